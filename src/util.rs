use std::net::UdpSocket;
use tracing::warn;

/// Discovers the address of the interface used to reach the outside world.
/// No packet is sent; connecting a UDP socket only selects a route.
pub fn local_ip() -> String {
    match routed_ip() {
        Some(ip) => ip,
        None => {
            warn!("could not determine the local ip, assuming loopback");
            "127.0.0.1".to_string()
        }
    }
}

fn routed_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    Some(addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ip_is_parseable() {
        let ip = local_ip();
        assert!(ip.parse::<std::net::IpAddr>().is_ok());
    }
}
