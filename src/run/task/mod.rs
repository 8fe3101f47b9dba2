// This module contains the per-connection client session.
pub mod client;

// This module contains the periodic liveness monitor.
pub mod monitor;

use crate::config::Config;
use crate::run::rw::FrameError;
use color_eyre::eyre::Report;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;

/// Spawns a new task.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
}

/// Binds the listening socket on all interfaces with `SO_REUSEADDR` and the
/// configured backlog.
pub fn listen(config: &Config) -> Result<TcpListener, Report> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port()));
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(config.backlog())?;
    Ok(listener)
}

/// Connects to a worker within the given timeout.
pub async fn connect(
    ip: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, FrameError> {
    match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(FrameError::Io(e)),
        Err(_) => Err(FrameError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listen_on_ephemeral_port() {
        let listener = listen(&Config::new(0)).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let stream = connect("127.0.0.1", addr.port(), Duration::from_secs(1))
            .await
            .unwrap();
        drop(stream);
    }

    #[tokio::test]
    async fn connect_fails_fast_on_dead_port() {
        let dead_port = {
            let listener = listen(&Config::new(0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let result =
            connect("127.0.0.1", dead_port, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(FrameError::Io(_))));
    }
}
