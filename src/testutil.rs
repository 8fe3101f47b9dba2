//! Mock workers for socket-level tests.

use crate::run::rw::Connection;
use tokio::net::TcpListener;

const MAX_FRAME: usize = 64 * 1024 * 1024;

/// A worker that sorts whatever it receives, one request per connection.
pub async fn spawn_sorting_worker() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(async move {
                        let mut conn = Connection::new(stream, MAX_FRAME);
                        if let Ok(mut numbers) = conn.recv::<Vec<i64>>().await {
                            numbers.sort_unstable();
                            let _ = conn.send(&numbers).await;
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });
    port
}

/// A worker that accepts connections, so liveness probes pass, but hangs up
/// before serving anything.
pub async fn spawn_flaky_worker() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => drop(stream),
                Err(_) => break,
            }
        }
    });
    port
}

/// A worker that always replies with a single element, whatever it was sent.
pub async fn spawn_lying_worker() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(async move {
                        let mut conn = Connection::new(stream, MAX_FRAME);
                        if conn.recv::<Vec<i64>>().await.is_ok() {
                            let _ = conn.send(&vec![0i64]).await;
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });
    port
}

/// A port that was briefly bound and then released: connecting to it fails.
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
