use crate::config::Config;
use crate::protocol::{
    parse_first_message, ErrorReply, FirstMessage, StatusReply,
};
use crate::registry::{WorkerRecord, WorkerRegistry};
use crate::run::rw::{Connection, FrameError};
use crate::sort::Dispatcher;
use crate::stats::{ClientStats, SortStats};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

/// One task per accepted client connection. Owns the socket for the whole
/// session; the socket is released on every exit path when the connection is
/// dropped.
pub async fn client_task(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<WorkerRegistry>,
    dispatcher: Arc<Dispatcher>,
    sort_stats: Arc<SortStats>,
    client_stats: Arc<ClientStats>,
    config: Config,
) {
    info!("client {} connected", addr);
    let mut conn = Connection::new(stream, config.max_frame_len());
    let result = session(
        &mut conn,
        &registry,
        &dispatcher,
        &sort_stats,
        &client_stats,
        &config,
    )
    .await;
    match result {
        Ok(()) => {}
        Err(e) if e.is_disconnect() => {
            warn!("client {} disconnected abruptly", addr)
        }
        Err(e) => error!("session with client {} failed: {}", addr, e),
    }
    info!("connection with client {} closed", addr);
}

/// The session state machine: one unframed first read, then one of the three
/// behaviors (listing, registration, sort).
async fn session<S>(
    conn: &mut Connection<S>,
    registry: &WorkerRegistry,
    dispatcher: &Dispatcher,
    sort_stats: &SortStats,
    client_stats: &ClientStats,
    config: &Config,
) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let first = conn.recv_probe(config.handshake_read_limit()).await?;
    match parse_first_message(&first) {
        FirstMessage::List => {
            if list_workers(conn, registry).await? {
                sort_session(
                    conn,
                    registry,
                    dispatcher,
                    sort_stats,
                    client_stats,
                    config,
                )
                .await?;
            }
        }
        FirstMessage::Register(request) => {
            let reply = registry.register(request);
            conn.send_unframed(&reply).await?;
        }
        FirstMessage::Sort => {
            sort_session(
                conn,
                registry,
                dispatcher,
                sort_stats,
                client_stats,
                config,
            )
            .await?;
        }
        FirstMessage::Unknown(action) => {
            let action = action.as_deref().unwrap_or("<missing>");
            warn!("client sent an unknown action: {}", action);
            conn.send_unframed(&StatusReply::error(format!(
                "unknown action: {}",
                action
            )))
            .await?;
        }
        FirstMessage::Malformed => {
            warn!("client sent a malformed first message");
            conn.send_unframed(&StatusReply::error("invalid JSON")).await?;
        }
    }
    Ok(())
}

/// Probes the fleet and sends the plain-text worker listing. Returns whether
/// the session should continue into a sort.
async fn list_workers<S>(
    conn: &mut Connection<S>,
    registry: &WorkerRegistry,
) -> Result<bool, FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    registry.probe_all().await;
    let active = registry.active_snapshot();
    if active.is_empty() {
        conn.send_text("ERROR: no workers available for processing\n")
            .await?;
        return Ok(false);
    }
    conn.send_text(&render_banner(&active)).await?;
    Ok(true)
}

fn render_banner(active: &[WorkerRecord]) -> String {
    let mut banner = String::new();
    banner.push_str("============================================\n");
    banner.push_str("distributed sort middleware\n");
    banner.push_str("============================================\n");
    let _ = writeln!(banner, "available workers: {}", active.len());
    for (i, worker) in active.iter().enumerate() {
        let response = if worker.last_response_time > Duration::ZERO {
            format!("{:.2}s", worker.last_response_time.as_secs_f64())
        } else {
            "N/A".to_string()
        };
        let _ = writeln!(
            banner,
            "{}. {} ({}:{}) - last response: {}",
            i + 1,
            worker.name,
            worker.ip,
            worker.port,
            response
        );
    }
    banner.push_str("starting distributed sort...\n");
    banner
}

/// The DISPATCH leg: readiness reply, framed input, dispatcher invocation,
/// operation counters.
async fn sort_session<S>(
    conn: &mut Connection<S>,
    registry: &WorkerRegistry,
    dispatcher: &Dispatcher,
    sort_stats: &SortStats,
    client_stats: &ClientStats,
    config: &Config,
) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (active, _total) = registry.probe_all().await;
    if active == 0 {
        conn.send_unframed(&ErrorReply::new(
            "no workers available for distributed processing",
        ))
        .await?;
        return Ok(());
    }

    conn.send_unframed(&StatusReply::ready("ready to sort")).await?;

    let body = match conn.recv_frame_timeout(config.transfer_timeout()).await {
        Ok(body) => body,
        Err(FrameError::PeerClosed { received, expected }) => {
            warn!(
                "client closed the connection mid-upload ({}/{} bytes)",
                received, expected
            );
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    sort_stats.add_bytes(body.len() as u64);

    let numbers: Vec<i64> = match serde_json::from_slice(&body) {
        Ok(numbers) => numbers,
        Err(_) => {
            conn.send_unframed(&ErrorReply::new(
                "payload is not a JSON list of integers",
            ))
            .await?;
            return Ok(());
        }
    };
    info!("received {} numbers to sort", numbers.len());

    let produced = dispatcher.dispatch(numbers, conn).await;
    client_stats.record_operation(produced);
    Ok(())
}
