//! The middleware runtime.
//!
//! One task runs the accept loop; each accepted connection is handed to a
//! fresh task that lives for that client's session; each partition dispatch
//! within a sort job runs as its own task so every worker is contacted
//! simultaneously. The registry is the only shared mutable structure and is
//! guarded by a single lock; sockets are never shared between tasks.

// This module contains the framed connection shared by every socket we own.
pub mod rw;

// This module contains the listener helpers plus the client-session and
// liveness-monitor tasks.
pub mod task;

use crate::config::Config;
use crate::registry::WorkerRegistry;
use crate::sort::Dispatcher;
use crate::stats::{ClientStats, SortStats};
use crate::util;
use color_eyre::eyre::Report;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Owner of the process-wide state: configuration, registry, dispatcher and
/// counters. One per process.
#[derive(Debug)]
pub struct Middleware {
    config: Config,
    registry: Arc<WorkerRegistry>,
    dispatcher: Arc<Dispatcher>,
    sort_stats: Arc<SortStats>,
    client_stats: Arc<ClientStats>,
    start: Instant,
}

impl Middleware {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(WorkerRegistry::new(&config));
        let sort_stats = Arc::new(SortStats::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            sort_stats.clone(),
            config,
        ));
        Self {
            config,
            registry,
            dispatcher,
            sort_stats,
            client_stats: Arc::new(ClientStats::new()),
            start: Instant::now(),
        }
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        self.registry.clone()
    }

    pub fn sort_stats(&self) -> Arc<SortStats> {
        self.sort_stats.clone()
    }

    pub fn client_stats(&self) -> Arc<ClientStats> {
        self.client_stats.clone()
    }

    /// Binds the configured port and serves until SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<(), Report> {
        let listener = task::listen(&self.config)?;
        self.run_on(listener).await
    }

    /// Serves on an already-bound listener until SIGINT or SIGTERM, then
    /// prints the final statistics. In-flight sessions are left to finish or
    /// die with their sockets.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), Report> {
        let addr = listener.local_addr()?;
        info!(
            "middleware listening on {}:{} (all interfaces)",
            util::local_ip(),
            addr.port()
        );

        task::spawn(task::monitor::monitor_task(
            self.registry.clone(),
            self.config.monitor_interval(),
        ));

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("new connection from {}", peer);
                        task::spawn(task::client::client_task(
                            stream,
                            peer,
                            self.registry.clone(),
                            self.dispatcher.clone(),
                            self.sort_stats.clone(),
                            self.client_stats.clone(),
                            self.config,
                        ));
                    }
                    Err(e) => error!("error accepting connection: {}", e),
                },
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    break;
                }
            }
        }

        drop(listener);
        self.print_summary();
        info!("middleware stopped");
        Ok(())
    }

    fn print_summary(&self) {
        let uptime = self.start.elapsed().as_secs();
        let (hours, rest) = (uptime / 3600, uptime % 3600);
        let (minutes, seconds) = (rest / 60, rest % 60);

        println!("\n============================================================");
        println!("                      final statistics");
        println!("============================================================");
        println!("uptime: {}h {}m {}s", hours, minutes, seconds);
        println!(
            "completed operations: {}",
            self.client_stats.successful_operations()
        );
        println!(
            "failed operations: {}",
            self.client_stats.failed_operations()
        );
        println!("bytes processed: {}", self.sort_stats.bytes_processed());
        println!("numbers sorted: {}", self.sort_stats.numbers_sorted());
        println!("worker errors: {}", self.sort_stats.total_errors());
        println!(
            "avg worker response time: {:?}",
            self.sort_stats.avg_response_time()
        );
        println!("============================================================\n");
    }
}
