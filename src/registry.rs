use crate::config::Config;
use crate::protocol::{RegisterReply, RegisterRequest};
use crate::util;
use parking_lot::Mutex;
use std::time::{Duration, SystemTime};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// One registered worker. The (ip, port) pair is the unique key; everything
/// else is replaced wholesale on re-registration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRecord {
    pub ip: String,
    pub port: u16,
    pub name: String,
    pub active: bool,
    /// wall-clock duration of the last sort request served by this worker
    pub last_response_time: Duration,
    /// when the last liveness probe ran
    pub last_check_time: SystemTime,
    /// items successfully sorted by this worker since registration
    pub total_processed: u64,
}

impl WorkerRecord {
    fn new(ip: String, port: u16, name: String) -> Self {
        Self {
            ip,
            port,
            name,
            active: true,
            last_response_time: Duration::ZERO,
            last_check_time: SystemTime::now(),
            total_processed: 0,
        }
    }

    pub fn addr(&self) -> (String, u16) {
        (self.ip.clone(), self.port)
    }
}

/// The fleet of registered workers. Insertion order is preserved and is the
/// order used for display and partition assignment. A single exclusive lock
/// serializes every mutation; snapshots handed to callers are copies, so no
/// caller does I/O while holding the lock.
#[derive(Debug)]
pub struct WorkerRegistry {
    workers: Mutex<Vec<WorkerRecord>>,
    host_ip: String,
    probe_timeout_local: Duration,
    probe_timeout_remote: Duration,
}

impl WorkerRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            host_ip: util::local_ip(),
            probe_timeout_local: config.probe_timeout_local(),
            probe_timeout_remote: config.probe_timeout_remote(),
        }
    }

    /// Registers a worker or replaces an existing record with the same
    /// (ip, port) key. No probe runs here; the worker is trusted to be
    /// reachable until the next sweep says otherwise.
    pub fn register(&self, request: RegisterRequest) -> RegisterReply {
        let (ip, port, name) = match request.validate() {
            Ok(fields) => fields,
            Err(message) => {
                warn!("rejected worker registration: {}", message);
                return RegisterReply::rejected(message);
            }
        };

        let record = WorkerRecord::new(ip, port, name);
        let mut workers = self.workers.lock();
        match workers
            .iter_mut()
            .find(|w| w.ip == record.ip && w.port == record.port)
        {
            Some(existing) => {
                info!(
                    "worker {} re-registered at {}:{}",
                    record.name, record.ip, record.port
                );
                *existing = record;
            }
            None => {
                info!(
                    "new worker {} registered at {}:{}",
                    record.name, record.ip, record.port
                );
                workers.push(record);
            }
        }
        RegisterReply::accepted()
    }

    /// Probes every registered worker with a TCP connect and updates the
    /// liveness flags. Addresses are snapshotted under the lock, probed
    /// concurrently outside it, and the outcomes merged back under it.
    /// Returns (active, total).
    pub async fn probe_all(&self) -> (usize, usize) {
        let targets: Vec<(String, u16)> = {
            let workers = self.workers.lock();
            workers.iter().map(|w| (w.ip.clone(), w.port)).collect()
        };
        if targets.is_empty() {
            return (0, 0);
        }

        let probes = targets.into_iter().map(|(ip, port)| {
            let timeout = self.probe_timeout(&ip);
            async move {
                let alive = probe(&ip, port, timeout).await;
                (ip, port, alive)
            }
        });
        let outcomes = futures::future::join_all(probes).await;

        let now = SystemTime::now();
        let mut workers = self.workers.lock();
        for (ip, port, alive) in outcomes {
            // the record may have been replaced mid-sweep; match by key
            if let Some(worker) = workers
                .iter_mut()
                .find(|w| w.ip == ip && w.port == port)
            {
                if worker.active != alive {
                    if alive {
                        info!(
                            "worker {} [{}:{}] is now reachable",
                            worker.name, worker.ip, worker.port
                        );
                    } else {
                        warn!(
                            "worker {} [{}:{}] is no longer reachable",
                            worker.name, worker.ip, worker.port
                        );
                    }
                }
                worker.active = alive;
                worker.last_check_time = now;
            }
        }
        let active = workers.iter().filter(|w| w.active).count();
        let total = workers.len();
        info!("active workers: {}/{}", active, total);
        (active, total)
    }

    /// Copies of the currently-active records, in registration order.
    pub fn active_snapshot(&self) -> Vec<WorkerRecord> {
        self.workers
            .lock()
            .iter()
            .filter(|w| w.active)
            .cloned()
            .collect()
    }

    /// Records a served sort request. No-op if the record is gone.
    pub fn record_success(
        &self,
        ip: &str,
        port: u16,
        elapsed: Duration,
        items: u64,
    ) {
        let mut workers = self.workers.lock();
        if let Some(worker) =
            workers.iter_mut().find(|w| w.ip == ip && w.port == port)
        {
            worker.last_response_time = elapsed;
            worker.total_processed += items;
        }
    }

    /// Flags a worker down without waiting for the next sweep; the
    /// dispatcher calls this on any transport failure.
    pub fn mark_inactive(&self, ip: &str, port: u16) {
        let mut workers = self.workers.lock();
        if let Some(worker) =
            workers.iter_mut().find(|w| w.ip == ip && w.port == port)
        {
            if worker.active {
                warn!(
                    "worker {} [{}:{}] marked inactive after a failed request",
                    worker.name, worker.ip, worker.port
                );
            }
            worker.active = false;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    fn probe_timeout(&self, ip: &str) -> Duration {
        if ip == "127.0.0.1" || ip == "localhost" || ip == self.host_ip {
            self.probe_timeout_local
        } else {
            self.probe_timeout_remote
        }
    }
}

async fn probe(ip: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("probe of {}:{} failed: {}", ip, port, e);
            false
        }
        Err(_) => {
            debug!("probe of {}:{} timed out", ip, port);
            false
        }
    }
}
