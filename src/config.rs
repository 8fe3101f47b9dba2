use std::time::Duration;

/// Default port clients and workers connect to.
pub const DEFAULT_PORT: u16 = 60000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// port the middleware listens on
    port: u16,
    /// listen backlog
    backlog: u32,
    /// size of the unframed first read on a new client connection
    handshake_read_limit: usize,
    /// largest frame body we're willing to receive
    max_frame_len: usize,
    /// timeout when connecting to a worker for a sort round trip
    worker_connect_timeout: Duration,
    /// per-message timeout on bulk transfers, both client and worker facing
    transfer_timeout: Duration,
    /// liveness probe timeout for host-local workers
    probe_timeout_local: Duration,
    /// liveness probe timeout for remote workers
    probe_timeout_remote: Duration,
    /// cadence of the background liveness monitor
    monitor_interval: Duration,
}

impl Config {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            backlog: 10,
            handshake_read_limit: 8 * 1024,
            max_frame_len: 256 * 1024 * 1024,
            worker_connect_timeout: Duration::from_secs(10),
            transfer_timeout: Duration::from_secs(5 * 60),
            probe_timeout_local: Duration::from_secs(1),
            probe_timeout_remote: Duration::from_secs(3),
            monitor_interval: Duration::from_secs(30),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    pub fn handshake_read_limit(&self) -> usize {
        self.handshake_read_limit
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Changes the cap on received frame bodies.
    pub fn set_max_frame_len(&mut self, max_frame_len: usize) {
        self.max_frame_len = max_frame_len;
    }

    pub fn worker_connect_timeout(&self) -> Duration {
        self.worker_connect_timeout
    }

    pub fn transfer_timeout(&self) -> Duration {
        self.transfer_timeout
    }

    pub fn set_transfer_timeout(&mut self, transfer_timeout: Duration) {
        self.transfer_timeout = transfer_timeout;
    }

    pub fn probe_timeout_local(&self) -> Duration {
        self.probe_timeout_local
    }

    pub fn probe_timeout_remote(&self) -> Duration {
        self.probe_timeout_remote
    }

    pub fn monitor_interval(&self) -> Duration {
        self.monitor_interval
    }

    /// Shortens the monitor cadence; mostly useful in tests.
    pub fn set_monitor_interval(&mut self, monitor_interval: Duration) {
        self.monitor_interval = monitor_interval;
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.backlog(), 10);
        assert_eq!(config.handshake_read_limit(), 8 * 1024);
        assert_eq!(config.worker_connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.transfer_timeout(), Duration::from_secs(300));
        assert_eq!(config.probe_timeout_local(), Duration::from_secs(1));
        assert_eq!(config.probe_timeout_remote(), Duration::from_secs(3));
        assert_eq!(config.monitor_interval(), Duration::from_secs(30));
    }

    #[test]
    fn setters() {
        let mut config = Config::new(7000);
        config.set_max_frame_len(1024);
        config.set_monitor_interval(Duration::from_millis(10));
        assert_eq!(config.port(), 7000);
        assert_eq!(config.max_frame_len(), 1024);
        assert_eq!(config.monitor_interval(), Duration::from_millis(10));
    }
}
