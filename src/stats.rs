use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide counters for the sort pipeline. Updated from many tasks, so
/// everything is atomic; consistency across fields is not required.
#[derive(Debug, Default)]
pub struct SortStats {
    bytes_processed: AtomicU64,
    numbers_sorted: AtomicU64,
    total_errors: AtomicU64,
    response_time_total_us: AtomicU64,
    response_count: AtomicU64,
}

impl SortStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_numbers(&self, count: u64) {
        self.numbers_sorted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        self.response_time_total_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.response_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    pub fn numbers_sorted(&self) -> u64 {
        self.numbers_sorted.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    /// Average worker round-trip time over all successful partitions.
    pub fn avg_response_time(&self) -> Duration {
        let count = self.response_count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        let total = self.response_time_total_us.load(Ordering::Relaxed);
        Duration::from_micros(total / count)
    }
}

/// Per-process operation counters owned by the client sessions.
#[derive(Debug, Default)]
pub struct ClientStats {
    total_operations: AtomicU64,
    successful_operations: AtomicU64,
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one finished sort job; `success` mirrors the dispatcher result.
    pub fn record_operation(&self, success: bool) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_operations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Relaxed)
    }

    pub fn successful_operations(&self) -> u64 {
        self.successful_operations.load(Ordering::Relaxed)
    }

    pub fn failed_operations(&self) -> u64 {
        self.total_operations() - self.successful_operations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_stats_accumulate() {
        let stats = SortStats::new();
        stats.add_bytes(100);
        stats.add_bytes(24);
        stats.add_numbers(5);
        stats.record_error();
        assert_eq!(stats.bytes_processed(), 124);
        assert_eq!(stats.numbers_sorted(), 5);
        assert_eq!(stats.total_errors(), 1);
    }

    #[test]
    fn avg_response_time_over_samples() {
        let stats = SortStats::new();
        assert_eq!(stats.avg_response_time(), Duration::ZERO);
        stats.record_response_time(Duration::from_millis(100));
        stats.record_response_time(Duration::from_millis(300));
        assert_eq!(stats.avg_response_time(), Duration::from_millis(200));
    }

    #[test]
    fn operations_are_monotone() {
        let stats = ClientStats::new();
        stats.record_operation(true);
        stats.record_operation(false);
        stats.record_operation(true);
        assert_eq!(stats.total_operations(), 3);
        assert_eq!(stats.successful_operations(), 2);
        assert_eq!(stats.failed_operations(), 1);
        assert!(stats.successful_operations() <= stats.total_operations());
    }
}
