use crate::registry::WorkerRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Long-lived background sweep: every `interval`, probe the whole fleet so
/// workers that died between jobs are noticed without waiting for a sort.
pub async fn monitor_task(registry: Arc<WorkerRegistry>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        if registry.is_empty() {
            debug!("liveness sweep skipped: no workers registered");
            continue;
        }
        registry.probe_all().await;
    }
}
