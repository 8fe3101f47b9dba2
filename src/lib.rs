// This module contains the definition of `Config`.
pub mod config;

// This module contains the wire message types shared with clients and
// workers.
pub mod protocol;

// This module contains the definition of `WorkerRecord` and `WorkerRegistry`.
pub mod registry;

// This module contains the middleware runtime: listener, framing, client
// sessions and the liveness monitor.
pub mod run;

// This module contains the sort dispatcher and the k-way merge.
pub mod sort;

// This module contains the process-wide counters.
pub mod stats;

// This module contains small network utilities.
pub mod util;

// This module contains mock workers shared by socket-level tests.
#[cfg(test)]
pub(crate) mod testutil;

// Re-exports.
pub use config::Config;
pub use registry::{WorkerRecord, WorkerRegistry};
pub use run::Middleware;
