//! Postmaster worker: configuration, logging setup and the consumer loop
//! run by the `postmaster-worker` binary.

pub mod config;
pub mod consumer;
pub mod telemetry;

pub use config::{TransportConfig, WorkerConfig};
pub use consumer::{ConsumerLoop, LoopExit, LoopSummary};
