pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod driver;
pub mod error;
pub mod identity;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod stats;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use checkpoint::JsonFileCheckpointStore;
pub use classify::{BlockSignatures, Classification, classify};
pub use config::EngineConfig;
pub use driver::{
    DEFAULT_TEMPLATE, DriverEvent, DriverReporter, FailedUnit, PageSequenceDriver, RunSummary,
    TracingDriverReporter, UrlTemplate,
};
pub use error::AppError;
pub use identity::IdentityPool;
pub use models::{
    Checkpoint, FetchOutcome, FetchRequest, FetchStatus, IdentityRecord, RawResult, RunMetadata,
    TransportErrorKind, TransportKind,
};
pub use orchestrator::{EscalationState, FetchOrchestrator};
pub use policy::{DelayRange, FallbackPolicy, RetryPolicy};
pub use stats::{Statistics, StatsCollector};
pub use traits::{
    CheckpointStore, DebugSink, FallbackTransport, NoFallback, NullSink, OutcomeSink,
    PrimaryTransport, Sleeper, TokioSleeper,
};
