//! Momentum Flux - On-device analytics engine for short-form video momentum
//!
//! Flux turns periodic engagement snapshots of a creator's videos into a 0-100
//! momentum score per video through a deterministic pipeline: rate normalization
//! → per-age-bucket baseline comparison → weighted sigmoid scoring → confidence
//! shrinkage → phase detection.
//!
//! ## Modules
//!
//! - **Engines**: `scoring`, `phase`, `overall`, `drivers` and `lifecycle` are pure
//!   functions of their inputs
//! - **Baselines**: `baseline` builds per-account, per-age-bucket reference tables
//! - **Orchestration**: `pipeline` drives the engines against the `store` contracts

pub mod baseline;
pub mod config;
pub mod drivers;
pub mod error;
pub mod lifecycle;
pub mod normalizer;
pub mod overall;
pub mod phase;
pub mod pipeline;
pub mod scoring;
pub mod stats;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use baseline::BaselineBuilder;
pub use config::ServiceConfig;
pub use drivers::{DriverPack, DriverPackBuilder};
pub use error::{ComputeError, StoreError};
pub use lifecycle::{LifecycleLineBuilder, LifecycleLineModel};
pub use overall::AccountOverallEngine;
pub use phase::PhaseDetector;
pub use pipeline::AnalyticsScoringService;
pub use scoring::HypeScoringEngine;
pub use store::{BaselineStore, InMemoryStore, ScoreStore, SnapshotStore};
pub use types::{
    AccountOverallComputation, AgeBucket, BaselineBucket, BaselineTable, HypeComputation, Phase,
    ScoreRecord, Snapshot, Stability,
};

/// Library version embedded in reports
pub const MOMENTUM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "momentum-flux";
