//! Photomirror Sync - mirror engine
//!
//! Provides:
//! - The pure [`differ`] from remote/local state to an ordered operation plan
//! - The metadata-fetch [`rate_limit::MetadataBucket`]
//! - The orchestrating [`engine::SyncEngine`] (fetch → diff → write) with
//!   bounded download concurrency, per-asset retry and event emission

pub mod differ;
pub mod engine;
pub mod rate_limit;

pub use differ::{diff, LocalState, RemoteState, SyncOperation};
pub use engine::{RunResult, SyncEngine};
