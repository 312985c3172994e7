//! Stage-based architecture analysis pipeline.
//!
//! A caller submits a batch of application identifiers. The
//! [`PipelineOrchestrator`] collects a record for each one through a
//! [`CollectionGateway`](collector::CollectionGateway) with bounded
//! concurrency, cleans the records, asks an [`Analyzer`](analyzer::Analyzer)
//! for an architecture analysis and hands the result to a
//! [`ReportSink`](report::ReportSink). Progress is published to a
//! process-local [`TaskRegistry`](registry::TaskRegistry) that any number
//! of pollers can read while the task runs.
//!
//! # Overview
//!
//! Every task walks the same state machine:
//!
//! ```text
//! initialized -> collecting -> processing -> analyzing -> generating_report -> completed
//!       \             \             \             \                \
//!        +-------------+-------------+-------------+----------------+--> failed
//! ```
//!
//! Failures never escape as errors. They end the task in `failed` and are
//! reported through an unsuccessful [`TaskResult`].
//!
//! # Module Organization
//!
//! - [`types`] - Stages, progress records, collected records, results
//! - [`orchestrator`] - Stage sequencing, task handles, cancellation
//! - [`registry`] - Live task registry
//! - [`collector`] - Gateway contract and bounded batch collection
//! - [`validator`] - Record cleaning
//! - [`analyzer`] - Analyzer contract and chat-model providers
//! - [`report`] - Report rendering and file sink
//! - [`config`] - TOML and environment configuration
//! - [`error`] - Error types

pub mod analyzer;
pub mod collector;
pub mod config;
pub mod constants;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod results;
pub mod types;
pub mod validator;

// Re-exports for ergonomic access
pub use config::PipelineConfig;
pub use error::{
    AnalysisError, CollectionError, ConfigError, PipelineError, RegistryError, ReportError,
};
pub use orchestrator::{PipelineOrchestrator, TaskHandle};
pub use types::*;
