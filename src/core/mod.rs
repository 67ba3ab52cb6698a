//! Core pipeline logic.
//!
//! This module contains:
//! - Pipeline: End-to-end run over one or more reporting windows
//! - Retry: Backoff policy for model calls
//! - Workspace: Per-run directories, locking, and the error log
//! - Digest: HTML rendering of the aggregated mail

pub mod digest;
pub mod pipeline;
pub mod retry;
pub mod workspace;

// Re-export commonly used types
pub use pipeline::{Pipeline, RunReport};
pub use retry::RetryPolicy;
pub use workspace::RunWorkspace;
