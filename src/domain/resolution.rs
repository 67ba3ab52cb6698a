//! Resolution detection over call summaries.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Sentence the summarization prompt asks the model to emit when a call
/// ended with the issue fixed. The phrase classifier matches on it
/// verbatim, so prompt and matcher must stay in sync.
pub const RESOLUTION_PHRASE: &str = "This issue was resolved.";

/// Outcome of classifying one summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Resolved,
    Unresolved,
}

impl ResolutionStatus {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionStatus::Resolved)
    }

    /// Label shown in the digest.
    pub fn label(&self) -> &'static str {
        match self {
            ResolutionStatus::Resolved => "Resolved",
            ResolutionStatus::Unresolved => "Not Resolved",
        }
    }
}

/// Which classifier the pipeline should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Exact-phrase match against the summary text.
    #[default]
    Phrase,
    /// Ask the completion model to judge the summary.
    Model,
}

/// Decides whether a summary describes a resolved call.
#[async_trait]
pub trait ResolutionClassifier: Send + Sync {
    async fn classify(&self, summary: &str) -> Result<ResolutionStatus>;
}

/// Matches the resolution phrase verbatim. Never fails and never
/// makes a network call.
pub struct PhraseClassifier;

#[async_trait]
impl ResolutionClassifier for PhraseClassifier {
    async fn classify(&self, summary: &str) -> Result<ResolutionStatus> {
        if summary.contains(RESOLUTION_PHRASE) {
            Ok(ResolutionStatus::Resolved)
        } else {
            Ok(ResolutionStatus::Unresolved)
        }
    }
}
