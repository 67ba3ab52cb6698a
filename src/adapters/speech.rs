//! Speech service client for transcription and summarization.
//!
//! Endpoints:
//! - POST /audio/transcriptions    multipart audio upload
//! - POST /chat/completions        summaries and short judgments
//!
//! Auth: Bearer token.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::SpeechSettings;
use crate::domain::{ResolutionClassifier, ResolutionStatus, RESOLUTION_PHRASE, UNKNOWN_COMPANY};

/// System prompt shared by all completion calls.
pub const SYSTEM_PROMPT: &str = "You are an intelligent assistant.";

/// Errors from the speech service.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("speech API transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed speech API response: {0}")]
    Malformed(String),
}

impl SpeechError {
    /// Rate limits, server errors and transport failures are worth
    /// retrying; everything else fails the call outright.
    pub fn is_transient(&self) -> bool {
        match self {
            SpeechError::Api { status, .. } => *status == 429 || *status >= 500,
            SpeechError::Transport(_) => true,
            SpeechError::Io { .. } | SpeechError::Malformed(_) => false,
        }
    }
}

/// Speech service client
pub struct SpeechClient {
    base_url: String,
    api_key: String,
    transcription_model: String,
    completion_model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl SpeechClient {
    /// Create a new client
    pub fn new(
        base_url: String,
        api_key: String,
        transcription_model: String,
        completion_model: String,
    ) -> Self {
        Self {
            base_url,
            api_key,
            transcription_model,
            completion_model,
            client: reqwest::Client::new(),
        }
    }

    /// Create from resolved settings
    pub fn from_settings(settings: &SpeechSettings) -> Self {
        Self::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            settings.transcription_model.clone(),
            settings.completion_model.clone(),
        )
    }

    /// Transcribe an audio file.
    pub async fn transcribe(&self, path: &Path) -> Result<String, SpeechError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| SpeechError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("recording.mp3")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let response = check(response).await?;

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text)
    }

    /// Run one chat completion and return the assistant's text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, SpeechError> {
        let payload = serde_json::json!({
            "model": self.completion_model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let response = check(response).await?;

        let parsed: serde_json::Value = response.json().await?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                SpeechError::Malformed("completion response missing message content".to_string())
            })?;
        Ok(content.trim().to_string())
    }

    /// Summarize one call.
    pub async fn summarize(
        &self,
        customer: &str,
        agent: &str,
        transcript: &str,
    ) -> Result<String, SpeechError> {
        self.complete(SYSTEM_PROMPT, &summary_prompt(customer, agent, transcript))
            .await
    }

    /// Ask which company the caller works for.
    pub async fn extract_company(&self, transcript: &str) -> Result<String, SpeechError> {
        self.complete(SYSTEM_PROMPT, &company_prompt(transcript))
            .await
    }
}

/// Surface non-success responses as [`SpeechError::Api`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, SpeechError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);
    Err(SpeechError::Api {
        status: status.as_u16(),
        message,
    })
}

/// User prompt for call summaries. Asks for the resolution sentence
/// verbatim so the phrase classifier can match on it.
pub fn summary_prompt(customer: &str, agent: &str, transcript: &str) -> String {
    format!(
        "Summarize the issue faced by customer {} and how agent {} addressed it. \
         Indicate if the issue was resolved, using no more than 150 words; \
         if it was, include the exact sentence \"{}\" \
         Transcript: {}",
        customer, agent, RESOLUTION_PHRASE, transcript
    )
}

/// User prompt for company extraction.
pub fn company_prompt(transcript: &str) -> String {
    format!(
        "Based on the transcript, what company does the customer work for? \
         Reply with the company name only, or \"{}\" if you cannot tell. \
         Transcript: {}",
        UNKNOWN_COMPANY, transcript
    )
}

/// Classifies summaries by asking the completion model for a one-word
/// judgment. Alternative to the default phrase matching.
pub struct ModelClassifier {
    speech: Arc<SpeechClient>,
}

impl ModelClassifier {
    pub fn new(speech: Arc<SpeechClient>) -> Self {
        Self { speech }
    }
}

#[async_trait]
impl ResolutionClassifier for ModelClassifier {
    async fn classify(&self, summary: &str) -> anyhow::Result<ResolutionStatus> {
        let prompt = format!(
            "Does the following summary state that the customer's issue was resolved? \
             Reply with exactly one word, Resolved or Unresolved. Summary: {}",
            summary
        );
        let reply = self.speech.complete(SYSTEM_PROMPT, &prompt).await?;
        Ok(parse_classifier_reply(&reply))
    }
}

/// Anything other than a clear "resolved" counts as unresolved.
fn parse_classifier_reply(reply: &str) -> ResolutionStatus {
    let normalized = reply.trim().trim_end_matches('.').to_lowercase();
    if normalized == "resolved" {
        ResolutionStatus::Resolved
    } else {
        ResolutionStatus::Unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prompt_contents() {
        let prompt = summary_prompt("Pat Doe", "Dana", "hello there");
        assert!(prompt.contains("customer Pat Doe"));
        assert!(prompt.contains("agent Dana"));
        assert!(prompt.contains("no more than 150 words"));
        assert!(prompt.contains(RESOLUTION_PHRASE));
        assert!(prompt.ends_with("Transcript: hello there"));
    }

    #[test]
    fn test_company_prompt_contents() {
        let prompt = company_prompt("we are calling from Acme");
        assert!(prompt.contains(UNKNOWN_COMPANY));
        assert!(prompt.ends_with("Transcript: we are calling from Acme"));
    }

    #[test]
    fn test_classifier_reply_parsing() {
        assert_eq!(parse_classifier_reply("Resolved"), ResolutionStatus::Resolved);
        assert_eq!(parse_classifier_reply("resolved."), ResolutionStatus::Resolved);
        assert_eq!(parse_classifier_reply("  RESOLVED  "), ResolutionStatus::Resolved);
        assert_eq!(
            parse_classifier_reply("Unresolved"),
            ResolutionStatus::Unresolved
        );
        assert_eq!(
            parse_classifier_reply("The issue was resolved"),
            ResolutionStatus::Unresolved
        );
        assert_eq!(parse_classifier_reply(""), ResolutionStatus::Unresolved);
    }

    #[test]
    fn test_transient_errors() {
        let rate_limited = SpeechError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(rate_limited.is_transient());

        let server = SpeechError::Api {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert!(server.is_transient());

        let bad_request = SpeechError::Api {
            status: 400,
            message: "invalid model".to_string(),
        };
        assert!(!bad_request.is_transient());

        let malformed = SpeechError::Malformed("no content".to_string());
        assert!(!malformed.is_transient());
    }
}
