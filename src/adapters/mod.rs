//! Adapter interfaces for external systems.
//!
//! Each adapter owns one HTTP surface:
//! - Helpdesk: ticket search, comments, attachments, updates
//! - Speech: transcription and chat completions
//! - Mail: OAuth token acquisition and digest delivery

pub mod helpdesk;
pub mod mail;
pub mod speech;

// Re-export commonly used types
pub use helpdesk::{HelpdeskClient, PaginationPolicy, RecordingComment, SearchResult};
pub use mail::MailClient;
pub use speech::{ModelClassifier, SpeechClient, SpeechError};
