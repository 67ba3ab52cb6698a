//! Domain types for the callscribe pipeline.
//!
//! This module contains the core data structures:
//! - Ticket: Per-ticket state accumulated across pipeline stages
//! - Window: Reporting windows for helpdesk searches
//! - Resolution: Classifying summaries as resolved or not

pub mod resolution;
pub mod ticket;
pub mod window;

// Re-export commonly used types
pub use resolution::{
    PhraseClassifier, ResolutionClassifier, ResolutionStatus, ResolutionStrategy,
    RESOLUTION_PHRASE,
};
pub use ticket::{CallDuration, TicketRecord, UNKNOWN_COMPANY};
pub use window::DayWindow;
