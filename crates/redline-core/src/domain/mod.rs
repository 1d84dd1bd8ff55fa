//! Domain model for revision runs.
//!
//! - `Document` / `Requirements`: the input artifact and its constraints
//! - `Message` / `ConversationHistory`: the ordered turn record
//! - `ParticipantProfile`: the fixed per-role configuration
//! - `RedlineError` / `CompletionError`: the error taxonomy

pub mod document;
pub mod error;
pub mod message;
pub mod profile;

pub use document::{admin_brief, word_count, Document, Requirements};
pub use error::{CompletionError, ErrorKind, RedlineError, Result};
pub use message::{ConversationHistory, Message, SpeakerRole};
pub use profile::{ParticipantProfile, ResponseFormat, SamplingParams};
