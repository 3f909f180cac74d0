//! Core of the LexAI chat client: document ingestion, the conversation with
//! the remote model and the streaming transcript.
//!
//! Presentation is left to the caller, which drives a [`ChatSession`] and
//! renders its transcript and attachments.

pub mod attachments;
pub mod chat;
pub mod error;
pub mod settings;

pub use attachments::{Attachment, AttachmentKind, ContentKind, RawFile, SubmitReport};
pub use chat::{ChatSession, ChatStatus, GeminiClient, Role, SessionBuilder, SessionEvent, TranscriptEntry};
pub use error::{ChatError, ChatResult, ExtractionError};
pub use settings::{JsonSettingsRepository, LexaiSettings, SettingsRepository};
