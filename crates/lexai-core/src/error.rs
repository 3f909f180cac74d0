use thiserror::Error;

/// Errors surfaced by the chat core.
///
/// Per-file variants (`FileTooLarge`, `UnsupportedFileType`,
/// `AttachmentProcessing`) are collected as rejections by
/// [`AttachmentManager::submit`](crate::attachments::AttachmentManager::submit)
/// and never abort a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("File \"{name}\" is {size} bytes, which exceeds the {limit} byte limit")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    #[error("File \"{name}\" is not supported. Please upload {accepted} files.")]
    UnsupportedFileType { name: String, accepted: String },

    #[error("Failed to process {name}: {reason}")]
    AttachmentProcessing { name: String, reason: String },

    #[error("{0}")]
    RemoteCall(String),

    #[error("Invalid send request: {0}")]
    InvalidSendRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Failure reported by a text-extraction or workbook-parsing collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExtractionError {
    pub message: String,
}

impl ExtractionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
