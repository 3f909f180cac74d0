//! Attachment validation logic
//!
//! Size is checked before type, and both run before any bytes are decoded.

use crate::error::ChatError;
use crate::settings::LexaiSettings;

use super::kind::AttachmentKind;

#[derive(Debug, PartialEq, Eq)]
pub enum ValidationError {
    FileTooLarge { size: u64, max: u64 },
    UnsupportedType { accepted: String },
}

impl ValidationError {
    /// Attach the file name to produce the user-facing error.
    pub fn into_chat_error(self, file_name: &str) -> ChatError {
        match self {
            ValidationError::FileTooLarge { size, max } => ChatError::FileTooLarge {
                name: file_name.to_string(),
                size,
                limit: max,
            },
            ValidationError::UnsupportedType { accepted } => ChatError::UnsupportedFileType {
                name: file_name.to_string(),
                accepted,
            },
        }
    }
}

/// Validate a classified file for attachment
pub fn validate_attachment(
    size: u64,
    kind: AttachmentKind,
    settings: &LexaiSettings,
) -> Result<(), ValidationError> {
    if size > settings.max_file_size {
        return Err(ValidationError::FileTooLarge {
            size,
            max: settings.max_file_size,
        });
    }

    if kind == AttachmentKind::Unsupported {
        return Err(ValidationError::UnsupportedType {
            accepted: settings.accepted_labels(),
        });
    }

    Ok(())
}
