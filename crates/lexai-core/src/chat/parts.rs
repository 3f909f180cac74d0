use serde::{Deserialize, Serialize};

use crate::attachments::{Attachment, ContentKind};
use crate::error::ChatError;

/// Provider-neutral piece of an outgoing user turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePart {
    Text(String),
    InlineData { media_type: String, data: String },
}

impl MessagePart {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text(text) => Some(text),
            MessagePart::InlineData { .. } => None,
        }
    }
}

/// Render an attachment as the part it is transmitted as.
pub fn attachment_part(attachment: &Attachment) -> Result<MessagePart, ChatError> {
    match attachment.content_kind {
        ContentKind::EmbeddedText => {
            let text = attachment
                .embedded_text()
                .map_err(|e| ChatError::AttachmentProcessing {
                    name: attachment.name.clone(),
                    reason: format!("stored payload is corrupt: {e}"),
                })?
                .unwrap_or_default();
            Ok(MessagePart::Text(format!(
                "[Document: {}]\n{}",
                attachment.name, text
            )))
        }
        ContentKind::InlineBinary => Ok(MessagePart::InlineData {
            media_type: attachment.transmit_media_type.clone(),
            data: attachment.data().to_string(),
        }),
    }
}

/// Assemble one user turn.
///
/// Attachment parts come first, in the order given, followed by the text.
/// When only attachments are sent, `default_instruction` takes the place of
/// the text.
pub fn build_turn(
    text: &str,
    attachments: &[Attachment],
    default_instruction: &str,
) -> Result<Vec<MessagePart>, ChatError> {
    if text.is_empty() && attachments.is_empty() {
        return Err(ChatError::InvalidSendRequest(
            "a turn needs text or at least one attachment".to_string(),
        ));
    }

    let mut parts = attachments
        .iter()
        .map(attachment_part)
        .collect::<Result<Vec<_>, _>>()?;

    if !text.is_empty() {
        parts.push(MessagePart::Text(text.to_string()));
    } else {
        parts.push(MessagePart::Text(default_instruction.to_string()));
    }

    Ok(parts)
}
