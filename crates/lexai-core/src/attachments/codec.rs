//! Per-kind transforms from raw file bytes to a transmittable payload.
//!
//! Document extraction is delegated to collaborators handed in at
//! construction, so the codec itself stays a pure function of its inputs.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ChatError, ExtractionError};
use crate::settings::{accepted_labels, default_file_types};

use super::kind::{AttachmentKind, ContentKind};
use super::model::{EncodedPayload, encode_portable};

const EMBEDDED_TEXT_MEDIA_TYPE: &str = "text/plain";
const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Extracts raw text from a word-processor document.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// One rendered worksheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetText {
    pub name: String,
    /// Delimiter-separated rendering of the sheet's cells.
    pub delimited_text: String,
}

/// Parses a workbook into its sheets, in workbook order.
pub trait WorkbookParser: Send + Sync {
    fn parse_workbook(&self, bytes: &[u8]) -> Result<Vec<SheetText>, ExtractionError>;
}

#[derive(Clone)]
pub struct AttachmentCodec {
    text_extractor: Arc<dyn TextExtractor>,
    workbook_parser: Arc<dyn WorkbookParser>,
    /// Named in the rejection of an unsupported file.
    accepted_labels: String,
}

impl AttachmentCodec {
    pub fn new(text_extractor: Arc<dyn TextExtractor>, workbook_parser: Arc<dyn WorkbookParser>) -> Self {
        Self {
            text_extractor,
            workbook_parser,
            accepted_labels: accepted_labels(&default_file_types()),
        }
    }

    pub fn with_accepted_labels(mut self, labels: impl Into<String>) -> Self {
        self.accepted_labels = labels.into();
        self
    }

    /// Transform one validated file.
    ///
    /// `kind` must come from [`classify`](super::kind::classify); passing
    /// `Unsupported` is reported the same way validation would report it.
    pub fn encode(
        &self,
        file_name: &str,
        kind: AttachmentKind,
        declared_media_type: &str,
        bytes: &[u8],
    ) -> Result<EncodedPayload, ChatError> {
        debug!(file = %file_name, ?kind, bytes = bytes.len(), "Encoding attachment");

        match kind {
            // Plain text keeps its bytes untouched; decoding happens at send time.
            AttachmentKind::Text => Ok(embedded_text_bytes(bytes)),
            AttachmentKind::WordDoc => {
                let text = self
                    .text_extractor
                    .extract_text(bytes)
                    .map_err(|e| processing_error(file_name, e))?;
                Ok(embedded_text_bytes(text.as_bytes()))
            }
            AttachmentKind::Spreadsheet => {
                let sheets = self
                    .workbook_parser
                    .parse_workbook(bytes)
                    .map_err(|e| processing_error(file_name, e))?;
                Ok(embedded_text_bytes(render_sheets(&sheets).as_bytes()))
            }
            AttachmentKind::Pdf => {
                let media_type = if declared_media_type.trim().is_empty() {
                    PDF_MEDIA_TYPE.to_string()
                } else {
                    declared_media_type.to_string()
                };
                Ok(EncodedPayload {
                    data: encode_portable(bytes),
                    media_type,
                    content_kind: ContentKind::InlineBinary,
                })
            }
            AttachmentKind::Unsupported => Err(ChatError::UnsupportedFileType {
                name: file_name.to_string(),
                accepted: self.accepted_labels.clone(),
            }),
        }
    }
}

/// Concatenate sheets under `--- Sheet: <name> ---` headers, skipping blank ones.
pub fn render_sheets(sheets: &[SheetText]) -> String {
    let mut out = String::new();
    for sheet in sheets {
        if sheet.delimited_text.trim().is_empty() {
            continue;
        }
        out.push_str("--- Sheet: ");
        out.push_str(&sheet.name);
        out.push_str(" ---\n");
        out.push_str(&sheet.delimited_text);
        out.push_str("\n\n");
    }
    out
}

fn embedded_text_bytes(bytes: &[u8]) -> EncodedPayload {
    EncodedPayload {
        data: encode_portable(bytes),
        media_type: EMBEDDED_TEXT_MEDIA_TYPE.to_string(),
        content_kind: ContentKind::EmbeddedText,
    }
}

fn processing_error(file_name: &str, err: ExtractionError) -> ChatError {
    ChatError::AttachmentProcessing {
        name: file_name.to_string(),
        reason: err.message,
    }
}
