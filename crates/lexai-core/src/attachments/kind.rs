//! Attachment classification
//!
//! Every uploaded file is classified exactly once, up front, into a closed
//! set of kinds. The result is threaded through validation and encoding so
//! nothing downstream re-inspects the media type or file name.

use serde::{Deserialize, Serialize};

use crate::settings::FileTypeRule;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Pdf,
    Text,
    WordDoc,
    Spreadsheet,
    Unsupported,
}

impl AttachmentKind {
    /// How the codec output of this kind travels to the remote model.
    pub fn content_kind(self) -> Option<ContentKind> {
        match self {
            AttachmentKind::Text | AttachmentKind::WordDoc | AttachmentKind::Spreadsheet => {
                Some(ContentKind::EmbeddedText)
            }
            AttachmentKind::Pdf => Some(ContentKind::InlineBinary),
            AttachmentKind::Unsupported => None,
        }
    }
}

/// Effective transmission form of an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    /// Raw bytes, base64-encoded, sent with their media type.
    InlineBinary,
    /// UTF-8 text sent as a `[Document: <name>]` text part.
    EmbeddedText,
}

/// Classify a file by declared media type, falling back to its extension.
///
/// Rules are evaluated in order and the first match wins.
pub fn classify(rules: &[FileTypeRule], file_name: &str, media_type: &str) -> AttachmentKind {
    let media_type = media_type.trim().to_ascii_lowercase();
    let extension = file_extension(file_name);

    rules
        .iter()
        .find(|rule| {
            let by_type = !media_type.is_empty()
                && rule
                    .media_types
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(&media_type));
            let by_extension = extension.as_deref().is_some_and(|ext| {
                rule.extensions
                    .iter()
                    .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
            });
            by_type || by_extension
        })
        .map(|rule| rule.kind)
        .unwrap_or(AttachmentKind::Unsupported)
}

/// Lowercased extension without the dot, if the name has one.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::default_file_types;

    const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
    const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

    fn classify_default(name: &str, mime: &str) -> AttachmentKind {
        classify(&default_file_types(), name, mime)
    }

    #[test]
    fn test_classify_by_media_type() {
        assert_eq!(classify_default("a", "application/pdf"), AttachmentKind::Pdf);
        assert_eq!(classify_default("a", "text/plain"), AttachmentKind::Text);
        assert_eq!(classify_default("a", DOCX_MIME), AttachmentKind::WordDoc);
        assert_eq!(classify_default("a", XLSX_MIME), AttachmentKind::Spreadsheet);
        assert_eq!(
            classify_default("a", "application/vnd.ms-excel"),
            AttachmentKind::Spreadsheet
        );
    }

    #[test]
    fn test_classify_falls_back_to_extension() {
        assert_eq!(classify_default("notes.docx", ""), AttachmentKind::WordDoc);
        assert_eq!(
            classify_default("ledger.xlsx", "application/octet-stream"),
            AttachmentKind::Spreadsheet
        );
        assert_eq!(classify_default("old.xls", ""), AttachmentKind::Spreadsheet);
        assert_eq!(classify_default("report.txt", ""), AttachmentKind::Text);
        assert_eq!(classify_default("brief.pdf", ""), AttachmentKind::Pdf);
    }

    #[test]
    fn test_classify_extension_case_insensitive() {
        assert_eq!(classify_default("REPORT.TXT", ""), AttachmentKind::Text);
        assert_eq!(classify_default("Deed.PDF", ""), AttachmentKind::Pdf);
    }

    #[test]
    fn test_classify_rule_order_wins() {
        // A text-typed file named .docx is still treated as a word document.
        assert_eq!(classify_default("notes.docx", "text/plain"), AttachmentKind::WordDoc);
        // A .txt name outranks a PDF media type.
        assert_eq!(classify_default("x.txt", "application/pdf"), AttachmentKind::Text);
    }

    #[test]
    fn test_classify_unsupported() {
        assert_eq!(classify_default("photo.png", "image/png"), AttachmentKind::Unsupported);
        assert_eq!(classify_default("README", ""), AttachmentKind::Unsupported);
        assert_eq!(classify_default(".txt", ""), AttachmentKind::Unsupported);
    }

    #[test]
    fn test_content_kind_mapping() {
        assert_eq!(AttachmentKind::Pdf.content_kind(), Some(ContentKind::InlineBinary));
        assert_eq!(AttachmentKind::Text.content_kind(), Some(ContentKind::EmbeddedText));
        assert_eq!(AttachmentKind::WordDoc.content_kind(), Some(ContentKind::EmbeddedText));
        assert_eq!(
            AttachmentKind::Spreadsheet.content_kind(),
            Some(ContentKind::EmbeddedText)
        );
        assert_eq!(AttachmentKind::Unsupported.content_kind(), None);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("a.b.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("trailing."), None);
    }
}
