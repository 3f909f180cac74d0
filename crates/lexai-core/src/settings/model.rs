use serde::{Deserialize, Serialize};

use crate::attachments::AttachmentKind;

/// 50 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub const DEFAULT_MODEL_IDENTIFIER: &str = "gemini-3-pro-preview";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Longest silence tolerated between two reads of a streaming response.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are LexAI, an elite legal assistant specialized in Indian law.

When the user uploads documents (PDF, DOCX, XLS/XLSX, TXT) you must:
1. Read exhaustively: process the entire document and do not skip sections.
2. Cite specifics: refer to page numbers, clause numbers or table cells from the uploaded file.
3. Analyze multi-format data: treat spreadsheet rows and columns (financial statements, employee lists) as part of the legal matter.

Primary jurisdiction: India. Key statutes: Constitution of India, Bharatiya Nyaya Sanhita (BNS), Bharatiya Nagarik Suraksha Sanhita (BNSS), Contract Act, Companies Act, CPC, Evidence Act.

Tone: professional, objective, courtroom-ready.
Remind the user that you are an AI assistant and not a replacement for a registered Advocate. Use Markdown for formatting.";

pub const DEFAULT_INSTRUCTION: &str = "Please analyze the uploaded documents and provide a professional summary based on Indian legal standards.";

pub const DEFAULT_ATTACHMENT_ONLY_TEXT: &str = "Please analyze the attached files.";

/// One row of the ordered classification table.
///
/// A file matches when its declared media type is listed in `media_types`
/// or its name ends with one of `extensions` (case-insensitive).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeRule {
    pub kind: AttachmentKind,
    /// Short name shown to users, e.g. "PDF".
    pub label: String,
    #[serde(default)]
    pub media_types: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl FileTypeRule {
    pub fn new(kind: AttachmentKind, label: &str, media_types: &[&str], extensions: &[&str]) -> Self {
        Self {
            kind,
            label: label.to_string(),
            media_types: media_types.iter().map(|m| m.to_string()).collect(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// First match wins, so word-processor and spreadsheet rules come before the
/// plain-text and PDF ones.
pub fn default_file_types() -> Vec<FileTypeRule> {
    vec![
        FileTypeRule::new(
            AttachmentKind::WordDoc,
            "DOCX",
            &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
            &["docx"],
        ),
        FileTypeRule::new(
            AttachmentKind::Spreadsheet,
            "Excel",
            &[
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ],
            &["xls", "xlsx"],
        ),
        FileTypeRule::new(AttachmentKind::Text, "TXT", &["text/plain"], &["txt"]),
        FileTypeRule::new(AttachmentKind::Pdf, "PDF", &["application/pdf"], &["pdf"]),
    ]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_identifier")]
    pub model_identifier: String,
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Reasoning budget in tokens; `None` leaves the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_model_identifier() -> String {
    DEFAULT_MODEL_IDENTIFIER.to_string()
}

fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_identifier: default_model_identifier(),
            system_instruction: default_system_instruction(),
            temperature: None,
            thinking_budget: None,
            max_output_tokens: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LexaiSettings {
    /// Inclusive upper bound on a single attachment, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_file_types")]
    pub file_types: Vec<FileTypeRule>,
    #[serde(default)]
    pub model: ModelSettings,
    /// Sent as the trailing text part when a turn carries only attachments.
    #[serde(default = "default_instruction")]
    pub default_instruction: String,
    /// Shown as the user's transcript text for an attachment-only turn.
    #[serde(default = "default_attachment_only_text")]
    pub attachment_only_display_text: String,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_instruction() -> String {
    DEFAULT_INSTRUCTION.to_string()
}

fn default_attachment_only_text() -> String {
    DEFAULT_ATTACHMENT_ONLY_TEXT.to_string()
}

impl Default for LexaiSettings {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            file_types: default_file_types(),
            model: ModelSettings::default(),
            default_instruction: default_instruction(),
            attachment_only_display_text: default_attachment_only_text(),
        }
    }
}

impl LexaiSettings {
    /// Human-readable list of accepted formats, e.g. "DOCX, Excel, TXT, or PDF".
    pub fn accepted_labels(&self) -> String {
        accepted_labels(&self.file_types)
    }
}

pub fn accepted_labels(rules: &[FileTypeRule]) -> String {
    let labels: Vec<&str> = rules.iter().map(|r| r.label.as_str()).collect();
    match labels.as_slice() {
        [] => String::new(),
        [only] => only.to_string(),
        [head @ .., last] => format!("{}, or {}", head.join(", "), last),
    }
}
