use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use super::kind::ContentKind;

/// Where the bytes of an uploaded file can be read from.
#[derive(Clone, Debug)]
pub enum FileSource {
    Memory(Vec<u8>),
    Path(PathBuf),
}

/// A file as picked by the user, before validation.
#[derive(Clone, Debug)]
pub struct RawFile {
    pub name: String,
    /// Declared media type; may be empty when the picker reports none.
    pub media_type: String,
    /// Declared size in bytes, used for the size check before any read.
    pub size: u64,
    pub source: FileSource,
}

impl RawFile {
    pub fn from_bytes(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size: bytes.len() as u64,
            source: FileSource::Memory(bytes),
        }
    }

    /// Describe a file on disk. The size comes from its metadata.
    pub async fn from_path(path: impl Into<PathBuf>, media_type: impl Into<String>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            media_type: media_type.into(),
            size: metadata.len(),
            source: FileSource::Path(path),
        })
    }

    pub(crate) async fn read_bytes(self) -> std::io::Result<Vec<u8>> {
        match self.source {
            FileSource::Memory(bytes) => Ok(bytes),
            FileSource::Path(path) => tokio::fs::read(path).await,
        }
    }
}

/// Codec output for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Base64 of the bytes to transmit (raw file bytes, or UTF-8 of extracted text).
    pub data: String,
    /// Media type the payload is transmitted with.
    pub media_type: String,
    pub content_kind: ContentKind,
}

/// An accepted, encoded attachment.
///
/// The payload is only ever produced by the codec, so it always decodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    /// Media type as declared at upload time.
    pub media_type: String,
    pub size: u64,
    data: String,
    pub transmit_media_type: String,
    pub content_kind: ContentKind,
    delivered: bool,
}

impl Attachment {
    pub(crate) fn new(name: String, media_type: String, size: u64, payload: EncodedPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            media_type,
            size,
            data: payload.data,
            transmit_media_type: payload.media_type,
            content_kind: payload.content_kind,
            delivered: false,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// One-way: there is no way to clear the flag again.
    pub(crate) fn mark_delivered(&mut self) {
        self.delivered = true;
    }

    /// Portable (base64) form of the payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn decoded_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        decode_portable(&self.data)
    }

    /// The embedded text, decoded lossily. `None` for inline-binary attachments.
    pub fn embedded_text(&self) -> Result<Option<String>, base64::DecodeError> {
        if self.content_kind != ContentKind::EmbeddedText {
            return Ok(None);
        }
        let bytes = self.decoded_bytes()?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Size in MiB with two decimals, e.g. "1.25 MB".
    pub fn display_size(&self) -> String {
        format!("{:.2} MB", self.size as f64 / 1024.0 / 1024.0)
    }
}

/// Encode arbitrary bytes to the portable text form used on the wire.
pub fn encode_portable(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_portable(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}
