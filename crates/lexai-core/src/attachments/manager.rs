use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::settings::LexaiSettings;

use super::codec::AttachmentCodec;
use super::kind::classify;
use super::model::{Attachment, RawFile};
use super::validation::validate_attachment;

/// A file that did not make it into the pending set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub file_name: String,
    pub reason: ChatError,
}

/// Outcome of one `submit` batch.
#[derive(Clone, Debug, Default)]
pub struct SubmitReport {
    /// Newly accepted attachments, in input order.
    pub accepted: Vec<Attachment>,
    pub rejections: Vec<Rejection>,
}

/// Owns the pending attachment set and the validate → encode pipeline.
pub struct AttachmentManager {
    settings: Arc<LexaiSettings>,
    codec: AttachmentCodec,
    pending: Mutex<Vec<Attachment>>,
    /// Bumped by `clear`, under the `pending` lock.
    generation: AtomicU64,
}

impl AttachmentManager {
    pub fn new(settings: Arc<LexaiSettings>, codec: AttachmentCodec) -> Self {
        Self {
            codec: codec.with_accepted_labels(settings.accepted_labels()),
            settings,
            pending: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Validate and encode a batch of files.
    ///
    /// Files are processed concurrently and independently: one failure never
    /// affects its siblings. Accepted files are appended in input order
    /// regardless of completion order. A batch still running when the set is
    /// cleared is discarded instead of landing in the new set.
    pub async fn submit(&self, files: Vec<RawFile>) -> SubmitReport {
        let total = files.len();
        let generation = self.generation.load(Ordering::SeqCst);
        let results = join_all(files.into_iter().map(|file| {
            let name = file.name.clone();
            async move { (name, self.process(file).await) }
        }))
        .await;

        let mut report = SubmitReport::default();
        for (file_name, result) in results {
            match result {
                Ok(attachment) => report.accepted.push(attachment),
                Err(reason) => {
                    warn!(file = %file_name, error = %reason, "Attachment rejected");
                    report.rejections.push(Rejection { file_name, reason });
                }
            }
        }

        {
            let mut pending = self.pending.lock();
            if self.generation.load(Ordering::SeqCst) == generation {
                pending.extend(report.accepted.iter().cloned());
            } else {
                debug!(discarded = report.accepted.len(), "Attachment batch outlived a reset");
                report.accepted.clear();
            }
        }

        info!(
            total,
            accepted = report.accepted.len(),
            rejected = report.rejections.len(),
            "Attachment batch processed"
        );
        report
    }

    async fn process(&self, file: RawFile) -> Result<Attachment, ChatError> {
        let kind = classify(&self.settings.file_types, &file.name, &file.media_type);
        validate_attachment(file.size, kind, &self.settings).map_err(|e| e.into_chat_error(&file.name))?;

        let name = file.name.clone();
        let media_type = file.media_type.clone();
        let size = file.size;

        let bytes = file.read_bytes().await.map_err(|e| ChatError::AttachmentProcessing {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        let codec = self.codec.clone();
        let encode_name = name.clone();
        let encode_media_type = media_type.clone();
        let payload = tokio::task::spawn_blocking(move || {
            codec.encode(&encode_name, kind, &encode_media_type, &bytes)
        })
        .await
        .map_err(|e| ChatError::AttachmentProcessing {
            name: name.clone(),
            reason: format!("Internal error: {}", e),
        })??;

        debug!(file = %name, ?kind, content_kind = ?payload.content_kind, "Attachment encoded");
        Ok(Attachment::new(name, media_type, size, payload))
    }

    /// Drop an attachment from the pending set. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|a| a.id != id);
        let removed = pending.len() != before;
        debug!(id = %id, removed, "Attachment removal");
        removed
    }

    /// Flag the given attachments as delivered. Unknown ids are ignored.
    pub fn mark_delivered(&self, ids: &[String]) {
        let mut pending = self.pending.lock();
        for attachment in pending.iter_mut().filter(|a| ids.contains(&a.id)) {
            attachment.mark_delivered();
        }
    }

    /// Snapshot of the whole set, delivered or not, in upload order.
    pub fn pending(&self) -> Vec<Attachment> {
        self.pending.lock().clone()
    }

    /// Snapshot of the attachments not yet sent with any turn.
    pub fn undelivered(&self) -> Vec<Attachment> {
        self.pending
            .lock()
            .iter()
            .filter(|a| !a.is_delivered())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        let mut pending = self.pending.lock();
        pending.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
