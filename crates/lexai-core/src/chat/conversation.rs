use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::attachments::Attachment;
use crate::error::ChatError;
use crate::settings::ModelSettings;

use super::dialogue::{Dialogue, RemoteModel};
use super::parts::build_turn;

/// Cumulative response text: every item is the whole answer so far.
pub type ResponseStream = BoxStream<'static, Result<String, ChatError>>;

/// One logical dialogue with the remote model.
///
/// The dialogue handle is created on the first `send` and reused for every
/// later turn until `reset`, so the remote side keeps the history.
pub struct ConversationSession {
    remote: Arc<dyn RemoteModel>,
    model: ModelSettings,
    default_instruction: String,
    dialogue: Mutex<Option<Arc<dyn Dialogue>>>,
}

impl ConversationSession {
    pub fn new(remote: Arc<dyn RemoteModel>, model: ModelSettings, default_instruction: String) -> Self {
        Self {
            remote,
            model,
            default_instruction,
            dialogue: Mutex::new(None),
        }
    }

    fn dialogue(&self) -> Result<Arc<dyn Dialogue>, ChatError> {
        let mut slot = self.dialogue.lock();
        if let Some(dialogue) = slot.as_ref() {
            return Ok(dialogue.clone());
        }

        info!(model = %self.model.model_identifier, "Starting new remote dialogue");
        let dialogue = self
            .remote
            .create_dialogue(&self.model.system_instruction, &self.model)?;
        *slot = Some(dialogue.clone());
        Ok(dialogue)
    }

    /// Send one turn and stream back the cumulative answer.
    ///
    /// The caller must not invoke this while a previous stream is still
    /// being consumed.
    pub async fn send(&self, text: &str, attachments: &[Attachment]) -> Result<ResponseStream, ChatError> {
        let parts = build_turn(text, attachments, &self.default_instruction)?;
        let dialogue = self.dialogue()?;

        debug!(
            parts = parts.len(),
            attachments = attachments.len(),
            "Dispatching turn"
        );
        let mut fragments = dialogue.send_turn(parts).await.inspect_err(|e| {
            error!(error = %e, "Remote call failed at dispatch");
        })?;

        let stream = async_stream::stream! {
            let mut full = String::new();
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(text) => {
                        if text.is_empty() {
                            continue;
                        }
                        full.push_str(&text);
                        yield Ok(full.clone());
                    }
                    Err(e) => {
                        error!(error = %e, received = full.len(), "Remote stream failed");
                        yield Err(e);
                        return;
                    }
                }
            }
            debug!(chars = full.len(), "Remote stream finished");
        };

        Ok(Box::pin(stream))
    }

    /// Forget the remote dialogue; the next `send` starts from scratch.
    pub fn reset(&self) {
        if self.dialogue.lock().take().is_some() {
            info!("Remote dialogue discarded");
        }
    }

    pub fn has_dialogue(&self) -> bool {
        self.dialogue.lock().is_some()
    }
}
