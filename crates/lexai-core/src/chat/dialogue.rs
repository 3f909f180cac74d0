use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ChatError;
use crate::settings::ModelSettings;

use super::parts::MessagePart;

/// Incremental text fragments of one remote response (deltas, not totals).
pub type FragmentStream = BoxStream<'static, Result<String, ChatError>>;

/// A stateful multi-turn conversation held by the remote service.
#[async_trait]
pub trait Dialogue: Send + Sync {
    /// Dispatch one user turn and stream back the model's reply.
    ///
    /// Failures, whether at dispatch or mid-stream, are `ChatError::RemoteCall`.
    /// A failed turn must leave the dialogue usable for the next one.
    async fn send_turn(&self, parts: Vec<MessagePart>) -> Result<FragmentStream, ChatError>;
}

/// Factory for dialogues bound to a system instruction and model.
pub trait RemoteModel: Send + Sync {
    fn create_dialogue(
        &self,
        system_instruction: &str,
        model: &ModelSettings,
    ) -> Result<Arc<dyn Dialogue>, ChatError>;
}
