use serde::{Deserialize, Serialize};

use super::transcript::Transcript;

/// Session-wide send status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatStatus {
    #[default]
    Idle,
    AwaitingFirstToken,
    Receiving,
    Failed,
}

impl ChatStatus {
    /// A stream is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, ChatStatus::AwaitingFirstToken | ChatStatus::Receiving)
    }
}

/// Notifications for a presentation layer, tagged with the assistant entry id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    ResponseUpdated { entry_id: String, content: String },
    ResponseFinished { entry_id: String, status: ChatStatus },
}

/// Mutable state shared between a session and its running reconciler.
#[derive(Debug, Default)]
pub struct SessionState {
    pub transcript: Transcript,
    pub status: ChatStatus,
    pub draft: String,
    /// Bumped by every reset.
    pub epoch: u64,
}
