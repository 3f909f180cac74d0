pub mod conversation;
pub mod dialogue;
pub mod gemini;
pub mod parts;
pub mod reconciler;
pub mod session;
pub mod sse;
pub mod state;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_support;

pub use conversation::{ConversationSession, ResponseStream};
pub use dialogue::{Dialogue, FragmentStream, RemoteModel};
pub use gemini::{GeminiClient, GeminiDialogue, describe_remote_error};
pub use parts::{MessagePart, attachment_part, build_turn};
pub use reconciler::{StreamReconciler, error_message};
pub use session::{ChatSession, SessionBuilder};
pub use state::{ChatStatus, SessionEvent, SessionState};
pub use transcript::{Role, Transcript, TranscriptEntry};
