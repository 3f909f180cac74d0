//! In-process fakes for the remote model.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ChatError;
use crate::settings::ModelSettings;

use super::dialogue::{Dialogue, FragmentStream, RemoteModel};
use super::parts::MessagePart;

#[derive(Clone)]
pub enum Step {
    Text(&'static str),
    Fail(&'static str),
    /// Suspend the stream until the gate is notified.
    Wait(Arc<Notify>),
}

/// What one `send_turn` call does.
#[derive(Clone)]
pub enum Turn {
    Stream(Vec<Step>),
    RejectDispatch(&'static str),
}

#[derive(Default)]
pub struct Recorded {
    pub turns: Mutex<Vec<Vec<MessagePart>>>,
    pub dialogues_created: AtomicUsize,
    pub system_instructions: Mutex<Vec<String>>,
}

/// Plays back scripted turns across every dialogue it creates.
#[derive(Clone)]
pub struct ScriptedRemote {
    script: Arc<Mutex<VecDeque<Turn>>>,
    pub recorded: Arc<Recorded>,
}

impl ScriptedRemote {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            script: Arc::new(Mutex::new(turns.into())),
            recorded: Arc::new(Recorded::default()),
        }
    }

    pub fn texts(fragments: &[&'static str]) -> Turn {
        Turn::Stream(fragments.iter().copied().map(Step::Text).collect())
    }

    pub fn dialogues_created(&self) -> usize {
        self.recorded.dialogues_created.load(Ordering::SeqCst)
    }

    pub fn sent_turns(&self) -> Vec<Vec<MessagePart>> {
        self.recorded.turns.lock().clone()
    }
}

impl RemoteModel for ScriptedRemote {
    fn create_dialogue(
        &self,
        system_instruction: &str,
        _model: &ModelSettings,
    ) -> Result<Arc<dyn Dialogue>, ChatError> {
        self.recorded.dialogues_created.fetch_add(1, Ordering::SeqCst);
        self.recorded
            .system_instructions
            .lock()
            .push(system_instruction.to_string());
        Ok(Arc::new(ScriptedDialogue {
            remote: self.clone(),
        }))
    }
}

struct ScriptedDialogue {
    remote: ScriptedRemote,
}

#[async_trait]
impl Dialogue for ScriptedDialogue {
    async fn send_turn(&self, parts: Vec<MessagePart>) -> Result<FragmentStream, ChatError> {
        self.remote.recorded.turns.lock().push(parts);
        let turn = self
            .remote
            .script
            .lock()
            .pop_front()
            .unwrap_or(Turn::Stream(Vec::new()));

        let steps = match turn {
            Turn::RejectDispatch(message) => return Err(ChatError::RemoteCall(message.to_string())),
            Turn::Stream(steps) => steps,
        };

        let stream = async_stream::stream! {
            for step in steps {
                match step {
                    Step::Text(text) => yield Ok(text.to_string()),
                    Step::Fail(message) => {
                        yield Err(ChatError::RemoteCall(message.to_string()));
                        return;
                    }
                    Step::Wait(gate) => gate.notified().await,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
