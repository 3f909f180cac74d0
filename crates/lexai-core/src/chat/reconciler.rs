use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::ChatError;

use super::conversation::ResponseStream;
use super::state::{ChatStatus, SessionEvent, SessionState};

/// Text written into the assistant entry when its stream fails.
pub fn error_message(err: &ChatError) -> String {
    format!("**Error:** {err}. Please try again later.")
}

/// Folds a cumulative response stream into one placeholder transcript entry.
///
/// A reconciler belongs to the session epoch it was started in. Once the
/// session is reset it no longer touches the status, and its entry updates
/// miss because the transcript was cleared.
pub struct StreamReconciler {
    state: Arc<Mutex<SessionState>>,
    entry_id: String,
    epoch: u64,
    received: bool,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl StreamReconciler {
    pub fn new(state: Arc<Mutex<SessionState>>, entry_id: String, epoch: u64) -> Self {
        Self {
            state,
            entry_id,
            epoch,
            received: false,
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Replace the entry's content with the latest cumulative text.
    pub fn apply(&mut self, cumulative: &str) {
        let first_token = !self.received && !cumulative.is_empty();
        if first_token {
            self.received = true;
        }

        let mut state = self.state.lock();
        let updated = state
            .transcript
            .update_content(&self.entry_id, cumulative.to_string(), self.received);
        if !updated {
            debug!(entry = %self.entry_id, "Dropping stale stream update");
            return;
        }

        if first_token && state.epoch == self.epoch {
            state.status = ChatStatus::Receiving;
        }
        drop(state);

        self.emit(SessionEvent::ResponseUpdated {
            entry_id: self.entry_id.clone(),
            content: cumulative.to_string(),
        });
    }

    /// The stream ended normally.
    pub fn complete(&mut self) {
        let mut state = self.state.lock();
        if !state.transcript.finalize(&self.entry_id) {
            debug!(entry = %self.entry_id, "Stream completed for a cleared entry");
        }
        let current = state.epoch == self.epoch;
        if current {
            state.status = ChatStatus::Idle;
        }
        drop(state);

        if current {
            self.emit(SessionEvent::ResponseFinished {
                entry_id: self.entry_id.clone(),
                status: ChatStatus::Idle,
            });
        }
    }

    /// The stream failed; the whole entry content becomes the error text.
    pub fn fail(&mut self, err: &ChatError) {
        let mut state = self.state.lock();
        if !state
            .transcript
            .update_content(&self.entry_id, error_message(err), true)
        {
            debug!(entry = %self.entry_id, error = %err, "Stream failed for a cleared entry");
        }
        let current = state.epoch == self.epoch;
        if current {
            state.status = ChatStatus::Failed;
        }
        drop(state);

        if current {
            self.emit(SessionEvent::ResponseFinished {
                entry_id: self.entry_id.clone(),
                status: ChatStatus::Failed,
            });
        }
    }

    /// Drive `stream` to its end, returning the final text.
    pub async fn run(mut self, mut stream: ResponseStream) -> Result<String, ChatError> {
        let mut latest = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(cumulative) => {
                    self.apply(&cumulative);
                    latest = cumulative;
                }
                Err(e) => {
                    warn!(entry = %self.entry_id, error = %e, "Response stream failed");
                    self.fail(&e);
                    return Err(e);
                }
            }
        }
        self.complete();
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_turn() -> (Arc<Mutex<SessionState>>, String) {
        let mut state = SessionState::default();
        let (_, assistant_id) = state.transcript.push_turn("q".to_string(), Vec::new());
        state.status = ChatStatus::AwaitingFirstToken;
        (Arc::new(Mutex::new(state)), assistant_id)
    }

    fn stream_of(items: Vec<Result<&'static str, ChatError>>) -> ResponseStream {
        Box::pin(futures::stream::iter(
            items.into_iter().map(|item| item.map(str::to_string)),
        ))
    }

    fn content(state: &Arc<Mutex<SessionState>>, id: &str) -> String {
        state.lock().transcript.get(id).unwrap().content.clone()
    }

    #[test]
    fn test_first_token_switches_to_receiving() {
        let (state, id) = state_with_turn();
        let mut reconciler = StreamReconciler::new(state.clone(), id.clone(), 0);

        reconciler.apply("");
        assert_eq!(state.lock().status, ChatStatus::AwaitingFirstToken);
        assert!(state.lock().transcript.get(&id).unwrap().in_progress);

        reconciler.apply("H");
        assert_eq!(state.lock().status, ChatStatus::Receiving);
        assert!(!state.lock().transcript.get(&id).unwrap().in_progress);
    }

    #[test]
    fn test_content_never_shrinks() {
        let (state, id) = state_with_turn();
        let mut reconciler = StreamReconciler::new(state.clone(), id.clone(), 0);

        let mut previous = 0;
        for cumulative in ["H", "He", "Hel", "Hello", "Hello, world"] {
            reconciler.apply(cumulative);
            let len = content(&state, &id).len();
            assert!(len >= previous);
            previous = len;
        }
        reconciler.complete();
        assert_eq!(content(&state, &id), "Hello, world");
    }

    #[tokio::test]
    async fn test_run_completes_to_idle() {
        let (state, id) = state_with_turn();
        let reconciler = StreamReconciler::new(state.clone(), id.clone(), 0);

        let result = reconciler
            .run(stream_of(vec![Ok("H"), Ok("He"), Ok("Hello")]))
            .await;

        assert_eq!(result, Ok("Hello".to_string()));
        let state = state.lock();
        assert_eq!(state.status, ChatStatus::Idle);
        let entry = state.transcript.get(&id).unwrap();
        assert_eq!(entry.content, "Hello");
        assert!(!entry.in_progress);
    }

    #[tokio::test]
    async fn test_empty_stream_finalizes_placeholder() {
        let (state, id) = state_with_turn();
        let reconciler = StreamReconciler::new(state.clone(), id.clone(), 0);

        assert_eq!(reconciler.run(stream_of(vec![])).await, Ok(String::new()));
        let state = state.lock();
        assert_eq!(state.status, ChatStatus::Idle);
        assert!(!state.transcript.get(&id).unwrap().in_progress);
    }

    #[tokio::test]
    async fn test_run_failure_replaces_content() {
        let (state, id) = state_with_turn();
        let reconciler = StreamReconciler::new(state.clone(), id.clone(), 0);

        let err = ChatError::RemoteCall("connection reset".to_string());
        let result = reconciler
            .run(stream_of(vec![Ok("Partial"), Err(err.clone())]))
            .await;

        assert_eq!(result, Err(err));
        assert_eq!(
            content(&state, &id),
            "**Error:** connection reset. Please try again later."
        );
        assert_eq!(state.lock().status, ChatStatus::Failed);
    }

    #[tokio::test]
    async fn test_events_follow_updates() {
        let (state, id) = state_with_turn();
        let (tx, mut rx) = broadcast::channel(16);
        let reconciler = StreamReconciler::new(state, id.clone(), 0).with_events(tx);

        reconciler.run(stream_of(vec![Ok("He"), Ok("Hello")])).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::ResponseUpdated { entry_id: id.clone(), content: "He".to_string() }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::ResponseUpdated { entry_id: id.clone(), content: "Hello".to_string() }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::ResponseFinished { entry_id: id, status: ChatStatus::Idle }
        );
    }

    #[test]
    fn test_stale_epoch_leaves_status_alone() {
        let (state, id) = state_with_turn();
        let mut reconciler = StreamReconciler::new(state.clone(), id.clone(), 0);
        {
            let mut state = state.lock();
            state.transcript.clear();
            state.status = ChatStatus::Idle;
            state.epoch += 1;
        }

        reconciler.apply("late");
        reconciler.fail(&ChatError::RemoteCall("gone".to_string()));
        reconciler.complete();

        let state = state.lock();
        assert!(state.transcript.is_empty());
        assert_eq!(state.status, ChatStatus::Idle);
    }
}
