use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::attachments::{
    Attachment, AttachmentCodec, AttachmentManager, RawFile, SubmitReport, TextExtractor,
    WorkbookParser,
};
use crate::error::ChatError;
use crate::settings::LexaiSettings;

use super::conversation::ConversationSession;
use super::dialogue::RemoteModel;
use super::reconciler::StreamReconciler;
use super::state::{ChatStatus, SessionEvent, SessionState};
use super::transcript::TranscriptEntry;

const EVENT_CAPACITY: usize = 256;

/// Assembles a [`ChatSession`] from its collaborators.
///
/// Every collaborator must be supplied up front; `build` reports the first
/// one that is missing as a configuration error.
#[derive(Default)]
pub struct SessionBuilder {
    settings: Option<LexaiSettings>,
    remote: Option<Arc<dyn RemoteModel>>,
    text_extractor: Option<Arc<dyn TextExtractor>>,
    workbook_parser: Option<Arc<dyn WorkbookParser>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: LexaiSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteModel>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = Some(extractor);
        self
    }

    pub fn workbook_parser(mut self, parser: Arc<dyn WorkbookParser>) -> Self {
        self.workbook_parser = Some(parser);
        self
    }

    /// Use the bundled DOCX extractor and calamine workbook parser.
    #[cfg(all(feature = "docx", feature = "excel"))]
    pub fn with_default_extractors(self) -> Self {
        use crate::attachments::extractors::{CalamineWorkbookParser, DocxTextExtractor};

        self.text_extractor(Arc::new(DocxTextExtractor::new()))
            .workbook_parser(Arc::new(CalamineWorkbookParser::new()))
    }

    pub fn build(self) -> Result<ChatSession, ChatError> {
        let remote = self
            .remote
            .ok_or_else(|| ChatError::Configuration("no remote model configured".to_string()))?;
        let text_extractor = self.text_extractor.ok_or_else(|| {
            ChatError::Configuration("no text extractor configured".to_string())
        })?;
        let workbook_parser = self.workbook_parser.ok_or_else(|| {
            ChatError::Configuration("no workbook parser configured".to_string())
        })?;

        let settings = Arc::new(self.settings.unwrap_or_default());
        if settings.model.model_identifier.trim().is_empty() {
            return Err(ChatError::Configuration(
                "model identifier is empty".to_string(),
            ));
        }
        let codec = AttachmentCodec::new(text_extractor, workbook_parser);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(ChatSession {
            attachments: AttachmentManager::new(settings.clone(), codec),
            conversation: ConversationSession::new(
                remote,
                settings.model.clone(),
                settings.default_instruction.clone(),
            ),
            state: Arc::new(Mutex::new(SessionState::default())),
            events,
            settings,
        })
    }
}

/// One conversation: transcript, pending attachments, draft, status and the
/// remote dialogue. Sessions share nothing, so several can live in one process.
pub struct ChatSession {
    settings: Arc<LexaiSettings>,
    attachments: AttachmentManager,
    conversation: ConversationSession,
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn settings(&self) -> &LexaiSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn submit_files(&self, files: Vec<RawFile>) -> SubmitReport {
        self.attachments.submit(files).await
    }

    pub fn remove_attachment(&self, id: &str) -> bool {
        self.attachments.remove(id)
    }

    /// Every attachment of the session in upload order, delivered or not.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.attachments.pending()
    }

    pub fn pending_attachments(&self) -> Vec<Attachment> {
        self.attachments.undelivered()
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        self.state.lock().draft = draft.into();
    }

    pub fn draft(&self) -> String {
        self.state.lock().draft.clone()
    }

    pub fn status(&self) -> ChatStatus {
        self.state.lock().status
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.state.lock().transcript.entries().to_vec()
    }

    pub fn has_dialogue(&self) -> bool {
        self.conversation.has_dialogue()
    }

    /// Send the current draft and clear it once the turn is accepted.
    pub async fn send_draft(&self) -> Result<String, ChatError> {
        let draft = self.draft();
        let result = self.send(&draft).await;
        if !matches!(result, Err(ChatError::InvalidSendRequest(_))) {
            let mut state = self.state.lock();
            if state.draft == draft {
                state.draft.clear();
            }
        }
        result
    }

    /// Send `text` together with every attachment not yet delivered.
    ///
    /// The transcript gains a user entry and an assistant placeholder that
    /// is filled in as the answer streams. Returns the final answer text, or
    /// the error that was also written into the placeholder.
    pub async fn send(&self, text: &str) -> Result<String, ChatError> {
        let text = text.trim();

        let (outgoing, entry_id, epoch) = {
            let mut state = self.state.lock();
            if state.status.is_busy() {
                return Err(ChatError::InvalidSendRequest(
                    "a response is still streaming".to_string(),
                ));
            }

            let outgoing = self.attachments.undelivered();
            if text.is_empty() && outgoing.is_empty() {
                return Err(ChatError::InvalidSendRequest(
                    "type a message or attach a file".to_string(),
                ));
            }

            let display_text = if text.is_empty() {
                self.settings.attachment_only_display_text.clone()
            } else {
                text.to_string()
            };
            let delivered: Vec<Attachment> = outgoing
                .iter()
                .cloned()
                .map(|mut attachment| {
                    attachment.mark_delivered();
                    attachment
                })
                .collect();

            let (_, entry_id) = state.transcript.push_turn(display_text, delivered);
            state.status = ChatStatus::AwaitingFirstToken;
            (outgoing, entry_id, state.epoch)
        };

        let ids: Vec<String> = outgoing.iter().map(|a| a.id.clone()).collect();
        self.attachments.mark_delivered(&ids);
        info!(attachments = ids.len(), chars = text.len(), "Sending turn");

        let mut reconciler = StreamReconciler::new(self.state.clone(), entry_id, epoch)
            .with_events(self.events.clone());

        match self.conversation.send(text, &outgoing).await {
            Ok(stream) => reconciler.run(stream).await,
            Err(e) => {
                warn!(error = %e, "Turn could not be dispatched");
                reconciler.fail(&e);
                Err(e)
            }
        }
    }

    /// Drop the transcript, attachments, draft and remote dialogue.
    ///
    /// A stream still running keeps going, but none of its updates land.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.transcript.clear();
            state.status = ChatStatus::Idle;
            state.draft.clear();
            state.epoch += 1;
        }
        self.attachments.clear();
        self.conversation.reset();
        info!("Session reset");
    }
}
