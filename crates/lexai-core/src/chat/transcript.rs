use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachments::Attachment;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One visible turn of the conversation.
#[derive(Clone, Debug)]
pub struct TranscriptEntry {
    pub id: String,
    pub role: Role,
    /// May be empty while an assistant reply is still waiting for its first token.
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set on a placeholder assistant entry until the first fragment lands.
    pub in_progress: bool,
    /// Attachments delivered with a user entry; always empty for assistant entries.
    pub attachments: Vec<Attachment>,
}

impl TranscriptEntry {
    fn new(role: Role, content: String, in_progress: bool, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            in_progress,
            attachments,
        }
    }
}

/// Ordered list of entries. Entries are only ever appended or cleared as a
/// whole; lookups by id that miss are not errors.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user entry and its in-progress assistant placeholder.
    ///
    /// Returns `(user_id, assistant_id)`. Any older placeholder still marked
    /// in progress is finalized first so at most one entry is in progress.
    pub fn push_turn(&mut self, user_text: String, attachments: Vec<Attachment>) -> (String, String) {
        for entry in self.entries.iter_mut().filter(|e| e.in_progress) {
            entry.in_progress = false;
        }

        let user = TranscriptEntry::new(Role::User, user_text, false, attachments);
        let assistant = TranscriptEntry::new(Role::Assistant, String::new(), true, Vec::new());
        let ids = (user.id.clone(), assistant.id.clone());

        self.entries.push(user);
        self.entries.push(assistant);
        ids
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut TranscriptEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Replace an entry's content. Returns false when the id is unknown.
    pub fn update_content(&mut self, id: &str, content: String, clear_in_progress: bool) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.content = content;
                if clear_in_progress {
                    entry.in_progress = false;
                }
                true
            }
            None => false,
        }
    }

    /// Clear the in-progress marker, keeping the content.
    pub fn finalize(&mut self, id: &str) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.in_progress = false;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_progress(&self) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| e.in_progress)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
