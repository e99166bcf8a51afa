use thiserror::Error;

/// Errors surfaced by the synchronization layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A single read, write or subscribe call against the remote store failed.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Malformed record: {0}")]
    Malformed(#[from] MalformedRecord),

    #[error("Invalid conversation: {0}")]
    InvalidConversation(String),

    /// The session loop has shut down; no further commands are accepted.
    #[error("Session closed")]
    SessionClosed,
}

/// A record missing one of its mandatory fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} record {id:?} is missing `{field}`")]
pub struct MalformedRecord {
    pub kind: RecordKind,
    pub id: String,
    pub field: &'static str,
}

impl MalformedRecord {
    pub fn new(kind: RecordKind, id: impl Into<String>, field: &'static str) -> Self {
        Self {
            kind,
            id: id.into(),
            field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Message,
    Conversation,
    Participant,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Message => "message",
            Self::Conversation => "conversation",
            Self::Participant => "participant",
        };
        f.write_str(name)
    }
}
