//! Resolution of conversation records into roster summaries, and creation
//! of new conversations.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use murmur_shared::constants::{UNKNOWN_PARTICIPANT, UNNAMED_CONVERSATION};
use murmur_shared::error::RecordKind;
use murmur_shared::{
    Conversation, ConversationId, ConversationSummary, LastMessage, MalformedRecord,
    ParticipantId, SyncError,
};
use murmur_store::schema::{self, fields};
use murmur_store::{Fields, RemoteStore, ServerValue, Snapshot, StorePath};

use crate::events::{Dispatcher, SyncEvent};
use crate::profiles::ProfileDirectory;
use crate::stream::parse_message;

/// Outcome of picking a display title for a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Title {
    Resolved(String),
    /// Two-party conversation whose counterpart profile is not cached yet.
    AwaitingProfile(ParticipantId),
}

/// Fetches conversation records and turns them into display summaries.
pub struct ConversationMetadataLoader {
    local: ParticipantId,
}

impl ConversationMetadataLoader {
    pub fn new(local: ParticipantId) -> Self {
        Self { local }
    }

    /// Fetch `id` once in the background and post the record tagged with
    /// the roster `generation` that asked for it.
    pub(crate) fn spawn_load(&self, id: ConversationId, generation: u64, dispatcher: &Dispatcher) {
        dispatcher.spawn(move |store| async move {
            let result = load_conversation(store.as_ref(), &id).await;
            SyncEvent::ConversationLoaded {
                generation,
                id,
                result,
            }
        });
    }

    /// Two-party conversations are named after the counterpart; others use
    /// their stored name or a placeholder.
    pub fn title(&self, conversation: &Conversation, profiles: &mut ProfileDirectory) -> Title {
        match conversation.counterpart(&self.local) {
            Some(other) => match profiles.display_name(other) {
                Some(name) => Title::Resolved(name),
                None => Title::AwaitingProfile(other.clone()),
            },
            None => Title::Resolved(stored_title(conversation)),
        }
    }

    /// Title to show when the counterpart profile could not be resolved.
    pub fn fallback_title(&self, conversation: &Conversation) -> String {
        match conversation.counterpart(&self.local) {
            Some(_) => conversation
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string()),
            None => stored_title(conversation),
        }
    }
}

fn stored_title(conversation: &Conversation) -> String {
    conversation
        .name
        .clone()
        .unwrap_or_else(|| UNNAMED_CONVERSATION.to_string())
}

pub fn summarize(conversation: Conversation, title: String) -> ConversationSummary {
    ConversationSummary {
        id: conversation.id,
        title,
        participants: conversation.participants,
        last_message: conversation.last_message,
    }
}

/// Snapshot read of a conversation record, including its messages.
pub async fn load_conversation(
    store: &dyn RemoteStore,
    id: &ConversationId,
) -> Result<Conversation, SyncError> {
    let snapshot = store.read_once(&schema::conversation(id)).await?;
    if !snapshot.exists() {
        return Err(SyncError::InvalidConversation(format!(
            "conversation {id} does not exist"
        )));
    }
    Ok(parse_conversation(id, &snapshot)?)
}

pub fn parse_conversation(
    id: &ConversationId,
    snapshot: &Snapshot,
) -> Result<Conversation, MalformedRecord> {
    let participants = normalize_participants(&snapshot.child(fields::PARTICIPANTS));
    if participants.is_empty() {
        return Err(MalformedRecord::new(
            RecordKind::Conversation,
            id.as_str(),
            fields::PARTICIPANTS,
        ));
    }

    let last_message = scan_last_message(&snapshot.child(schema::MESSAGES))
        .or_else(|| stored_last_message(snapshot));

    Ok(Conversation {
        id: id.clone(),
        participants,
        name: snapshot.child_str(fields::NAME),
        created_at: millis_to_datetime(snapshot.child(fields::CREATED_AT).as_i64()),
        last_message,
    })
}

/// Accepts both wire shapes of the participant list: a dense list of ids,
/// or a map whose values are ids (`{"0": "u1"}`) or whose keys are ids
/// (`{"u1": true}`). Duplicates are dropped, first occurrence wins.
pub fn normalize_participants(snapshot: &Snapshot) -> Vec<ParticipantId> {
    let mut participants: Vec<ParticipantId> = Vec::new();
    let candidates = snapshot.children().into_iter().filter_map(|child| {
        match child.value() {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Bool(false) | Value::String(_) => None,
            _ if snapshot.value().is_object() => Some(child.key().to_string()),
            _ => None,
        }
    });
    for id in candidates {
        let id = ParticipantId::new(id);
        if !participants.contains(&id) {
            participants.push(id);
        }
    }
    participants
}

/// Latest message by timestamp among the well-formed items of the
/// collection. Items without a timestamp cannot be ranked and are skipped.
/// Ties keep the first one scanned.
pub fn scan_last_message(messages: &Snapshot) -> Option<LastMessage> {
    let now = Utc::now();
    let mut latest: Option<(i64, LastMessage)> = None;
    for item in messages.children() {
        let Some(ts) = item.child(fields::TIMESTAMP).as_i64() else {
            continue;
        };
        let message = match parse_message(&item, now) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed message for preview");
                continue;
            }
        };
        if latest.as_ref().map_or(true, |(best, _)| ts > *best) {
            latest = Some((
                ts,
                LastMessage {
                    body: message.body,
                    timestamp: Some(message.timestamp),
                    sender: Some(message.sender_id),
                },
            ));
        }
    }
    latest.map(|(_, message)| message)
}

fn stored_last_message(snapshot: &Snapshot) -> Option<LastMessage> {
    let body = snapshot.child_str(fields::LAST_MESSAGE)?;
    Some(LastMessage {
        body,
        timestamp: millis_to_datetime(snapshot.child(fields::LAST_MESSAGE_TIMESTAMP).as_i64()),
        sender: snapshot
            .child_str(fields::LAST_MESSAGE_SENDER)
            .map(ParticipantId::new),
    })
}

pub(crate) fn millis_to_datetime(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

/// Participant list for a new conversation: the local user first, then the
/// others in the given order, without duplicates.
pub fn conversation_members(
    local: &ParticipantId,
    others: Vec<ParticipantId>,
) -> Result<Vec<ParticipantId>, SyncError> {
    let mut members = vec![local.clone()];
    for id in others {
        if id.as_str().is_empty() {
            return Err(SyncError::InvalidConversation("empty participant id".into()));
        }
        if !members.contains(&id) {
            members.push(id);
        }
    }
    if members.len() < 2 {
        return Err(SyncError::InvalidConversation(
            "a conversation needs another participant".into(),
        ));
    }
    Ok(members)
}

/// Write a new conversation record and add it to every member's roster in
/// a single multi-path update.
pub async fn create_conversation(
    store: &dyn RemoteStore,
    members: Vec<ParticipantId>,
    name: Option<String>,
) -> Result<ConversationId, SyncError> {
    let conversations = StorePath::root().child(schema::CONVERSATIONS);
    let id = ConversationId::new(store.push_key(&conversations));
    let record = schema::conversation(&id);

    let mut update = Fields::new();
    let participant_list: Vec<Value> = members
        .iter()
        .map(|p| Value::from(p.as_str()))
        .collect();
    update.insert(
        schema::root_key(&record.child(fields::PARTICIPANTS)),
        Value::Array(participant_list),
    );
    update.insert(
        schema::root_key(&record.child(fields::CREATED_AT)),
        ServerValue::timestamp(),
    );
    if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
        update.insert(schema::root_key(&record.child(fields::NAME)), Value::from(name));
    }
    for member in &members {
        let entry = schema::roster(member).child(id.as_str());
        update.insert(schema::root_key(&entry), Value::Bool(true));
    }

    debug!(conversation = %id, members = members.len(), "Creating conversation");
    store.update(&StorePath::root(), update).await?;
    info!(conversation = %id, "Conversation created");
    Ok(id)
}
