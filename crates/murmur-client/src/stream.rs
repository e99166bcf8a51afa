//! The single live subscription to the open conversation's messages.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use murmur_shared::constants::UNKNOWN_PARTICIPANT;
use murmur_shared::error::RecordKind;
use murmur_shared::{
    ConversationId, MalformedRecord, Message, MessageId, MessageKind, ParticipantId,
    RenderedMessage, SyncError,
};
use murmur_store::schema::{self, fields};
use murmur_store::{RemoteStore, Snapshot, SubscriptionHandle};

use crate::events::{Dispatcher, SyncEvent};
use crate::metadata::millis_to_datetime;
use crate::profiles::ProfileDirectory;
use crate::view::MessageView;

enum StreamState {
    Detached,
    Attached {
        conversation: ConversationId,
        generation: u64,
        handle: SubscriptionHandle,
    },
}

/// Owns at most one message subscription. `open` is the only way to bind
/// one, and it releases the previous subscription before creating the next.
pub struct MessageStreamController {
    local: ParticipantId,
    state: StreamState,
    generation: u64,
}

impl MessageStreamController {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            state: StreamState::Detached,
            generation: 0,
        }
    }

    pub fn active(&self) -> Option<&ConversationId> {
        match &self.state {
            StreamState::Attached { conversation, .. } => Some(conversation),
            StreamState::Detached => None,
        }
    }

    /// Bind the stream to `id`. Re-opening the active conversation is a no-op.
    pub(crate) fn open(&mut self, id: &ConversationId, dispatcher: &Dispatcher) -> Result<(), SyncError> {
        if self.active() == Some(id) {
            return Ok(());
        }
        self.close(dispatcher.store());

        self.generation += 1;
        let generation = self.generation;
        let handle = dispatcher.store().subscribe(
            &schema::messages(id),
            dispatcher.callback(move |snapshot| SyncEvent::MessagesChanged {
                generation,
                snapshot,
            }),
        )?;

        info!(conversation = %id, generation, "Message stream attached");
        self.state = StreamState::Attached {
            conversation: id.clone(),
            generation,
            handle,
        };
        Ok(())
    }

    pub fn close(&mut self, store: &dyn RemoteStore) {
        if let StreamState::Attached {
            conversation,
            handle,
            ..
        } = std::mem::replace(&mut self.state, StreamState::Detached)
        {
            store.unsubscribe(handle);
            info!(conversation = %conversation, "Message stream detached");
        }
    }

    /// Render a full-history notification. Notifications from a released
    /// subscription are dropped.
    pub(crate) fn apply(
        &self,
        generation: u64,
        snapshot: &Snapshot,
        profiles: &mut ProfileDirectory,
        dispatcher: &Dispatcher,
        view: &mut dyn MessageView,
    ) {
        let StreamState::Attached {
            conversation,
            generation: current,
            ..
        } = &self.state
        else {
            return;
        };
        if *current != generation {
            debug!(generation, current, "Dropping stale message batch");
            return;
        }

        let messages = parse_batch(snapshot, Utc::now());
        let rendered = messages
            .into_iter()
            .map(|m| self.render(m, profiles, dispatcher))
            .collect::<Vec<_>>();
        debug!(conversation = %conversation, count = rendered.len(), "Rendering messages");
        view.render_messages(conversation, rendered);
    }

    /// Sender names come from the profile cache. On a miss the record's own
    /// sender name (or a placeholder) is shown and the profile is fetched for
    /// later batches; rendered rows are not revisited.
    fn render(
        &self,
        message: Message,
        profiles: &mut ProfileDirectory,
        dispatcher: &Dispatcher,
    ) -> RenderedMessage {
        let sender_name = profiles
            .display_name_or_fetch(&message.sender_id, dispatcher)
            .or(message.sender_name)
            .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string());
        RenderedMessage {
            is_own: message.sender_id == self.local,
            id: message.id,
            sender_id: message.sender_id,
            sender_name,
            body: message.body,
            timestamp: message.timestamp,
            kind: message.kind,
        }
    }
}

/// Parse every item of a message collection, skipping malformed records,
/// ordered by timestamp (stable for equal timestamps).
pub fn parse_batch(snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<Message> {
    let mut messages: Vec<Message> = snapshot
        .children()
        .iter()
        .filter_map(|item| match parse_message(item, now) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "Discarding malformed message");
                None
            }
        })
        .collect();
    messages.sort_by_key(|m| m.timestamp);
    messages
}

/// Sender and body are mandatory; a missing timestamp defaults to `now`.
pub fn parse_message(item: &Snapshot, now: DateTime<Utc>) -> Result<Message, MalformedRecord> {
    let sender_id = item
        .child_str(fields::SENDER_ID)
        .ok_or_else(|| MalformedRecord::new(RecordKind::Message, item.key(), fields::SENDER_ID))?;
    let body = item
        .child_str(fields::TEXT)
        .ok_or_else(|| MalformedRecord::new(RecordKind::Message, item.key(), fields::TEXT))?;

    Ok(Message {
        id: MessageId::new(item.key()),
        sender_id: ParticipantId::new(sender_id),
        sender_name: item.child_str(fields::SENDER_NAME),
        body,
        timestamp: millis_to_datetime(item.child(fields::TIMESTAMP).as_i64()).unwrap_or(now),
        kind: MessageKind::from_tag(item.child(fields::KIND).as_str()),
    })
}
