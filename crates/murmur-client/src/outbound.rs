//! Optimistic message send with debounce and input rollback.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use murmur_shared::constants::SEND_FAILED_NOTICE;
use murmur_shared::{ConversationId, MessageId, MessageKind, ParticipantId, SyncError};
use murmur_store::schema::{self, fields};
use murmur_store::{fields_from, Fields, RemoteStore, ServerValue};

use crate::events::{Dispatcher, SyncEvent};
use crate::typing::PresenceTypingController;
use crate::view::ComposerView;

/// Message record as written to the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub text: String,
    /// Server timestamp placeholder.
    pub timestamp: Value,
    #[serde(rename = "type")]
    pub kind: String,
}

impl OutgoingMessage {
    pub fn text(sender_id: ParticipantId, sender_name: String, text: String) -> Self {
        Self {
            sender_id,
            sender_name,
            text,
            timestamp: ServerValue::timestamp(),
            kind: MessageKind::Text.as_tag().to_string(),
        }
    }
}

/// Why a send request did not start a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejected {
    Empty,
    Debounced,
    InFlight,
}

pub struct OutboundMessagePipeline {
    local: ParticipantId,
    debounce: Duration,
    last_attempt: Option<Instant>,
    in_flight: bool,
}

impl OutboundMessagePipeline {
    pub fn new(local: ParticipantId, debounce: Duration) -> Self {
        Self {
            local,
            debounce,
            last_attempt: None,
            in_flight: false,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Start sending `text`. The input is cleared and disabled right away;
    /// the outcome arrives later as [`SyncEvent::SendFinished`]. Without a
    /// resolved profile the sender name falls back to the local id.
    pub(crate) fn send(
        &mut self,
        conversation: &ConversationId,
        text: &str,
        sender_name: Option<String>,
        typing: &mut PresenceTypingController,
        dispatcher: &Dispatcher,
        composer: &mut dyn ComposerView,
    ) -> Result<(), SendRejected> {
        let body = text.trim();
        if body.is_empty() {
            composer.focus();
            return Err(SendRejected::Empty);
        }

        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < self.debounce {
                debug!(conversation = %conversation, "Dropping repeated send");
                return Err(SendRejected::Debounced);
            }
        }
        self.last_attempt = Some(now);
        if self.in_flight {
            debug!(conversation = %conversation, "Send already in flight");
            return Err(SendRejected::InFlight);
        }

        composer.clear_input();
        composer.set_enabled(false);
        typing.stop_typing();
        self.in_flight = true;

        let conversation = conversation.clone();
        let sender_name = sender_name.unwrap_or_else(|| self.local.to_string());
        let outgoing = OutgoingMessage::text(self.local.clone(), sender_name, body.to_string());
        let typed = text.to_string();
        dispatcher.spawn(move |store| async move {
            let result = deliver(store.as_ref(), &conversation, &outgoing).await;
            SyncEvent::SendFinished {
                conversation,
                text: typed,
                result,
            }
        });
        Ok(())
    }

    /// Re-enable the composer; on failure put the text back, as typed, for
    /// a retry.
    pub(crate) fn finished(
        &mut self,
        conversation: &ConversationId,
        text: String,
        result: Result<MessageId, SyncError>,
        composer: &mut dyn ComposerView,
    ) {
        self.in_flight = false;
        match result {
            Ok(id) => info!(conversation = %conversation, message = %id.short(), "Message sent"),
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "Message send failed");
                composer.set_input(&text);
                composer.show_notice(SEND_FAILED_NOTICE);
            }
        }
        composer.set_enabled(true);
        composer.focus();
    }

    pub fn reset(&mut self) {
        self.last_attempt = None;
        self.in_flight = false;
    }
}

/// Write the message under a fresh key, then update the conversation's
/// last-message preview. Only the message write decides the outcome.
pub async fn deliver(
    store: &dyn RemoteStore,
    conversation: &ConversationId,
    outgoing: &OutgoingMessage,
) -> Result<MessageId, SyncError> {
    let messages = schema::messages(conversation);
    let id = MessageId::new(store.push_key(&messages));
    store
        .update(&messages.child(id.as_str()), fields_from(outgoing)?)
        .await?;

    let mut preview = Fields::new();
    preview.insert(fields::LAST_MESSAGE.into(), Value::from(outgoing.text.as_str()));
    preview.insert(fields::LAST_MESSAGE_TIMESTAMP.into(), ServerValue::timestamp());
    preview.insert(
        fields::LAST_MESSAGE_SENDER.into(),
        Value::from(outgoing.sender_id.as_str()),
    );
    if let Err(e) = store.update(&schema::conversation(conversation), preview).await {
        warn!(conversation = %conversation, error = %e, "Last-message preview update failed");
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc;

    use murmur_store::{MemoryStore, StoreOp};

    use super::*;

    #[derive(Default)]
    struct Composer {
        calls: Vec<String>,
    }

    impl ComposerView for Composer {
        fn clear_input(&mut self) {
            self.calls.push("clear".into());
        }
        fn set_input(&mut self, text: &str) {
            self.calls.push(format!("input:{text}"));
        }
        fn set_enabled(&mut self, enabled: bool) {
            self.calls.push(format!("enabled:{enabled}"));
        }
        fn focus(&mut self) {
            self.calls.push("focus".into());
        }
        fn show_notice(&mut self, _notice: &str) {
            self.calls.push("notice".into());
        }
    }

    fn message_writes(store: &MemoryStore) -> usize {
        store
            .journal()
            .iter()
            .filter(|op| matches!(op, StoreOp::Update { path, .. } if path.segments().len() == 4))
            .count()
    }

    #[tokio::test]
    async fn deliver_writes_message_then_preview() {
        let store = MemoryStore::new();
        let cid = ConversationId::from("c1");
        let outgoing = OutgoingMessage::text("u1".into(), "Ana".into(), "hello".into());

        let id = deliver(&store, &cid, &outgoing).await.unwrap();

        let record = store.value(&schema::messages(&cid).child(id.as_str()));
        assert_eq!(record["senderId"], json!("u1"));
        assert_eq!(record["senderName"], json!("Ana"));
        assert_eq!(record["text"], json!("hello"));
        assert_eq!(record["type"], json!("text"));
        assert!(record["timestamp"].is_i64());

        let conversation = store.value(&schema::conversation(&cid));
        assert_eq!(conversation["lastMessage"], json!("hello"));
        assert_eq!(conversation["lastMessageSender"], json!("u1"));
        assert!(conversation["lastMessageTimestamp"].is_i64());
    }

    #[tokio::test]
    async fn failed_message_write_skips_preview() {
        let store = MemoryStore::new();
        let cid = ConversationId::from("c1");
        store.fail_writes_under(&schema::messages(&cid));
        let outgoing = OutgoingMessage::text("u1".into(), "u1".into(), "hello".into());

        assert!(deliver(&store, &cid, &outgoing).await.is_err());
        assert_eq!(store.value(&schema::conversation(&cid)), Value::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_and_repeated_sends_are_dropped() {
        let store = MemoryStore::new();
        let shared: Arc<dyn RemoteStore> = Arc::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(shared.clone(), tx);
        let mut typing = PresenceTypingController::new("u1".into(), Duration::from_secs(2), shared);
        let mut pipeline = OutboundMessagePipeline::new("u1".into(), Duration::from_millis(500));
        let mut composer = Composer::default();
        let cid = ConversationId::from("c1");

        assert_eq!(
            pipeline.send(&cid, "   ", None, &mut typing, &dispatcher, &mut composer),
            Err(SendRejected::Empty)
        );
        assert_eq!(composer.calls, vec!["focus"]);

        pipeline
            .send(&cid, " hi ", None, &mut typing, &dispatcher, &mut composer)
            .unwrap();
        assert_eq!(
            pipeline.send(&cid, "hi", None, &mut typing, &dispatcher, &mut composer),
            Err(SendRejected::Debounced)
        );

        let Some(SyncEvent::SendFinished { conversation, text, result }) = rx.recv().await else {
            panic!("expected a finished send");
        };
        assert_eq!(text, " hi ");
        pipeline.finished(&conversation, text, result, &mut composer);
        assert_eq!(message_writes(&store), 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        pipeline
            .send(&cid, "again", None, &mut typing, &dispatcher, &mut composer)
            .unwrap();
        assert!(rx.recv().await.is_some());
        assert_eq!(message_writes(&store), 2);
    }

    #[tokio::test]
    async fn failure_restores_input_as_typed() {
        let store = MemoryStore::new();
        let shared: Arc<dyn RemoteStore> = Arc::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(shared.clone(), tx);
        let mut typing = PresenceTypingController::new("u1".into(), Duration::from_secs(2), shared);
        let mut pipeline = OutboundMessagePipeline::new("u1".into(), Duration::from_millis(500));
        let mut composer = Composer::default();
        let cid = ConversationId::from("c1");
        store.fail_writes_under(&schema::messages(&cid));

        pipeline
            .send(&cid, "  hello  ", None, &mut typing, &dispatcher, &mut composer)
            .unwrap();
        assert!(pipeline.in_flight());
        let Some(SyncEvent::SendFinished { conversation, text, result }) = rx.recv().await else {
            panic!("expected a finished send");
        };
        assert!(result.is_err());
        pipeline.finished(&conversation, text, result, &mut composer);

        assert_eq!(
            composer.calls,
            vec![
                "clear",
                "enabled:false",
                "input:  hello  ",
                "notice",
                "enabled:true",
                "focus"
            ]
        );
        assert!(!pipeline.in_flight());
    }

    #[tokio::test]
    async fn unresolved_sender_name_falls_back_to_local_id() {
        let store = MemoryStore::new();
        let shared: Arc<dyn RemoteStore> = Arc::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(shared.clone(), tx);
        let mut typing = PresenceTypingController::new("u1".into(), Duration::from_secs(2), shared);
        let mut pipeline = OutboundMessagePipeline::new("u1".into(), Duration::from_millis(500));
        let mut composer = Composer::default();
        let cid = ConversationId::from("c1");

        pipeline
            .send(&cid, "hello", None, &mut typing, &dispatcher, &mut composer)
            .unwrap();
        let Some(SyncEvent::SendFinished { result, .. }) = rx.recv().await else {
            panic!("expected a finished send");
        };
        let id = result.unwrap();

        let record = store.value(&schema::messages(&cid).child(id.as_str()));
        assert_eq!(record["senderName"], json!("u1"));
        assert_eq!(record["text"], json!("hello"));
    }
}
