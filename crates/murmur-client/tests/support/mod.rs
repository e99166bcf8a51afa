#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use murmur_client::{
    AvatarView, ComposerView, DecodedImage, ImageDecoder, MessageView, RosterView, TypingView,
    ViewSet,
};
use murmur_shared::{
    ConversationId, ConversationSummary, ParticipantId, RenderedMessage, SyncError,
    TypingIndicator,
};
use murmur_store::{schema, MemoryStore, StoreOp, StorePath};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    RosterCleared,
    RosterInserted { index: usize, summary: ConversationSummary },
    Opened { id: String, title: Option<String> },
    Rendered { id: String, messages: Vec<RenderedMessage> },
    Typing(TypingIndicator),
    InputCleared,
    InputSet(String),
    Enabled(bool),
    Focused,
    Notice(String),
    AvatarReady(String),
}

/// Records every view callback in arrival order.
#[derive(Clone, Default)]
pub struct RecordingView {
    events: Arc<Mutex<Vec<ViewEvent>>>,
}

impl RecordingView {
    pub fn views(&self) -> ViewSet {
        ViewSet::shared(self.clone())
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, f: impl Fn(&ViewEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| f(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Roster rows as currently rendered, replaying clears and insertions.
    pub fn roster_rows(&self) -> Vec<String> {
        let mut rows: Vec<String> = Vec::new();
        for event in self.events.lock().iter() {
            match event {
                ViewEvent::RosterCleared => rows.clear(),
                ViewEvent::RosterInserted { index, summary } => {
                    rows.insert(*index, summary.id.to_string())
                }
                _ => {}
            }
        }
        rows
    }

    pub fn roster_titles(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::RosterInserted { summary, .. } => {
                    Some((summary.id.to_string(), summary.title.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Latest rendered batch for `conversation`.
    pub fn last_render(&self, conversation: &str) -> Option<Vec<RenderedMessage>> {
        self.events.lock().iter().rev().find_map(|e| match e {
            ViewEvent::Rendered { id, messages } if id == conversation => Some(messages.clone()),
            _ => None,
        })
    }

    pub fn last_typing(&self) -> Option<TypingIndicator> {
        self.events.lock().iter().rev().find_map(|e| match e {
            ViewEvent::Typing(indicator) => Some(indicator.clone()),
            _ => None,
        })
    }

    pub fn last_title(&self, conversation: &str) -> Option<Option<String>> {
        self.events.lock().iter().rev().find_map(|e| match e {
            ViewEvent::Opened { id, title } if id == conversation => Some(title.clone()),
            _ => None,
        })
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().push(event);
    }
}

impl RosterView for RecordingView {
    fn clear(&mut self) {
        self.push(ViewEvent::RosterCleared);
    }

    fn insert(&mut self, index: usize, summary: ConversationSummary) {
        self.push(ViewEvent::RosterInserted { index, summary });
    }
}

impl MessageView for RecordingView {
    fn conversation_opened(&mut self, id: &ConversationId, title: Option<&str>) {
        self.push(ViewEvent::Opened {
            id: id.to_string(),
            title: title.map(str::to_string),
        });
    }

    fn render_messages(&mut self, id: &ConversationId, messages: Vec<RenderedMessage>) {
        self.push(ViewEvent::Rendered {
            id: id.to_string(),
            messages,
        });
    }
}

impl TypingView for RecordingView {
    fn show_typing(&mut self, indicator: &TypingIndicator) {
        self.push(ViewEvent::Typing(indicator.clone()));
    }
}

impl ComposerView for RecordingView {
    fn clear_input(&mut self) {
        self.push(ViewEvent::InputCleared);
    }

    fn set_input(&mut self, text: &str) {
        self.push(ViewEvent::InputSet(text.to_string()));
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.push(ViewEvent::Enabled(enabled));
    }

    fn focus(&mut self) {
        self.push(ViewEvent::Focused);
    }

    fn show_notice(&mut self, notice: &str) {
        self.push(ViewEvent::Notice(notice.to_string()));
    }
}

impl AvatarView for RecordingView {
    fn avatar_ready(&mut self, id: &ParticipantId, _image: Arc<DecodedImage>) {
        self.push(ViewEvent::AvatarReady(id.to_string()));
    }
}

/// Decoder that produces a 1x1 image for any non-empty source.
pub struct PixelDecoder;

#[async_trait]
impl ImageDecoder for PixelDecoder {
    async fn decode(&self, source: &str) -> Result<DecodedImage, SyncError> {
        if source.is_empty() {
            return Err(SyncError::Store("empty avatar source".into()));
        }
        Ok(DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![255, 255, 255, 255],
        })
    }
}

pub async fn wait_until(what: &str, mut f: impl FnMut() -> bool) {
    for _ in 0..400 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{what}: condition not met");
}

/// Let queued events run without waiting on any condition.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn path(p: &str) -> StorePath {
    StorePath::parse(p).unwrap()
}

/// Three users; `u1` sees a two-party conversation with `u2` and a named
/// group with everyone.
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.set(
        &StorePath::root(),
        json!({
            "users": {
                "u1": {"name": "Ana", "email": "ana@example.org", "conversations": {"c1": true, "c2": true}},
                "u2": {"name": "Bea", "email": "bea@example.org", "avatar": "bea.png", "conversations": {"c1": true, "c2": true}},
                "u3": {"name": "Cy", "email": "cy@example.org", "conversations": {"c2": true}},
            },
            "conversations": {
                "c1": {
                    "participants": ["u1", "u2"],
                    "createdAt": 1000,
                    "messages": {
                        "m1": {"senderId": "u2", "senderName": "Bea", "text": "hey", "timestamp": 2000, "type": "text"},
                        "m2": {"senderId": "u1", "senderName": "Ana", "text": "hi", "timestamp": 3000, "type": "text"},
                    }
                },
                "c2": {
                    "participants": {"u1": true, "u2": true, "u3": true},
                    "name": "Team",
                    "createdAt": 1000,
                    "messages": {
                        "m1": {"senderId": "u3", "text": "standup?", "timestamp": 2500},
                    }
                }
            }
        }),
    );
    store
}

pub fn roster_reads(store: &MemoryStore) -> usize {
    store
        .journal()
        .iter()
        .filter(|op| {
            matches!(op, StoreOp::ReadOnce(p) if p.segments().first().map(String::as_str) == Some(schema::CONVERSATIONS))
        })
        .count()
}

/// Updates of `typing/{cid}` that set `uid` to `value`.
pub fn typing_writes(store: &MemoryStore, cid: &str, uid: &str, value: bool) -> usize {
    let typing = schema::typing(&ConversationId::from(cid));
    store
        .journal()
        .iter()
        .filter(|op| match op {
            StoreOp::Update { path, fields } => {
                *path == typing && fields.get(uid) == Some(&Value::Bool(value))
            }
            _ => false,
        })
        .count()
}

/// Message records written under `conversations/{cid}/messages`.
pub fn message_writes(store: &MemoryStore, cid: &str) -> usize {
    let messages = schema::messages(&ConversationId::from(cid));
    store
        .journal()
        .iter()
        .filter(|op| matches!(op, StoreOp::Update { path, .. } if messages.contains(path) && *path != messages))
        .count()
}
