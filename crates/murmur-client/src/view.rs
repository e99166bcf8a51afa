//! Capability traits through which the session drives the presentation
//! layer. The session holds these; views never hold the session.
//!
//! Every callback runs on the session loop, one at a time.

use std::sync::Arc;

use murmur_shared::{
    ConversationId, ConversationSummary, ParticipantId, RenderedMessage, TypingIndicator,
};

use crate::avatar::DecodedImage;

/// The list of conversations.
pub trait RosterView: Send {
    /// Drop every rendered row before a rebuild.
    fn clear(&mut self);

    /// Insert a row at `index`; rows already shown keep their relative order.
    fn insert(&mut self, index: usize, summary: ConversationSummary);
}

/// The open conversation.
pub trait MessageView: Send {
    /// `title` is `None` until the conversation record has been resolved;
    /// the call is repeated once it is.
    fn conversation_opened(&mut self, id: &ConversationId, title: Option<&str>);

    /// Replace the rendered history with `messages`, oldest first.
    fn render_messages(&mut self, id: &ConversationId, messages: Vec<RenderedMessage>);
}

pub trait TypingView: Send {
    fn show_typing(&mut self, indicator: &TypingIndicator);
}

/// The message input and its send control.
pub trait ComposerView: Send {
    fn clear_input(&mut self);
    fn set_input(&mut self, text: &str);
    fn set_enabled(&mut self, enabled: bool);
    fn focus(&mut self);
    /// Transient, user-visible notice.
    fn show_notice(&mut self, notice: &str);
}

pub trait AvatarView: Send {
    fn avatar_ready(&mut self, id: &ParticipantId, image: Arc<DecodedImage>);
}

/// The full set of views a session renders into.
pub struct ViewSet {
    pub roster: Box<dyn RosterView>,
    pub messages: Box<dyn MessageView>,
    pub typing: Box<dyn TypingView>,
    pub composer: Box<dyn ComposerView>,
    pub avatars: Box<dyn AvatarView>,
}

impl ViewSet {
    /// Route every capability to one shared view object.
    pub fn shared<V>(view: V) -> Self
    where
        V: RosterView + MessageView + TypingView + ComposerView + AvatarView + Clone + 'static,
    {
        Self {
            roster: Box::new(view.clone()),
            messages: Box::new(view.clone()),
            typing: Box::new(view.clone()),
            composer: Box::new(view.clone()),
            avatars: Box::new(view),
        }
    }
}

impl Default for ViewSet {
    /// Views that discard everything; useful for headless sessions.
    fn default() -> Self {
        Self::shared(Headless)
    }
}

#[derive(Clone, Copy)]
struct Headless;

impl RosterView for Headless {
    fn clear(&mut self) {}
    fn insert(&mut self, _index: usize, _summary: ConversationSummary) {}
}

impl MessageView for Headless {
    fn conversation_opened(&mut self, _id: &ConversationId, _title: Option<&str>) {}
    fn render_messages(&mut self, _id: &ConversationId, _messages: Vec<RenderedMessage>) {}
}

impl TypingView for Headless {
    fn show_typing(&mut self, _indicator: &TypingIndicator) {}
}

impl ComposerView for Headless {
    fn clear_input(&mut self) {}
    fn set_input(&mut self, _text: &str) {}
    fn set_enabled(&mut self, _enabled: bool) {}
    fn focus(&mut self) {}
    fn show_notice(&mut self, _notice: &str) {}
}

impl AvatarView for Headless {
    fn avatar_ready(&mut self, _id: &ParticipantId, _image: Arc<DecodedImage>) {}
}
