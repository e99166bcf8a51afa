//! Everything a session owns, mutated only on the session loop.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use murmur_shared::{Conversation, ConversationId, ParticipantId, SyncError};

use crate::avatar::{AvatarCache, ImageDecoder};
use crate::cache::BoundedCache;
use crate::config::SyncConfig;
use crate::events::{Dispatcher, SyncEvent};
use crate::metadata::{conversation_members, create_conversation, load_conversation, Title};
use crate::outbound::OutboundMessagePipeline;
use crate::profiles::ProfileDirectory;
use crate::roster::RosterReconciler;
use crate::session::SessionCommand;
use crate::stream::MessageStreamController;
use crate::typing::PresenceTypingController;
use crate::view::ViewSet;

/// Central session state.
///
/// Holds the three caches, the controllers and the views. Only the session
/// loop touches it; background work reports back through [`SyncEvent`]s.
pub(crate) struct SessionState {
    local: ParticipantId,
    dispatcher: Dispatcher,

    /// Participant profiles, shared by every controller.
    profiles: ProfileDirectory,

    /// Conversation records resolved by the roster or for a header.
    conversations: BoundedCache<ConversationId, Conversation>,

    /// Decoded avatar images.
    avatars: AvatarCache,

    roster: RosterReconciler,
    stream: MessageStreamController,
    typing: PresenceTypingController,
    outbound: OutboundMessagePipeline,

    views: ViewSet,
}

impl SessionState {
    pub(crate) fn new(
        local: ParticipantId,
        dispatcher: Dispatcher,
        config: &SyncConfig,
        views: ViewSet,
        decoder: Option<Arc<dyn ImageDecoder>>,
    ) -> Self {
        Self {
            profiles: ProfileDirectory::new(config.profile_cache_capacity),
            conversations: BoundedCache::new("conversations", config.conversation_cache_capacity),
            avatars: AvatarCache::new(config.image_cache_capacity, decoder),
            roster: RosterReconciler::new(local.clone()),
            stream: MessageStreamController::new(local.clone()),
            typing: PresenceTypingController::new(
                local.clone(),
                config.typing_idle_timeout,
                dispatcher.store_handle(),
            ),
            outbound: OutboundMessagePipeline::new(local.clone(), config.send_debounce),
            local,
            dispatcher,
            views,
        }
    }

    /// Follow the roster and prefetch the local profile, whose name is
    /// written on outgoing messages.
    pub(crate) fn start(&mut self) {
        info!(user = %self.local.short(), "Session started");
        self.roster.attach(&self.dispatcher);
        self.profiles.fetch(&self.local, &self.dispatcher);
    }

    pub(crate) fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::OpenConversation(id) => self.open_conversation(id),
            SessionCommand::ContentChanged(text) => {
                self.typing.content_changed(&text, &self.dispatcher)
            }
            SessionCommand::Send { conversation, text } => {
                let sender_name = self
                    .profiles
                    .display_name_or_fetch(&self.local, &self.dispatcher);
                if let Err(reason) = self.outbound.send(
                    &conversation,
                    &text,
                    sender_name,
                    &mut self.typing,
                    &self.dispatcher,
                    self.views.composer.as_mut(),
                ) {
                    trace!(?reason, "Send not started");
                }
            }
            SessionCommand::CreateConversation {
                participants,
                name,
                reply,
            } => self.create_conversation(participants, name, reply),
            SessionCommand::RequestAvatar(id) => self.avatars.request(
                &id,
                &mut self.profiles,
                &self.dispatcher,
                self.views.avatars.as_mut(),
            ),
            SessionCommand::Close(_) => {
                debug!("Close is handled by the session loop");
            }
        }
    }

    pub(crate) fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::RosterChanged(snapshot) => {
                self.roster
                    .observe(&snapshot, &self.dispatcher, self.views.roster.as_mut());
            }
            SyncEvent::ConversationLoaded {
                generation,
                id,
                result,
            } => {
                if let Ok(conversation) = &result {
                    self.conversations.put(id.clone(), conversation.clone());
                }
                self.roster.conversation_loaded(
                    generation,
                    &id,
                    result,
                    &mut self.profiles,
                    &self.dispatcher,
                    self.views.roster.as_mut(),
                );
            }
            SyncEvent::HeaderLoaded { id, result } => match result {
                Ok(conversation) => {
                    self.conversations.put(id.clone(), conversation);
                    if self.stream.active() == Some(&id) {
                        self.show_header(&id);
                    }
                }
                Err(e) => warn!(conversation = %id, error = %e, "Header lookup failed"),
            },
            SyncEvent::ProfileLoaded { id, result } => {
                let profile = self.profiles.resolve(&id, result);
                self.roster
                    .profile_loaded(&id, profile.as_ref(), self.views.roster.as_mut());
                self.avatars
                    .profile_loaded(&id, profile.as_ref(), &self.dispatcher);
                if profile.is_some() {
                    self.typing.refresh(
                        &mut self.profiles,
                        &self.dispatcher,
                        self.views.typing.as_mut(),
                    );
                    self.refresh_header(&id);
                }
            }
            SyncEvent::MessagesChanged {
                generation,
                snapshot,
            } => self.stream.apply(
                generation,
                &snapshot,
                &mut self.profiles,
                &self.dispatcher,
                self.views.messages.as_mut(),
            ),
            SyncEvent::TypingChanged {
                generation,
                snapshot,
            } => self.typing.apply_remote(
                generation,
                snapshot,
                &mut self.profiles,
                &self.dispatcher,
                self.views.typing.as_mut(),
            ),
            SyncEvent::TypingIdle { generation } => self.typing.idle_elapsed(generation),
            SyncEvent::SendFinished {
                conversation,
                text,
                result,
            } => self
                .outbound
                .finished(&conversation, text, result, self.views.composer.as_mut()),
            SyncEvent::AvatarDecoded { id, result } => {
                self.avatars
                    .decoded(id, result, self.views.avatars.as_mut())
            }
        }
    }

    /// Release every subscription, stop the timers and drop cached data.
    pub(crate) fn teardown(&mut self) {
        let store = self.dispatcher.store();
        self.stream.close(store);
        self.typing.detach(store, self.views.typing.as_mut());
        self.roster.detach(store);
        self.roster.clear();

        self.profiles.clear();
        self.conversations.clear();
        self.avatars.clear();
        self.outbound.reset();
        info!(user = %self.local.short(), "Session closed");
    }

    fn open_conversation(&mut self, id: ConversationId) {
        if self.stream.active() == Some(&id) {
            return;
        }
        self.typing
            .attach(&id, &self.dispatcher, self.views.typing.as_mut());
        if let Err(e) = self.stream.open(&id, &self.dispatcher) {
            warn!(conversation = %id, error = %e, "Could not open message stream");
        }

        let cached = self.conversations.contains(&id);
        self.show_header(&id);
        if !cached {
            let id = id.clone();
            self.dispatcher.spawn(move |store| async move {
                let result = load_conversation(store.as_ref(), &id).await;
                SyncEvent::HeaderLoaded { id, result }
            });
        }
    }

    fn show_header(&mut self, id: &ConversationId) {
        let title = self.header_title(id);
        self.views.messages.conversation_opened(id, title.as_deref());
    }

    /// Title for the open conversation; `None` while a lookup is pending.
    fn header_title(&mut self, id: &ConversationId) -> Option<String> {
        let conversation = self.conversations.get(id)?;
        match self.roster.loader().title(conversation, &mut self.profiles) {
            Title::Resolved(title) => Some(title),
            Title::AwaitingProfile(other) => {
                self.profiles.fetch(&other, &self.dispatcher);
                None
            }
        }
    }

    fn refresh_header(&mut self, participant: &ParticipantId) {
        let Some(active) = self.stream.active().cloned() else {
            return;
        };
        let awaited = self
            .conversations
            .peek(&active)
            .and_then(|c| c.counterpart(&self.local))
            == Some(participant);
        if awaited {
            self.show_header(&active);
        }
    }

    fn create_conversation(
        &mut self,
        participants: Vec<ParticipantId>,
        name: Option<String>,
        reply: oneshot::Sender<Result<ConversationId, SyncError>>,
    ) {
        let members = match conversation_members(&self.local, participants) {
            Ok(members) => members,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let store = self.dispatcher.store_handle();
        tokio::spawn(async move {
            let result = create_conversation(store.as_ref(), members, name).await;
            if let Err(e) = &result {
                warn!(error = %e, "Conversation creation failed");
            }
            let _ = reply.send(result);
        });
    }
}
