//! The session actor and its handle.
//!
//! A session runs in a dedicated tokio task. Callers talk to it through a
//! [`SessionHandle`]; store notifications and background results arrive on
//! a second channel. Both are drained by one `select!` loop, so every cache,
//! controller and view callback is touched from that task only.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use murmur_shared::{ConversationId, ParticipantId, SyncError};
use murmur_store::RemoteStore;

use crate::avatar::ImageDecoder;
use crate::config::SyncConfig;
use crate::events::{Dispatcher, SyncEvent};
use crate::state::SessionState;
use crate::view::ViewSet;

const COMMAND_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

/// Commands sent *into* the session task.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Bind the message and typing streams to a conversation.
    OpenConversation(ConversationId),
    /// The composer content changed.
    ContentChanged(String),
    Send {
        conversation: ConversationId,
        text: String,
    },
    CreateConversation {
        participants: Vec<ParticipantId>,
        name: Option<String>,
        reply: oneshot::Sender<Result<ConversationId, SyncError>>,
    },
    RequestAvatar(ParticipantId),
    /// Tear down and stop; the sender is notified once done.
    Close(oneshot::Sender<()>),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Entry point for starting a session.
pub struct Session;

impl Session {
    pub fn builder(store: Arc<dyn RemoteStore>, local: impl Into<ParticipantId>) -> SessionBuilder {
        SessionBuilder {
            store,
            local: local.into(),
            config: SyncConfig::default(),
            views: ViewSet::default(),
            decoder: None,
        }
    }
}

pub struct SessionBuilder {
    store: Arc<dyn RemoteStore>,
    local: ParticipantId,
    config: SyncConfig,
    views: ViewSet,
    decoder: Option<Arc<dyn ImageDecoder>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config.clamped();
        self
    }

    pub fn views(mut self, views: ViewSet) -> Self {
        self.views = views;
        self
    }

    /// Without a decoder, avatar requests are ignored.
    pub fn image_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Spawn the session loop on the current tokio runtime.
    ///
    /// The roster subscription is in place before this returns.
    pub fn spawn(self) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<SyncEvent>();

        let dispatcher = Dispatcher::new(self.store, event_tx);
        let mut state = SessionState::new(
            self.local,
            dispatcher,
            &self.config,
            self.views,
            self.decoder,
        );
        state.start();

        tokio::spawn(run(state, cmd_rx, event_rx));

        SessionHandle { commands: cmd_tx }
    }
}

async fn run(
    mut state: SessionState,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut events: mpsc::UnboundedReceiver<SyncEvent>,
) {
    loop {
        tokio::select! {
            // --- Commands from handles ---
            cmd = commands.recv() => {
                match cmd {
                    Some(SessionCommand::Close(done)) => {
                        info!("Session close requested");
                        state.teardown();
                        let _ = done.send(());
                        break;
                    }
                    Some(cmd) => state.handle_command(cmd),
                    None => {
                        // All handles dropped
                        info!("Command channel closed, closing session");
                        state.teardown();
                        break;
                    }
                }
            }

            // --- Store notifications and background results ---
            Some(event) = events.recv() => {
                state.handle_event(event);
            }
        }
    }
    debug!("Session loop stopped");
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running session. Commands are applied in the
/// order they are sent. Every method fails with
/// [`SyncError::SessionClosed`] once the session has stopped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn open_conversation(&self, id: impl Into<ConversationId>) -> Result<(), SyncError> {
        self.dispatch(SessionCommand::OpenConversation(id.into())).await
    }

    pub async fn content_changed(&self, text: impl Into<String>) -> Result<(), SyncError> {
        self.dispatch(SessionCommand::ContentChanged(text.into())).await
    }

    /// Queue a send. Empty or debounced attempts are dropped silently;
    /// the outcome is reported through the composer view.
    pub async fn send(
        &self,
        conversation: impl Into<ConversationId>,
        text: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.dispatch(SessionCommand::Send {
            conversation: conversation.into(),
            text: text.into(),
        })
        .await
    }

    /// Create a conversation between the local user and `participants`.
    pub async fn create_conversation(
        &self,
        participants: Vec<ParticipantId>,
        name: Option<String>,
    ) -> Result<ConversationId, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(SessionCommand::CreateConversation {
            participants,
            name,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SyncError::SessionClosed)?
    }

    pub async fn request_avatar(&self, id: impl Into<ParticipantId>) -> Result<(), SyncError> {
        self.dispatch(SessionCommand::RequestAvatar(id.into())).await
    }

    /// Tear the session down and wait until every subscription has been
    /// released. Closing an already closed session is a no-op.
    pub async fn close(&self) -> Result<(), SyncError> {
        let (done, rx) = oneshot::channel();
        if self.commands.send(SessionCommand::Close(done)).await.is_err() {
            return Ok(());
        }
        // A dropped reply means another close got there first.
        let _ = rx.await;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn dispatch(&self, command: SessionCommand) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::SessionClosed)
    }
}
