//! Events posted back to the session loop, and the dispatcher that runs
//! store I/O in the background and posts their results.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use murmur_shared::{Conversation, ConversationId, MessageId, Participant, ParticipantId, SyncError};
use murmur_store::{ChangeCallback, RemoteStore, Snapshot};

use crate::avatar::DecodedImage;

/// Results handed from background tasks and subscriptions to the loop.
///
/// Subscription-driven events carry the generation of the subscription
/// that produced them so deliveries for a superseded one can be dropped.
#[derive(Debug)]
pub(crate) enum SyncEvent {
    RosterChanged(Snapshot),
    ConversationLoaded {
        generation: u64,
        id: ConversationId,
        result: Result<Conversation, SyncError>,
    },
    HeaderLoaded {
        id: ConversationId,
        result: Result<Conversation, SyncError>,
    },
    ProfileLoaded {
        id: ParticipantId,
        result: Result<Participant, SyncError>,
    },
    MessagesChanged {
        generation: u64,
        snapshot: Snapshot,
    },
    TypingChanged {
        generation: u64,
        snapshot: Snapshot,
    },
    TypingIdle {
        generation: u64,
    },
    SendFinished {
        conversation: ConversationId,
        text: String,
        result: Result<MessageId, SyncError>,
    },
    AvatarDecoded {
        id: ParticipantId,
        result: Result<Arc<DecodedImage>, SyncError>,
    },
}

/// Spawns background work against the store and posts the outcome to the
/// session loop. Nothing spawned here touches session state directly.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    store: Arc<dyn RemoteStore>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl Dispatcher {
    pub(crate) fn new(
        store: Arc<dyn RemoteStore>,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        Self { store, events }
    }

    pub(crate) fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub(crate) fn post(&self, event: SyncEvent) {
        if self.events.send(event).is_err() {
            trace!("Session loop gone, dropping event");
        }
    }

    /// Run `task` on the runtime and post the event it resolves to.
    pub(crate) fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(Arc<dyn RemoteStore>) -> Fut,
        Fut: Future<Output = SyncEvent> + Send + 'static,
    {
        let fut = task(self.store.clone());
        let this = self.clone();
        tokio::spawn(async move {
            let event = fut.await;
            this.post(event);
        });
    }

    /// Post `event` after `delay`. Abort the handle to cancel.
    pub(crate) fn post_after(&self, delay: Duration, event: SyncEvent) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.post(event);
        })
    }

    /// Subscription callback that maps each snapshot to an event.
    pub(crate) fn callback<F>(&self, to_event: F) -> ChangeCallback
    where
        F: Fn(Snapshot) -> SyncEvent + Send + Sync + 'static,
    {
        let this = self.clone();
        Box::new(move |snapshot| this.post(to_event(snapshot)))
    }

    pub(crate) fn store_handle(&self) -> Arc<dyn RemoteStore> {
        self.store.clone()
    }
}
