//! Local typing signal and the remote "someone is typing" indicator.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use murmur_shared::constants::UNKNOWN_PARTICIPANT;
use murmur_shared::{ConversationId, ParticipantId, TypingIndicator};
use murmur_store::{schema, Fields, RemoteStore, Snapshot, StorePath, SubscriptionHandle};

use crate::events::{Dispatcher, SyncEvent};
use crate::profiles::ProfileDirectory;
use crate::view::TypingView;

struct RemoteTyping {
    generation: u64,
    handle: SubscriptionHandle,
    last: Option<Snapshot>,
}

/// Writes the local typing flag only on transitions, and renders the
/// aggregate typing state of the other participants.
pub struct PresenceTypingController {
    local: ParticipantId,
    idle_timeout: Duration,
    conversation: Option<ConversationId>,
    is_typing: bool,
    idle_timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    remote: Option<RemoteTyping>,
    remote_generation: u64,
    indicator: TypingIndicator,
    writes: mpsc::UnboundedSender<(StorePath, Fields)>,
}

impl PresenceTypingController {
    /// Must be called inside a tokio runtime: typing writes are applied in
    /// order by a dedicated writer task.
    pub fn new(local: ParticipantId, idle_timeout: Duration, store: std::sync::Arc<dyn RemoteStore>) -> Self {
        let (writes, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(store, rx));
        Self {
            local,
            idle_timeout,
            conversation: None,
            is_typing: false,
            idle_timer: None,
            timer_generation: 0,
            remote: None,
            remote_generation: 0,
            indicator: TypingIndicator::Nobody,
            writes,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    /// Follow `id`'s typing state. The previous conversation is left first,
    /// clearing the local flag there if it was set.
    pub(crate) fn attach(
        &mut self,
        id: &ConversationId,
        dispatcher: &Dispatcher,
        view: &mut dyn TypingView,
    ) {
        if self.conversation.as_ref() == Some(id) {
            return;
        }
        self.detach(dispatcher.store(), view);

        self.remote_generation += 1;
        let generation = self.remote_generation;
        let path = schema::typing(id);
        match dispatcher.store().subscribe(
            &path,
            dispatcher.callback(move |snapshot| SyncEvent::TypingChanged {
                generation,
                snapshot,
            }),
        ) {
            Ok(handle) => {
                self.remote = Some(RemoteTyping {
                    generation,
                    handle,
                    last: None,
                })
            }
            Err(e) => warn!(path = %path, error = %e, "Typing subscription failed"),
        }
        self.conversation = Some(id.clone());
    }

    pub fn detach(&mut self, store: &dyn RemoteStore, view: &mut dyn TypingView) {
        self.stop_typing();
        if let Some(remote) = self.remote.take() {
            store.unsubscribe(remote.handle);
        }
        self.conversation = None;
        self.show(TypingIndicator::Nobody, view);
    }

    /// A local edit of the composer. Empty content counts as having stopped.
    pub(crate) fn content_changed(&mut self, text: &str, dispatcher: &Dispatcher) {
        if self.conversation.is_none() {
            return;
        }
        if text.trim().is_empty() {
            self.stop_typing();
            return;
        }

        self.restart_idle_timer(dispatcher);
        if !self.is_typing {
            self.is_typing = true;
            self.write(true);
        }
    }

    pub(crate) fn idle_elapsed(&mut self, generation: u64) {
        if generation != self.timer_generation {
            return;
        }
        self.idle_timer = None;
        if self.is_typing {
            debug!("Typing idle timeout");
            self.is_typing = false;
            self.write(false);
        }
    }

    /// Cancel the idle timer and clear the local flag if it is set.
    pub fn stop_typing(&mut self) {
        self.cancel_idle_timer();
        if self.is_typing {
            self.is_typing = false;
            self.write(false);
        }
    }

    pub(crate) fn apply_remote(
        &mut self,
        generation: u64,
        snapshot: Snapshot,
        profiles: &mut ProfileDirectory,
        dispatcher: &Dispatcher,
        view: &mut dyn TypingView,
    ) {
        match self.remote.as_mut() {
            Some(remote) if remote.generation == generation => remote.last = Some(snapshot),
            _ => {
                debug!(generation, "Dropping stale typing notification");
                return;
            }
        }
        self.refresh(profiles, dispatcher, view);
    }

    /// Re-derive the indicator from the last notification, e.g. after a
    /// profile arrived.
    pub(crate) fn refresh(
        &mut self,
        profiles: &mut ProfileDirectory,
        dispatcher: &Dispatcher,
        view: &mut dyn TypingView,
    ) {
        let Some(snapshot) = self.remote.as_ref().and_then(|r| r.last.as_ref()) else {
            return;
        };
        let typing = others_typing(snapshot, &self.local);
        let indicator = match typing.len() {
            0 => TypingIndicator::Nobody,
            1 => {
                let Some(other) = typing.iter().next() else {
                    return;
                };
                let name = profiles
                    .display_name_or_fetch(other, dispatcher)
                    .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string());
                TypingIndicator::One { name }
            }
            _ => TypingIndicator::Several,
        };
        self.show(indicator, view);
    }

    fn show(&mut self, indicator: TypingIndicator, view: &mut dyn TypingView) {
        if indicator != self.indicator {
            view.show_typing(&indicator);
            self.indicator = indicator;
        }
    }

    fn restart_idle_timer(&mut self, dispatcher: &Dispatcher) {
        self.cancel_idle_timer();
        self.timer_generation += 1;
        self.idle_timer = Some(dispatcher.post_after(
            self.idle_timeout,
            SyncEvent::TypingIdle {
                generation: self.timer_generation,
            },
        ));
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
        // Invalidate a timeout that fired but is still queued.
        self.timer_generation += 1;
    }

    fn write(&self, typing: bool) {
        let Some(conversation) = &self.conversation else {
            return;
        };
        let mut fields = Fields::new();
        fields.insert(self.local.as_str().to_string(), Value::Bool(typing));
        if self.writes.send((schema::typing(conversation), fields)).is_err() {
            warn!("Typing writer stopped, dropping typing update");
        }
    }
}

/// Other participants flagged as typing, in id order.
pub fn others_typing(snapshot: &Snapshot, local: &ParticipantId) -> BTreeSet<ParticipantId> {
    snapshot
        .children()
        .into_iter()
        .filter(|entry| entry.as_bool() == Some(true) && entry.key() != local.as_str())
        .map(|entry| ParticipantId::new(entry.key()))
        .collect()
}

/// Applies typing writes one at a time so a later state never lands before
/// an earlier one. Failures are logged and never retried.
async fn write_loop(
    store: std::sync::Arc<dyn RemoteStore>,
    mut rx: mpsc::UnboundedReceiver<(StorePath, Fields)>,
) {
    while let Some((path, fields)) = rx.recv().await {
        if let Err(e) = store.update(&path, fields).await {
            warn!(path = %path, error = %e, "Typing update failed");
        }
    }
    debug!("Typing writer stopped");
}
