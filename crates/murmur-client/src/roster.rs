//! Keeps the rendered conversation list in step with the user's roster.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use murmur_shared::{Conversation, ConversationId, ConversationSummary, Participant, ParticipantId, SyncError};
use murmur_store::{schema, RemoteStore, Snapshot, SubscriptionHandle};

use crate::events::{Dispatcher, SyncEvent};
use crate::metadata::{summarize, ConversationMetadataLoader, Title};
use crate::profiles::ProfileDirectory;
use crate::view::RosterView;

/// Rebuilds the conversation list only when the set of roster ids changes,
/// and inserts each resolved conversation exactly once per rebuild.
pub struct RosterReconciler {
    local: ParticipantId,
    loader: ConversationMetadataLoader,
    subscription: Option<SubscriptionHandle>,
    /// Ids of the last observed roster; `None` before the first one.
    known: Option<BTreeSet<ConversationId>>,
    generation: u64,
    /// Ids of the current rebuild not inserted yet.
    pending: HashSet<ConversationId>,
    /// Loaded two-party conversations waiting for their counterpart's profile.
    awaiting_profile: HashMap<ParticipantId, Vec<Conversation>>,
    rendered: Vec<ConversationSummary>,
}

impl RosterReconciler {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            loader: ConversationMetadataLoader::new(local.clone()),
            local,
            subscription: None,
            known: None,
            generation: 0,
            pending: HashSet::new(),
            awaiting_profile: HashMap::new(),
            rendered: Vec::new(),
        }
    }

    pub(crate) fn attach(&mut self, dispatcher: &Dispatcher) {
        if self.subscription.is_some() {
            return;
        }
        let path = schema::roster(&self.local);
        match dispatcher
            .store()
            .subscribe(&path, dispatcher.callback(SyncEvent::RosterChanged))
        {
            Ok(handle) => self.subscription = Some(handle),
            Err(e) => warn!(path = %path, error = %e, "Roster subscription failed"),
        }
    }

    pub fn detach(&mut self, store: &dyn RemoteStore) {
        if let Some(handle) = self.subscription.take() {
            store.unsubscribe(handle);
        }
        self.pending.clear();
        self.awaiting_profile.clear();
    }

    pub fn rendered(&self) -> &[ConversationSummary] {
        &self.rendered
    }

    pub fn loader(&self) -> &ConversationMetadataLoader {
        &self.loader
    }

    /// Handle a roster notification. Returns `true` if a rebuild started.
    pub(crate) fn observe(
        &mut self,
        snapshot: &Snapshot,
        dispatcher: &Dispatcher,
        view: &mut dyn RosterView,
    ) -> bool {
        let ids = roster_ids(snapshot);
        if self.known.as_ref() == Some(&ids) {
            debug!(count = ids.len(), "Roster notification without changes");
            return false;
        }

        self.generation += 1;
        info!(count = ids.len(), generation = self.generation, "Rebuilding roster");
        self.rendered.clear();
        self.awaiting_profile.clear();
        self.pending = ids.iter().cloned().collect();
        view.clear();

        for id in &ids {
            self.loader.spawn_load(id.clone(), self.generation, dispatcher);
        }
        self.known = Some(ids);
        true
    }

    /// Apply a finished metadata fetch. Results from an older rebuild, or for
    /// an id already inserted, are ignored.
    pub(crate) fn conversation_loaded(
        &mut self,
        generation: u64,
        id: &ConversationId,
        result: Result<Conversation, SyncError>,
        profiles: &mut ProfileDirectory,
        dispatcher: &Dispatcher,
        view: &mut dyn RosterView,
    ) {
        if generation != self.generation || !self.pending.contains(id) {
            debug!(conversation = %id, generation, "Dropping stale conversation load");
            return;
        }
        let conversation = match result {
            Ok(conversation) => conversation,
            Err(e) => {
                warn!(conversation = %id, error = %e, "Skipping conversation");
                self.pending.remove(id);
                return;
            }
        };

        match self.loader.title(&conversation, profiles) {
            Title::Resolved(title) => self.insert(summarize(conversation, title), view),
            Title::AwaitingProfile(other) => {
                profiles.fetch(&other, dispatcher);
                self.awaiting_profile.entry(other).or_default().push(conversation);
            }
        }
    }

    /// Insert conversations that were waiting on `id`'s profile. A failed
    /// fetch (`None`) still inserts them under a fallback title.
    pub(crate) fn profile_loaded(
        &mut self,
        id: &ParticipantId,
        profile: Option<&Participant>,
        view: &mut dyn RosterView,
    ) {
        let Some(waiting) = self.awaiting_profile.remove(id) else {
            return;
        };
        for conversation in waiting {
            let title = match profile {
                Some(p) => p.display_name.clone(),
                None => self.loader.fallback_title(&conversation),
            };
            self.insert(summarize(conversation, title), view);
        }
    }

    fn insert(&mut self, summary: ConversationSummary, view: &mut dyn RosterView) {
        if !self.pending.remove(&summary.id) {
            return;
        }
        let index = insertion_index(&self.rendered, summary.last_message_at());
        debug!(conversation = %summary.id, index, "Inserting conversation");
        self.rendered.insert(index, summary.clone());
        view.insert(index, summary);
    }

    pub fn clear(&mut self) {
        self.known = None;
        self.pending.clear();
        self.awaiting_profile.clear();
        self.rendered.clear();
    }
}

/// Conversation ids listed in a roster snapshot; entries set to `false`
/// are not part of the roster.
pub fn roster_ids(snapshot: &Snapshot) -> BTreeSet<ConversationId> {
    snapshot
        .children()
        .into_iter()
        .filter(|entry| !matches!(entry.value(), Value::Bool(false)))
        .map(|entry| ConversationId::new(entry.key()))
        .collect()
}

/// Position for a new row in a list kept newest-first.
///
/// A row newer than the current first row goes to the top; otherwise it
/// goes before the first row with an older (or no) timestamp, after any
/// rows with an equal one. Rows without a timestamp go to the end.
pub fn insertion_index(rendered: &[ConversationSummary], at: Option<DateTime<Utc>>) -> usize {
    let Some(at) = at else {
        return rendered.len();
    };
    rendered
        .iter()
        .position(|row| row.last_message_at().map_or(true, |existing| existing < at))
        .unwrap_or(rendered.len())
}
