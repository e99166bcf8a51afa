//! Participant profile lookups backed by the profile cache.

use std::collections::HashSet;

use tracing::{debug, warn};

use murmur_shared::error::RecordKind;
use murmur_shared::{MalformedRecord, Participant, ParticipantId, SyncError};
use murmur_store::schema::{self, fields};
use murmur_store::{RemoteStore, Snapshot};

use crate::cache::BoundedCache;
use crate::events::{Dispatcher, SyncEvent};

/// Resolves participant ids to profiles. Misses are fetched once in the
/// background; concurrent requests for the same id share one fetch.
pub struct ProfileDirectory {
    cache: BoundedCache<ParticipantId, Participant>,
    in_flight: HashSet<ParticipantId>,
}

impl ProfileDirectory {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new("profiles", capacity),
            in_flight: HashSet::new(),
        }
    }

    pub fn get(&mut self, id: &ParticipantId) -> Option<Participant> {
        self.cache.get(id).cloned()
    }

    pub fn display_name(&mut self, id: &ParticipantId) -> Option<String> {
        self.cache.get(id).map(|p| p.display_name.clone())
    }

    /// Cached display name, or start a fetch and return `None`.
    pub(crate) fn display_name_or_fetch(
        &mut self,
        id: &ParticipantId,
        dispatcher: &Dispatcher,
    ) -> Option<String> {
        let name = self.display_name(id);
        if name.is_none() {
            self.fetch(id, dispatcher);
        }
        name
    }

    pub(crate) fn fetch(&mut self, id: &ParticipantId, dispatcher: &Dispatcher) {
        if self.cache.contains(id) || !self.in_flight.insert(id.clone()) {
            return;
        }
        debug!(participant = %id.short(), "Fetching profile");
        let id = id.clone();
        dispatcher.spawn(move |store| async move {
            let result = fetch_profile(store.as_ref(), &id).await;
            SyncEvent::ProfileLoaded { id, result }
        });
    }

    /// Record the outcome of a fetch. Returns the profile on success.
    pub(crate) fn resolve(
        &mut self,
        id: &ParticipantId,
        result: Result<Participant, SyncError>,
    ) -> Option<Participant> {
        self.in_flight.remove(id);
        match result {
            Ok(profile) => {
                self.cache.put(id.clone(), profile.clone());
                Some(profile)
            }
            Err(e) => {
                warn!(participant = %id.short(), error = %e, "Profile fetch failed");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.size()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.in_flight.clear();
    }
}

pub async fn fetch_profile(
    store: &dyn RemoteStore,
    id: &ParticipantId,
) -> Result<Participant, SyncError> {
    let snapshot = store.read_once(&schema::user(id)).await?;
    Ok(parse_profile(id, &snapshot)?)
}

/// A profile needs a display name; the contact address stands in for it.
pub fn parse_profile(id: &ParticipantId, snapshot: &Snapshot) -> Result<Participant, MalformedRecord> {
    let contact = snapshot.child_str(fields::EMAIL);
    let display_name = snapshot
        .child_str(fields::NAME)
        .or_else(|| contact.clone())
        .ok_or_else(|| MalformedRecord::new(RecordKind::Participant, id.as_str(), fields::NAME))?;

    Ok(Participant {
        id: id.clone(),
        display_name,
        contact,
        avatar: snapshot.child_str(fields::AVATAR),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use murmur_store::StorePath;

    use super::*;

    fn snapshot(value: serde_json::Value) -> Snapshot {
        Snapshot::new(StorePath::parse("users/u2").unwrap(), value)
    }

    #[test]
    fn parses_full_profile() {
        let id = ParticipantId::from("u2");
        let p = parse_profile(
            &id,
            &snapshot(json!({"name": "Bea", "email": "bea@example.org", "avatar": "bea.png"})),
        )
        .unwrap();
        assert_eq!(p.display_name, "Bea");
        assert_eq!(p.contact.as_deref(), Some("bea@example.org"));
        assert_eq!(p.avatar.as_deref(), Some("bea.png"));
    }

    #[test]
    fn falls_back_to_contact_address() {
        let id = ParticipantId::from("u2");
        let p = parse_profile(&id, &snapshot(json!({"email": "bea@example.org"}))).unwrap();
        assert_eq!(p.display_name, "bea@example.org");
    }

    #[test]
    fn profile_without_name_is_malformed() {
        let id = ParticipantId::from("u2");
        let err = parse_profile(&id, &snapshot(json!({"conversations": {}}))).unwrap_err();
        assert_eq!(err.field, fields::NAME);
        assert!(parse_profile(&id, &snapshot(serde_json::Value::Null)).is_err());
    }

    #[test]
    fn resolve_populates_cache() {
        let mut profiles = ProfileDirectory::new(4);
        let id = ParticipantId::from("u2");
        let profile = Participant {
            id: id.clone(),
            display_name: "Bea".into(),
            contact: None,
            avatar: None,
        };
        assert!(profiles.resolve(&id, Ok(profile)).is_some());
        assert_eq!(profiles.display_name(&id).as_deref(), Some("Bea"));

        let other = ParticipantId::from("u3");
        assert!(profiles
            .resolve(&other, Err(SyncError::Store("offline".into())))
            .is_none());
        assert_eq!(profiles.len(), 1);
    }
}
