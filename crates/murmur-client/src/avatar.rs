//! Decoded avatar images, kept in a bounded cache.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use murmur_shared::{Participant, ParticipantId, SyncError};

use crate::cache::BoundedCache;
use crate::events::{Dispatcher, SyncEvent};
use crate::profiles::ProfileDirectory;
use crate::view::AvatarView;

/// A decoded, display-ready image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major.
    pub pixels: Vec<u8>,
}

/// Decodes (and scales) an avatar source into pixels. Runs off the
/// session loop.
#[async_trait]
pub trait ImageDecoder: Send + Sync + 'static {
    async fn decode(&self, source: &str) -> Result<DecodedImage, SyncError>;
}

pub struct AvatarCache {
    images: BoundedCache<ParticipantId, Arc<DecodedImage>>,
    decoder: Option<Arc<dyn ImageDecoder>>,
    in_flight: HashSet<ParticipantId>,
    awaiting_profile: HashSet<ParticipantId>,
}

impl AvatarCache {
    pub fn new(capacity: usize, decoder: Option<Arc<dyn ImageDecoder>>) -> Self {
        Self {
            images: BoundedCache::new("images", capacity),
            decoder,
            in_flight: HashSet::new(),
            awaiting_profile: HashSet::new(),
        }
    }

    /// Show `id`'s avatar, decoding it first if it is not cached.
    pub(crate) fn request(
        &mut self,
        id: &ParticipantId,
        profiles: &mut ProfileDirectory,
        dispatcher: &Dispatcher,
        view: &mut dyn AvatarView,
    ) {
        if let Some(image) = self.images.get(id) {
            view.avatar_ready(id, image.clone());
            return;
        }
        if self.decoder.is_none() {
            debug!(participant = %id.short(), "No image decoder configured");
            return;
        }
        match profiles.get(id) {
            Some(profile) => self.start_decode(&profile, dispatcher),
            None => {
                self.awaiting_profile.insert(id.clone());
                profiles.fetch(id, dispatcher);
            }
        }
    }

    pub(crate) fn profile_loaded(
        &mut self,
        id: &ParticipantId,
        profile: Option<&Participant>,
        dispatcher: &Dispatcher,
    ) {
        if !self.awaiting_profile.remove(id) {
            return;
        }
        if let Some(profile) = profile {
            self.start_decode(profile, dispatcher);
        }
    }

    fn start_decode(&mut self, profile: &Participant, dispatcher: &Dispatcher) {
        let (Some(decoder), Some(source)) = (self.decoder.clone(), profile.avatar.clone()) else {
            trace!(participant = %profile.id.short(), "Participant has no avatar");
            return;
        };
        if !self.in_flight.insert(profile.id.clone()) {
            return;
        }
        let id = profile.id.clone();
        dispatcher.spawn(move |_store| async move {
            let result = decoder.decode(&source).await.map(Arc::new);
            SyncEvent::AvatarDecoded { id, result }
        });
    }

    pub(crate) fn decoded(
        &mut self,
        id: ParticipantId,
        result: Result<Arc<DecodedImage>, SyncError>,
        view: &mut dyn AvatarView,
    ) {
        if !self.in_flight.remove(&id) {
            // Cache was cleared while decoding.
            return;
        }
        match result {
            Ok(image) => {
                if let Some((evicted, _)) = self.images.put(id.clone(), image.clone()) {
                    trace!(participant = %evicted.short(), "Released decoded avatar");
                }
                view.avatar_ready(&id, image);
            }
            Err(e) => warn!(participant = %id.short(), error = %e, "Avatar decode failed"),
        }
    }

    pub fn len(&self) -> usize {
        self.images.size()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.in_flight.clear();
        self.awaiting_profile.clear();
    }
}
