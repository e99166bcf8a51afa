//! The remote store interface consumed by the synchronization layer.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::path::StorePath;
use crate::snapshot::Snapshot;

/// Partial keyed update. Keys are relative paths and may contain `/`;
/// a `null` value removes the child.
pub type Fields = Map<String, Value>;

/// Invoked with the full current value on every change.
///
/// Callbacks run on the writer's task and must not call back into the store.
pub type ChangeCallback = Box<dyn Fn(Snapshot) + Send + Sync + 'static>;

/// Proof of an active subscription. Consumed by [`RemoteStore::unsubscribe`],
/// so a handle can be released at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    path: StorePath,
}

impl SubscriptionHandle {
    pub fn new(id: u64, path: StorePath) -> Self {
        Self { id, path }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }
}

/// Placeholders resolved by the store at write time.
pub struct ServerValue;

impl ServerValue {
    const MARKER: &'static str = ".sv";

    /// Replaced by the store's clock (epoch milliseconds) when written.
    pub fn timestamp() -> Value {
        let mut marker = Map::new();
        marker.insert(Self::MARKER.to_string(), Value::from("timestamp"));
        Value::Object(marker)
    }

    pub fn is_timestamp(value: &Value) -> bool {
        value
            .as_object()
            .and_then(|m| m.get(Self::MARKER))
            .and_then(Value::as_str)
            == Some("timestamp")
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// One-shot read of the value at `path`.
    async fn read_once(&self, path: &StorePath) -> Result<Snapshot>;

    /// Deliver the current value immediately and again after every change
    /// until the handle is passed to [`RemoteStore::unsubscribe`].
    fn subscribe(&self, path: &StorePath, on_change: ChangeCallback) -> Result<SubscriptionHandle>;

    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Partial write of `fields` below `path`.
    async fn update(&self, path: &StorePath, fields: Fields) -> Result<()>;

    /// Allocate a unique child key under `path` without writing anything.
    fn push_key(&self, path: &StorePath) -> String;
}

/// Convert a serializable struct into update fields.
pub fn fields_from<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidPath(format!(
            "expected an object of fields, got {other}"
        ))),
    }
}
