//! In-process [`RemoteStore`] holding the whole tree as a JSON value.
//!
//! Besides serving as a local backend, the store records every call it
//! receives in a journal and can be told to fail or delay individual
//! operations, which is what the client tests assert against.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::path::StorePath;
use crate::remote::{ChangeCallback, Fields, RemoteStore, ServerValue, SubscriptionHandle};
use crate::snapshot::Snapshot;

/// One call observed by the store, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    ReadOnce(StorePath),
    Subscribe(StorePath),
    Unsubscribe(StorePath),
    Update { path: StorePath, fields: Fields },
    PushKey(StorePath),
}

type SharedCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

struct Subscriber {
    path: StorePath,
    callback: SharedCallback,
}

#[derive(Default)]
struct Inner {
    root: Value,
    subscribers: BTreeMap<u64, Subscriber>,
    next_subscription: u64,
    journal: Vec<StoreOp>,
    failing_writes: Vec<StorePath>,
    failing_reads: Vec<StorePath>,
    read_delays: Vec<(StorePath, Duration)>,
}

impl Inner {
    fn snapshot(&self, path: &StorePath) -> Snapshot {
        let value = value_at(&self.root, path).cloned().unwrap_or(Value::Null);
        Snapshot::new(path.clone(), value)
    }

    fn write(&mut self, path: &StorePath, value: Value) {
        if value.is_null() {
            remove_at(&mut self.root, path.segments());
        } else {
            let mut node = &mut self.root;
            for segment in path.segments() {
                node = object_mut(node)
                    .entry(segment.clone())
                    .or_insert(Value::Null);
            }
            *node = value;
        }
    }

    /// Snapshots owed to every subscriber whose path overlaps a written path.
    fn deliveries(&self, written: &[StorePath]) -> Vec<(SharedCallback, Snapshot)> {
        self.subscribers
            .values()
            .filter(|sub| written.iter().any(|w| w.overlaps(&sub.path)))
            .map(|sub| (sub.callback.clone(), self.snapshot(&sub.path)))
            .collect()
    }

    fn read_rejected(&self, path: &StorePath) -> bool {
        self.failing_reads.iter().any(|p| p.overlaps(path))
    }
}

/// Thread-safe in-memory store. Clones share the same tree.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    /// Serialises notification delivery so subscribers observe writes in order
    /// and receive nothing once `unsubscribe` has returned.
    delivery: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the value at `path` without journaling the write.
    /// Subscribers are notified as for any other write.
    pub fn set(&self, path: &StorePath, mut value: Value) {
        resolve_server_values(&mut value, now_millis());
        let _delivery = self.delivery.lock();
        let deliveries = {
            let mut inner = self.inner.lock();
            inner.write(path, value);
            inner.deliveries(std::slice::from_ref(path))
        };
        for (callback, snapshot) in deliveries {
            callback(snapshot);
        }
    }

    /// Current value at `path` (`Value::Null` when absent).
    pub fn value(&self, path: &StorePath) -> Value {
        self.inner.lock().snapshot(path).into_value()
    }

    pub fn journal(&self) -> Vec<StoreOp> {
        self.inner.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.inner.lock().journal.clear();
    }

    /// Paths of all subscriptions that have not been released.
    pub fn active_subscriptions(&self) -> Vec<StorePath> {
        self.inner
            .lock()
            .subscribers
            .values()
            .map(|s| s.path.clone())
            .collect()
    }

    /// Reject every update at or below `path`.
    pub fn fail_writes_under(&self, path: &StorePath) {
        self.inner.lock().failing_writes.push(path.clone());
    }

    /// Reject reads and subscriptions overlapping `path`.
    pub fn fail_reads_under(&self, path: &StorePath) {
        self.inner.lock().failing_reads.push(path.clone());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.failing_writes.clear();
        inner.failing_reads.clear();
    }

    /// Delay one-shot reads at or below `path`.
    pub fn delay_reads_under(&self, path: &StorePath, delay: Duration) {
        self.inner.lock().read_delays.push((path.clone(), delay));
    }

    fn begin_read(&self, path: &StorePath) -> Option<Duration> {
        let mut inner = self.inner.lock();
        inner.journal.push(StoreOp::ReadOnce(path.clone()));
        inner
            .read_delays
            .iter()
            .filter(|(p, _)| p.contains(path))
            .map(|(_, d)| *d)
            .max()
    }

    fn finish_read(&self, path: &StorePath) -> Result<Snapshot> {
        let inner = self.inner.lock();
        if inner.read_rejected(path) {
            return Err(StoreError::Unavailable(format!("read rejected at {path}")));
        }
        Ok(inner.snapshot(path))
    }

    fn apply_update(&self, path: &StorePath, fields: Fields) -> Result<()> {
        let now = now_millis();
        let _delivery = self.delivery.lock();
        let deliveries = {
            let mut inner = self.inner.lock();
            inner.journal.push(StoreOp::Update {
                path: path.clone(),
                fields: fields.clone(),
            });
            if inner.failing_writes.iter().any(|p| p.contains(path)) {
                debug!(path = %path, "Rejecting write");
                return Err(StoreError::Unavailable(format!("write rejected at {path}")));
            }

            // Validate every key before touching the tree.
            let mut targets = Vec::with_capacity(fields.len());
            for (key, mut value) in fields {
                let target = path.join(&key)?;
                resolve_server_values(&mut value, now);
                targets.push((target, value));
            }

            let written: Vec<StorePath> = targets.iter().map(|(p, _)| p.clone()).collect();
            for (target, value) in targets {
                inner.write(&target, value);
            }
            inner.deliveries(&written)
        };

        trace!(path = %path, subscribers = deliveries.len(), "Delivering update");
        for (callback, snapshot) in deliveries {
            callback(snapshot);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read_once(&self, path: &StorePath) -> Result<Snapshot> {
        if let Some(delay) = self.begin_read(path) {
            tokio::time::sleep(delay).await;
        }
        self.finish_read(path)
    }

    fn subscribe(&self, path: &StorePath, on_change: ChangeCallback) -> Result<SubscriptionHandle> {
        let callback: SharedCallback = Arc::from(on_change);
        let _delivery = self.delivery.lock();
        let (handle, snapshot) = {
            let mut inner = self.inner.lock();
            inner.journal.push(StoreOp::Subscribe(path.clone()));
            if inner.read_rejected(path) {
                return Err(StoreError::Unavailable(format!(
                    "subscription rejected at {path}"
                )));
            }
            inner.next_subscription += 1;
            let id = inner.next_subscription;
            inner.subscribers.insert(
                id,
                Subscriber {
                    path: path.clone(),
                    callback: callback.clone(),
                },
            );
            (SubscriptionHandle::new(id, path.clone()), inner.snapshot(path))
        };

        debug!(path = %path, id = handle.id(), "Subscribed");
        callback(snapshot);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let _delivery = self.delivery.lock();
        let mut inner = self.inner.lock();
        if inner.subscribers.remove(&handle.id()).is_some() {
            inner.journal.push(StoreOp::Unsubscribe(handle.path().clone()));
            debug!(path = %handle.path(), id = handle.id(), "Unsubscribed");
        } else {
            debug!(id = handle.id(), "Unsubscribe for unknown handle ignored");
        }
    }

    async fn update(&self, path: &StorePath, fields: Fields) -> Result<()> {
        self.apply_update(path, fields)
    }

    fn push_key(&self, path: &StorePath) -> String {
        self.inner.lock().journal.push(StoreOp::PushKey(path.clone()));
        Uuid::new_v4().simple().to_string()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn value_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Coerce `node` into an object, keeping array items under their index.
fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if let Value::Array(items) = node {
        let map: Map<String, Value> = items
            .drain(..)
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        *node = Value::Object(map);
    } else if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was coerced into an object"),
    }
}

/// Remove the value at `segments`, pruning parents left empty.
fn remove_at(node: &mut Value, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        *node = Value::Null;
        return;
    };
    let Some(map) = node.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
        return;
    }
    if let Some(child) = map.get_mut(first) {
        remove_at(child, rest);
        let emptied = child.is_null() || child.as_object().is_some_and(Map::is_empty);
        if emptied {
            map.remove(first);
        }
    }
}

fn resolve_server_values(value: &mut Value, now: i64) {
    if ServerValue::is_timestamp(value) {
        *value = Value::from(now);
        return;
    }
    match value {
        Value::Object(map) => map
            .values_mut()
            .for_each(|v| resolve_server_values(v, now)),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|v| resolve_server_values(v, now)),
        _ => {}
    }
}
