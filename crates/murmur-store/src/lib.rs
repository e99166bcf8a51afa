//! # murmur-store
//!
//! Interface to the remote structured data store the chat client keeps in
//! sync with, plus [`MemoryStore`], an in-process implementation.
//!
//! The store exposes four primitives: a one-shot read, a subscription that
//! re-delivers the full value at a path on every change, a partial keyed
//! update, and client-side generation of child keys.

pub mod memory;
pub mod path;
pub mod remote;
pub mod schema;
pub mod snapshot;

mod error;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, StoreOp};
pub use path::StorePath;
pub use remote::{fields_from, ChangeCallback, Fields, RemoteStore, ServerValue, SubscriptionHandle};
pub use snapshot::Snapshot;
