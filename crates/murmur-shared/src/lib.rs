//! Types shared by the murmur store and client crates.

pub mod constants;
pub mod error;
pub mod models;
pub mod types;

pub use error::{MalformedRecord, SyncError};
pub use models::*;
pub use types::{ConversationId, MessageId, ParticipantId};
