//! # murmur-client
//!
//! Real-time conversation sync for the Murmur chat client.
//!
//! A [`Session`] keeps the local view of the user's conversations, the open
//! conversation's messages and who is typing in step with a
//! [`RemoteStore`](murmur_store::RemoteStore), and renders changes into the
//! [`view`] capability traits supplied by the presentation layer.

pub mod avatar;
pub mod cache;
pub mod config;
pub mod metadata;
pub mod outbound;
pub mod profiles;
pub mod roster;
pub mod session;
pub mod stream;
pub mod typing;
pub mod view;

mod events;
mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use avatar::{DecodedImage, ImageDecoder};
pub use cache::BoundedCache;
pub use config::SyncConfig;
pub use session::{Session, SessionBuilder, SessionHandle};
pub use view::{AvatarView, ComposerView, MessageView, RosterView, TypingView, ViewSet};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter. Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("murmur_client=debug,murmur_store=info,warn"));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting {} sync", murmur_shared::constants::APP_NAME);
    }
}
