//! Session configuration, optionally overridden from environment variables.

use std::str::FromStr;
use std::time::Duration;

use murmur_shared::constants::{
    DEFAULT_CONVERSATION_CACHE_CAPACITY, DEFAULT_IMAGE_CACHE_CAPACITY,
    DEFAULT_PROFILE_CACHE_CAPACITY, DEFAULT_SEND_DEBOUNCE_MS, DEFAULT_TYPING_IDLE_MS,
};

/// Capacities and timings of a sync session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Participant profiles kept in memory.
    /// Env: `MURMUR_PROFILE_CACHE`
    /// Default: `200`
    pub profile_cache_capacity: usize,

    /// Resolved conversation records kept in memory.
    /// Env: `MURMUR_CONVERSATION_CACHE`
    /// Default: `100`
    pub conversation_cache_capacity: usize,

    /// Decoded avatar images kept in memory.
    /// Env: `MURMUR_IMAGE_CACHE`
    /// Default: `64`
    pub image_cache_capacity: usize,

    /// Delay after the last keystroke before the local user stops typing.
    /// Env: `MURMUR_TYPING_IDLE_MS`
    /// Default: `2000`
    pub typing_idle_timeout: Duration,

    /// Window in which a repeated send attempt is dropped.
    /// Env: `MURMUR_SEND_DEBOUNCE_MS`
    /// Default: `500`
    pub send_debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            profile_cache_capacity: DEFAULT_PROFILE_CACHE_CAPACITY,
            conversation_cache_capacity: DEFAULT_CONVERSATION_CACHE_CAPACITY,
            image_cache_capacity: DEFAULT_IMAGE_CACHE_CAPACITY,
            typing_idle_timeout: Duration::from_millis(DEFAULT_TYPING_IDLE_MS),
            send_debounce: Duration::from_millis(DEFAULT_SEND_DEBOUNCE_MS),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(n) = parse_var(&lookup, "MURMUR_PROFILE_CACHE") {
            config.profile_cache_capacity = n;
        }
        if let Some(n) = parse_var(&lookup, "MURMUR_CONVERSATION_CACHE") {
            config.conversation_cache_capacity = n;
        }
        if let Some(n) = parse_var(&lookup, "MURMUR_IMAGE_CACHE") {
            config.image_cache_capacity = n;
        }
        if let Some(ms) = parse_var(&lookup, "MURMUR_TYPING_IDLE_MS") {
            config.typing_idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "MURMUR_SEND_DEBOUNCE_MS") {
            config.send_debounce = Duration::from_millis(ms);
        }

        config.clamped()
    }

    /// Every cache holds at least one entry.
    pub fn clamped(mut self) -> Self {
        self.profile_cache_capacity = self.profile_cache_capacity.max(1);
        self.conversation_cache_capacity = self.conversation_cache_capacity.max(1);
        self.image_cache_capacity = self.image_cache_capacity.max(1);
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
