/// Application name
pub const APP_NAME: &str = "Murmur";

/// Default number of participant profiles kept in memory
pub const DEFAULT_PROFILE_CACHE_CAPACITY: usize = 200;

/// Default number of resolved conversation records kept in memory
pub const DEFAULT_CONVERSATION_CACHE_CAPACITY: usize = 100;

/// Default number of decoded avatar images kept in memory
pub const DEFAULT_IMAGE_CACHE_CAPACITY: usize = 64;

/// Idle delay after the last keystroke before "typing" is cleared (ms)
pub const DEFAULT_TYPING_IDLE_MS: u64 = 2_000;

/// Window in which a repeated send attempt is dropped (ms)
pub const DEFAULT_SEND_DEBOUNCE_MS: u64 = 500;

/// Display name used for multi-party conversations without a name
pub const UNNAMED_CONVERSATION: &str = "Group chat";

/// Display name used while a participant profile is unresolved
pub const UNKNOWN_PARTICIPANT: &str = "Unknown";

/// Kind tag written on text messages
pub const MESSAGE_KIND_TEXT: &str = "text";

/// Notice shown when a message could not be delivered
pub const SEND_FAILED_NOTICE: &str = "Message could not be sent. Try again.";
