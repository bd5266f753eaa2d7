/// Application name
pub const APP_NAME: &str = "Courier";

/// File extension of serialized users
pub const USER_EXTENSION: &str = "user";

/// File extension of serialized messages
pub const MESSAGE_EXTENSION: &str = "msg";

/// File extension of per-user read-message sets
pub const READ_SET_EXTENSION: &str = "notif";

/// Extension used for in-flight writes before they are renamed into place
pub const TEMP_EXTENSION: &str = "tmp";

/// Maximum message length in characters (enforced by the compose flow)
pub const MESSAGE_CHARACTER_LIMIT: usize = 200;

/// Prefix marking a hashtag inside message text
pub const HASHTAG_PREFIX: char = '#';

/// Prefix marking a user mention inside message text
pub const MENTION_PREFIX: char = '@';

/// Default debounce window for directory events in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default poll interval for the polling watcher in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Settings key holding the exchange directory path
pub const CONFIG_KEY_EXCHANGE_DIRECTORY: &str = "EXCHANGE_DIRECTORY";

/// File name of the persisted client settings
pub const CONFIG_FILE_NAME: &str = "courier.properties";
