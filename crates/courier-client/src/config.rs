//! Client configuration.
//!
//! [`ClientConfig`] is read from environment variables and has defaults for
//! everything, so the client starts with zero configuration. [`Settings`]
//! is the small file that remembers the chosen exchange directory between
//! runs, written in the same `key=value` format as entity files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use courier_shared::constants::{
    APP_NAME, CONFIG_FILE_NAME, CONFIG_KEY_EXCHANGE_DIRECTORY, DEFAULT_DEBOUNCE_MS,
    DEFAULT_POLL_INTERVAL_MS,
};
use courier_shared::Properties;
use courier_store::{WatchMode, WatcherConfig};
use directories::ProjectDirs;
use tracing::{debug, warn};

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Exchange directory to use instead of the persisted one.
    /// Env: `COURIER_EXCHANGE_DIR`
    /// Default: none (use [`Settings`]).
    pub exchange_dir: Option<PathBuf>,

    /// Where [`Settings`] are stored.
    /// Env: `COURIER_CONFIG_FILE`
    /// Default: `<platform config dir>/courier.properties`
    pub config_file: PathBuf,

    /// Quiet period before a changed file is ingested.
    /// Env: `COURIER_DEBOUNCE_MS`
    /// Default: `100`
    pub debounce: Duration,

    /// Env: `COURIER_WATCH_MODE` (`native` / `poll`)
    /// Default: `native`
    pub watch_mode: WatchMode,

    /// Scan interval in poll mode.
    /// Env: `COURIER_POLL_INTERVAL_MS`
    /// Default: `500`
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            exchange_dir: None,
            config_file: default_config_file(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            watch_mode: WatchMode::Native,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("COURIER_EXCHANGE_DIR").filter(|d| !d.is_empty()) {
            config.exchange_dir = Some(PathBuf::from(dir));
        }

        if let Some(path) = lookup("COURIER_CONFIG_FILE").filter(|p| !p.is_empty()) {
            config.config_file = PathBuf::from(path);
        }

        if let Some(val) = lookup("COURIER_DEBOUNCE_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.debounce = Duration::from_millis(ms),
                Err(_) => warn!(value = %val, "Invalid COURIER_DEBOUNCE_MS, using default"),
            }
        }

        if let Some(val) = lookup("COURIER_WATCH_MODE") {
            match val.to_ascii_lowercase().as_str() {
                "native" => config.watch_mode = WatchMode::Native,
                "poll" => config.watch_mode = WatchMode::Poll,
                _ => warn!(value = %val, "Invalid COURIER_WATCH_MODE, using default"),
            }
        }

        if let Some(val) = lookup("COURIER_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => warn!(value = %val, "Invalid COURIER_POLL_INTERVAL_MS, using default"),
            }
        }

        config
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce: self.debounce,
            mode: self.watch_mode,
            poll_interval: self.poll_interval,
        }
    }
}

fn default_config_file() -> PathBuf {
    ProjectDirs::from("org", "courier", APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Persisted user choices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub exchange_directory: Option<PathBuf>,
}

impl Settings {
    /// A missing file yields empty settings.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file yet");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };

        let props = Properties::parse(&text);
        Ok(Self {
            exchange_directory: props
                .get(CONFIG_KEY_EXCHANGE_DIRECTORY)
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut props = Properties::new();
        if let Some(ref dir) = self.exchange_directory {
            props.set(CONFIG_KEY_EXCHANGE_DIRECTORY, dir.to_string_lossy());
        }
        fs::write(path, props.to_string())
    }
}
