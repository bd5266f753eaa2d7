use std::fs;
use std::path::Path;

use courier_store::ImportStats;
use tracing::info;

use crate::config::Settings;
use crate::error::{Result, ValidationError};
use crate::state::App;

impl App {
    /// Switch to another exchange directory: validate it, import it, watch
    /// it, reload notifications, then remember the choice. Entities already
    /// loaded from the previous directory stay in memory.
    pub fn change_exchange_directory(&self, path: &Path) -> Result<ImportStats> {
        if !is_valid_exchange_directory(path) {
            return Err(ValidationError::InvalidDirectory(path.to_path_buf()).into());
        }

        let stats = self.open_directory(path)?;

        let settings = Settings {
            exchange_directory: Some(path.to_path_buf()),
        };
        settings.save(&self.config().config_file)?;

        info!(path = %path.display(), "Exchange directory changed");
        Ok(stats)
    }
}

/// Exists, is a directory, can be listed and is not read-only.
fn is_valid_exchange_directory(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    metadata.is_dir() && !metadata.permissions().readonly() && fs::read_dir(path).is_ok()
}
