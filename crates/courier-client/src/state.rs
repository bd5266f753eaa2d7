//! Application state shared by every command.
//!
//! [`App`] owns one instance of each store component and wires them
//! together: watcher events feed the entity manager, and the notification
//! engine follows the session, the message repository and read-set changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use courier_shared::User;
use courier_store::{
    DirectoryWatcher, EntityManager, ImportStats, MessageRepository, NotificationEngine, Session,
    UserRepository,
};
use tracing::{info, warn};

use crate::config::{ClientConfig, Settings};
use crate::error::{Result, ValidationError};

pub struct App {
    config: ClientConfig,
    users: Arc<UserRepository>,
    messages: Arc<MessageRepository>,
    manager: Arc<EntityManager>,
    watcher: DirectoryWatcher,
    session: Session,
    notifications: Arc<NotificationEngine>,
}

impl App {
    /// Build and wire every component. Nothing touches the filesystem until
    /// [`App::start`].
    pub fn new(config: ClientConfig) -> Self {
        let users = Arc::new(UserRepository::new());
        let messages = Arc::new(MessageRepository::new());
        let manager = Arc::new(EntityManager::new(users.clone(), messages.clone()));
        let watcher = DirectoryWatcher::new(config.watcher_config());
        let session = Session::new();
        let notifications = Arc::new(NotificationEngine::new(
            users.clone(),
            messages.clone(),
            manager.clone(),
        ));

        let sink = manager.clone();
        watcher.subscribe(move |event| sink.handle_file_event(event));
        notifications.attach(&session);

        Self {
            config,
            users,
            messages,
            manager,
            watcher,
            session,
            notifications,
        }
    }

    /// Open the configured exchange directory: the `COURIER_EXCHANGE_DIR`
    /// override if set, else the persisted one. Returns `None` when no
    /// directory has been chosen yet.
    pub fn start(&self) -> Result<Option<ImportStats>> {
        let directory = match self.config.exchange_dir.clone() {
            Some(dir) => Some(dir),
            None => Settings::load(&self.config.config_file)?.exchange_directory,
        };

        match directory {
            Some(dir) => self.open_directory(&dir).map(Some),
            None => {
                info!("No exchange directory configured yet");
                Ok(None)
            }
        }
    }

    /// Stop watching. In-memory state is kept.
    pub fn shutdown(&self) {
        self.watcher.stop_watching();
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn users(&self) -> &Arc<UserRepository> {
        &self.users
    }

    pub fn messages(&self) -> &Arc<MessageRepository> {
        &self.messages
    }

    pub fn manager(&self) -> &Arc<EntityManager> {
        &self.manager
    }

    pub fn watcher(&self) -> &DirectoryWatcher {
        &self.watcher
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn notifications(&self) -> &Arc<NotificationEngine> {
        &self.notifications
    }

    pub fn exchange_directory(&self) -> Option<PathBuf> {
        self.manager.exchange_directory()
    }

    /// The connected user, or [`ValidationError::NotConnected`].
    pub(crate) fn require_user(&self) -> std::result::Result<User, ValidationError> {
        self.session
            .connected_user()
            .ok_or(ValidationError::NotConnected)
    }

    /// Watch first, then import, so a file landing during the scan is
    /// picked up by one or the other.
    pub(crate) fn open_directory(&self, dir: &Path) -> Result<ImportStats> {
        self.watcher.init_watching(dir)?;

        let stats = match self.manager.set_exchange_directory(dir) {
            Ok(stats) => stats,
            Err(e) => {
                self.watcher.stop_watching();
                return Err(e.into());
            }
        };

        if let Err(e) = self.notifications.set_exchange_directory(dir) {
            warn!(error = %e, "Failed to reload notifications");
        }
        Ok(stats)
    }
}
