//! Synchronization hub between the repositories and the exchange directory.
//!
//! Three triggers meet here:
//!
//! - **import**: [`EntityManager::set_exchange_directory`] scans the directory
//!   once and merges every decodable entity file.
//! - **write-through**: `write_*_file` mirror a local mutation to disk.
//! - **ingestion**: [`EntityManager::handle_file_event`] routes debounced
//!   watcher events back into the repositories.
//!
//! Our own writes come back through the watcher too. They are absorbed by
//! the repositories' identity-based idempotence (`merge` publishes nothing
//! for an identical entity), so no write tracking is kept here.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use courier_shared::codec::{self, id_from_path};
use courier_shared::constants::TEMP_EXTENSION;
use courier_shared::{Entity, EntityKind, Message, ReadSet, User};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::events::{EventBus, SubscriptionId};
use crate::repository::{MessageRepository, UserRepository};
use crate::watcher::{FileChange, FileEvent};

/// Outcome of a directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub users_imported: usize,
    pub messages_imported: usize,
    pub read_sets_found: usize,
    pub files_skipped: usize,
}

pub struct EntityManager {
    users: Arc<UserRepository>,
    messages: Arc<MessageRepository>,
    directory: RwLock<Option<PathBuf>>,
    read_sets: EventBus<ReadSet>,
}

impl EntityManager {
    pub fn new(users: Arc<UserRepository>, messages: Arc<MessageRepository>) -> Self {
        Self {
            users,
            messages,
            directory: RwLock::new(None),
            read_sets: EventBus::new(),
        }
    }

    pub fn users(&self) -> &Arc<UserRepository> {
        &self.users
    }

    pub fn messages(&self) -> &Arc<MessageRepository> {
        &self.messages
    }

    /// Point the manager at `path` and import every entity file found there.
    /// Entities already in memory are kept; a file that fails to decode is
    /// skipped without aborting the scan.
    pub fn set_exchange_directory(&self, path: &Path) -> Result<ImportStats> {
        if !path.is_dir() {
            return Err(StoreError::InvalidDirectory(path.to_path_buf()));
        }
        *self
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());

        let stats = self.import(path)?;
        info!(
            path = %path.display(),
            users = stats.users_imported,
            messages = stats.messages_imported,
            skipped = stats.files_skipped,
            "Exchange directory imported"
        );
        Ok(stats)
    }

    pub fn exchange_directory(&self) -> Option<PathBuf> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn write_user_file(&self, user: &User) -> Result<PathBuf> {
        self.write_entity(user)
    }

    pub fn write_message_file(&self, message: &Message) -> Result<PathBuf> {
        self.write_entity(message)
    }

    pub fn write_notif_file(&self, read_set: &ReadSet) -> Result<PathBuf> {
        self.write_entity(read_set)
    }

    /// The persisted read-set of `user_id`. A missing or undecodable file
    /// means nothing has been read yet.
    pub fn load_read_set(&self, user_id: Uuid) -> Result<ReadSet> {
        let dir = self.require_directory()?;
        let path = dir.join(codec::file_name_for(EntityKind::ReadSet, user_id));

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ReadSet::new(user_id)),
            Err(e) => return Err(e.into()),
        };

        match codec::decode_file::<ReadSet>(&path, &bytes) {
            Ok(set) if set.user_id == user_id => Ok(set),
            Ok(set) => {
                warn!(
                    path = %path.display(),
                    owner = %set.user_id,
                    "Read-set file names another owner, ignoring"
                );
                Ok(ReadSet::new(user_id))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable read-set file");
                Ok(ReadSet::new(user_id))
            }
        }
    }

    /// Apply one debounced watcher event. Never fails: a file that vanished
    /// or cannot be decoded yet is logged and skipped, the next write to it
    /// produces a new event.
    pub fn handle_file_event(&self, event: &FileEvent) {
        if !self.is_in_exchange_directory(&event.path) {
            debug!(path = %event.path.display(), "Event outside exchange directory, ignoring");
            return;
        }

        match event.kind {
            FileChange::Removed => self.forget(event),
            FileChange::Created | FileChange::Modified => self.ingest(event),
        }
    }

    /// Called with every read-set file that appears or changes, e.g. when
    /// the same user marks messages read from another instance.
    pub fn subscribe_read_sets<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ReadSet) + Send + Sync + 'static,
    {
        self.read_sets.subscribe(callback)
    }

    pub fn unsubscribe_read_sets(&self, id: SubscriptionId) -> bool {
        self.read_sets.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_directory(&self) -> Result<PathBuf> {
        self.exchange_directory()
            .ok_or(StoreError::NoExchangeDirectory)
    }

    fn is_in_exchange_directory(&self, path: &Path) -> bool {
        match (self.exchange_directory(), path.parent()) {
            (Some(dir), Some(parent)) => same_directory(&dir, parent),
            _ => false,
        }
    }

    /// Write to a hidden sibling first and rename it over the target, so
    /// other instances never read a half-written entity from us.
    fn write_entity<E: Entity>(&self, entity: &E) -> Result<PathBuf> {
        let dir = self.require_directory()?;
        let name = codec::file_name(entity);
        let target = dir.join(&name);
        let temp = dir.join(format!(".{name}.{TEMP_EXTENSION}"));

        let written = (|| -> io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&codec::encode(entity))?;
            file.sync_all()?;
            fs::rename(&temp, &target)
        })();

        if let Err(e) = written {
            warn!(path = %target.display(), error = %e, "Entity write failed");
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!(path = %target.display(), kind = %E::KIND, "Entity written");
        Ok(target)
    }

    fn import(&self, dir: &Path) -> Result<ImportStats> {
        let mut stats = ImportStats::default();

        for entry in fs::read_dir(dir)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(error = %e, "Unreadable directory entry");
                    stats.files_skipped += 1;
                    continue;
                }
            };
            let Some(kind) = EntityKind::from_path(&path) else {
                continue;
            };

            match self.load(&path, kind) {
                Ok(Loaded::User) => stats.users_imported += 1,
                Ok(Loaded::Message) => stats.messages_imported += 1,
                Ok(Loaded::ReadSet) => stats.read_sets_found += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping entity file");
                    stats.files_skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    fn ingest(&self, event: &FileEvent) {
        match self.load(&event.path, event.entity) {
            Ok(loaded) => debug!(path = %event.path.display(), ?loaded, "Entity file ingested"),
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %event.path.display(), "File vanished before it could be read");
            }
            Err(e) => warn!(path = %event.path.display(), error = %e, "Failed to ingest entity file"),
        }
    }

    /// Read, decode and route one entity file.
    fn load(&self, path: &Path, kind: EntityKind) -> Result<Loaded> {
        let bytes = fs::read(path)?;
        let loaded = match kind {
            EntityKind::User => {
                self.users.merge(codec::decode_file::<User>(path, &bytes)?);
                Loaded::User
            }
            EntityKind::Message => {
                self.messages
                    .merge(codec::decode_file::<Message>(path, &bytes)?);
                Loaded::Message
            }
            EntityKind::ReadSet => {
                self.read_sets
                    .publish(&codec::decode_file::<ReadSet>(path, &bytes)?);
                Loaded::ReadSet
            }
        };
        Ok(loaded)
    }

    fn forget(&self, event: &FileEvent) {
        let Some(id) = id_from_path(&event.path) else {
            debug!(path = %event.path.display(), "Removed file has no entity id");
            return;
        };
        let removed = match event.entity {
            EntityKind::User => self.users.remove_by_id(id).is_some(),
            EntityKind::Message => self.messages.remove_by_id(id).is_some(),
            // A deleted read-set only means nothing new has been read.
            EntityKind::ReadSet => false,
        };
        if removed {
            info!(kind = %event.entity, %id, "Entity removed from exchange directory");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Loaded {
    User,
    Message,
    ReadSet,
}

fn same_directory(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
