//! In-memory authoritative collections of live entities.
//!
//! A [`Repository`] is keyed by entity UUID and guarded by a single mutex.
//! Each mutation is applied under the lock, the lock is released, and only
//! then is the change published, so subscribers always observe the new state
//! and may query the repository from inside their callback.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use courier_shared::{Entity, Message, User};
use serde::Serialize;
use uuid::Uuid;

use crate::events::{EventBus, SubscriptionId};

pub type UserRepository = Repository<User>;
pub type MessageRepository = Repository<Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A mutation applied to a repository, carrying the entity as it was
/// added, modified, or just before it was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<T> {
    pub kind: ChangeKind,
    pub entity: T,
}

pub struct Repository<T: Entity> {
    entities: Mutex<HashMap<Uuid, T>>,
    events: EventBus<Change<T>>,
}

impl<T: Entity> Repository<T> {
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
            events: EventBus::new(),
        }
    }

    /// Insert an entity. Adding an identity that is already present is a
    /// no-op and publishes nothing, which is what makes re-ingesting our own
    /// files harmless. Returns `true` if the entity was inserted.
    pub fn add(&self, entity: T) -> bool {
        {
            let mut entities = self.lock();
            if entities.contains_key(&entity.id()) {
                return false;
            }
            entities.insert(entity.id(), entity.clone());
        }
        self.publish(ChangeKind::Added, entity);
        true
    }

    /// Remove the entity with the same identity. Returns `false` (and
    /// publishes nothing) if it was not present.
    pub fn remove(&self, entity: &T) -> bool {
        self.remove_by_id(entity.id()).is_some()
    }

    pub fn remove_by_id(&self, id: Uuid) -> Option<T> {
        let removed = self.lock().remove(&id)?;
        self.publish(ChangeKind::Removed, removed.clone());
        Some(removed)
    }

    /// Replace the stored entity with the same identity, inserting it if it
    /// is unknown. Publishes `Modified` unless the stored copy is identical.
    pub fn modify(&self, entity: T) -> bool {
        {
            let mut entities = self.lock();
            if entities.get(&entity.id()) == Some(&entity) {
                return false;
            }
            entities.insert(entity.id(), entity.clone());
        }
        self.publish(ChangeKind::Modified, entity);
        true
    }

    /// Add-or-modify used when ingesting files: unknown identities are
    /// added, changed ones modified, identical ones ignored.
    pub fn merge(&self, entity: T) -> Option<ChangeKind> {
        let kind = {
            let mut entities = self.lock();
            let kind = match entities.get(&entity.id()) {
                None => ChangeKind::Added,
                Some(existing) if *existing == entity => return None,
                Some(_) => ChangeKind::Modified,
            };
            entities.insert(entity.id(), entity.clone());
            kind
        };
        self.publish(kind, entity);
        Some(kind)
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.lock().contains_key(id)
    }

    /// Snapshot of every entity, in no particular order.
    pub fn get_all(&self) -> Vec<T> {
        self.lock().values().cloned().collect()
    }

    /// Snapshot of the entities matching `predicate`.
    pub fn filter<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.lock()
            .values()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every entity, publishing one `Removed` change per entity.
    pub fn clear(&self) {
        let drained: Vec<T> = self.lock().drain().map(|(_, e)| e).collect();
        for entity in drained {
            self.publish(ChangeKind::Removed, entity);
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Change<T>) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn publish(&self, kind: ChangeKind, entity: T) {
        self.events.publish(&Change { kind, entity });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, T>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Entity> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}
