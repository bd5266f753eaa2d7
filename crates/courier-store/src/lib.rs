//! # courier-store
//!
//! In-memory model and filesystem synchronization for Courier.
//!
//! Every user, message and read-set lives as one file in a shared exchange
//! directory. This crate keeps the authoritative in-memory copies
//! ([`Repository`]), mirrors local mutations to disk and ingests foreign
//! files ([`EntityManager`]), watches the directory ([`DirectoryWatcher`]),
//! tracks who is logged in ([`Session`]) and derives the connected user's
//! notifications ([`NotificationEngine`]).
//!
//! All observable components publish through a synchronous [`EventBus`]:
//! subscribers run on the thread that made the change, after it is applied.

pub mod events;
pub mod manager;
pub mod messages;
pub mod notifications;
pub mod repository;
pub mod session;
pub mod watcher;

mod error;
mod users;

pub use error::{Result, StoreError};
pub use events::{EventBus, SubscriptionId};
pub use manager::{EntityManager, ImportStats};
pub use notifications::{NotificationEngine, NotificationEvent};
pub use repository::{Change, ChangeKind, MessageRepository, Repository, UserRepository};
pub use session::{Session, SessionEvent};
pub use watcher::{
    DirectoryWatcher, FileChange, FileEvent, WatchMode, WatcherConfig, WatcherState,
};
