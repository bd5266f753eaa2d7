//! "Someone you follow posted" feed for the connected user.
//!
//! Notifications live in memory only. What persists is the owner's read-set
//! (`<user id>.notif`), which records the messages already dismissed so a
//! later login does not show them again.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use courier_shared::{Message, Notification, ReadSet, User};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::events::{EventBus, SubscriptionId};
use crate::manager::EntityManager;
use crate::messages::newest_first;
use crate::repository::{Change, ChangeKind, MessageRepository, UserRepository};
use crate::session::{Session, SessionEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// The whole list was rebuilt (login, directory change).
    Reloaded(Vec<Notification>),
    /// A followed user posted while we are logged in.
    Added(Notification),
    /// These messages were marked read elsewhere and left the list.
    Dismissed(Vec<Uuid>),
    /// The list was emptied (mark-all-as-read, logout).
    Cleared,
}

#[derive(Default)]
struct State {
    user: Option<User>,
    read: Option<ReadSet>,
    notifications: Vec<Notification>,
}

pub struct NotificationEngine {
    users: Arc<UserRepository>,
    messages: Arc<MessageRepository>,
    manager: Arc<EntityManager>,
    state: Mutex<State>,
    events: EventBus<NotificationEvent>,
}

impl NotificationEngine {
    pub fn new(
        users: Arc<UserRepository>,
        messages: Arc<MessageRepository>,
        manager: Arc<EntityManager>,
    ) -> Self {
        Self {
            users,
            messages,
            manager,
            state: Mutex::new(State::default()),
            events: EventBus::new(),
        }
    }

    /// Wire the engine to the login state, the message feed and external
    /// read-set changes. Callbacks hold a weak handle, so dropping the last
    /// `Arc` to the engine turns them into no-ops.
    pub fn attach(self: &Arc<Self>, session: &Session) {
        let weak = Arc::downgrade(self);
        session.subscribe(with_engine(&weak, |engine, event: &SessionEvent| match event {
            SessionEvent::Login(user) => engine.load_for(user),
            SessionEvent::Logout => engine.clear(),
        }));

        self.messages
            .subscribe(with_engine(&weak, |engine, change: &Change<Message>| {
                match change.kind {
                    ChangeKind::Added => engine.on_message_added(&change.entity),
                    ChangeKind::Removed => engine.dismiss(&[change.entity.id]),
                    ChangeKind::Modified => {}
                }
            }));

        // A message can be ingested before its author's user file.
        self.users
            .subscribe(with_engine(&weak, |engine, change: &Change<User>| {
                if change.kind == ChangeKind::Added {
                    engine.on_user_added(&change.entity);
                }
            }));

        self.manager
            .subscribe_read_sets(with_engine(&weak, |engine, set: &ReadSet| {
                engine.on_read_set(set)
            }));

        // Someone may already be logged in.
        if let Some(user) = session.connected_user() {
            self.load_for(&user);
        }
    }

    /// Snapshot of the current list, most recent first at login time and
    /// newer arrivals appended.
    pub fn get_all_notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn get_unread_count(&self) -> usize {
        self.lock().notifications.iter().filter(|n| !n.read).count()
    }

    /// Mark every held notification read, persist the union with the
    /// previously read ids, then clear the list. A failed write is returned
    /// but the list is cleared regardless.
    pub fn mark_all_as_read(&self) -> Result<()> {
        let read = {
            let mut state = self.lock();
            let State {
                read, notifications, ..
            } = &mut *state;
            let Some(read) = read.as_mut() else {
                return Ok(());
            };
            for notification in notifications.iter_mut() {
                notification.mark_as_read();
                read.insert(notification.message_id());
            }
            notifications.clear();
            read.clone()
        };

        info!(user = %read.user_id, read = read.message_ids.len(), "Notifications marked as read");
        self.events.publish(&NotificationEvent::Cleared);
        self.manager.write_notif_file(&read)?;
        Ok(())
    }

    /// Reload the connected user's read-set from `path` and rebuild the list.
    pub fn set_exchange_directory(&self, path: &Path) -> Result<()> {
        if self.manager.exchange_directory().as_deref() != Some(path) {
            self.manager.set_exchange_directory(path)?;
        }
        let user = self.lock().user.clone();
        if let Some(user) = user {
            self.load_for(&user);
        }
        Ok(())
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Feeds
    // -----------------------------------------------------------------------

    fn load_for(&self, user: &User) {
        let read = match self.manager.load_read_set(user.id) {
            Ok(read) => read,
            Err(e) => {
                warn!(user = %user.tag, error = %e, "Could not load read-set, assuming nothing read");
                ReadSet::new(user.id)
            }
        };

        // Scan under the state lock so a message arriving meanwhile is
        // either in this scan or appended afterwards, never both.
        let list = {
            let mut state = self.lock();
            let follower = self.latest(user);
            let candidates = newest_first(
                self.messages
                    .filter(|m| follower.is_following(&m.sender_tag) && !read.contains(&m.id)),
            );

            state.notifications = candidates
                .into_iter()
                .filter_map(|m| self.notification_for(&follower, m))
                .collect();
            state.user = Some(user.clone());
            state.read = Some(read);
            state.notifications.clone()
        };

        info!(user = %user.tag, count = list.len(), "Notifications loaded");
        self.events.publish(&NotificationEvent::Reloaded(list));
    }

    fn on_message_added(&self, message: &Message) {
        let added = {
            let mut state = self.lock();
            let Some(user) = state.user.clone() else {
                return;
            };
            let follower = self.latest(&user);
            if !follower.is_following(&message.sender_tag)
                || state.read.as_ref().is_some_and(|r| r.contains(&message.id))
                || state
                    .notifications
                    .iter()
                    .any(|n| n.message_id() == message.id)
            {
                return;
            }
            let Some(notification) = self.notification_for(&follower, message.clone()) else {
                return;
            };
            state.notifications.push(notification.clone());
            notification
        };

        debug!(message = %message.id, sender = %message.sender_tag, "Notification added");
        self.events.publish(&NotificationEvent::Added(added));
    }

    /// Pick up messages from `sender` that were skipped while their author
    /// was still unknown.
    fn on_user_added(&self, sender: &User) {
        let added: Vec<Notification> = {
            let mut state = self.lock();
            let Some(user) = state.user.clone() else {
                return;
            };
            let follower = self.latest(&user);
            if sender.id == follower.id || !follower.is_following(&sender.tag) {
                return;
            }

            let State {
                read, notifications, ..
            } = &mut *state;
            let pending = newest_first(self.messages.filter(|m| {
                m.sender_tag == sender.tag
                    && !read.as_ref().is_some_and(|r| r.contains(&m.id))
                    && !notifications.iter().any(|n| n.message_id() == m.id)
            }));
            let fresh: Vec<Notification> = pending
                .into_iter()
                .filter_map(|m| self.notification_for(&follower, m))
                .collect();
            notifications.extend(fresh.iter().cloned());
            fresh
        };

        for notification in added {
            debug!(message = %notification.message_id(), sender = %sender.tag, "Late notification added");
            self.events.publish(&NotificationEvent::Added(notification));
        }
    }

    fn on_read_set(&self, set: &ReadSet) {
        let ids: Vec<Uuid> = {
            let mut state = self.lock();
            match state.read.as_mut() {
                Some(read) if read.user_id == set.user_id => {
                    read.merge(set.message_ids.iter().copied())
                }
                _ => return,
            }
            set.message_ids.iter().copied().collect()
        };
        self.dismiss(&ids);
    }

    fn dismiss(&self, ids: &[Uuid]) {
        let dismissed: Vec<Uuid> = {
            let mut state = self.lock();
            let mut dismissed = Vec::new();
            state.notifications.retain(|n| {
                let gone = ids.contains(&n.message_id());
                if gone {
                    dismissed.push(n.message_id());
                }
                !gone
            });
            dismissed
        };

        if !dismissed.is_empty() {
            debug!(count = dismissed.len(), "Notifications dismissed");
            self.events.publish(&NotificationEvent::Dismissed(dismissed));
        }
    }

    fn clear(&self) {
        *self.lock() = State::default();
        self.events.publish(&NotificationEvent::Cleared);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Freshest copy of `user`, so follows made since login are honoured.
    fn latest(&self, user: &User) -> User {
        self.users.get(&user.id).unwrap_or_else(|| user.clone())
    }

    /// `None` for our own messages and for senders no loaded user carries
    /// yet (the message file may have arrived before its author's).
    fn notification_for(&self, follower: &User, message: Message) -> Option<Notification> {
        if message.sender_tag == follower.tag {
            return None;
        }
        let Some(sender) = self.users.find_by_tag(&message.sender_tag) else {
            debug!(sender = %message.sender_tag, "Skipping message from unknown sender");
            return None;
        };
        if sender.id == follower.id {
            return None;
        }
        Some(Notification::new(message, sender))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Adapt an engine method into a subscriber closure holding a weak handle.
fn with_engine<E, F>(weak: &Weak<NotificationEngine>, f: F) -> impl Fn(&E) + Send + Sync + 'static
where
    E: 'static,
    F: Fn(&NotificationEngine, &E) + Send + Sync + 'static,
{
    let weak = weak.clone();
    move |event: &E| {
        if let Some(engine) = weak.upgrade() {
            f(&*engine, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Duration;
    use courier_shared::codec;

    use super::*;
    use crate::watcher::{FileChange, FileEvent};

    struct Fixture {
        users: Arc<UserRepository>,
        messages: Arc<MessageRepository>,
        manager: Arc<EntityManager>,
        session: Session,
        engine: Arc<NotificationEngine>,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let users = Arc::new(UserRepository::new());
        let messages = Arc::new(MessageRepository::new());
        let manager = Arc::new(EntityManager::new(users.clone(), messages.clone()));
        manager.set_exchange_directory(dir.path()).unwrap();

        let session = Session::new();
        let engine = Arc::new(NotificationEngine::new(
            users.clone(),
            messages.clone(),
            manager.clone(),
        ));
        engine.attach(&session);

        Fixture {
            users,
            messages,
            manager,
            session,
            engine,
            dir,
        }
    }

    fn register(f: &Fixture, tag: &str, follows: &[&str]) -> User {
        let mut user = User::new(tag, tag.to_uppercase(), "pw", None);
        for t in follows {
            user.follow(*t);
        }
        f.users.add(user.clone());
        user
    }

    #[test]
    fn test_only_followed_senders_notify() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        let carol = register(&f, "carol", &[]);
        f.messages.add(Message::new(&bob, "from bob"));
        f.messages.add(Message::new(&carol, "from carol"));

        f.session.connect(alice);

        let list = f.engine.get_all_notifications();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].sender.tag, "bob");
        assert_eq!(f.engine.get_unread_count(), 1);
    }

    #[test]
    fn test_never_notified_of_own_messages() {
        let f = fixture();
        let alice = register(&f, "alice", &["alice"]);
        f.messages.add(Message::new(&alice, "talking to myself"));

        f.session.connect(alice.clone());
        assert!(f.engine.get_all_notifications().is_empty());

        f.messages.add(Message::new(&alice, "again"));
        assert!(f.engine.get_all_notifications().is_empty());
    }

    #[test]
    fn test_login_list_is_newest_first() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        let mut old = Message::new(&bob, "old");
        old.emitted_at -= Duration::minutes(5);
        f.messages.add(old);
        f.messages.add(Message::new(&bob, "new"));

        f.session.connect(alice);

        let texts: Vec<String> = f
            .engine
            .get_all_notifications()
            .into_iter()
            .map(|n| n.message.text)
            .collect();
        assert_eq!(texts, vec!["new", "old"]);
    }

    #[test]
    fn test_mark_all_as_read_survives_relogin() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        f.messages.add(Message::new(&bob, "one"));
        f.messages.add(Message::new(&bob, "two"));

        f.session.connect(alice.clone());
        assert_eq!(f.engine.get_unread_count(), 2);
        f.engine.mark_all_as_read().unwrap();
        assert!(f.engine.get_all_notifications().is_empty());

        let read = f.manager.load_read_set(alice.id).unwrap();
        assert_eq!(read.message_ids.len(), 2);

        f.session.disconnect();
        f.session.connect(alice.clone());
        assert!(f.engine.get_all_notifications().is_empty());

        f.messages.add(Message::new(&bob, "three"));
        let list = f.engine.get_all_notifications();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message.text, "three");
    }

    #[test]
    fn test_read_union_is_persisted() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        let first = Message::new(&bob, "first");
        f.messages.add(first.clone());

        f.session.connect(alice.clone());
        f.engine.mark_all_as_read().unwrap();

        let second = Message::new(&bob, "second");
        f.messages.add(second.clone());
        f.engine.mark_all_as_read().unwrap();

        let read = f.manager.load_read_set(alice.id).unwrap();
        assert!(read.contains(&first.id));
        assert!(read.contains(&second.id));
    }

    #[test]
    fn test_unknown_sender_is_skipped() {
        let f = fixture();
        let alice = register(&f, "alice", &["ghost"]);
        let ghost = User::new("ghost", "Ghost", "pw", None);
        f.messages.add(Message::new(&ghost, "boo"));

        f.session.connect(alice);
        assert!(f.engine.get_all_notifications().is_empty());
    }

    #[test]
    fn test_message_before_its_author_is_picked_up_later() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        f.session.connect(alice);

        let bob = User::new("bob", "Bob", "pw", None);
        let msg = Message::new(&bob, "posted right after registering");
        let msg_path = f.dir.path().join(codec::file_name(&msg));
        let user_path = f.dir.path().join(codec::file_name(&bob));
        fs::write(&msg_path, codec::encode(&msg)).unwrap();
        fs::write(&user_path, codec::encode(&bob)).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        f.engine
            .subscribe(move |e: &NotificationEvent| sink.lock().unwrap().push(e.clone()));

        f.manager.handle_file_event(&FileEvent {
            path: msg_path,
            kind: FileChange::Created,
            entity: courier_shared::EntityKind::Message,
        });
        assert_eq!(f.engine.get_unread_count(), 0);

        f.manager.handle_file_event(&FileEvent {
            path: user_path,
            kind: FileChange::Created,
            entity: courier_shared::EntityKind::User,
        });
        let list = f.engine.get_all_notifications();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message_id(), msg.id);
        assert_eq!(list[0].sender.tag, "bob");
        assert!(matches!(
            events.lock().unwrap().as_slice(),
            [NotificationEvent::Added(n)] if n.message_id() == msg.id
        ));

        // A second copy of the author changes nothing.
        f.users.modify(bob);
        assert_eq!(f.engine.get_unread_count(), 1);
    }

    #[test]
    fn test_late_author_of_read_message_stays_quiet() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = User::new("bob", "Bob", "pw", None);
        let msg = Message::new(&bob, "already seen");
        let mut read = ReadSet::new(alice.id);
        read.insert(msg.id);
        f.manager.write_notif_file(&read).unwrap();

        f.messages.add(msg);
        f.session.connect(alice);
        f.users.add(bob);

        assert!(f.engine.get_all_notifications().is_empty());
    }

    #[test]
    fn test_removed_message_is_dismissed() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        let msg = Message::new(&bob, "soon gone");
        f.messages.add(msg.clone());
        f.session.connect(alice);
        assert_eq!(f.engine.get_unread_count(), 1);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        f.engine
            .subscribe(move |e: &NotificationEvent| sink.lock().unwrap().push(e.clone()));

        assert!(f.messages.remove(&msg));

        assert!(f.engine.get_all_notifications().is_empty());
        assert_eq!(
            *events.lock().unwrap(),
            vec![NotificationEvent::Dismissed(vec![msg.id])]
        );
    }

    #[test]
    fn test_follow_after_login_is_honoured() {
        let f = fixture();
        let mut alice = register(&f, "alice", &[]);
        let bob = register(&f, "bob", &[]);
        f.session.connect(alice.clone());

        alice.follow("bob");
        f.users.modify(alice);
        f.messages.add(Message::new(&bob, "hi"));

        assert_eq!(f.engine.get_unread_count(), 1);
    }

    #[test]
    fn test_logout_clears_memory_only() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        f.messages.add(Message::new(&bob, "hi"));

        f.session.connect(alice.clone());
        f.engine.mark_all_as_read().unwrap();
        f.messages.add(Message::new(&bob, "again"));
        f.session.disconnect();

        assert!(f.engine.get_all_notifications().is_empty());
        assert_eq!(f.manager.load_read_set(alice.id).unwrap().message_ids.len(), 1);

        // Nobody logged in: arrivals are ignored.
        f.messages.add(Message::new(&bob, "later"));
        assert!(f.engine.get_all_notifications().is_empty());
    }

    #[test]
    fn test_external_read_set_dismisses() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        let seen = Message::new(&bob, "seen elsewhere");
        let unseen = Message::new(&bob, "still new");
        f.messages.add(seen.clone());
        f.messages.add(unseen.clone());
        f.session.connect(alice.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        f.engine
            .subscribe(move |e: &NotificationEvent| sink.lock().unwrap().push(e.clone()));

        let mut other = ReadSet::new(alice.id);
        other.insert(seen.id);
        let path = f.dir.path().join(codec::file_name(&other));
        fs::write(&path, codec::encode(&other)).unwrap();
        f.manager.handle_file_event(&FileEvent {
            path,
            kind: FileChange::Modified,
            entity: courier_shared::EntityKind::ReadSet,
        });

        let list = f.engine.get_all_notifications();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message_id(), unseen.id);
        assert_eq!(
            *events.lock().unwrap(),
            vec![NotificationEvent::Dismissed(vec![seen.id])]
        );
    }

    #[test]
    fn test_missing_read_file_means_all_unread() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        f.messages.add(Message::new(&bob, "hi"));

        assert!(!f.dir.path().join(format!("{}.notif", alice.id)).exists());
        f.session.connect(alice);
        assert_eq!(f.engine.get_unread_count(), 1);
    }

    #[test]
    fn test_directory_change_reloads_read_set() {
        let f = fixture();
        let alice = register(&f, "alice", &["bob"]);
        let bob = register(&f, "bob", &[]);
        f.messages.add(Message::new(&bob, "hi"));
        f.session.connect(alice.clone());
        f.engine.mark_all_as_read().unwrap();

        // The new directory has no read-set for alice yet.
        let other = tempfile::tempdir().unwrap();
        f.engine.set_exchange_directory(other.path()).unwrap();
        assert_eq!(f.manager.exchange_directory(), Some(other.path().to_path_buf()));
        assert_eq!(f.engine.get_unread_count(), 1);
    }
}
