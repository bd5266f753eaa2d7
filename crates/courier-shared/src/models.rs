//! Domain model structs mirrored as files in the exchange directory.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a presentation layer. The on-disk representation is not
//! serde-driven; see [`crate::codec`].

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user. Other entities refer to users by `tag`, never by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Immutable identity, generated at registration.
    pub id: Uuid,
    /// Unique human-readable handle.
    pub tag: String,
    /// Display name.
    pub name: String,
    /// Plaintext password, matched as-is at login.
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Optional path to an avatar image.
    pub avatar_path: Option<String>,
    /// Tags of the users this user follows.
    pub follows: BTreeSet<String>,
}

impl User {
    pub fn new(
        tag: impl Into<String>,
        name: impl Into<String>,
        password: impl Into<String>,
        avatar_path: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: tag.into(),
            name: name.into(),
            password: password.into(),
            avatar_path,
            follows: BTreeSet::new(),
        }
    }

    pub fn is_following(&self, tag: &str) -> bool {
        self.follows.contains(tag)
    }

    /// Returns `false` if the tag was already followed.
    pub fn follow(&mut self, tag: impl Into<String>) -> bool {
        self.follows.insert(tag.into())
    }

    /// Returns `false` if the tag was not followed.
    pub fn unfollow(&mut self, tag: &str) -> bool {
        self.follows.remove(tag)
    }

    pub fn check_password(&self, candidate: &str) -> bool {
        self.password == candidate
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message broadcast to every instance sharing the exchange directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    /// Tag of the sending user.
    pub sender_tag: String,
    /// Message body.
    pub text: String,
    /// Emission time, kept at millisecond precision to match the file format.
    pub emitted_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: &User, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_tag: sender.tag.clone(),
            text: text.into(),
            emitted_at: now_millis(),
        }
    }

    pub fn is_from(&self, user: &User) -> bool {
        self.sender_tag == user.tag
    }

    pub fn hashtags(&self) -> BTreeSet<String> {
        text::hashtags(&self.text)
    }

    pub fn mentions(&self) -> BTreeSet<String> {
        text::mentions(&self.text)
    }

    pub fn has_hashtag(&self, tag: &str) -> bool {
        self.hashtags().contains(text::strip_marker(tag))
    }

    pub fn mentions_user(&self, user_tag: &str) -> bool {
        self.mentions().contains(text::strip_marker(user_tag))
    }
}

/// Current time truncated to whole milliseconds.
pub fn now_millis() -> DateTime<Utc> {
    let millis = Utc::now().timestamp_millis();
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

// ---------------------------------------------------------------------------
// ReadSet
// ---------------------------------------------------------------------------

/// The messages one user has marked as read, persisted as `<user id>.notif`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadSet {
    /// Owner of the set.
    pub user_id: Uuid,
    /// Identifiers of the messages already read.
    pub message_ids: BTreeSet<Uuid>,
}

impl ReadSet {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            message_ids: BTreeSet::new(),
        }
    }

    pub fn contains(&self, message_id: &Uuid) -> bool {
        self.message_ids.contains(message_id)
    }

    pub fn insert(&mut self, message_id: Uuid) -> bool {
        self.message_ids.insert(message_id)
    }

    /// Union with another set of read identifiers.
    pub fn merge<I: IntoIterator<Item = Uuid>>(&mut self, ids: I) {
        self.message_ids.extend(ids);
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// "Someone you follow posted" for the connected user. Lives in memory only;
/// what survives a logout is the owner's [`ReadSet`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub message: Message,
    pub sender: User,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: Message, sender: User) -> Self {
        Self {
            message,
            sender,
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message.id
    }

    pub fn mark_as_read(&mut self) {
        self.read = true;
    }
}
