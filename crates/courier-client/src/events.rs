//! Outbound change events, for a presentation layer or the daemon log.

use chrono::{DateTime, Utc};
use courier_shared::{Message, User};
use courier_store::{Change, ChangeKind, NotificationEvent, SessionEvent};
use serde::Serialize;
use uuid::Uuid;

use crate::state::App;

pub const EVENT_USER_CHANGED: &str = "user-changed";
pub const EVENT_MESSAGE_CHANGED: &str = "message-changed";
pub const EVENT_SESSION_CHANGED: &str = "session-changed";
pub const EVENT_NOTIFICATIONS_CHANGED: &str = "notifications-changed";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub change: ChangeKind,
    pub id: Uuid,
    pub tag: String,
    pub name: String,
    pub follows: Vec<String>,
}

impl From<&Change<User>> for UserPayload {
    fn from(c: &Change<User>) -> Self {
        Self {
            change: c.kind,
            id: c.entity.id,
            tag: c.entity.tag.clone(),
            name: c.entity.name.clone(),
            follows: c.entity.follows.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub change: ChangeKind,
    pub id: Uuid,
    pub sender_tag: String,
    pub text: String,
    pub emitted_at: DateTime<Utc>,
}

impl From<&Change<Message>> for MessagePayload {
    fn from(c: &Change<Message>) -> Self {
        Self {
            change: c.kind,
            id: c.entity.id,
            sender_tag: c.entity.sender_tag.clone(),
            text: c.entity.text.clone(),
            emitted_at: c.entity.emitted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub connected_tag: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsPayload {
    pub unread: usize,
    pub event: NotificationEvent,
}

/// Log one event with its JSON payload.
pub fn emit_event<S: Serialize>(event: &str, payload: &S) {
    match serde_json::to_string(payload) {
        Ok(json) => tracing::info!(event, payload = %json, "Event"),
        Err(e) => tracing::error!(event, error = %e, "Failed to serialize event payload"),
    }
}

/// Subscribe to every observable component of `app` and log its events.
pub fn log_events(app: &App) {
    app.users().subscribe(|c: &Change<User>| {
        emit_event(EVENT_USER_CHANGED, &UserPayload::from(c));
    });

    app.messages().subscribe(|c: &Change<Message>| {
        emit_event(EVENT_MESSAGE_CHANGED, &MessagePayload::from(c));
    });

    app.session().subscribe(|e: &SessionEvent| {
        let connected_tag = match e {
            SessionEvent::Login(user) => Some(user.tag.clone()),
            SessionEvent::Logout => None,
        };
        emit_event(EVENT_SESSION_CHANGED, &SessionPayload { connected_tag });
    });

    let engine = std::sync::Arc::downgrade(app.notifications());
    app.notifications().subscribe(move |e: &NotificationEvent| {
        let unread = engine.upgrade().map_or(0, |n| n.get_unread_count());
        emit_event(
            EVENT_NOTIFICATIONS_CHANGED,
            &NotificationsPayload {
                unread,
                event: e.clone(),
            },
        );
    });
}
