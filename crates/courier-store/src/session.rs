//! The single locally authenticated user of this instance.

use std::sync::{Mutex, PoisonError};

use courier_shared::User;
use tracing::info;

use crate::events::{EventBus, SubscriptionId};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Login(User),
    Logout,
}

/// One-slot login state. Only one user is connected per instance; calling
/// [`Session::connect`] while someone is connected simply replaces them.
#[derive(Default)]
pub struct Session {
    connected: Mutex<Option<User>>,
    events: EventBus<SessionEvent>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, user: User) {
        info!(tag = %user.tag, id = %user.id, "User connected");
        *self.slot() = Some(user.clone());
        self.events.publish(&SessionEvent::Login(user));
    }

    pub fn disconnect(&self) {
        let previous = self.slot().take();
        if let Some(user) = previous {
            info!(tag = %user.tag, "User disconnected");
        }
        self.events.publish(&SessionEvent::Logout);
    }

    pub fn connected_user(&self) -> Option<User> {
        self.slot().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.slot().is_some()
    }

    /// Replace the stored copy of the connected user (e.g. after a follow)
    /// without firing a login event. Ignored if `user` is not the one
    /// connected.
    pub fn refresh(&self, user: &User) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|u| u.id == user.id) {
            *slot = Some(user.clone());
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<User>> {
        self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
