use courier_shared::text::strip_marker;
use courier_shared::{Message, User};

use crate::repository::Repository;

impl Repository<Message> {
    /// Every message, most recent first.
    pub fn timeline(&self) -> Vec<Message> {
        newest_first(self.get_all())
    }

    /// Messages sent by `user`, most recent first.
    pub fn get_by_user(&self, user: &User) -> Vec<Message> {
        newest_first(self.filter(|m| m.is_from(user)))
    }

    /// Messages carrying the hashtag `tag` (with or without its `#`).
    pub fn get_by_tag_containing(&self, tag: &str) -> Vec<Message> {
        let tag = strip_marker(tag);
        if tag.is_empty() {
            return Vec::new();
        }
        newest_first(self.filter(|m| m.has_hashtag(tag)))
    }

    /// Messages mentioning `user_tag` (with or without its `@`).
    pub fn get_mentioning(&self, user_tag: &str) -> Vec<Message> {
        let user_tag = strip_marker(user_tag);
        if user_tag.is_empty() {
            return Vec::new();
        }
        newest_first(self.filter(|m| m.mentions_user(user_tag)))
    }

    /// Messages whose text contains `needle`, ignoring case.
    pub fn get_by_text(&self, needle: &str) -> Vec<Message> {
        let needle = needle.to_lowercase();
        newest_first(self.filter(|m| m.text.to_lowercase().contains(&needle)))
    }
}

/// Sort by emission date, most recent first. Ties are broken by id so the
/// order is stable across instances.
pub fn newest_first(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by(|a, b| {
        b.emitted_at
            .cmp(&a.emitted_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    messages
}
