use std::collections::HashMap;

use courier_shared::constants::{HASHTAG_PREFIX, MENTION_PREFIX, MESSAGE_CHARACTER_LIMIT};
use courier_shared::Message;
use courier_store::messages::newest_first;
use tracing::info;

use crate::error::{Result, ValidationError};
use crate::state::App;

impl App {
    /// Post a message as the connected user.
    pub fn send_message(&self, text: &str) -> Result<Message> {
        let sender = self.require_user()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        let len = text.chars().count();
        if len > MESSAGE_CHARACTER_LIMIT {
            return Err(ValidationError::TextTooLong { len }.into());
        }

        let message = Message::new(&sender, text);
        self.messages().add(message.clone());
        self.manager().write_message_file(&message)?;

        info!(id = %message.id, sender = %message.sender_tag, "Message sent");
        Ok(message)
    }

    /// Search the timeline, most recent first.
    ///
    /// - `@tag`: messages sent by or mentioning that user
    /// - `#tag`: messages carrying that hashtag
    /// - anything else: both of the above, plus messages containing the text
    /// - empty: every message
    pub fn search_messages(&self, query: &str) -> Vec<Message> {
        let query = query.trim();
        if query.is_empty() {
            return self.messages().timeline();
        }

        let mut found: HashMap<_, Message> = HashMap::new();
        let mut gather = |messages: Vec<Message>| {
            for m in messages {
                found.insert(m.id, m);
            }
        };

        if let Some(tag) = query.strip_prefix(MENTION_PREFIX) {
            gather(self.by_user_tag(tag));
            gather(self.messages().get_mentioning(tag));
        } else if let Some(tag) = query.strip_prefix(HASHTAG_PREFIX) {
            gather(self.messages().get_by_tag_containing(tag));
        } else {
            gather(self.by_user_tag(query));
            gather(self.messages().get_mentioning(query));
            gather(self.messages().get_by_tag_containing(query));
            gather(self.messages().get_by_text(query));
        }

        newest_first(found.into_values().collect())
    }

    fn by_user_tag(&self, tag: &str) -> Vec<Message> {
        self.users()
            .find_by_tag(tag)
            .map(|user| self.messages().get_by_user(&user))
            .unwrap_or_default()
    }
}
