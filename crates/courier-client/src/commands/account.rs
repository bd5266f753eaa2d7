use courier_shared::text::is_valid_tag;
use courier_shared::User;
use tracing::{debug, info};

use crate::error::{Result, ValidationError};
use crate::state::App;

impl App {
    /// Create a user and publish their file. The tag must be unused.
    pub fn register(
        &self,
        name: &str,
        tag: &str,
        password: &str,
        avatar_path: Option<String>,
    ) -> Result<User> {
        let name = name.trim();
        let tag = tag.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if tag.is_empty() {
            return Err(ValidationError::EmptyTag.into());
        }
        if !is_valid_tag(tag) {
            return Err(ValidationError::MalformedTag(tag.to_string()).into());
        }
        if self.users().tag_exists(tag) {
            debug!(tag, "Registration rejected, tag taken");
            return Err(ValidationError::DuplicateTag(tag.to_string()).into());
        }

        let avatar_path = avatar_path.filter(|p| !p.trim().is_empty());
        let user = User::new(tag, name, password, avatar_path);
        self.users().add(user.clone());
        self.manager().write_user_file(&user)?;

        info!(tag = %user.tag, id = %user.id, "User registered");
        Ok(user)
    }

    /// Log in by tag and plaintext password.
    pub fn login(&self, tag: &str, password: &str) -> Result<User> {
        let tag = tag.trim();
        let user = self
            .users()
            .find_by_tag(tag)
            .ok_or_else(|| ValidationError::UnknownTag(tag.to_string()))?;
        if !user.check_password(password) {
            debug!(tag, "Login rejected, wrong password");
            return Err(ValidationError::WrongPassword.into());
        }

        self.session().connect(user.clone());
        Ok(user)
    }

    pub fn logout(&self) {
        if self.session().is_connected() {
            self.session().disconnect();
        }
    }
}
