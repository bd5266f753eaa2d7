use courier_shared::text::strip_marker;
use courier_shared::User;
use tracing::info;

use crate::error::{Result, ValidationError};
use crate::state::App;

impl App {
    /// Add `tag` to the connected user's follow-set.
    pub fn follow(&self, tag: &str) -> Result<User> {
        let tag = strip_marker(tag);
        let mut me = self.current_user()?;
        if tag == me.tag {
            return Err(ValidationError::SelfFollow.into());
        }
        if !self.users().tag_exists(tag) {
            return Err(ValidationError::UnknownTag(tag.to_string()).into());
        }
        if !me.follow(tag) {
            return Err(ValidationError::AlreadyFollowing(tag.to_string()).into());
        }

        self.save_follows(&me)?;
        info!(user = %me.tag, followed = tag, "Now following");
        Ok(me)
    }

    /// Remove `tag` from the connected user's follow-set. The followed user
    /// does not need to exist any more.
    pub fn unfollow(&self, tag: &str) -> Result<User> {
        let tag = strip_marker(tag);
        let mut me = self.current_user()?;
        if !me.unfollow(tag) {
            return Err(ValidationError::NotFollowing(tag.to_string()).into());
        }

        self.save_follows(&me)?;
        info!(user = %me.tag, unfollowed = tag, "Stopped following");
        Ok(me)
    }

    /// Users following `user`, by name.
    pub fn followers(&self, user: &User) -> Vec<User> {
        by_name(self.users().followers_of(user))
    }

    /// Known users `user` follows, by name.
    pub fn following(&self, user: &User) -> Vec<User> {
        by_name(self.users().following_of(user))
    }

    pub fn followers_count(&self, user: &User) -> usize {
        self.users().followers_count(user)
    }

    /// Latest stored copy of the connected user, which may have been
    /// changed from another instance since login.
    fn current_user(&self) -> Result<User> {
        let connected = self.require_user()?;
        self.users()
            .get(&connected.id)
            .ok_or_else(|| ValidationError::UnknownUser.into())
    }

    fn save_follows(&self, me: &User) -> Result<()> {
        self.users().modify(me.clone());
        self.session().refresh(me);
        self.manager().write_user_file(me)?;
        Ok(())
    }
}

fn by_name(mut users: Vec<User>) -> Vec<User> {
    users.sort_by_cached_key(|u| (u.name.to_lowercase(), u.tag.clone()));
    users
}

#[cfg(test)]
mod tests {
    use courier_shared::codec;

    use crate::commands::testing;
    use crate::error::AppError;

    use super::*;

    fn rejection(result: Result<User>) -> ValidationError {
        match result {
            Err(AppError::Validation(e)) => e,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_follow_and_unfollow() {
        let t = testing::app();
        let alice = t.app.register("Alice", "alice", "pw", None).unwrap();
        let bob = t.app.register("Bob", "bob", "pw", None).unwrap();
        t.app.login("alice", "pw").unwrap();

        let me = t.app.follow("@bob").unwrap();
        assert!(me.is_following("bob"));
        assert!(t.app.session().connected_user().unwrap().is_following("bob"));
        assert_eq!(t.app.followers_count(&bob), 1);

        let on_disk: User = codec::decode(
            &std::fs::read(t.exchange.path().join(codec::file_name(&alice))).unwrap(),
        )
        .unwrap();
        assert!(on_disk.is_following("bob"));

        let me = t.app.unfollow("bob").unwrap();
        assert!(!me.is_following("bob"));
        assert_eq!(t.app.followers_count(&bob), 0);
    }

    #[test]
    fn test_follow_rejections() {
        let t = testing::app();
        t.app.register("Alice", "alice", "pw", None).unwrap();
        t.app.register("Bob", "bob", "pw", None).unwrap();

        assert_eq!(rejection(t.app.follow("bob")), ValidationError::NotConnected);

        t.app.login("alice", "pw").unwrap();
        assert_eq!(rejection(t.app.follow("alice")), ValidationError::SelfFollow);
        assert_eq!(
            rejection(t.app.follow("carol")),
            ValidationError::UnknownTag("carol".into())
        );
        t.app.follow("bob").unwrap();
        assert_eq!(
            rejection(t.app.follow("bob")),
            ValidationError::AlreadyFollowing("bob".into())
        );
        assert_eq!(
            rejection(t.app.unfollow("carol")),
            ValidationError::NotFollowing("carol".into())
        );
    }

    #[test]
    fn test_lists_are_sorted_by_name() {
        let t = testing::app();
        let zed = t.app.register("zed", "zed", "pw", None).unwrap();
        t.app.register("Bob", "bob", "pw", None).unwrap();
        t.app.register("alice", "alice", "pw", None).unwrap();
        t.app.register("Carol", "carol", "pw", None).unwrap();

        for tag in ["alice", "bob", "carol"] {
            t.app.login(tag, "pw").unwrap();
            t.app.follow("zed").unwrap();
        }
        t.app.login("zed", "pw").unwrap();
        t.app.follow("carol").unwrap();
        t.app.follow("alice").unwrap();

        let names = |users: Vec<User>| users.into_iter().map(|u| u.name).collect::<Vec<_>>();
        assert_eq!(names(t.app.followers(&zed)), vec!["alice", "Bob", "Carol"]);
        assert_eq!(names(t.app.following(&zed)), vec!["alice", "Carol"]);
    }
}
