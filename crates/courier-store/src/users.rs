use courier_shared::User;

use crate::repository::Repository;

impl Repository<User> {
    /// Tags are the cross-entity join key, so this is how senders and
    /// followed users are resolved.
    pub fn find_by_tag(&self, tag: &str) -> Option<User> {
        self.filter(|u| u.tag == tag).into_iter().next()
    }

    pub fn tag_exists(&self, tag: &str) -> bool {
        self.find_by_tag(tag).is_some()
    }

    /// Users whose follow-set contains `user`'s tag.
    pub fn followers_of(&self, user: &User) -> Vec<User> {
        self.filter(|other| other.id != user.id && other.is_following(&user.tag))
    }

    pub fn followers_count(&self, user: &User) -> usize {
        self.followers_of(user).len()
    }

    /// Known users that `user` follows. Followed tags that no loaded user
    /// carries are skipped.
    pub fn following_of(&self, user: &User) -> Vec<User> {
        self.filter(|other| user.is_following(&other.tag))
    }
}
