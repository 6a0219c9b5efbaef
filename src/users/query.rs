//! Finding users by property
//!
//! Results come back in ascending user id order (creation order), which is
//! stable within a snapshot of the store, so `limit`/`offset` paginate
//! deterministically.

use super::codec::{self, PropertyValue};
use super::error::Result;
use super::record::{User, UserRepository};
use super::state::STATE_PROPERTY;
use super::store::Page;

/// Property-based user lookup
#[derive(Clone)]
pub struct PropertyQuery {
    users: UserRepository,
}

impl PropertyQuery {
    /// Query over the users of a repository
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }

    /// Users having property `name`; with `value`, only those whose stored
    /// value equals it under canonical encoding.
    pub fn find_by_property(
        &self,
        name: &str,
        value: Option<&PropertyValue>,
        page: Page,
    ) -> Result<Vec<User>> {
        let raw_value = value.map(codec::encode).transpose()?;
        let records = self
            .users
            .store()
            .users_with_property(name, raw_value.as_deref(), page)?;
        tracing::debug!(
            name,
            raw_value = raw_value.as_deref().unwrap_or("*"),
            matched = records.len(),
            "property query"
        );
        Ok(records.into_iter().map(|r| self.users.bind(r)).collect())
    }

    /// First user (lowest id) whose property `name` equals `value`
    pub fn first_by_property(&self, name: &str, value: &PropertyValue) -> Result<Option<User>> {
        Ok(self
            .find_by_property(name, Some(value), Page::first(1))?
            .into_iter()
            .next())
    }

    /// Users currently in the given state
    pub fn find_by_state(&self, state: &PropertyValue, page: Page) -> Result<Vec<User>> {
        self.find_by_property(STATE_PROPERTY, Some(state), page)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::users::record::NewUser;
    use crate::users::store::MemoryStore;

    fn usernames(users: &[User]) -> Vec<&str> {
        users.iter().map(User::username).collect()
    }

    #[test]
    fn test_value_match_uses_canonical_equality() {
        let users = UserRepository::new(Arc::new(MemoryStore::new()));
        let query = PropertyQuery::new(users.clone());

        let a = users.create(NewUser::new("a")).unwrap();
        let b = users.create(NewUser::new("b")).unwrap();
        a.set_property("score", 2.0).unwrap();
        b.set_property("score", "2").unwrap();

        let found = query
            .find_by_property("score", Some(&2i64.into()), Page::all())
            .unwrap();
        assert_eq!(usernames(&found), vec!["a"]);
    }

    #[test]
    fn test_first_by_property_picks_lowest_id() {
        let users = UserRepository::new(Arc::new(MemoryStore::new()));
        let query = PropertyQuery::new(users.clone());

        for name in ["first", "second"] {
            users
                .create(NewUser::new(name))
                .unwrap()
                .set_property("chat_id", 7i64)
                .unwrap();
        }

        let found = query.first_by_property("chat_id", &7i64.into()).unwrap();
        assert_eq!(found.unwrap().username(), "first");
        assert!(query.first_by_property("chat_id", &8i64.into()).unwrap().is_none());
    }
}
