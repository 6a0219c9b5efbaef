//! Synchronous data-access layer
//!
//! Two tables back the user system:
//!
//! - `users`: `{id, username UNIQUE NOT NULL, phone NULL, email NULL, created_at, updated_at}`
//! - `user_properties`: `{id, user_id FK, name NOT NULL, raw_value NOT NULL, created_at, updated_at}`
//!   with a unique index on `(name, user_id)`
//!
//! Uniqueness is enforced by the backend itself, never only by checking in
//! application code first. Backends report index rejections as
//! `StoreError::UniqueViolation` naming the table.
//!
//! Every listing is ordered by ascending user id, which is creation order.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use super::error::StoreResult;
use super::property::Property;
use super::record::{NewUser, UserId, UserRecord};

/// Table name for identity rows
pub const USERS_TABLE: &str = "users";

/// Table name for property rows
pub const PROPERTIES_TABLE: &str = "user_properties";

/// A property write carrying already-encoded text
#[derive(Debug, Clone, Copy)]
pub struct PropertyWrite<'a> {
    /// Property name
    pub name: &'a str,
    /// Canonical encoding of the value
    pub raw_value: &'a str,
}

/// Pagination window over a result set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of rows
    pub limit: Option<u64>,
    /// Leading rows to skip
    pub offset: Option<u64>,
}

impl Page {
    /// No limit, no offset
    pub fn all() -> Self {
        Self::default()
    }

    /// First `limit` rows
    pub fn first(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }

    /// Set the offset
    pub fn skip(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Apply the window to an ordered iterator
    pub fn apply<I: Iterator>(&self, iter: I) -> impl Iterator<Item = I::Item> {
        let skipped = iter.skip(self.offset.unwrap_or(0) as usize);
        skipped.take(self.limit.map(|l| l as usize).unwrap_or(usize::MAX))
    }
}

/// Backing store for users and their properties
pub trait Store: Send + Sync {
    /// Insert a user, optionally together with an initial property in the same
    /// atomic unit. A taken username yields `UniqueViolation` on `users` and
    /// leaves no rows behind.
    fn insert_user(
        &self,
        user: &NewUser,
        initial: Option<PropertyWrite<'_>>,
    ) -> StoreResult<UserRecord>;

    /// Fetch a user by id
    fn user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>>;

    /// Fetch a user by username
    fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;

    /// Count stored users
    fn user_count(&self) -> StoreResult<u64>;

    /// Fetch one property of a user
    fn property(&self, user: UserId, name: &str) -> StoreResult<Option<Property>>;

    /// All properties of a user, ordered by name
    fn properties(&self, user: UserId) -> StoreResult<Vec<Property>>;

    /// Atomic create-or-update of the `(user, name)` row
    fn upsert_property(&self, user: UserId, name: &str, raw_value: &str)
    -> StoreResult<Property>;

    /// Users having a property `name`, optionally restricted to rows whose
    /// `raw_value` equals the given text, ordered by ascending user id
    fn users_with_property(
        &self,
        name: &str,
        raw_value: Option<&str>,
        page: Page,
    ) -> StoreResult<Vec<UserRecord>>;
}
