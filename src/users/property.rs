//! Per-user property storage with upsert semantics
//!
//! At most one property row exists per (user, name). Writes are upserts that
//! the backend performs as a single atomic create-or-update against its unique
//! index, so concurrent writers of the same key never produce duplicates; the
//! last writer wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec::{self, PropertyValue};
use super::error::{DecodeError, Result};
use super::record::UserId;
use super::store::Store;

/// A stored property row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Row id
    pub id: i64,
    /// Owning user
    pub user_id: UserId,
    /// Property name
    pub name: String,
    /// Canonical encoding of the value
    pub raw_value: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last overwrite time
    pub updated_at: DateTime<Utc>,
}

impl Property {
    /// Decode the stored value
    pub fn value(&self) -> std::result::Result<PropertyValue, DecodeError> {
        codec::decode(&self.raw_value)
    }
}

/// Property access over a shared store
#[derive(Clone)]
pub struct PropertyStore {
    store: Arc<dyn Store>,
}

impl PropertyStore {
    /// Wrap a store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Fetch one property; `None` when the user has no property of that name
    pub fn get(&self, user: UserId, name: &str) -> Result<Option<Property>> {
        Ok(self.store.property(user, name)?)
    }

    /// All properties of a user
    pub fn list(&self, user: UserId) -> Result<Vec<Property>> {
        Ok(self.store.properties(user)?)
    }

    /// Create the property if absent, otherwise overwrite its value
    pub fn upsert(&self, user: UserId, name: &str, value: &PropertyValue) -> Result<Property> {
        let raw_value = codec::encode(value)?;
        let property = self.store.upsert_property(user, name, &raw_value)?;
        tracing::debug!(user_id = %user, name, raw_value = %property.raw_value, "property upserted");
        Ok(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::error::{StoreError, UserSystemError};
    use crate::users::record::NewUser;
    use crate::users::store::MemoryStore;

    fn setup() -> (PropertyStore, UserId) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let record = store.insert_user(&NewUser::new("owner"), None).unwrap();
        (PropertyStore::new(store), record.id)
    }

    #[test]
    fn test_get_absent_is_none() {
        let (properties, user) = setup();
        assert!(properties.get(user, "missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let (properties, user) = setup();

        let first = properties.upsert(user, "tree", &"oak".into()).unwrap();
        let second = properties.upsert(user, "tree", &"birch".into()).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.raw_value, "\"birch\"");
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(properties.list(user).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_for_missing_user_fails() {
        let (properties, _) = setup();
        let result = properties.upsert(UserId(999), "tree", &"oak".into());
        assert!(matches!(
            result,
            Err(UserSystemError::Store(StoreError::UserNotFound(UserId(999))))
        ));
    }

    #[test]
    fn test_corrupt_value_surfaces_decode_error() {
        let (properties, user) = setup();
        properties.store().upsert_property(user, "broken", "{oops").unwrap();

        let property = properties.get(user, "broken").unwrap().unwrap();
        let err = property.value().unwrap_err();
        assert_eq!(err.raw, "{oops");
    }
}
