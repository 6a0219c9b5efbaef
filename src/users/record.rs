//! User identity records and the live user handle
//!
//! `UserRecord` is the persisted identity row. `User` pairs a record with the
//! backing store so that property and state access can be made directly on
//! the value bound to an event.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec::PropertyValue;
use super::error::{Result, UserSystemError};
use super::property::{Property, PropertyStore};
use super::store::{PropertyWrite, Store, USERS_TABLE};

/// Opaque, stable user key. Ascending ids follow creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted identity row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Primary key
    pub id: UserId,
    /// Globally unique username
    pub username: String,
    /// Optional phone number
    pub phone: Option<String>,
    /// Optional email address
    pub email: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last identity update
    pub updated_at: DateTime<Utc>,
}

/// Fields for a user that has not been inserted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Requested username
    pub username: String,
    /// Optional phone number
    pub phone: Option<String>,
    /// Optional email address
    pub email: Option<String>,
}

impl NewUser {
    /// A user with only a username
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            phone: None,
            email: None,
        }
    }

    /// Set the phone number
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Set the email address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// A user record bound to the store it came from
#[derive(Clone)]
pub struct User {
    record: UserRecord,
    properties: PropertyStore,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User").field("record", &self.record).finish()
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl User {
    pub(crate) fn new(record: UserRecord, properties: PropertyStore) -> Self {
        Self { record, properties }
    }

    /// User id
    pub fn id(&self) -> UserId {
        self.record.id
    }

    /// Username
    pub fn username(&self) -> &str {
        &self.record.username
    }

    /// Phone number, if set
    pub fn phone(&self) -> Option<&str> {
        self.record.phone.as_deref()
    }

    /// Email address, if set
    pub fn email(&self) -> Option<&str> {
        self.record.email.as_deref()
    }

    /// The underlying identity row
    pub fn record(&self) -> &UserRecord {
        &self.record
    }

    /// All properties of this user, in no particular order
    pub fn properties(&self) -> Result<Vec<Property>> {
        self.properties.list(self.id())
    }

    /// Property by name; `None` when absent
    pub fn property(&self, name: &str) -> Result<Option<Property>> {
        self.properties.get(self.id(), name)
    }

    /// Decoded property value by name
    pub fn property_value(&self, name: &str) -> Result<Option<PropertyValue>> {
        match self.property(name)? {
            Some(property) => Ok(Some(property.value()?)),
            None => Ok(None),
        }
    }

    /// Create or overwrite a property
    pub fn set_property(&self, name: &str, value: impl Into<PropertyValue>) -> Result<Property> {
        self.properties.upsert(self.id(), name, &value.into())
    }

    /// Re-read the identity row from the store
    pub fn reload(&mut self) -> Result<()> {
        let record = self
            .properties
            .store()
            .user_by_id(self.id())?
            .ok_or(UserSystemError::UserNotFound(self.id()))?;
        self.record = record;
        Ok(())
    }
}

/// Creation and lookup of user records
#[derive(Clone)]
pub struct UserRepository {
    properties: PropertyStore,
}

impl UserRepository {
    /// Create a repository over a store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            properties: PropertyStore::new(store),
        }
    }

    /// Insert a new user.
    ///
    /// Fails with `DuplicateUsername` when the storage layer's unique index on
    /// username rejects the row.
    pub fn create(&self, new_user: NewUser) -> Result<User> {
        self.insert(new_user, None)
    }

    /// Insert a new user together with one initial property, as one atomic
    /// unit: either both rows exist afterwards or neither does.
    pub fn create_with_property(
        &self,
        new_user: NewUser,
        name: &str,
        value: &PropertyValue,
    ) -> Result<User> {
        let raw_value = super::codec::encode(value)?;
        self.insert(
            new_user,
            Some(PropertyWrite {
                name,
                raw_value: &raw_value,
            }),
        )
    }

    fn insert(&self, new_user: NewUser, initial: Option<PropertyWrite<'_>>) -> Result<User> {
        match self.properties.store().insert_user(&new_user, initial) {
            Ok(record) => {
                tracing::info!(user_id = %record.id, username = %record.username, "user created");
                Ok(self.bind(record))
            }
            Err(e) if e.is_unique_violation_on(USERS_TABLE) => {
                Err(UserSystemError::DuplicateUsername(new_user.username))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by id
    pub fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.properties.store().user_by_id(id)?.map(|r| self.bind(r)))
    }

    /// Look up a user by username
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .properties
            .store()
            .user_by_username(username)?
            .map(|r| self.bind(r)))
    }

    /// Number of stored users
    pub fn count(&self) -> Result<u64> {
        Ok(self.properties.store().user_count()?)
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.properties.store()
    }

    pub(crate) fn bind(&self, record: UserRecord) -> User {
        User::new(record, self.properties.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::store::MemoryStore;

    fn repository() -> UserRepository {
        UserRepository::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_create_and_find_by_username() {
        let users = repository();
        let created = users.create(NewUser::new("Bonjo")).unwrap();

        let found = users.find_by_username("Bonjo").unwrap().unwrap();
        assert_eq!(found.id(), created.id());
        assert!(users.find_by_username("Gonjo").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let users = repository();
        users.create(NewUser::new("Bonjo")).unwrap();

        match users.create(NewUser::new("Bonjo")) {
            Err(UserSystemError::DuplicateUsername(name)) => assert_eq!(name, "Bonjo"),
            other => panic!("expected DuplicateUsername, got {:?}", other),
        }
        assert_eq!(users.count().unwrap(), 1);
    }

    #[test]
    fn test_identity_fields() {
        let users = repository();
        let user = users
            .create(
                NewUser::new("Rico")
                    .with_phone("+100200")
                    .with_email("rico@example.com"),
            )
            .unwrap();

        assert_eq!(user.phone(), Some("+100200"));
        assert_eq!(user.email(), Some("rico@example.com"));
    }

    #[test]
    fn test_create_with_property_is_atomic_on_conflict() {
        let users = repository();
        users.create(NewUser::new("taken")).unwrap();

        let result = users.create_with_property(NewUser::new("taken"), "chat_id", &1i64.into());
        assert!(matches!(result, Err(UserSystemError::DuplicateUsername(_))));
        assert_eq!(users.count().unwrap(), 1);
    }

    #[test]
    fn test_set_property_twice_keeps_one_row() {
        let users = repository();
        let user = users.create(NewUser::new("John Rico")).unwrap();

        user.set_property("favorite_food", "carrot").unwrap();
        user.set_property("favorite_food", "carrot").unwrap();

        let properties = user.properties().unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].name, "favorite_food");
        assert_eq!(properties[0].value().unwrap(), PropertyValue::from("carrot"));
    }
}
