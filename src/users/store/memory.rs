//! In-process store
//!
//! All tables sit behind one `RwLock`; every write checks and mutates under the
//! write guard, so the username and `(name, user_id)` indexes hold under
//! concurrent callers exactly as a database index would.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use parking_lot::RwLock;

use super::{Page, PropertyWrite, Store, USERS_TABLE};
use crate::users::error::{StoreError, StoreResult};
use crate::users::property::Property;
use crate::users::record::{NewUser, UserId, UserRecord};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, UserRecord>,
    usernames: HashMap<String, UserId>,
    properties: HashMap<(UserId, String), Property>,
    next_user_id: i64,
    next_property_id: i64,
}

impl Tables {
    fn write_property(&mut self, user: UserId, name: &str, raw_value: &str) -> Property {
        let now = Utc::now();
        let key = (user, name.to_string());
        if let Some(existing) = self.properties.get_mut(&key) {
            existing.raw_value = raw_value.to_string();
            existing.updated_at = now;
            return existing.clone();
        }

        self.next_property_id += 1;
        let property = Property {
            id: self.next_property_id,
            user_id: user,
            name: name.to_string(),
            raw_value: raw_value.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.properties.insert(key, property.clone());
        property
    }
}

/// Store keeping all rows in memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn insert_user(
        &self,
        user: &NewUser,
        initial: Option<PropertyWrite<'_>>,
    ) -> StoreResult<UserRecord> {
        let mut tables = self.tables.write();
        if tables.usernames.contains_key(&user.username) {
            return Err(StoreError::UniqueViolation {
                table: USERS_TABLE,
                detail: format!("username '{}'", user.username),
            });
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let record = UserRecord {
            id: UserId(tables.next_user_id),
            username: user.username.clone(),
            phone: user.phone.clone(),
            email: user.email.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.usernames.insert(record.username.clone(), record.id);
        tables.users.insert(record.id, record.clone());

        if let Some(write) = initial {
            tables.write_property(record.id, write.name, write.raw_value);
        }

        Ok(record)
    }

    fn user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .usernames
            .get(username)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    fn user_count(&self) -> StoreResult<u64> {
        Ok(self.tables.read().users.len() as u64)
    }

    fn property(&self, user: UserId, name: &str) -> StoreResult<Option<Property>> {
        Ok(self
            .tables
            .read()
            .properties
            .get(&(user, name.to_string()))
            .cloned())
    }

    fn properties(&self, user: UserId) -> StoreResult<Vec<Property>> {
        let tables = self.tables.read();
        let mut properties: Vec<Property> = tables
            .properties
            .values()
            .filter(|p| p.user_id == user)
            .cloned()
            .collect();
        properties.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(properties)
    }

    fn upsert_property(
        &self,
        user: UserId,
        name: &str,
        raw_value: &str,
    ) -> StoreResult<Property> {
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&user) {
            return Err(StoreError::UserNotFound(user));
        }
        Ok(tables.write_property(user, name, raw_value))
    }

    fn users_with_property(
        &self,
        name: &str,
        raw_value: Option<&str>,
        page: Page,
    ) -> StoreResult<Vec<UserRecord>> {
        let tables = self.tables.read();
        let matching = tables.users.values().filter(|record| {
            match tables.properties.get(&(record.id, name.to_string())) {
                Some(property) => raw_value.is_none_or(|raw| property.raw_value == raw),
                None => false,
            }
        });
        Ok(page.apply(matching).cloned().collect())
    }
}
