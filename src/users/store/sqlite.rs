//! SQLite-backed store
//!
//! A single connection is shared behind a mutex; statements from different
//! threads are serialized by it. The unique indexes live in the schema, and
//! property writes use `INSERT ... ON CONFLICT DO UPDATE` so a create-or-update
//! is one statement regardless of how many processes share the file.

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, ffi, params};

use super::{Page, PropertyWrite, Store, PROPERTIES_TABLE, USERS_TABLE};
use crate::users::error::{StoreError, StoreResult};
use crate::users::property::Property;
use crate::users::record::{NewUser, UserId, UserRecord};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        phone TEXT,
        email TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS users_unique_username
    ON users(username);

    CREATE TABLE IF NOT EXISTS user_properties (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        raw_value TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS user_properties_unique_name_user
    ON user_properties(name, user_id);

    CREATE INDEX IF NOT EXISTS user_properties_user
    ON user_properties(user_id);
";

const USER_COLUMNS: &str = "u.id, u.username, u.phone, u.email, u.created_at, u.updated_at";

const PROPERTY_COLUMNS: &str = "id, user_id, name, raw_value, created_at, updated_at";

/// Store persisting to a SQLite database
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Connection::open(path.as_ref())?;
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::initialize(db)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(db: Connection) -> StoreResult<Self> {
        db.execute_batch("PRAGMA foreign_keys=ON;")?;
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn property_from_row(row: &Row<'_>) -> rusqlite::Result<Property> {
    Ok(Property {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        name: row.get(2)?,
        raw_value: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Translate unique index rejections into the backend-neutral error. Other
/// constraint failures pass through as `StoreError::Sqlite`.
fn classify(err: rusqlite::Error, table: &'static str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(code, message)
            if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::UniqueViolation {
                table,
                detail: message.unwrap_or_else(|| code.to_string()),
            }
        }
        other => StoreError::Sqlite(other),
    }
}

fn page_params(page: Page) -> (i64, i64) {
    // SQLite treats a negative LIMIT as "no limit".
    let limit = page.limit.map(|l| l.min(i64::MAX as u64) as i64).unwrap_or(-1);
    let offset = page.offset.map(|o| o.min(i64::MAX as u64) as i64).unwrap_or(0);
    (limit, offset)
}

impl Store for SqliteStore {
    fn insert_user(
        &self,
        user: &NewUser,
        initial: Option<PropertyWrite<'_>>,
    ) -> StoreResult<UserRecord> {
        let mut db = self.db.lock();
        let tx = db.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO users (username, phone, email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user.username, user.phone, user.email, now],
        )
        .map_err(|e| classify(e, USERS_TABLE))?;
        let id = UserId(tx.last_insert_rowid());

        if let Some(write) = initial {
            tx.execute(
                "INSERT INTO user_properties (user_id, name, raw_value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id.0, write.name, write.raw_value, now],
            )
            .map_err(|e| classify(e, PROPERTIES_TABLE))?;
        }

        tx.commit()?;

        Ok(UserRecord {
            id,
            username: user.username.clone(),
            phone: user.phone.clone(),
            email: user.email.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    fn user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let db = self.db.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
        Ok(db.query_row(&sql, [id.0], user_from_row).optional()?)
    }

    fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let db = self.db.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1");
        Ok(db.query_row(&sql, [username], user_from_row).optional()?)
    }

    fn user_count(&self) -> StoreResult<u64> {
        let db = self.db.lock();
        let count: i64 = db.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn property(&self, user: UserId, name: &str) -> StoreResult<Option<Property>> {
        let db = self.db.lock();
        let sql = format!(
            "SELECT {PROPERTY_COLUMNS} FROM user_properties WHERE user_id = ?1 AND name = ?2"
        );
        Ok(db
            .query_row(&sql, params![user.0, name], property_from_row)
            .optional()?)
    }

    fn properties(&self, user: UserId) -> StoreResult<Vec<Property>> {
        let db = self.db.lock();
        let sql = format!(
            "SELECT {PROPERTY_COLUMNS} FROM user_properties WHERE user_id = ?1 ORDER BY name"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map([user.0], property_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn upsert_property(
        &self,
        user: UserId,
        name: &str,
        raw_value: &str,
    ) -> StoreResult<Property> {
        let db = self.db.lock();
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO user_properties (user_id, name, raw_value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(name, user_id) DO UPDATE SET raw_value = ?3, updated_at = ?4
             RETURNING {PROPERTY_COLUMNS}"
        );
        match db.query_row(&sql, params![user.0, name, raw_value, now], property_from_row) {
            Ok(property) => Ok(property),
            Err(rusqlite::Error::SqliteFailure(code, _))
                if code.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                Err(StoreError::UserNotFound(user))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn users_with_property(
        &self,
        name: &str,
        raw_value: Option<&str>,
        page: Page,
    ) -> StoreResult<Vec<UserRecord>> {
        let db = self.db.lock();
        let (limit, offset) = page_params(page);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u
             JOIN user_properties p ON p.user_id = u.id
             WHERE p.name = ?1 AND (?2 IS NULL OR p.raw_value = ?2)
             ORDER BY u.id
             LIMIT ?3 OFFSET ?4"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![name, raw_value, limit, offset], user_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_schema_is_idempotent_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("users.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_user(&NewUser::new("persisted"), None).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let record = store.user_by_username("persisted").unwrap().unwrap();
        assert_eq!(record.username, "persisted");
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_username_is_unique_violation() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_user(&NewUser::new("Bonjo"), None).unwrap();
        let err = store.insert_user(&NewUser::new("Bonjo"), None).unwrap_err();
        assert!(err.is_unique_violation_on(USERS_TABLE));
    }

    #[test]
    fn test_failed_insert_rolls_back_initial_property() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_user(&NewUser::new("Bonjo"), None).unwrap();
        let write = PropertyWrite {
            name: "chat_id",
            raw_value: "1",
        };
        assert!(store.insert_user(&NewUser::new("Bonjo"), Some(write)).is_err());
        assert!(
            store
                .users_with_property("chat_id", None, Page::all())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_upsert_keeps_single_row_and_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = store.insert_user(&NewUser::new("u"), None).unwrap();

        let first = store.upsert_property(user.id, "food", "\"carrot\"").unwrap();
        let second = store.upsert_property(user.id, "food", "\"carrot\"").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.properties(user.id).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_missing_user_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.upsert_property(UserId(42), "food", "1").unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(UserId(42))));
    }

    #[test]
    fn test_other_constraint_failures_pass_through() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .db
            .lock()
            .execute(
                "INSERT INTO users (username, created_at, updated_at) VALUES (NULL, 'now', 'now')",
                [],
            )
            .unwrap_err();

        let classified = classify(err, USERS_TABLE);
        assert!(!classified.is_unique_violation_on(USERS_TABLE));
        match classified {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => {
                assert_eq!(code.extended_code, ffi::SQLITE_CONSTRAINT_NOTNULL);
            }
            other => panic!("expected a passed-through SQLite error, got {other:?}"),
        }
    }

    #[test]
    fn test_pagination_follows_user_id_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        for name in ["a", "b", "c", "d"] {
            let user = store.insert_user(&NewUser::new(name), None).unwrap();
            store.upsert_property(user.id, "tree", "\"oak\"").unwrap();
        }

        let page = store
            .users_with_property("tree", Some("\"oak\""), Page::first(2).skip(1))
            .unwrap();
        let names: Vec<_> = page.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}
