//! Roster – an entity-attribute-value user property store with routing conditions
//!
//! This crate provides:
//! - User records with globally unique usernames and optional phone/email
//! - Per-user properties stored as canonical JSON text, one row per (user, name)
//! - Lookup of users by property name and canonical value, with pagination
//! - A state label kept in the reserved `_state` property
//! - Namespaced condition packs a host router evaluates against the event's user
//! - Idempotent auto-creation of users from an external correlation id

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// User system modules
pub mod users;

// Re-export key types for convenience
pub use users::{UserSystem, UserSystemConfig};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
