//! Inbound events as seen by the user system
//!
//! The host routing layer owns the real event type; this is the slice of it
//! the pre-processing stages and predicates read and write: a bag of named
//! input fields plus the user bound to the event, if any.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec::PropertyValue;
use super::record::User;

/// Event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new random EventId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One inbound event
#[derive(Debug, Clone, Default)]
pub struct Event {
    id: EventId,
    fields: BTreeMap<String, PropertyValue>,
    user: Option<User>,
}

impl Event {
    /// An event with no fields and no bound user
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Event id
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Input field by name. A field explicitly set to `Null` reads as absent.
    pub fn field(&self, name: &str) -> Option<&PropertyValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Set an input field
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// The bound user, if any
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Bind a user to this event, replacing any previous binding
    pub fn bind_user(&mut self, user: User) {
        self.user = Some(user);
    }
}
