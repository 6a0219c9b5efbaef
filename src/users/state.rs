//! User state as a reserved property
//!
//! The finite-state label of a user lives in the property named `_state`.
//! No such property means no state.

use super::codec::PropertyValue;
use super::error::Result;
use super::property::Property;
use super::record::User;

/// Name of the property carrying the state label
pub const STATE_PROPERTY: &str = "_state";

impl User {
    /// Current state label, `None` when unset
    pub fn state(&self) -> Result<Option<PropertyValue>> {
        self.property_value(STATE_PROPERTY)
    }

    /// Set the state label
    pub fn set_state(&self, label: impl Into<PropertyValue>) -> Result<Property> {
        self.set_property(STATE_PROPERTY, label)
    }

    /// True when a state label is stored
    pub fn has_state(&self) -> Result<bool> {
        Ok(self.property(STATE_PROPERTY)?.is_some())
    }

    /// Compare the current state against a label
    pub fn state_is(&self, label: &PropertyValue) -> Result<bool> {
        Ok(self.state()?.as_ref() == Some(label))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::users::record::{NewUser, UserRepository};
    use crate::users::store::MemoryStore;

    use super::*;

    #[test]
    fn test_state_roundtrip() {
        let users = UserRepository::new(Arc::new(MemoryStore::new()));
        let user = users.create(NewUser::new("Proper")).unwrap();

        assert_eq!(user.state().unwrap(), None);
        assert!(!user.has_state().unwrap());

        user.set_state("just_registered").unwrap();
        assert_eq!(user.state().unwrap(), Some("just_registered".into()));
        assert!(user.state_is(&"just_registered".into()).unwrap());
        assert!(!user.state_is(&"main_menu".into()).unwrap());

        let property = user.property(STATE_PROPERTY).unwrap().unwrap();
        assert_eq!(property.raw_value, "\"just_registered\"");
    }
}
