//! Get-or-create of users from an external correlation id
//!
//! When enabled, every event carrying the configured external id field is
//! resolved to exactly one user: the user whose correlation property holds
//! that id, created on first contact if none exists.
//!
//! Concurrent first contacts for the same id are resolved through the store's
//! uniqueness constraints. The user row and its correlation property are
//! inserted as one atomic unit, so a losing creator that hits the username
//! index can always find the winner by re-querying the correlation property.
//! After any successful creation the lowest-id user holding the correlation is
//! bound, so racers that created under different usernames still converge on
//! one record.

use serde::{Deserialize, Serialize};

use super::codec::PropertyValue;
use super::error::{Result, UserSystemError};
use super::event::Event;
use super::pipeline::{Stage, StageOutcome};
use super::query::PropertyQuery;
use super::record::{NewUser, User, UserRepository};

/// Prefix of generated usernames
pub const PLACEHOLDER_PREFIX: &str = "TEMP_USERNAME_";

/// Which event fields identify an external account and where the id is kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdKind {
    /// Event field carrying the external id
    pub id_field: String,
    /// Event field carrying an optional display name
    pub display_name_field: Option<String>,
    /// Property linking the id to the user
    pub correlation_property: String,
}

impl ExternalIdKind {
    /// Telegram chat ids
    pub fn telegram() -> Self {
        Self {
            id_field: "tg_chat_id".to_string(),
            display_name_field: Some("tg_username".to_string()),
            correlation_property: "telegram_chat_id".to_string(),
        }
    }
}

/// Auto-creation mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AutoCreationPolicy {
    /// Never create users implicitly
    #[default]
    Disabled,
    /// Create users for the given external id kind
    Enabled(ExternalIdKind),
}

impl AutoCreationPolicy {
    /// Auto-creation for Telegram chat ids
    pub fn telegram() -> Self {
        AutoCreationPolicy::Enabled(ExternalIdKind::telegram())
    }

    /// True unless disabled
    pub fn is_enabled(&self) -> bool {
        matches!(self, AutoCreationPolicy::Enabled(_))
    }
}

/// Deterministic username for an external id
pub fn placeholder_username(external_id: &PropertyValue) -> Result<String> {
    Ok(format!("{PLACEHOLDER_PREFIX}{}", external_id.to_display_text()?))
}

/// Pre-processing stage implementing auto-creation for one id kind
pub struct AutoCreator {
    kind: ExternalIdKind,
    users: UserRepository,
    query: PropertyQuery,
}

impl AutoCreator {
    /// Stage over a repository
    pub fn new(kind: ExternalIdKind, users: UserRepository) -> Self {
        let query = PropertyQuery::new(users.clone());
        Self { kind, users, query }
    }

    /// The id kind this stage handles
    pub fn kind(&self) -> &ExternalIdKind {
        &self.kind
    }

    /// Resolve the user for an external id, creating it on first contact
    pub fn resolve(&self, external_id: &PropertyValue, display_name: Option<&str>) -> Result<User> {
        let correlation = self.kind.correlation_property.as_str();
        if let Some(user) = self.query.first_by_property(correlation, external_id)? {
            return Ok(user);
        }

        let placeholder = placeholder_username(external_id)?;
        let mut candidates = Vec::with_capacity(2);
        if let Some(name) = display_name {
            candidates.push(name.to_string());
        }
        if display_name != Some(placeholder.as_str()) {
            candidates.push(placeholder);
        }

        let mut last_error = None;
        for username in candidates {
            match self
                .users
                .create_with_property(NewUser::new(username.clone()), correlation, external_id)
            {
                Ok(created) => {
                    tracing::info!(
                        user_id = %created.id(),
                        username = %created.username(),
                        correlation,
                        "user auto-created"
                    );
                    return self.converge(created, external_id);
                }
                Err(UserSystemError::DuplicateUsername(taken)) => {
                    if let Some(winner) = self.query.first_by_property(correlation, external_id)? {
                        tracing::warn!(
                            user_id = %winner.id(),
                            username = %taken,
                            "concurrent auto-creation detected; binding existing user"
                        );
                        return Ok(winner);
                    }
                    tracing::debug!(username = %taken, "username owned by another account");
                    last_error = Some(UserSystemError::DuplicateUsername(taken));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            UserSystemError::Config("no username candidates for auto-creation".to_string())
        }))
    }

    /// Bind the earliest user holding the correlation, which is the newly
    /// created one unless another creator won with a different username.
    fn converge(&self, created: User, external_id: &PropertyValue) -> Result<User> {
        let correlation = self.kind.correlation_property.as_str();
        match self.query.first_by_property(correlation, external_id)? {
            Some(earliest) if earliest.id() != created.id() => {
                tracing::warn!(
                    bound = %earliest.id(),
                    orphaned = %created.id(),
                    "duplicate correlation created concurrently; binding earliest user"
                );
                Ok(earliest)
            }
            _ => Ok(created),
        }
    }
}

impl Stage for AutoCreator {
    fn name(&self) -> &str {
        "auto_create"
    }

    fn process(&self, event: &mut Event) -> Result<StageOutcome> {
        let Some(external_id) = event.field(&self.kind.id_field).cloned() else {
            return Ok(StageOutcome::Declined);
        };
        let display_name = self
            .kind
            .display_name_field
            .as_deref()
            .and_then(|field| event.field(field))
            .and_then(PropertyValue::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let user = self.resolve(&external_id, display_name.as_deref())?;
        event.bind_user(user);
        Ok(StageOutcome::Bound)
    }
}
