//! Condition packs and the predicate registry
//!
//! A condition pack is a namespace of named predicates that a host router can
//! branch on. Packs are declared into a [`ConditionCatalog`] at startup; the
//! catalog is then frozen into an immutable [`ConditionRegistry`] that is
//! cheap to clone and shared by every event.
//!
//! Predicates only read: they receive the event (and through it the bound
//! user) by shared reference. Every built-in `user` and `user_state` predicate
//! evaluates to `false` when no user is bound.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::codec::PropertyValue;
use super::error::{ConditionError, ConditionResult, Result, UserSystemError};
use super::event::Event;
use super::record::User;

/// Built-in pack over the bound user's identity and properties
pub const USER_PACK: &str = "user";

/// Built-in pack over the bound user's state label
pub const USER_STATE_PACK: &str = "user_state";

/// Read-only view handed to predicates
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    event: &'a Event,
}

impl<'a> ConditionContext<'a> {
    /// Context over an event
    pub fn new(event: &'a Event) -> Self {
        Self { event }
    }

    /// The event being routed
    pub fn event(&self) -> &'a Event {
        self.event
    }

    /// The bound user, if any
    pub fn user(&self) -> Option<&'a User> {
        self.event.user()
    }
}

type PlainPredicate = Arc<dyn Fn(&ConditionContext<'_>) -> Result<bool> + Send + Sync>;
type ArgumentPredicate =
    Arc<dyn Fn(&ConditionContext<'_>, &PropertyValue) -> Result<bool> + Send + Sync>;

#[derive(Clone)]
enum Predicate {
    Plain(PlainPredicate),
    WithArgument(ArgumentPredicate),
}

/// A namespace of named predicates
#[derive(Clone)]
pub struct ConditionPack {
    name: String,
    conditions: HashMap<String, Predicate>,
}

impl fmt::Debug for ConditionPack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.conditions.keys().collect();
        names.sort();
        f.debug_struct("ConditionPack")
            .field("name", &self.name)
            .field("conditions", &names)
            .finish()
    }
}

impl ConditionPack {
    /// An empty pack
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: HashMap::new(),
        }
    }

    /// Pack name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a predicate that takes no argument
    pub fn add_condition<F>(&mut self, name: &str, predicate: F) -> ConditionResult<()>
    where
        F: Fn(&ConditionContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.insert(name, Predicate::Plain(Arc::new(predicate)))
    }

    /// Register a predicate that requires an argument
    pub fn add_condition_with_argument<F>(&mut self, name: &str, predicate: F) -> ConditionResult<()>
    where
        F: Fn(&ConditionContext<'_>, &PropertyValue) -> Result<bool> + Send + Sync + 'static,
    {
        self.insert(name, Predicate::WithArgument(Arc::new(predicate)))
    }

    fn insert(&mut self, name: &str, predicate: Predicate) -> ConditionResult<()> {
        if self.conditions.contains_key(name) {
            return Err(ConditionError::DuplicateCondition {
                pack: self.name.clone(),
                condition: name.to_string(),
            });
        }
        self.conditions.insert(name.to_string(), predicate);
        Ok(())
    }
}

/// Startup-time collection of condition packs
#[derive(Debug, Default)]
pub struct ConditionCatalog {
    packs: HashMap<String, ConditionPack>,
}

impl ConditionCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the built-in `user` and `user_state` packs
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.packs.insert(USER_PACK.to_string(), user_pack());
        catalog
            .packs
            .insert(USER_STATE_PACK.to_string(), user_state_pack());
        catalog
    }

    /// Declare a pack. Pack names are unique.
    pub fn register(&mut self, pack: ConditionPack) -> ConditionResult<()> {
        if self.packs.contains_key(pack.name()) {
            return Err(ConditionError::DuplicatePack(pack.name().to_string()));
        }
        tracing::debug!(pack = pack.name(), conditions = pack.conditions.len(), "condition pack registered");
        self.packs.insert(pack.name().to_string(), pack);
        Ok(())
    }

    /// Freeze into an immutable registry
    pub fn build(self) -> ConditionRegistry {
        ConditionRegistry {
            packs: Arc::new(self.packs),
        }
    }
}

/// Immutable lookup table from (pack, condition) to predicate
#[derive(Clone)]
pub struct ConditionRegistry {
    packs: Arc<HashMap<String, ConditionPack>>,
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionRegistry")
            .field("packs", &self.list_packs())
            .finish()
    }
}

impl ConditionRegistry {
    /// Evaluate `pack.condition` against an event.
    ///
    /// Predicates that take no argument ignore any argument given; predicates
    /// that need one fail with `MissingArgument` when it is absent. The
    /// built-in `user` and `user_state` packs are `false` without a bound
    /// user, missing argument or not.
    pub fn evaluate(
        &self,
        event: &Event,
        pack: &str,
        condition: &str,
        argument: Option<&PropertyValue>,
    ) -> Result<bool> {
        let found = self
            .packs
            .get(pack)
            .ok_or_else(|| ConditionError::UnknownPack(pack.to_string()))?;
        let predicate =
            found
                .conditions
                .get(condition)
                .ok_or_else(|| ConditionError::UnknownCondition {
                    pack: pack.to_string(),
                    condition: condition.to_string(),
                })?;

        let context = ConditionContext::new(event);
        let met = match (predicate, argument) {
            (Predicate::Plain(f), _) => f(&context)?,
            (Predicate::WithArgument(f), Some(argument)) => f(&context, argument)?,
            (Predicate::WithArgument(_), None)
                if event.user().is_none() && is_builtin_pack(pack) =>
            {
                false
            }
            (Predicate::WithArgument(_), None) => {
                return Err(ConditionError::MissingArgument {
                    pack: pack.to_string(),
                    condition: condition.to_string(),
                }
                .into());
            }
        };
        tracing::trace!(event = %event.id(), pack, condition, met, "condition evaluated");
        Ok(met)
    }

    /// Whether `pack.condition` is registered
    pub fn has_condition(&self, pack: &str, condition: &str) -> bool {
        self.packs
            .get(pack)
            .is_some_and(|p| p.conditions.contains_key(condition))
    }

    /// Registered pack names, sorted
    pub fn list_packs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.packs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Condition names of a pack, sorted
    pub fn list_conditions(&self, pack: &str) -> Option<Vec<String>> {
        self.packs.get(pack).map(|p| {
            let mut names: Vec<String> = p.conditions.keys().cloned().collect();
            names.sort();
            names
        })
    }
}

fn invalid_argument(pack: &str, condition: &str, detail: impl Into<String>) -> UserSystemError {
    ConditionError::InvalidArgument {
        pack: pack.to_string(),
        condition: condition.to_string(),
        detail: detail.into(),
    }
    .into()
}

fn expect_list<'v>(
    argument: &'v PropertyValue,
    condition: &str,
) -> Result<&'v [PropertyValue]> {
    argument
        .as_sequence()
        .ok_or_else(|| invalid_argument(USER_PACK, condition, "expected a list"))
}

/// Membership of an optional identity field in a list argument.
/// An unset field is never a member.
fn one_of(field: Option<&str>, candidates: &[PropertyValue]) -> bool {
    match field {
        Some(field) => candidates.iter().any(|c| c.as_str() == Some(field)),
        None => false,
    }
}

fn is_builtin_pack(pack: &str) -> bool {
    pack == USER_PACK || pack == USER_STATE_PACK
}

impl ConditionPack {
    fn builtin(mut self, name: &str, predicate: Predicate) -> Self {
        self.conditions.insert(name.to_string(), predicate);
        self
    }

    fn builtin_plain<F>(self, name: &str, predicate: F) -> Self
    where
        F: Fn(&ConditionContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.builtin(name, Predicate::Plain(Arc::new(predicate)))
    }

    fn builtin_with_argument<F>(self, name: &str, predicate: F) -> Self
    where
        F: Fn(&ConditionContext<'_>, &PropertyValue) -> Result<bool> + Send + Sync + 'static,
    {
        self.builtin(name, Predicate::WithArgument(Arc::new(predicate)))
    }
}

fn user_pack() -> ConditionPack {
    ConditionPack::new(USER_PACK)
        .builtin_plain("exists", |ctx| Ok(ctx.user().is_some()))
        .builtin_with_argument("has_property_value", |ctx, argument| {
            let Some(user) = ctx.user() else {
                return Ok(false);
            };
            let Some([PropertyValue::String(name), expected]) = argument.as_sequence() else {
                return Err(invalid_argument(
                    USER_PACK,
                    "has_property_value",
                    "expected [name, value]",
                ));
            };
            Ok(user.property_value(name)?.as_ref() == Some(expected))
        })
        .builtin_with_argument("phone_one_of", |ctx, argument| match ctx.user() {
            Some(user) => Ok(one_of(user.phone(), expect_list(argument, "phone_one_of")?)),
            None => Ok(false),
        })
        .builtin_with_argument("email_one_of", |ctx, argument| match ctx.user() {
            Some(user) => Ok(one_of(user.email(), expect_list(argument, "email_one_of")?)),
            None => Ok(false),
        })
        .builtin_with_argument("username_one_of", |ctx, argument| match ctx.user() {
            Some(user) => Ok(one_of(
                Some(user.username()),
                expect_list(argument, "username_one_of")?,
            )),
            None => Ok(false),
        })
}

fn user_state_pack() -> ConditionPack {
    ConditionPack::new(USER_STATE_PACK)
        .builtin_with_argument("is", |ctx, label| match ctx.user() {
            Some(user) => user.state_is(label),
            None => Ok(false),
        })
        .builtin_plain("not_set", |ctx| match ctx.user() {
            Some(user) => Ok(!user.has_state()?),
            None => Ok(false),
        })
}
