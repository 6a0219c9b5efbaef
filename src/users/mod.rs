//! User system orchestrator and public API
//!
//! `UserSystem` wires a storage backend to the user repository, the property
//! query, the frozen condition registry and the pre-processing pipeline. The
//! host routing layer calls [`UserSystem::prepare`] on each inbound event
//! before dispatch and [`UserSystem::evaluate`] while matching routes.

use std::sync::Arc;

use anyhow::Context;

// Submodules
pub mod auto_create;
pub mod codec;
pub mod condition;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod property;
pub mod query;
pub mod record;
pub mod state;
pub mod store;

pub use config::{DatabaseConfig, LoggingConfig, UserSystemConfig};

use auto_create::{AutoCreationPolicy, AutoCreator};
use codec::PropertyValue;
use condition::{ConditionCatalog, ConditionPack, ConditionRegistry};
use event::Event;
use pipeline::{Pipeline, Stage, StageOutcome};
use query::PropertyQuery;
use record::UserRepository;
use store::{MemoryStore, SqliteStore, Store};

/// The user system
pub struct UserSystem {
    config: UserSystemConfig,
    users: UserRepository,
    query: PropertyQuery,
    conditions: ConditionRegistry,
    pipeline: Pipeline,
}

impl UserSystem {
    /// Build a user system with only the built-in condition packs
    pub fn new(config: UserSystemConfig) -> anyhow::Result<Self> {
        UserSystemBuilder::new(config).build()
    }

    /// Start a builder for custom packs or stages
    pub fn builder(config: UserSystemConfig) -> UserSystemBuilder {
        UserSystemBuilder::new(config)
    }

    /// Load configuration from a file and build
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = config::load_config(path)?;
        Self::new(config)
    }

    /// The active configuration
    pub fn config(&self) -> &UserSystemConfig {
        &self.config
    }

    /// User creation and lookup
    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    /// Property-based lookup
    pub fn query(&self) -> &PropertyQuery {
        &self.query
    }

    /// The frozen condition registry
    pub fn conditions(&self) -> &ConditionRegistry {
        &self.conditions
    }

    /// The pre-processing pipeline
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run the pre-processing pipeline over an inbound event
    pub fn prepare(&self, event: &mut Event) -> error::Result<Vec<StageOutcome>> {
        self.pipeline.run(event)
    }

    /// Evaluate `pack.condition` against an event
    pub fn evaluate(
        &self,
        event: &Event,
        pack: &str,
        condition: &str,
        argument: Option<&PropertyValue>,
    ) -> error::Result<bool> {
        self.conditions.evaluate(event, pack, condition, argument)
    }
}

/// Startup-time assembly of a [`UserSystem`]
pub struct UserSystemBuilder {
    config: UserSystemConfig,
    store: Option<Arc<dyn Store>>,
    catalog: ConditionCatalog,
    stages: Vec<Box<dyn Stage>>,
}

impl UserSystemBuilder {
    fn new(config: UserSystemConfig) -> Self {
        Self {
            config,
            store: None,
            catalog: ConditionCatalog::with_builtins(),
            stages: Vec::new(),
        }
    }

    /// Use an existing store instead of opening the configured one
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Declare a host condition pack alongside the built-in ones
    pub fn register_pack(mut self, pack: ConditionPack) -> error::ConditionResult<Self> {
        self.catalog.register(pack)?;
        Ok(self)
    }

    /// Append a stage that runs after the built-in auto-creation stage
    pub fn stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Open storage and freeze the registry
    pub fn build(self) -> anyhow::Result<UserSystem> {
        let store = match self.store {
            Some(store) => store,
            None => open_store(&self.config.database)?,
        };

        let users = UserRepository::new(store);
        let query = PropertyQuery::new(users.clone());

        let mut pipeline = Pipeline::new();
        if let AutoCreationPolicy::Enabled(kind) = &self.config.auto_create {
            tracing::info!(id_field = %kind.id_field, "auto-creation enabled");
            pipeline.push(Box::new(AutoCreator::new(kind.clone(), users.clone())));
        }
        for stage in self.stages {
            pipeline.push(stage);
        }

        Ok(UserSystem {
            config: self.config,
            users,
            query,
            conditions: self.catalog.build(),
            pipeline,
        })
    }
}

fn open_store(database: &DatabaseConfig) -> anyhow::Result<Arc<dyn Store>> {
    match database {
        DatabaseConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        DatabaseConfig::Sqlite { path } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open user database at {:?}", path))?;
            Ok(Arc::new(store))
        }
    }
}

// Re-export commonly used types
pub use error::{Result, UserSystemError};
pub use record::{NewUser, User, UserId};
pub use store::Page;
