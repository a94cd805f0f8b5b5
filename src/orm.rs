//! The ORM façade.
//!
//! [`Orm`] ties the schema registry, an execution engine and the
//! configuration together and hands out queries, entries and the save/delete
//! lifecycle. [`ModelHandle`] scopes the same operations to one model.
//!
//! # Examples
//!
//! ```
//! use trellis::engine::MemoryEngine;
//! use trellis::schema::{Model, PropertyType};
//! use trellis::{Orm, OrmConfig};
//!
//! let mut orm = Orm::new(MemoryEngine::new(), OrmConfig::default());
//! orm.register(Model::new("Tag").with_property("name", PropertyType::String)).unwrap();
//!
//! let tags = orm.model("Tag").unwrap();
//! let mut tag = tags.create_entry();
//! tag.set("name", "rust");
//! tags.save(&mut tag).unwrap();
//!
//! let loaded = tags.get_by_id(tag.id().unwrap().clone()).unwrap();
//! assert_eq!(loaded.value("name").and_then(|name| name.as_str()), Some("rust"));
//! ```

use crate::cache::{CachePool, CacheableModelQuery};
use crate::config::OrmConfig;
use crate::engine::ExecutionEngine;
use crate::entry::Entry;
use crate::error::{OrmError, Result, UsageError};
use crate::expr::field;
use crate::persist::Persister;
use crate::query::ModelQuery;
use crate::schema::{Model, ModelIo, ModelMeta, ModelRegister};
use crate::value::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Entry point of the ORM
#[derive(Debug)]
pub struct Orm<E> {
    registry: ModelRegister,
    engine: E,
    config: OrmConfig,
    /// Bumped by every save and delete; part of cached result keys
    data_generation: AtomicU64,
}

impl<E: ExecutionEngine> Orm<E> {
    pub fn new(engine: E, config: OrmConfig) -> Self {
        Self {
            registry: ModelRegister::new(),
            engine,
            config,
            data_generation: AtomicU64::new(0),
        }
    }

    /// ORM configured from `config/trellis.toml` and the environment
    pub fn from_env(engine: E) -> Result<Self> {
        Ok(Self::new(engine, OrmConfig::load()?))
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegister {
        &self.registry
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn register(&mut self, model: Model) -> Result<()> {
        self.registry.register(model)
    }

    pub fn unregister(&mut self, name: &str) -> Result<()> {
        self.registry.unregister(name)
    }

    /// Register every model a source provides
    pub fn load_models(&mut self, io: &dyn ModelIo) -> Result<()> {
        io.register_into(&mut self.registry)
    }

    /// Write the declared models to a source
    pub fn write_models(&self, io: &dyn ModelIo) -> Result<()> {
        io.write_models(&self.registry.declared_models())
    }

    /// Operations scoped to one registered model
    pub fn model(&self, name: &str) -> Result<ModelHandle<'_, E>> {
        self.registry.get(name)?;
        Ok(ModelHandle {
            orm: self,
            model: name.to_string(),
        })
    }

    pub fn create_query(&self, model: &str) -> Result<ModelQuery<'_>> {
        ModelQuery::new(&self.registry, &self.engine, &self.config, model)
    }

    /// Query whose compiled statement and result go through `pool`
    pub fn create_cacheable_query<'q>(
        &'q self,
        model: &str,
        pool: &'q dyn CachePool,
    ) -> Result<CacheableModelQuery<'q, 'q>> {
        let query = self.create_query(model)?;
        Ok(CacheableModelQuery::new(query, pool, self.data_generation()))
    }

    /// New entry with the default values of the model
    pub fn create_entry(&self, model: &str) -> Result<Entry> {
        let definition = self.registry.get(model)?;
        let mut entry = Entry::new(definition.name(), definition.primary_key());
        for field in definition.table().fields() {
            if let Some(default) = &field.default {
                entry.set(&field.name, default.clone());
            }
        }
        if definition.table().has_localized_fields() {
            entry.set_locale(self.config.default_locale.as_str());
        }
        Ok(entry)
    }

    /// Entry with the given id, not-found when there is none
    pub fn get_by_id(&self, model: &str, id: impl Into<Value>) -> Result<Entry> {
        let id = id.into();
        let primary_key = self.registry.get(model)?.primary_key().to_string();
        let mut query = self.create_query(model)?;
        query.add_condition(field(primary_key).eq(id.clone()));
        query.query_first()?.ok_or_else(|| OrmError::NotFound {
            kind: "entry",
            name: format!("{model} {}", id.key()),
        })
    }

    pub fn save(&self, entry: &mut Entry) -> Result<()> {
        let saved = Persister::new(&self.registry, &self.engine, &self.config).save(entry);
        self.data_changed();
        saved
    }

    pub fn delete(&self, entry: &Entry) -> Result<()> {
        let deleted = Persister::new(&self.registry, &self.engine, &self.config).delete(entry);
        self.data_changed();
        deleted
    }

    pub fn data_generation(&self) -> u64 {
        self.data_generation.load(Ordering::Acquire)
    }

    fn data_changed(&self) {
        self.data_generation.fetch_add(1, Ordering::AcqRel);
    }
}

/// Operations of one model
pub struct ModelHandle<'o, E> {
    orm: &'o Orm<E>,
    model: String,
}

impl<'o, E: ExecutionEngine> ModelHandle<'o, E> {
    pub fn name(&self) -> &str {
        &self.model
    }

    pub fn meta(&self) -> Result<Arc<ModelMeta>> {
        self.orm.registry.meta(&self.model)
    }

    pub fn create_query(&self) -> Result<ModelQuery<'o>> {
        self.orm.create_query(&self.model)
    }

    pub fn create_cacheable_query(&self, pool: &'o dyn CachePool) -> Result<CacheableModelQuery<'o, 'o>> {
        self.orm.create_cacheable_query(&self.model, pool)
    }

    pub fn create_entry(&self) -> Entry {
        // The handle only exists for registered models
        self.orm
            .create_entry(&self.model)
            .unwrap_or_else(|_| Entry::new(self.model.as_str(), crate::schema::PRIMARY_KEY))
    }

    pub fn get_by_id(&self, id: impl Into<Value>) -> Result<Entry> {
        self.orm.get_by_id(&self.model, id)
    }

    pub fn save(&self, entry: &mut Entry) -> Result<()> {
        self.check(entry)?;
        self.orm.save(entry)
    }

    pub fn delete(&self, entry: &Entry) -> Result<()> {
        self.check(entry)?;
        self.orm.delete(entry)
    }

    fn check(&self, entry: &Entry) -> Result<()> {
        if entry.model() != self.model {
            return Err(UsageError::ModelMismatch {
                model: self.model.clone(),
                entry_model: entry.model().to_string(),
            }
            .into());
        }
        Ok(())
    }
}
