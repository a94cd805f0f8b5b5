//! Save and delete lifecycle.
//!
//! [`Persister`] writes entry graphs through an [`ExecutionEngine`]:
//!
//! - nested belongs-to entries are saved first so their ids can be stored;
//! - loaded entries only write the fields that changed since they were read,
//!   clean entries write nothing;
//! - localized fields go to the shadow row of the entry locale, created on
//!   first save;
//! - has-fields are synchronized after the owner: foreign keys of direct
//!   relations are set (and cleared for entries no longer listed), link rows
//!   of many-to-many relations are added and removed.
//!
//! Deleting an entry refuses when an unlinked model marked `block_delete`
//! still points at it, deletes dependant rows and clears the remaining
//! references. Both operations run in one transaction and call the
//! [`Behaviour`](crate::schema::Behaviour) hooks of the model.

use crate::config::OrmConfig;
use crate::engine::{execute_logged, ExecutionEngine, ResultSet, Row};
use crate::entry::{Entry, FieldValue};
use crate::error::{OrmError, Result};
use crate::expr::{column, field, Expression};
use crate::query::parser::SELF_ALIAS;
use crate::query::ModelQuery;
use crate::schema::register::{LOCALE_FIELD, LOCALIZED_ENTRY_FIELD};
use crate::schema::{ForeignKey, ModelMeta, ModelRegister, RelationMeta};
use crate::statement::{Delete, Insert, Select, Statement, Update};
use crate::value::Value;

/// Writes entries and deletes them again
pub struct Persister<'a> {
    registry: &'a ModelRegister,
    engine: &'a dyn ExecutionEngine,
    config: &'a OrmConfig,
}

impl<'a> Persister<'a> {
    pub fn new(
        registry: &'a ModelRegister,
        engine: &'a dyn ExecutionEngine,
        config: &'a OrmConfig,
    ) -> Self {
        Self {
            registry,
            engine,
            config,
        }
    }

    /// Insert or update `entry` and everything it holds
    ///
    /// The entry gets its new id and is marked as persisted; on error nothing
    /// is written.
    pub fn save(&self, entry: &mut Entry) -> Result<()> {
        self.registry.get(entry.model())?;
        transaction(self.engine, || self.save_entry(entry))
    }

    /// Delete a stored entry with its dependants
    pub fn delete(&self, entry: &Entry) -> Result<()> {
        let id = entry.id().cloned().ok_or_else(|| OrmError::NotFound {
            kind: "entry",
            name: format!("unsaved {}", entry.model()),
        })?;
        self.registry.get(entry.model())?;
        transaction(self.engine, || self.delete_entry(entry, &id))
    }

    fn save_entry(&self, entry: &mut Entry) -> Result<()> {
        if entry.is_clean() {
            return Ok(());
        }
        let model = self.registry.get(entry.model())?;
        let meta = self.registry.meta(entry.model())?;
        let behaviours = model.behaviours().to_vec();
        let table = model.name().to_string();
        let primary_key = model.primary_key().to_string();
        let is_new = entry.is_new() || !entry.is_proxy();

        if is_new {
            for field in model.table().fields() {
                if let Some(default) = &field.default {
                    if !entry.values().contains_key(&field.name) {
                        entry.set(&field.name, default.clone());
                    }
                }
            }
        }
        for behaviour in &behaviours {
            if is_new {
                behaviour.before_insert(entry)?;
            } else {
                behaviour.before_update(entry)?;
            }
        }

        for name in meta.belongs_to()? {
            self.save_belongs_to(entry, name)?;
        }

        let changed: Vec<String> = entry.changed_fields().into_iter().map(str::to_string).collect();
        let mut base = Vec::new();
        let mut localized = Vec::new();
        for name in &changed {
            if !meta.fields()?.contains(name) || (*name == primary_key && !is_new) {
                continue;
            }
            if meta.is_relation(name)? && !meta.relation_meta(name)?.is_belongs_to() {
                continue;
            }
            let Some(value) = entry.values().get(name) else {
                continue;
            };
            let value = column_value(&table, name, value)?;
            if meta.is_localized_field(name)? {
                localized.push((name.clone(), value));
            } else {
                base.push((name.clone(), value));
            }
        }

        if is_new {
            self.execute(Statement::Insert(Insert {
                table: table.clone(),
                values: base,
            }))?;
            let id = self
                .engine
                .last_insert_id()
                .ok_or_else(|| OrmError::Execution(format!("no id generated for {table}")))?;
            entry.set_id(id);
        } else if !base.is_empty() {
            let id = require_id(entry)?;
            self.execute(Statement::Update(Update {
                table: table.clone(),
                values: base,
                condition: Some(column(table.as_str(), primary_key.as_str()).eq(id)),
            }))?;
        }

        if meta.is_localized()? && (is_new || !localized.is_empty()) {
            self.save_localized(entry, &meta, localized)?;
        }

        for name in meta.has_one()?.iter().chain(meta.has_many()?) {
            if changed.contains(name) {
                self.save_has(entry, meta.relation_meta(name)?)?;
            }
        }

        for behaviour in &behaviours {
            if is_new {
                behaviour.after_insert(entry)?;
            } else {
                behaviour.after_update(entry)?;
            }
        }
        log::debug!(
            "saved {table} {}",
            entry.id().map(Value::key).unwrap_or_default()
        );
        entry.mark_persisted();
        Ok(())
    }

    fn save_belongs_to(&self, entry: &mut Entry, name: &str) -> Result<()> {
        if !matches!(entry.values().get(name), Some(FieldValue::Entry(_))) {
            return Ok(());
        }
        let Some(FieldValue::Entry(mut related)) = entry.remove_field(name) else {
            return Ok(());
        };
        let saved = self.save_entry(&mut related);
        entry.set(name, FieldValue::Entry(related));
        saved
    }

    /// Update or create the shadow row of the entry locale
    fn save_localized(&self, entry: &mut Entry, meta: &ModelMeta, values: Vec<(String, Value)>) -> Result<()> {
        let shadow = meta
            .localized_model()?
            .ok_or_else(|| OrmError::model_not_found(format!("localized {}", meta.model())))?
            .to_string();
        let shadow_key = self.registry.get(&shadow)?.primary_key().to_string();
        let locale = entry
            .locale()
            .unwrap_or(self.config.default_locale.as_str())
            .to_string();
        let owner = require_id(entry)?;

        let existing = self
            .select_ids(
                &shadow,
                column(SELF_ALIAS, LOCALIZED_ENTRY_FIELD)
                    .eq(owner.clone())
                    .and(column(SELF_ALIAS, LOCALE_FIELD).eq(locale.as_str())),
            )?
            .into_iter()
            .next();
        let localized_id = match existing {
            Some(id) => {
                if !values.is_empty() {
                    self.execute(Statement::Update(Update {
                        table: shadow.clone(),
                        values,
                        condition: Some(column(shadow.as_str(), shadow_key.as_str()).eq(id.clone())),
                    }))?;
                }
                id
            }
            None => {
                let mut row = vec![
                    (LOCALIZED_ENTRY_FIELD.to_string(), owner),
                    (LOCALE_FIELD.to_string(), Value::from(locale.as_str())),
                ];
                row.extend(values);
                self.execute(Statement::Insert(Insert {
                    table: shadow.clone(),
                    values: row,
                }))?;
                self.engine
                    .last_insert_id()
                    .ok_or_else(|| OrmError::Execution(format!("no id generated for {shadow}")))?
            }
        };
        entry.set_localized_id(Some(localized_id));
        entry.set_locale(locale);
        entry.set_localized(true);
        Ok(())
    }

    fn save_has(&self, entry: &mut Entry, relation: &RelationMeta) -> Result<()> {
        let owner = if relation.localized {
            entry.localized_id().cloned()
        } else {
            entry.id().cloned()
        };
        let owner = owner.ok_or_else(|| {
            OrmError::Data(format!("{}.{} has no owner id", entry.model(), relation.field))
        })?;
        let Some(mut value) = entry.remove_field(&relation.field) else {
            return Ok(());
        };
        let saved = self.save_related(relation, &owner, &mut value);
        entry.set(&relation.field, value);
        saved
    }

    fn save_related(&self, relation: &RelationMeta, owner: &Value, value: &mut FieldValue) -> Result<()> {
        match &relation.foreign_key {
            ForeignKey::Single { field: key } => {
                let mut kept = Vec::new();
                for related in related_mut(value) {
                    related.set(key, owner.clone());
                    self.save_entry(related)?;
                    kept.push(require_id(related)?);
                }
                let previous = self.select_ids(&relation.model, column(SELF_ALIAS, key.as_str()).eq(owner.clone()))?;
                for id in previous.iter().filter(|id| !contains(&kept, id)) {
                    if relation.dependant {
                        self.delete_by_id(&relation.model, id)?;
                    } else {
                        let target_key = self.registry.get(&relation.model)?.primary_key();
                        self.execute(Statement::Update(Update {
                            table: relation.model.clone(),
                            values: vec![(key.clone(), Value::Null)],
                            condition: Some(column(relation.model.as_str(), target_key).eq(id.clone())),
                        }))?;
                    }
                }
            }
            ForeignKey::Link { to_self, to_target } => {
                let link = link_model(relation)?;
                let targets = self.save_targets(value)?;
                let rows = self.select_rows(
                    link,
                    &[to_target],
                    column(SELF_ALIAS, to_self.as_str()).eq(owner.clone()),
                )?;
                let existing: Vec<(Value, Value)> = self.link_rows(link, rows, |row| row.get(to_target).cloned())?;
                self.sync_links(link, (to_self, to_target), owner, &targets, existing)?;
            }
            ForeignKey::SelfLink { first, second } => {
                let link = link_model(relation)?;
                let targets = self.save_targets(value)?;
                let rows = self.select_rows(
                    link,
                    &[first, second],
                    column(SELF_ALIAS, first.as_str())
                        .eq(owner.clone())
                        .or(column(SELF_ALIAS, second.as_str()).eq(owner.clone())),
                )?;
                let existing = self.link_rows(link, rows, |row| {
                    let first = row.get(first)?;
                    if first.key() == owner.key() {
                        row.get(second).cloned()
                    } else {
                        Some(first.clone())
                    }
                })?;
                self.sync_links(link, (first, second), owner, &targets, existing)?;
            }
        }
        Ok(())
    }

    fn save_targets(&self, value: &mut FieldValue) -> Result<Vec<Value>> {
        let mut targets = Vec::new();
        for related in related_mut(value) {
            self.save_entry(related)?;
            targets.push(require_id(related)?);
        }
        Ok(targets)
    }

    /// Link row ids paired with the target they point at
    fn link_rows<F>(&self, link: &str, rows: Vec<Row>, target: F) -> Result<Vec<(Value, Value)>>
    where
        F: Fn(&Row) -> Option<Value>,
    {
        let link_key = self.registry.get(link)?.primary_key();
        Ok(rows
            .iter()
            .filter_map(|row| Some((row.get(link_key)?.clone(), target(row)?)))
            .collect())
    }

    /// Insert link rows for new targets, delete the ones for dropped targets
    fn sync_links(
        &self,
        link: &str,
        (to_self, to_target): (&String, &String),
        owner: &Value,
        targets: &[Value],
        existing: Vec<(Value, Value)>,
    ) -> Result<()> {
        let link_key = self.registry.get(link)?.primary_key();
        let linked: Vec<Value> = existing.iter().map(|(_, target)| target.clone()).collect();
        for target in targets.iter().filter(|target| !contains(&linked, target)) {
            self.execute(Statement::Insert(Insert {
                table: link.to_string(),
                values: vec![(to_self.clone(), owner.clone()), (to_target.clone(), target.clone())],
            }))?;
        }
        for (id, target) in &existing {
            if !contains(targets, target) {
                self.execute(Statement::Delete(Delete {
                    table: link.to_string(),
                    condition: Some(column(link, link_key).eq(id.clone())),
                }))?;
            }
        }
        Ok(())
    }

    fn delete_entry(&self, entry: &Entry, id: &Value) -> Result<()> {
        let model = self.registry.get(entry.model())?;
        let meta = self.registry.meta(entry.model())?;
        let table = model.name();
        for behaviour in model.behaviours() {
            behaviour.before_delete(entry)?;
        }

        let references = self.references(table, &meta, id)?;
        if let Some((referencing, key, _)) = references.iter().find(|(_, _, relation)| relation.block_delete) {
            return Err(OrmError::DeleteBlocked {
                model: table.to_string(),
                id: id.key(),
                referenced_by: format!("{referencing}.{key}"),
            });
        }

        self.execute(Statement::Delete(Delete {
            table: table.to_string(),
            condition: Some(column(table, model.primary_key()).eq(id.clone())),
        }))?;

        for (referencing, key, relation) in &references {
            if relation.dependant {
                for dependant in self.select_ids(referencing, column(SELF_ALIAS, key.as_str()).eq(id.clone()))? {
                    self.delete_by_id(referencing, &dependant)?;
                }
            } else {
                self.execute(Statement::Update(Update {
                    table: referencing.clone(),
                    values: vec![(key.clone(), Value::Null)],
                    condition: Some(column(referencing.as_str(), key.as_str()).eq(id.clone())),
                }))?;
            }
        }

        for relation in meta.relations()? {
            // Localized has-fields hang off the shadow rows removed above
            if relation.is_belongs_to() || relation.localized {
                continue;
            }
            self.delete_has(relation, id)?;
        }

        for behaviour in model.behaviours() {
            behaviour.after_delete(entry)?;
        }
        log::debug!("deleted {table} {}", id.key());
        Ok(())
    }

    /// Belongs-to fields of unlinked models pointing at the entry, with the
    /// relation that declares them
    fn references(&self, table: &str, meta: &ModelMeta, id: &Value) -> Result<Vec<(String, String, RelationMeta)>> {
        let mut references = Vec::new();
        for unlinked in meta.unlinked_models()? {
            let unlinked_meta = self.registry.meta(unlinked)?;
            for relation in unlinked_meta.relations()? {
                if !relation.is_belongs_to() || relation.model != table {
                    continue;
                }
                let Some(key) = relation.single_key() else {
                    continue;
                };
                // Stored in the shadow model, which is unlinked as well
                if unlinked_meta.is_localized_field(key)? {
                    continue;
                }
                let referencing = self.select_ids(unlinked, column(SELF_ALIAS, key).eq(id.clone()))?;
                if !referencing.is_empty() {
                    references.push((unlinked.clone(), key.to_string(), relation.clone()));
                }
            }
        }
        Ok(references)
    }

    fn delete_has(&self, relation: &RelationMeta, id: &Value) -> Result<()> {
        match &relation.foreign_key {
            ForeignKey::Single { field: key } => {
                if relation.dependant {
                    for child in self.select_ids(&relation.model, column(SELF_ALIAS, key.as_str()).eq(id.clone()))? {
                        self.delete_by_id(&relation.model, &child)?;
                    }
                } else {
                    self.execute(Statement::Update(Update {
                        table: relation.model.clone(),
                        values: vec![(key.clone(), Value::Null)],
                        condition: Some(column(relation.model.as_str(), key.as_str()).eq(id.clone())),
                    }))?;
                }
            }
            ForeignKey::Link { to_self, to_target } => {
                let link = link_model(relation)?;
                let targets: Vec<Value> = if relation.dependant {
                    self.select_rows(link, &[to_target], column(SELF_ALIAS, to_self.as_str()).eq(id.clone()))?
                        .iter()
                        .filter_map(|row| row.get(to_target).cloned())
                        .collect()
                } else {
                    Vec::new()
                };
                self.execute(Statement::Delete(Delete {
                    table: link.to_string(),
                    condition: Some(column(link, to_self.as_str()).eq(id.clone())),
                }))?;
                for target in targets {
                    self.delete_by_id(&relation.model, &target)?;
                }
            }
            ForeignKey::SelfLink { first, second } => {
                let link = link_model(relation)?;
                self.execute(Statement::Delete(Delete {
                    table: link.to_string(),
                    condition: Some(
                        column(link, first.as_str())
                            .eq(id.clone())
                            .or(column(link, second.as_str()).eq(id.clone())),
                    ),
                }))?;
            }
        }
        Ok(())
    }

    /// Load and delete one row; rows already gone are skipped
    fn delete_by_id(&self, model: &str, id: &Value) -> Result<()> {
        let primary_key = self.registry.get(model)?.primary_key().to_string();
        let mut query = ModelQuery::new(self.registry, self.engine, self.config, model)?;
        query
            .set_recursive_depth(Some(0))?
            .set_include_unlocalized(true)
            .add_condition(field(primary_key).eq(id.clone()));
        match query.query_first()? {
            Some(entry) => self.delete_entry(&entry, id),
            None => Ok(()),
        }
    }

    fn select_rows(&self, table: &str, columns: &[&String], condition: Expression) -> Result<Vec<Row>> {
        let primary_key = self.registry.get(table)?.primary_key();
        let mut select = Select::new(table, SELF_ALIAS);
        select.field(column(SELF_ALIAS, primary_key), primary_key);
        for name in columns {
            select.field(column(SELF_ALIAS, name.as_str()), name.as_str());
        }
        select.and_where(condition);
        Ok(self.execute(Statement::Select(select))?.rows)
    }

    fn select_ids(&self, table: &str, condition: Expression) -> Result<Vec<Value>> {
        let primary_key = self.registry.get(table)?.primary_key();
        Ok(self
            .select_rows(table, &[], condition)?
            .iter()
            .filter_map(|row| row.get(primary_key).cloned())
            .collect())
    }

    fn execute(&self, statement: Statement) -> Result<ResultSet> {
        execute_logged(self.engine, &statement)
    }
}

/// Run `f` in a transaction, rolled back when it fails
fn transaction<T>(engine: &dyn ExecutionEngine, f: impl FnOnce() -> Result<T>) -> Result<T> {
    engine.begin()?;
    match f() {
        Ok(value) => {
            engine.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = engine.rollback() {
                log::warn!("rollback after {err} failed: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// Value written to the column of a field
fn column_value(model: &str, name: &str, value: &FieldValue) -> Result<Value> {
    match value {
        FieldValue::Null => Ok(Value::Null),
        FieldValue::Scalar(value) => Ok(value.clone()),
        FieldValue::Data(data) if data.is_null() => Ok(Value::Null),
        FieldValue::Data(data) => Ok(Value::Text(serde_json::to_string(data)?)),
        FieldValue::Entry(related) => Ok(related.id().cloned().unwrap_or(Value::Null)),
        FieldValue::Entries(_) | FieldValue::Keyed(_) => Err(OrmError::Data(format!(
            "{model}.{name} holds several entries but is stored in one column"
        ))),
    }
}

fn related_mut(value: &mut FieldValue) -> Vec<&mut Entry> {
    match value {
        FieldValue::Entry(entry) => vec![entry.as_mut()],
        FieldValue::Entries(entries) => entries.iter_mut().collect(),
        FieldValue::Keyed(entries) => entries.iter_mut().map(|(_, entry)| entry).collect(),
        _ => Vec::new(),
    }
}

fn link_model(relation: &RelationMeta) -> Result<&str> {
    relation
        .link_model
        .as_deref()
        .ok_or_else(|| OrmError::Data(format!("relation {} has no link model", relation.field)))
}

fn require_id(entry: &Entry) -> Result<Value> {
    entry
        .id()
        .cloned()
        .ok_or_else(|| OrmError::Data(format!("{} entry has no id", entry.model())))
}

fn contains(ids: &[Value], id: &Value) -> bool {
    ids.iter().any(|candidate| candidate.key() == id.key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::schema::{Behaviour, Field, Model, ModelRegister, PropertyType};
    use std::sync::Arc;

    struct Slug;

    impl Behaviour for Slug {
        fn before_insert(&self, entry: &mut Entry) -> Result<()> {
            let slug = entry.value("title").and_then(Value::as_str).unwrap_or_default().to_lowercase();
            entry.set("slug", slug);
            Ok(())
        }

        fn before_update(&self, entry: &mut Entry) -> Result<()> {
            if entry.value("title").and_then(Value::as_str) == Some("forbidden") {
                return Err(OrmError::Data("forbidden title".to_string()));
            }
            Ok(())
        }
    }

    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn registry() -> ModelRegister {
        let mut registry = ModelRegister::new();
        registry
            .register(
                Model::new("Author")
                    .with_property("name", PropertyType::String)
                    .with_field(Field::has_many("posts", "Post").dependant()),
            )
            .expect("author");
        registry
            .register(
                Model::new("Post")
                    .with_property("title", PropertyType::String)
                    .with_property("slug", PropertyType::String)
                    .with_field(Field::property("body", PropertyType::Text).localized())
                    .with_field(Field::belongs_to("author", "Author"))
                    .with_behaviour(Arc::new(Slug)),
            )
            .expect("post");
        registry
            .register(
                Model::new("Comment")
                    .with_property("text", PropertyType::Text)
                    .with_field(Field::belongs_to("post", "Post").block_delete()),
            )
            .expect("comment");
        registry
    }

    fn columns(engine: &MemoryEngine, table: &str, name: &str) -> Vec<Value> {
        engine
            .rows(table)
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or_default())
            .collect()
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_insert_saves_belongs_to_and_shadow_row() {
        let registry = registry();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let persister = Persister::new(&registry, &engine, &config);

        let author = Entry::new("Author", "id").with("name", "Jane");
        let mut post = Entry::new("Post", "id")
            .with("title", "Hello")
            .with("body", "Welcome")
            .with("author", author);
        persister.save(&mut post).expect("save");

        assert_eq!(post.id(), Some(&Value::Int(1)));
        assert_eq!(post.related("author").and_then(Entry::id), Some(&Value::Int(1)));
        assert_eq!(columns(&engine, "Post", "author"), vec![Value::Int(1)]);
        assert_eq!(columns(&engine, "Post", "slug"), vec![Value::from("hello")]);
        assert_eq!(columns(&engine, "PostLocalized", "body"), vec![Value::from("Welcome")]);
        assert_eq!(columns(&engine, "PostLocalized", "locale"), vec![Value::from("en")]);
        assert!(post.is_clean());
        assert!(post.is_localized());
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_update_writes_changed_fields_only() {
        let registry = registry();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let persister = Persister::new(&registry, &engine, &config);

        let mut post = Entry::new("Post", "id").with("title", "Hello").with("body", "Welcome");
        persister.save(&mut post).expect("insert");
        engine.clear_log();

        persister.save(&mut post).expect("clean save");
        assert_eq!(engine.statement_count(), 0);

        post.set("title", "Hi");
        persister.save(&mut post).expect("update");
        let updates: Vec<Update> = engine
            .statements()
            .into_iter()
            .filter_map(|statement| match statement {
                Statement::Update(update) => Some(update),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].values, vec![("title".to_string(), Value::from("Hi"))]);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_failing_hook_rolls_back() {
        let registry = registry();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let persister = Persister::new(&registry, &engine, &config);

        let mut post = Entry::new("Post", "id").with("title", "Hello");
        persister.save(&mut post).expect("insert");
        post.set("title", "forbidden");
        assert!(persister.save(&mut post).is_err());
        assert_eq!(columns(&engine, "Post", "title"), vec![Value::from("Hello")]);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_delete_is_blocked_by_unlinked_reference() {
        let registry = registry();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let persister = Persister::new(&registry, &engine, &config);

        let mut post = Entry::new("Post", "id").with("title", "Hello");
        persister.save(&mut post).expect("post");
        let mut comment = Entry::new("Comment", "id").with("text", "Nice").with("post", post.clone());
        persister.save(&mut comment).expect("comment");

        let err = persister.delete(&post).expect_err("blocked");
        assert!(matches!(err, OrmError::DeleteBlocked { ref referenced_by, .. } if referenced_by == "Comment.post"));
        assert_eq!(engine.rows("Post").len(), 1);

        persister.delete(&comment).expect("comment delete");
        persister.delete(&post).expect("post delete");
        assert!(engine.rows("Post").is_empty());
        assert!(engine.rows("PostLocalized").is_empty());
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_dependant_has_many_is_deleted() {
        let registry = registry();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let persister = Persister::new(&registry, &engine, &config);

        let mut author = Entry::new("Author", "id").with("name", "Jane").with(
            "posts",
            vec![
                Entry::new("Post", "id").with("title", "One"),
                Entry::new("Post", "id").with("title", "Two"),
            ],
        );
        persister.save(&mut author).expect("save");
        assert_eq!(columns(&engine, "Post", "author"), vec![Value::Int(1), Value::Int(1)]);

        persister.delete(&author).expect("delete");
        assert!(engine.rows("Author").is_empty());
        assert!(engine.rows("Post").is_empty());
    }

    #[test]
    fn test_unsaved_entry_cannot_be_deleted() {
        let registry = registry();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let persister = Persister::new(&registry, &engine, &config);
        let result = persister.delete(&Entry::new("Post", "id"));
        assert!(result.is_err_and(|err| err.is_not_found()));
    }
}
