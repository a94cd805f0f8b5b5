//! The schema registry.
//!
//! [`ModelRegister`] owns every declared model and keeps the schema graph
//! consistent while models come and go:
//!
//! - models with localized fields get a localized shadow model
//!   (`<Model>Localized`) holding one row per entry and locale;
//! - has-one/has-many fields are resolved against the relations their target
//!   declares back: a single belongs-to becomes a direct foreign key, no back
//!   relation (or a declared inverse has-field) becomes a synthesized link
//!   model;
//! - every model gets its set of *unlinked* models: models pointing at it with
//!   a belongs-to that no has-field of its own reaches.
//!
//! Fields the registry rewrote are restored when the model they depend on is
//! unregistered, and link models nobody references any more are removed.

use crate::error::{ConfigError, OrmError, Result};
use crate::schema::field::{Field, PropertyType, Relation, RelationKind};
use crate::schema::meta::ModelMeta;
use crate::schema::model::{Index, Model};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Suffix of localized shadow model names
pub const LOCALIZED_SUFFIX: &str = "Localized";
/// Belongs-to field of a shadow model pointing at its owner
pub const LOCALIZED_ENTRY_FIELD: &str = "entry";
/// Locale field of a shadow model
pub const LOCALE_FIELD: &str = "locale";
/// Highest numeric suffix tried when making a link model name unique
pub const MAX_LINK_SUFFIX: u32 = 99;

/// Name of the localized shadow model of `model`
pub fn localized_model_name(model: &str) -> String {
    format!("{model}{LOCALIZED_SUFFIX}")
}

/// Default link model name: both model names sorted, then concatenated
pub fn link_model_name(a: &str, b: &str) -> String {
    let mut names = [a, b];
    names.sort_unstable();
    names.concat()
}

fn lcfirst(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A relation field the target model declares back toward the owner
#[derive(Debug, Clone)]
struct BackRelation {
    field: String,
    kind: RelationKind,
    link_model: Option<String>,
}

enum Resolution {
    Direct(String),
    Link {
        name: Option<String>,
        inverse: Option<String>,
    },
}

/// Registry of every model in the schema
#[derive(Debug, Default)]
pub struct ModelRegister {
    models: BTreeMap<String, Model>,
    /// Registration order
    order: Vec<String>,
    /// Owner name to shadow model name
    shadows: BTreeMap<String, String>,
    /// Synthesized link models and the (model, field) pairs using them
    links: BTreeMap<String, BTreeSet<(String, String)>>,
    /// Original relation of every field the registry rewrote
    originals: BTreeMap<(String, String), Relation>,
    unlinked: BTreeMap<String, Vec<String>>,
    generation: u64,
}

impl ModelRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model to the schema. Registering a name twice replaces the
    /// previous model, which is kept when the replacement fails to resolve.
    pub fn register(&mut self, model: Model) -> Result<()> {
        model.validate()?;
        let name = model.name().to_string();
        let previous = if self.models.contains_key(&name) {
            let previous = self
                .declared_models()
                .into_iter()
                .find(|declared| declared.name() == name);
            self.unregister(&name)?;
            previous
        } else {
            None
        };

        let shadow = if model.table().has_localized_fields() {
            Some(localized_model(&model)?)
        } else {
            None
        };

        log::debug!("registering model {name}");
        self.insert(model);
        if let Some(shadow) = shadow {
            self.shadows.insert(name.clone(), shadow.name().to_string());
            self.insert(shadow);
        }

        let linked = self.link_pending();
        self.schema_changed();
        if let Err(err) = linked {
            log::warn!("registering model {name} failed: {err}");
            // Leave the schema as it was before the call
            if let Err(rollback_err) = self.unregister(&name) {
                log::warn!("removing failed model {name} failed: {rollback_err}");
            }
            if let Some(previous) = previous {
                if let Err(restore_err) = self.register(previous) {
                    log::warn!("restoring previous model {name} failed: {restore_err}");
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Remove a model, its localized shadow and the link models only it used.
    pub fn unregister(&mut self, name: &str) -> Result<()> {
        if self.models.remove(name).is_none() {
            return Err(OrmError::model_not_found(name));
        }
        log::debug!("unregistering model {name}");
        self.order.retain(|registered| registered != name);
        self.links.remove(name);
        self.unlinked.remove(name);

        let rewritten: Vec<(String, String)> = self.originals.keys().cloned().collect();
        for (model, field) in rewritten {
            let key = (model, field);
            if key.0 == name {
                self.originals.remove(&key);
                self.release_links(&key);
                continue;
            }
            let depends_on_removed = self
                .models
                .get(&key.0)
                .and_then(|model| model.field(&key.1))
                .and_then(Field::target)
                == Some(name);
            if depends_on_removed {
                self.restore(&key);
            }
        }

        let orphans: Vec<String> = self
            .links
            .iter()
            .filter(|(_, users)| users.is_empty())
            .map(|(link, _)| link.clone())
            .collect();
        for link in orphans {
            log::debug!("removing unreferenced link model {link}");
            self.links.remove(&link);
            self.models.remove(&link);
            self.order.retain(|registered| registered != &link);
        }

        if let Some(shadow) = self.shadows.remove(name) {
            if self.models.contains_key(&shadow) {
                self.unregister(&shadow)?;
            }
        }

        self.schema_changed();
        Ok(())
    }

    /// A registered model, not-found when missing
    pub fn get(&self, name: &str) -> Result<&Model> {
        self.models
            .get(name)
            .ok_or_else(|| OrmError::model_not_found(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Every model in registration order
    pub fn all(&self) -> Vec<&Model> {
        self.order
            .iter()
            .filter_map(|name| self.models.get(name))
            .collect()
    }

    /// Parsed metadata of a model, computed once per schema generation
    pub fn meta(&self, name: &str) -> Result<Arc<ModelMeta>> {
        let model = self.get(name)?;
        model
            .meta
            .get_or_try_init(|| {
                let mut meta = ModelMeta::new(name);
                meta.parse(model, self)?;
                Ok::<_, OrmError>(Arc::new(meta))
            })
            .cloned()
    }

    /// Models holding a belongs-to to `name` that none of its has-fields reach
    pub fn unlinked_models(&self, name: &str) -> Result<&[String]> {
        self.get(name)?;
        Ok(self.unlinked.get(name).map(Vec::as_slice).unwrap_or_default())
    }

    /// Name of the localized shadow model of `name`, if it has one
    pub fn localized_model(&self, name: &str) -> Option<&str> {
        self.shadows.get(name).map(String::as_str)
    }

    /// Whether `name` is a link model synthesized by the registry
    pub fn is_link_model(&self, name: &str) -> bool {
        self.links.contains_key(name)
    }

    /// The models as declared: synthesized link and shadow models left out,
    /// fields the registry rewrote restored.
    pub fn declared_models(&self) -> Vec<Model> {
        let shadows: BTreeSet<&str> = self.shadows.values().map(String::as_str).collect();
        self.all()
            .into_iter()
            .filter(|model| !self.is_link_model(model.name()) && !shadows.contains(model.name()))
            .map(|model| {
                let mut declared = model.clone();
                declared.meta = OnceCell::new();
                for ((owner, field), original) in &self.originals {
                    if owner != model.name() {
                        continue;
                    }
                    if let Some(relation) = declared
                        .table_mut()
                        .field_mut(field)
                        .and_then(Field::relation_mut)
                    {
                        *relation = original.clone();
                    }
                }
                declared
            })
            .collect()
    }

    /// Counter bumped on every schema change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn insert(&mut self, model: Model) {
        let name = model.name().to_string();
        if !self.order.contains(&name) {
            self.order.push(name.clone());
        }
        self.models.insert(name, model);
    }

    fn schema_changed(&mut self) {
        self.generation += 1;
        for model in self.models.values_mut() {
            model.meta = OnceCell::new();
        }
        self.recompute_unlinked();
    }

    /// Resolve every has-field whose target is registered and which was not
    /// resolved yet.
    fn link_pending(&mut self) -> Result<()> {
        let mut pending = Vec::new();
        for name in &self.order {
            let Some(model) = self.models.get(name) else { continue };
            for field in model.table().fields() {
                let key = (name.clone(), field.name.clone());
                let resolvable = field.is_has()
                    && !field.localized
                    && !self.originals.contains_key(&key)
                    && field.target().is_some_and(|target| self.models.contains_key(target));
                if resolvable {
                    pending.push(key);
                }
            }
        }
        for (model, field) in pending {
            // An inverse resolved earlier in this pass shares its link already
            if !self.originals.contains_key(&(model.clone(), field.clone())) {
                self.resolve_field(&model, &field)?;
            }
        }
        Ok(())
    }

    fn resolve_field(&mut self, owner: &str, field_name: &str) -> Result<()> {
        let relation = self
            .get(owner)?
            .field(field_name)
            .and_then(Field::relation)
            .cloned()
            .ok_or_else(|| ConfigError::InvalidModel {
                model: owner.to_string(),
                reason: format!("{field_name} is not a relation field"),
            })?;
        let target = relation.model.clone();
        let back = self.back_relations(&target, owner, field_name)?;

        let resolution = match back.as_slice() {
            [] => Resolution::Link {
                name: relation.link_model.clone(),
                inverse: None,
            },
            [single] if single.kind == RelationKind::BelongsTo => {
                if let Some(link) = &relation.link_model {
                    log::debug!("{owner}.{field_name}: ignoring link model {link}, {target}.{} points back", single.field);
                }
                Resolution::Direct(single.field.clone())
            }
            [single] if single.kind != RelationKind::BelongsTo => Resolution::Link {
                name: relation.link_model.clone().or_else(|| single.link_model.clone()),
                inverse: Some(single.field.clone()),
            },
            candidates => {
                let belongs_to: Vec<&str> = candidates
                    .iter()
                    .filter(|back| back.kind == RelationKind::BelongsTo)
                    .map(|back| back.field.as_str())
                    .collect();
                match (&relation.foreign_key, &relation.link_model) {
                    (Some(fk), _) if belongs_to.contains(&fk.as_str()) => {
                        Resolution::Direct(fk.clone())
                    }
                    (_, Some(link)) => Resolution::Link {
                        name: Some(link.clone()),
                        inverse: None,
                    },
                    // A key naming none of the back relations asks for a link of its own
                    (Some(_), None) => Resolution::Link {
                        name: None,
                        inverse: None,
                    },
                    (None, None) => {
                        return Err(ConfigError::AmbiguousForeignKey {
                            model: owner.to_string(),
                            field: field_name.to_string(),
                            candidates: candidates.iter().map(|back| back.field.clone()).collect(),
                        }
                        .into())
                    }
                }
            }
        };

        match resolution {
            Resolution::Direct(foreign_key) => {
                log::debug!("{owner}.{field_name}: foreign key {target}.{foreign_key}");
                self.rewrite(owner, field_name, |relation| {
                    relation.foreign_key = Some(foreign_key);
                    relation.link_model = None;
                });
            }
            Resolution::Link { name, inverse } => {
                let generated = name.is_none();
                let name = match name {
                    Some(name) => name,
                    None => self.unique_link_name(owner, field_name, &target)?,
                };
                log::debug!("{owner}.{field_name}: link model {name}");
                if !self.models.contains_key(&name) {
                    self.insert(link_model(&name, owner, &target));
                    self.links.entry(name.clone()).or_default();
                }
                self.use_link(&name, owner, field_name);
                let link = name.clone();
                self.rewrite(owner, field_name, |relation| {
                    // Both keys of a generated link model are unambiguous
                    if generated {
                        relation.foreign_key = None;
                    }
                    relation.link_model = Some(link);
                });
                if let Some(inverse) = inverse {
                    self.use_link(&name, &target, &inverse);
                    self.rewrite(&target, &inverse, |relation| relation.link_model = Some(name));
                }
            }
        }
        Ok(())
    }

    /// Non-localized relation fields of `target` pointing at `owner`
    fn back_relations(&self, target: &str, owner: &str, field: &str) -> Result<Vec<BackRelation>> {
        let target_model = self.get(target)?;
        Ok(target_model
            .table()
            .fields()
            .iter()
            .filter(|candidate| !(target == owner && candidate.name == field))
            .filter(|candidate| !candidate.localized && candidate.target() == Some(owner))
            .filter_map(|candidate| {
                Some(BackRelation {
                    field: candidate.name.clone(),
                    kind: candidate.relation_kind()?,
                    link_model: candidate.relation()?.link_model.clone(),
                })
            })
            .collect())
    }

    /// Generated link model name, suffixed until no sibling has-field of the
    /// owner uses it.
    fn unique_link_name(&self, owner: &str, field_name: &str, target: &str) -> Result<String> {
        let base = link_model_name(owner, target);
        let taken: BTreeSet<&str> = self
            .get(owner)?
            .table()
            .fields()
            .iter()
            .filter(|field| field.is_has() && field.name != field_name)
            .filter_map(|field| field.relation()?.link_model.as_deref())
            .collect();
        if !taken.contains(base.as_str()) {
            return Ok(base);
        }
        (2..=MAX_LINK_SUFFIX)
            .map(|suffix| format!("{base}{suffix}"))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .ok_or_else(|| {
                ConfigError::InvalidLinkModel {
                    model: owner.to_string(),
                    field: field_name.to_string(),
                    name: base,
                }
                .into()
            })
    }

    fn use_link(&mut self, link: &str, model: &str, field: &str) {
        if let Some(users) = self.links.get_mut(link) {
            users.insert((model.to_string(), field.to_string()));
        }
    }

    fn release_links(&mut self, key: &(String, String)) {
        for users in self.links.values_mut() {
            users.remove(key);
        }
    }

    fn rewrite(&mut self, model: &str, field: &str, change: impl FnOnce(&mut Relation)) {
        let Some(relation) = self
            .models
            .get_mut(model)
            .and_then(|model| model.table_mut().field_mut(field))
            .and_then(Field::relation_mut)
        else {
            return;
        };
        self.originals
            .entry((model.to_string(), field.to_string()))
            .or_insert_with(|| relation.clone());
        change(relation);
    }

    fn restore(&mut self, key: &(String, String)) {
        let Some(original) = self.originals.remove(key) else { return };
        self.release_links(key);
        if let Some(relation) = self
            .models
            .get_mut(&key.0)
            .and_then(|model| model.table_mut().field_mut(&key.1))
            .and_then(Field::relation_mut)
        {
            *relation = original;
        }
    }

    fn recompute_unlinked(&mut self) {
        let mut unlinked = BTreeMap::new();
        for (name, model) in &self.models {
            let reachable: BTreeSet<&str> = model
                .table()
                .fields()
                .iter()
                .filter(|field| field.is_has())
                .filter_map(Field::relation)
                .flat_map(|relation| {
                    std::iter::once(relation.model.as_str()).chain(relation.link_model.as_deref())
                })
                .collect();
            let models: Vec<String> = self
                .order
                .iter()
                .filter(|other| !reachable.contains(other.as_str()))
                .filter(|other| {
                    self.models.get(*other).is_some_and(|other| {
                        other
                            .table()
                            .fields()
                            .iter()
                            .any(|field| field.is_belongs_to() && field.target() == Some(name.as_str()))
                    })
                })
                .cloned()
                .collect();
            unlinked.insert(name.clone(), models);
        }
        self.unlinked = unlinked;
    }
}

/// Build the localized shadow model of `owner`
fn localized_model(owner: &Model) -> Result<Model> {
    let mut shadow = Model::new(localized_model_name(owner.name()))
        .with_field(Field::belongs_to(LOCALIZED_ENTRY_FIELD, owner.name()).dependant())
        .with_property(LOCALE_FIELD, PropertyType::String);
    for field in owner.table().fields().iter().filter(|field| field.localized) {
        if field.name == LOCALIZED_ENTRY_FIELD || field.name == LOCALE_FIELD {
            return Err(ConfigError::InvalidModel {
                model: owner.name().to_string(),
                reason: format!("localized field name '{}' is reserved", field.name),
            }
            .into());
        }
        let mut copy = field.clone();
        copy.localized = false;
        shadow.table_mut().add_field(copy);
    }
    Ok(shadow.with_index(Index {
        name: format!("{}_{LOCALE_FIELD}_{LOCALIZED_ENTRY_FIELD}", lcfirst(owner.name())),
        fields: vec![LOCALE_FIELD.to_string(), LOCALIZED_ENTRY_FIELD.to_string()],
        unique: true,
    }))
}

/// Build a link model between `a` and `b`; both belongs-to fields are
/// dependant so link rows go away with either side.
fn link_model(name: &str, a: &str, b: &str) -> Model {
    if a == b {
        let field = lcfirst(a);
        return Model::new(name)
            .with_field(Field::belongs_to(format!("{field}1"), a).dependant())
            .with_field(Field::belongs_to(format!("{field}2"), a).dependant());
    }
    let mut ends = [a, b];
    ends.sort_unstable();
    Model::new(name)
        .with_field(Field::belongs_to(lcfirst(ends[0]), ends[0]).dependant())
        .with_field(Field::belongs_to(lcfirst(ends[1]), ends[1]).dependant())
}
