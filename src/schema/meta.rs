//! Relation metadata of a model.
//!
//! [`ModelMeta`] classifies the fields of one model and resolves every
//! relation field into a [`RelationMeta`]: which model it points at, which
//! field holds the foreign key and, for many-to-many relations, which link
//! model sits in between.
//!
//! Metadata is derived lazily from the registered schema. A fresh
//! [`ModelMeta`] is empty; [`ModelMeta::parse`] fills it once and every
//! accessor refuses to answer before that. Use
//! [`ModelRegister::meta`](crate::schema::ModelRegister::meta) to get the
//! parsed metadata of a registered model.

use crate::error::{ConfigError, OrmError, Result, UsageError};
use crate::schema::field::{Field, FieldKind, Relation, RelationKind};
use crate::schema::model::Model;
use crate::schema::register::ModelRegister;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the foreign key of a relation lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ForeignKey {
    /// One field: the field itself for belongs-to, the field of the target
    /// pointing back for has-fields
    Single { field: String },
    /// The two fields of a link model
    Link { to_self: String, to_target: String },
    /// The two fields of a link model joining a model with itself; the pair
    /// is unordered
    SelfLink { first: String, second: String },
}

/// Resolved metadata of one relation field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMeta {
    pub field: String,
    pub kind: RelationKind,
    /// Target model
    pub model: String,
    pub foreign_key: ForeignKey,
    pub link_model: Option<String>,
    pub is_relation_with_self: bool,
    pub dependant: bool,
    pub block_delete: bool,
    pub order: Option<String>,
    pub index_on: Option<String>,
    /// Localized has-field: keys refer to the localized shadow row
    pub localized: bool,
}

impl RelationMeta {
    pub fn is_many_to_many(&self) -> bool {
        self.link_model.is_some() && self.kind != RelationKind::BelongsTo
    }

    pub fn is_belongs_to(&self) -> bool {
        self.kind == RelationKind::BelongsTo
    }

    /// Single foreign key field, if the relation has one
    pub fn single_key(&self) -> Option<&str> {
        match &self.foreign_key {
            ForeignKey::Single { field } => Some(field),
            _ => None,
        }
    }
}

/// Parsed classification of the fields of one model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMeta {
    model: String,
    parsed: bool,
    fields: Vec<String>,
    properties: Vec<String>,
    belongs_to: Vec<String>,
    has_one: Vec<String>,
    has_many: Vec<String>,
    localized_fields: Vec<String>,
    serialized_fields: Vec<String>,
    relations: BTreeMap<String, RelationMeta>,
    localized_model: Option<String>,
    unlinked_models: Vec<String>,
}

/// Serializable form of [`ModelMeta`] for metadata caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactMeta {
    pub model: String,
    pub fields: Vec<String>,
    pub properties: Vec<String>,
    pub belongs_to: Vec<String>,
    pub has_one: Vec<String>,
    pub has_many: Vec<String>,
    pub localized_fields: Vec<String>,
    pub serialized_fields: Vec<String>,
    pub relations: Vec<RelationMeta>,
    pub localized_model: Option<String>,
    pub unlinked_models: Vec<String>,
}

impl ModelMeta {
    /// Unparsed metadata for `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parsed: false,
            fields: Vec::new(),
            properties: Vec::new(),
            belongs_to: Vec::new(),
            has_one: Vec::new(),
            has_many: Vec::new(),
            localized_fields: Vec::new(),
            serialized_fields: Vec::new(),
            relations: BTreeMap::new(),
            localized_model: None,
            unlinked_models: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Classify every field and resolve every relation. Parsing twice is a
    /// no-op; every model a relation points at must be registered.
    pub fn parse(&mut self, model: &Model, registry: &ModelRegister) -> Result<()> {
        if self.parsed {
            return Ok(());
        }
        let mut parsed = Self::new(model.name());
        for field in model.table().fields() {
            parsed.fields.push(field.name.clone());
            if field.localized {
                parsed.localized_fields.push(field.name.clone());
            }
            match &field.kind {
                FieldKind::Property { .. } => {
                    parsed.properties.push(field.name.clone());
                    if field.is_serialized() {
                        parsed.serialized_fields.push(field.name.clone());
                    }
                }
                FieldKind::BelongsTo(relation) => {
                    let meta = resolve_belongs_to(model, field, relation, registry)?;
                    parsed.belongs_to.push(field.name.clone());
                    parsed.relations.insert(field.name.clone(), meta);
                }
                FieldKind::HasOne(relation) | FieldKind::HasMany(relation) => {
                    let meta = resolve_has(model, field, relation, registry)?;
                    if meta.kind == RelationKind::HasOne {
                        parsed.has_one.push(field.name.clone());
                    } else {
                        parsed.has_many.push(field.name.clone());
                    }
                    parsed.relations.insert(field.name.clone(), meta);
                }
            }
        }
        parsed.localized_model = registry.localized_model(model.name()).map(str::to_string);
        parsed.unlinked_models = registry.unlinked_models(model.name())?.to_vec();
        parsed.parsed = true;
        *self = parsed;
        Ok(())
    }

    fn ensure_parsed(&self) -> Result<()> {
        if self.parsed {
            Ok(())
        } else {
            Err(UsageError::MetaNotParsed(self.model.clone()).into())
        }
    }

    /// Every field name in table order
    pub fn fields(&self) -> Result<&[String]> {
        self.ensure_parsed()?;
        Ok(&self.fields)
    }

    pub fn properties(&self) -> Result<&[String]> {
        self.ensure_parsed()?;
        Ok(&self.properties)
    }

    pub fn belongs_to(&self) -> Result<&[String]> {
        self.ensure_parsed()?;
        Ok(&self.belongs_to)
    }

    pub fn has_one(&self) -> Result<&[String]> {
        self.ensure_parsed()?;
        Ok(&self.has_one)
    }

    pub fn has_many(&self) -> Result<&[String]> {
        self.ensure_parsed()?;
        Ok(&self.has_many)
    }

    pub fn localized_fields(&self) -> Result<&[String]> {
        self.ensure_parsed()?;
        Ok(&self.localized_fields)
    }

    /// Properties stored as serialized JSON
    pub fn serialized_fields(&self) -> Result<&[String]> {
        self.ensure_parsed()?;
        Ok(&self.serialized_fields)
    }

    pub fn is_localized(&self) -> Result<bool> {
        self.ensure_parsed()?;
        Ok(!self.localized_fields.is_empty())
    }

    pub fn is_localized_field(&self, name: &str) -> Result<bool> {
        self.ensure_parsed()?;
        Ok(self.localized_fields.iter().any(|field| field == name))
    }

    /// Name of the localized shadow model
    pub fn localized_model(&self) -> Result<Option<&str>> {
        self.ensure_parsed()?;
        Ok(self.localized_model.as_deref())
    }

    pub fn unlinked_models(&self) -> Result<&[String]> {
        self.ensure_parsed()?;
        Ok(&self.unlinked_models)
    }

    pub fn is_relation(&self, name: &str) -> Result<bool> {
        self.ensure_parsed()?;
        Ok(self.relations.contains_key(name))
    }

    pub fn has_relation_fields(&self) -> Result<bool> {
        self.ensure_parsed()?;
        Ok(!self.relations.is_empty())
    }

    /// Every relation in table order
    pub fn relations(&self) -> Result<Vec<&RelationMeta>> {
        self.ensure_parsed()?;
        Ok(self
            .fields
            .iter()
            .filter_map(|field| self.relations.get(field))
            .collect())
    }

    /// Metadata of one relation field
    pub fn relation_meta(&self, name: &str) -> Result<&RelationMeta> {
        self.ensure_parsed()?;
        self.relations.get(name).ok_or_else(|| {
            UsageError::NotARelationField {
                model: self.model.clone(),
                field: name.to_string(),
            }
            .into()
        })
    }

    /// Compact serializable form
    pub fn to_cacheable(&self) -> Result<CompactMeta> {
        self.ensure_parsed()?;
        Ok(CompactMeta {
            model: self.model.clone(),
            fields: self.fields.clone(),
            properties: self.properties.clone(),
            belongs_to: self.belongs_to.clone(),
            has_one: self.has_one.clone(),
            has_many: self.has_many.clone(),
            localized_fields: self.localized_fields.clone(),
            serialized_fields: self.serialized_fields.clone(),
            relations: self.relations().map(|relations| relations.into_iter().cloned().collect())?,
            localized_model: self.localized_model.clone(),
            unlinked_models: self.unlinked_models.clone(),
        })
    }

    /// Rebuild parsed metadata from its compact form, checked against the
    /// live schema.
    pub fn from_cacheable(compact: CompactMeta, registry: &ModelRegister) -> Result<Self> {
        let model = registry.get(&compact.model)?;
        if let Some(missing) = compact.fields.iter().find(|name| model.field(name).is_none()) {
            return Err(OrmError::Data(format!(
                "cached metadata of {} refers to unknown field {missing}",
                compact.model
            )));
        }
        if let Some(relation) = compact
            .relations
            .iter()
            .find(|relation| !registry.has(&relation.model))
        {
            return Err(OrmError::Data(format!(
                "cached metadata of {} refers to unknown model {}",
                compact.model, relation.model
            )));
        }
        Ok(Self {
            model: compact.model,
            parsed: true,
            fields: compact.fields,
            properties: compact.properties,
            belongs_to: compact.belongs_to,
            has_one: compact.has_one,
            has_many: compact.has_many,
            localized_fields: compact.localized_fields,
            serialized_fields: compact.serialized_fields,
            relations: compact
                .relations
                .into_iter()
                .map(|relation| (relation.field.clone(), relation))
                .collect(),
            localized_model: compact.localized_model,
            unlinked_models: compact.unlinked_models,
        })
    }
}

fn unknown_target(model: &Model, field: &Field, target: &str) -> OrmError {
    ConfigError::UnknownRelationModel {
        model: model.name().to_string(),
        field: field.name.clone(),
        target: target.to_string(),
    }
    .into()
}

fn relation_meta(
    model: &Model,
    field: &Field,
    relation: &Relation,
    foreign_key: ForeignKey,
    link_model: Option<String>,
) -> Option<RelationMeta> {
    Some(RelationMeta {
        field: field.name.clone(),
        kind: field.relation_kind()?,
        model: relation.model.clone(),
        foreign_key,
        link_model,
        is_relation_with_self: relation.model == model.name(),
        dependant: relation.dependant,
        block_delete: relation.block_delete,
        order: relation.order.clone(),
        index_on: relation.index_on.clone(),
        localized: field.localized,
    })
}

fn resolve_belongs_to(
    model: &Model,
    field: &Field,
    relation: &Relation,
    registry: &ModelRegister,
) -> Result<RelationMeta> {
    let target = registry
        .get(&relation.model)
        .map_err(|_| unknown_target(model, field, &relation.model))?;

    // A localized inverse lives in the target's shadow model, so the link
    // model cannot be derived from this side.
    let back: Vec<&Field> = target
        .table()
        .fields()
        .iter()
        .filter(|back| back.is_has() && back.target() == Some(model.name()))
        .collect();
    if let [inverse] = back.as_slice() {
        if inverse.localized && relation.link_model.is_none() {
            return Err(ConfigError::MissingLinkModel {
                model: model.name().to_string(),
                field: field.name.clone(),
            }
            .into());
        }
    }

    let foreign_key = ForeignKey::Single {
        field: field.name.clone(),
    };
    relation_meta(model, field, relation, foreign_key, relation.link_model.clone())
        .ok_or_else(|| unknown_target(model, field, &relation.model))
}

fn resolve_has(
    model: &Model,
    field: &Field,
    relation: &Relation,
    registry: &ModelRegister,
) -> Result<RelationMeta> {
    if !registry.has(&relation.model) {
        return Err(unknown_target(model, field, &relation.model));
    }

    // Localized has-fields are resolved on the shadow model's copy; their
    // keys point at shadow rows.
    let (key_model, resolved) = if field.localized {
        let shadow_name = registry.localized_model(model.name()).ok_or_else(|| {
            ConfigError::InvalidModel {
                model: model.name().to_string(),
                reason: format!("localized field {} has no shadow model", field.name),
            }
        })?;
        let copy = registry
            .get(shadow_name)?
            .field(&field.name)
            .and_then(Field::relation)
            .cloned()
            .ok_or_else(|| ConfigError::MissingLinkModel {
                model: model.name().to_string(),
                field: field.name.clone(),
            })?;
        (shadow_name.to_string(), copy)
    } else {
        (model.name().to_string(), relation.clone())
    };

    let candidates_in = |holder: &Model, pointing_at: &str| -> Vec<String> {
        holder
            .table()
            .fields()
            .iter()
            .filter(|candidate| {
                candidate.is_belongs_to()
                    && !candidate.localized
                    && candidate.target() == Some(pointing_at)
            })
            .map(|candidate| candidate.name.clone())
            .collect()
    };

    let foreign_key = match &resolved.link_model {
        Some(link_name) => {
            let link = registry
                .get(link_name)
                .map_err(|_| unknown_target(model, field, link_name))?;
            let to_self = candidates_in(link, &key_model);
            if key_model == relation.model {
                match to_self.as_slice() {
                    [first, second] => ForeignKey::SelfLink {
                        first: first.clone(),
                        second: second.clone(),
                    },
                    _ => return Err(missing_or_ambiguous(model, field, link_name, to_self)),
                }
            } else {
                let to_self = pick_key(model, field, link_name, to_self, resolved.foreign_key.as_deref())?;
                let to_target = pick_key(
                    model,
                    field,
                    link_name,
                    candidates_in(link, &relation.model),
                    None,
                )?;
                ForeignKey::Link { to_self, to_target }
            }
        }
        None => {
            let target = registry.get(&relation.model)?;
            let candidates = candidates_in(target, &key_model);
            ForeignKey::Single {
                field: pick_key(
                    model,
                    field,
                    &relation.model,
                    candidates,
                    resolved.foreign_key.as_deref(),
                )?,
            }
        }
    };

    relation_meta(model, field, relation, foreign_key, resolved.link_model.clone())
        .ok_or_else(|| unknown_target(model, field, &relation.model))
}

fn missing_or_ambiguous(model: &Model, field: &Field, holder: &str, candidates: Vec<String>) -> OrmError {
    if candidates.is_empty() {
        ConfigError::MissingForeignKey {
            model: model.name().to_string(),
            field: field.name.clone(),
            target: holder.to_string(),
        }
        .into()
    } else {
        ConfigError::AmbiguousForeignKey {
            model: model.name().to_string(),
            field: field.name.clone(),
            candidates,
        }
        .into()
    }
}

fn pick_key(
    model: &Model,
    field: &Field,
    holder: &str,
    candidates: Vec<String>,
    explicit: Option<&str>,
) -> Result<String> {
    match explicit {
        Some(explicit) if candidates.iter().any(|candidate| candidate == explicit) => {
            Ok(explicit.to_string())
        }
        Some(_) => Err(missing_or_ambiguous(model, field, holder, Vec::new())),
        None if candidates.len() == 1 => Ok(candidates.into_iter().next().unwrap_or_default()),
        None => Err(missing_or_ambiguous(model, field, holder, candidates)),
    }
}
