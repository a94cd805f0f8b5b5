//! Field definitions of a model table.
//!
//! A field is either a plain property or one of the three relation kinds.
//! Relation fields carry the name of the model they point at plus the hints
//! the registry and the metadata resolver use to find the foreign key: an
//! explicit foreign key name, an explicit link model name and the
//! `dependant` flag which makes deletes cascade.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Storage type of a property field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// Auto-incremented primary key
    Pk,
    Boolean,
    Integer,
    Float,
    String,
    Text,
    Date,
    DateTime,
    /// Opaque value stored as serialized JSON text
    Serialize,
}

/// Kind of a relation field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// Many-to-one: this model's table stores the foreign key
    BelongsTo,
    /// One-to-one: the other side (or a link model) stores the foreign key
    HasOne,
    /// One-to-many or many-to-many
    HasMany,
}

/// Relation part of a relation field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Name of the related model
    pub model: String,
    /// Explicit foreign key, used to pick one out of several candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    /// Explicit link model for many-to-many relations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_model: Option<String>,
    /// Delete related entries together with the owner
    #[serde(default)]
    pub dependant: bool,
    /// Refuse to delete the target while entries still point at it
    #[serde(default)]
    pub block_delete: bool,
    /// Ordering of has-many results, e.g. `"name ASC, id DESC"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    /// Field of the related model used as key of has-many results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_on: Option<String>,
}

impl Relation {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            foreign_key: None,
            link_model: None,
            dependant: false,
            block_delete: false,
            order: None,
            index_on: None,
        }
    }
}

/// What a field stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldKind {
    Property { property_type: PropertyType },
    BelongsTo(Relation),
    HasOne(Relation),
    HasMany(Relation),
}

/// A named validator and its options; executed outside the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    pub name: String,
    #[serde(default)]
    pub options: Vec<(String, String)>,
}

/// A field of a model table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Stored per locale in the localized shadow model
    #[serde(default)]
    pub localized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<ValidatorSpec>,
}

impl Field {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            localized: false,
            default: None,
            validators: Vec::new(),
        }
    }

    /// Plain property field
    pub fn property(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self::with_kind(name, FieldKind::Property { property_type })
    }

    /// Primary key field
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self::property(name, PropertyType::Pk)
    }

    pub fn belongs_to(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::BelongsTo(Relation::new(model)))
    }

    pub fn has_one(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::HasOne(Relation::new(model)))
    }

    pub fn has_many(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::HasMany(Relation::new(model)))
    }

    /// Mark the field as localized
    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_validator(mut self, name: impl Into<String>) -> Self {
        self.validators.push(ValidatorSpec {
            name: name.into(),
            options: Vec::new(),
        });
        self
    }

    /// Set the explicit foreign key of a relation field
    pub fn with_foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.foreign_key = Some(foreign_key.into());
        }
        self
    }

    /// Set the explicit link model of a relation field
    pub fn with_link_model(mut self, link_model: impl Into<String>) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.link_model = Some(link_model.into());
        }
        self
    }

    /// Make deletes of the owner cascade through this relation
    pub fn dependant(mut self) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.dependant = true;
        }
        self
    }

    /// Refuse deletes of the target while this relation still points at it
    pub fn block_delete(mut self) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.block_delete = true;
        }
        self
    }

    /// Order has-many results
    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.order = Some(order.into());
        }
        self
    }

    /// Key has-many results by a field of the related model
    pub fn with_index_on(mut self, index_on: impl Into<String>) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.index_on = Some(index_on.into());
        }
        self
    }

    pub fn property_type(&self) -> Option<PropertyType> {
        match &self.kind {
            FieldKind::Property { property_type } => Some(*property_type),
            _ => None,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.property_type() == Some(PropertyType::Pk)
    }

    pub fn relation_kind(&self) -> Option<RelationKind> {
        match &self.kind {
            FieldKind::Property { .. } => None,
            FieldKind::BelongsTo(_) => Some(RelationKind::BelongsTo),
            FieldKind::HasOne(_) => Some(RelationKind::HasOne),
            FieldKind::HasMany(_) => Some(RelationKind::HasMany),
        }
    }

    pub fn relation(&self) -> Option<&Relation> {
        match &self.kind {
            FieldKind::Property { .. } => None,
            FieldKind::BelongsTo(relation)
            | FieldKind::HasOne(relation)
            | FieldKind::HasMany(relation) => Some(relation),
        }
    }

    pub fn relation_mut(&mut self) -> Option<&mut Relation> {
        match &mut self.kind {
            FieldKind::Property { .. } => None,
            FieldKind::BelongsTo(relation)
            | FieldKind::HasOne(relation)
            | FieldKind::HasMany(relation) => Some(relation),
        }
    }

    pub fn is_relation(&self) -> bool {
        self.relation().is_some()
    }

    pub fn is_belongs_to(&self) -> bool {
        self.relation_kind() == Some(RelationKind::BelongsTo)
    }

    /// Has-one or has-many
    pub fn is_has(&self) -> bool {
        matches!(
            self.relation_kind(),
            Some(RelationKind::HasOne | RelationKind::HasMany)
        )
    }

    /// Name of the related model, for relation fields
    pub fn target(&self) -> Option<&str> {
        self.relation().map(|relation| relation.model.as_str())
    }

    /// Whether reads need to deserialize the stored value
    pub fn is_serialized(&self) -> bool {
        self.property_type() == Some(PropertyType::Serialize)
    }
}
