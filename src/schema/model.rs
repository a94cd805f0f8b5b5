//! Model and table definitions.

use crate::error::{ConfigError, Result};
use crate::schema::behaviour::Behaviour;
use crate::schema::field::{Field, PropertyType};
use crate::schema::meta::ModelMeta;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name of the primary key every table starts with
pub const PRIMARY_KEY: &str = "id";

/// An index over one or more fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// Ordered field list plus indexes, formats and free-form options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    indexes: Vec<Index>,
    /// Named display formats, e.g. `title => "{title} ({id})"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    formats: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    options: BTreeMap<String, String>,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            fields: vec![Field::primary_key(PRIMARY_KEY)],
            indexes: Vec::new(),
            formats: BTreeMap::new(),
            options: BTreeMap::new(),
        }
    }
}

impl Table {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Add a field, replacing an existing field with the same name
    pub fn add_field(&mut self, field: Field) {
        match self.field_mut(&field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        let position = self.fields.iter().position(|field| field.name == name)?;
        Some(self.fields.remove(position))
    }

    /// Name of the primary key field
    pub fn primary_key(&self) -> &str {
        self.fields
            .iter()
            .find(|field| field.is_primary_key())
            .map_or(PRIMARY_KEY, |field| field.name.as_str())
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn add_index(&mut self, index: Index) {
        self.indexes.retain(|existing| existing.name != index.name);
        self.indexes.push(index);
    }

    pub fn formats(&self) -> &BTreeMap<String, String> {
        &self.formats
    }

    pub fn set_format(&mut self, name: impl Into<String>, format: impl Into<String>) {
        self.formats.insert(name.into(), format.into());
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.options.insert(name.into(), value.into());
    }

    pub fn has_localized_fields(&self) -> bool {
        self.fields.iter().any(|field| field.localized)
    }

    pub fn has_relation_fields(&self) -> bool {
        self.fields.iter().any(Field::is_relation)
    }

    fn validate(&self, model: &str) -> Result<()> {
        let invalid = |reason: String| ConfigError::InvalidModel {
            model: model.to_string(),
            reason,
        };

        let keys = self.fields.iter().filter(|field| field.is_primary_key()).count();
        if keys != 1 {
            return Err(invalid(format!("expected exactly one primary key, found {keys}")).into());
        }

        let mut seen = std::collections::BTreeSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name.contains('.') || field.name.contains("__") {
                return Err(invalid(format!("invalid field name '{}'", field.name)).into());
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)).into());
            }
            if field.is_primary_key() && field.localized {
                return Err(invalid("the primary key cannot be localized".to_string()).into());
            }
        }
        Ok(())
    }
}

/// A named entity type
#[derive(Clone, Serialize, Deserialize)]
pub struct Model {
    name: String,
    #[serde(default)]
    table: Table,
    #[serde(skip)]
    behaviours: Vec<Arc<dyn Behaviour>>,
    /// Parsed metadata, filled lazily by the registry
    #[serde(skip)]
    pub(crate) meta: OnceCell<Arc<ModelMeta>>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("behaviours", &self.behaviours.len())
            .finish()
    }
}

impl Model {
    /// A model with only a primary key
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: Table::default(),
            behaviours: Vec::new(),
            meta: OnceCell::new(),
        }
    }

    /// Builder style field addition
    pub fn with_field(mut self, field: Field) -> Self {
        self.table.add_field(field);
        self
    }

    /// Builder style property addition
    pub fn with_property(self, name: impl Into<String>, property_type: PropertyType) -> Self {
        self.with_field(Field::property(name, property_type))
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.table.add_index(index);
        self
    }

    pub fn with_behaviour(mut self, behaviour: Arc<dyn Behaviour>) -> Self {
        self.behaviours.push(behaviour);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.table.field(name)
    }

    pub fn primary_key(&self) -> &str {
        self.table.primary_key()
    }

    pub fn behaviours(&self) -> &[Arc<dyn Behaviour>] {
        &self.behaviours
    }

    pub fn add_behaviour(&mut self, behaviour: Arc<dyn Behaviour>) {
        self.behaviours.push(behaviour);
    }

    /// Check the table is usable: one primary key, unique and valid field names
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidModel {
                model: self.name.clone(),
                reason: "empty model name".to_string(),
            }
            .into());
        }
        self.table.validate(&self.name)
    }
}
