//! Materialized rows.
//!
//! An [`Entry`] is one row of one model, with its relation fields folded in as
//! nested entries. The engine only reads and writes entries through the
//! [`FieldAccess`] trait, so typed structs can take part by converting with
//! [`FromEntry`].
//!
//! Entries loaded from storage carry a [`ProxyState`] that remembers which
//! fields were loaded and what was last persisted, which is what partial
//! updates and clean-entry detection are built on.

pub mod proxy;

#[doc(inline)]
pub use proxy::ProxyState;

use crate::error::{OrmError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The value of one field of an entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    /// No value, also the state of an unresolved relation
    #[default]
    Null,
    /// Scalar property or raw foreign key
    Scalar(Value),
    /// Deserialized opaque value
    Data(serde_json::Value),
    /// Resolved belongs-to or has-one relation
    Entry(Box<Entry>),
    /// Resolved has-many relation
    Entries(Vec<Entry>),
    /// Resolved has-many relation keyed by its index-on field
    Keyed(Vec<(String, Entry)>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Scalar(value) => value.is_null(),
            FieldValue::Data(data) => data.is_null(),
            _ => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            FieldValue::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    /// Entries of a collection value, in order
    pub fn entries(&self) -> Vec<&Entry> {
        match self {
            FieldValue::Entry(entry) => vec![entry.as_ref()],
            FieldValue::Entries(entries) => entries.iter().collect(),
            FieldValue::Keyed(entries) => entries.iter().map(|(_, entry)| entry).collect(),
            _ => Vec::new(),
        }
    }

    /// Id of the referenced entry: the id of a nested entry or a raw
    /// foreign key value
    pub fn reference_id(&self) -> Option<Value> {
        match self {
            FieldValue::Scalar(value) if !value.is_null() => Some(value.clone()),
            FieldValue::Entry(entry) => entry.id().cloned(),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Scalar(value)
    }
}

macro_rules! impl_field_value_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Scalar(value.into())
                }
            }
        )*
    };
}

impl_field_value_from_scalar!(bool, i32, i64, u32, f64, &str, String);

impl From<Entry> for FieldValue {
    fn from(entry: Entry) -> Self {
        FieldValue::Entry(Box::new(entry))
    }
}

impl From<Vec<Entry>> for FieldValue {
    fn from(entries: Vec<Entry>) -> Self {
        FieldValue::Entries(entries)
    }
}

/// Field accessor the engine depends on instead of concrete entry types
pub trait FieldAccess {
    fn get_field(&self, name: &str) -> Option<&FieldValue>;
    fn set_field(&mut self, name: &str, value: FieldValue);
}

/// Conversion from a dynamic entry into a typed struct
pub trait FromEntry: Sized {
    fn from_entry(entry: Entry) -> Result<Self>;
}

impl FromEntry for Entry {
    fn from_entry(entry: Entry) -> Result<Self> {
        Ok(entry)
    }
}

/// One materialized row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    model: String,
    primary_key: String,
    values: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locale: Option<String>,
    #[serde(default)]
    localized: bool,
    /// Id of the localized shadow row the values were read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    localized_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proxy: Option<ProxyState>,
}

impl Entry {
    /// A new, unsaved entry
    pub fn new(model: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            primary_key: primary_key.into(),
            values: BTreeMap::new(),
            locale: None,
            localized: false,
            localized_id: None,
            proxy: None,
        }
    }

    /// Builder style value assignment
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set_field(name, value.into());
        self
    }

    /// Assign a field value
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.set_field(name, value.into());
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Primary key value, `None` for new entries
    pub fn id(&self) -> Option<&Value> {
        self.values
            .get(&self.primary_key)
            .and_then(FieldValue::as_scalar)
            .filter(|value| !value.is_null())
    }

    pub fn set_id(&mut self, id: Value) {
        let primary_key = self.primary_key.clone();
        self.values.insert(primary_key, FieldValue::Scalar(id));
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Scalar value of a field
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(FieldValue::as_scalar)
    }

    /// Nested entry of a belongs-to or has-one field
    pub fn related(&self, name: &str) -> Option<&Entry> {
        self.values.get(name).and_then(FieldValue::as_entry)
    }

    /// Entries of a has-many field, in order
    pub fn related_all(&self, name: &str) -> Vec<&Entry> {
        self.values.get(name).map(FieldValue::entries).unwrap_or_default()
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn remove_field(&mut self, name: &str) -> Option<FieldValue> {
        self.values.remove(name)
    }

    /// Locale the localized values were read in
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = Some(locale.into());
    }

    /// Whether the localized values match the requested locale
    pub fn is_localized(&self) -> bool {
        self.localized
    }

    pub fn set_localized(&mut self, localized: bool) {
        self.localized = localized;
    }

    pub fn localized_id(&self) -> Option<&Value> {
        self.localized_id.as_ref()
    }

    pub fn set_localized_id(&mut self, id: Option<Value>) {
        self.localized_id = id.filter(|id| !id.is_null());
    }

    pub fn proxy(&self) -> Option<&ProxyState> {
        self.proxy.as_ref()
    }

    /// Whether this entry was loaded from storage
    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Whether the field was loaded from storage (always true for plain entries)
    pub fn is_field_loaded(&self, name: &str) -> bool {
        self.proxy.as_ref().map_or(true, |proxy| proxy.is_loaded(name))
    }

    /// Fields to write on save: every set field for plain entries, only the
    /// loaded-and-changed ones for proxies.
    pub fn changed_fields(&self) -> Vec<&str> {
        match &self.proxy {
            None => self.values.keys().map(String::as_str).collect(),
            Some(proxy) => self
                .values
                .iter()
                .filter(|(name, value)| proxy.has_changed(name, value))
                .map(|(name, _)| name.as_str())
                .collect(),
        }
    }

    /// A loaded entry nobody touched since; saving it is a no-op
    pub fn is_clean(&self) -> bool {
        self.proxy.is_some() && !self.is_new() && self.changed_fields().is_empty()
    }

    /// Last persisted value of a field
    pub fn persisted(&self, name: &str) -> Option<&FieldValue> {
        self.proxy.as_ref().and_then(|proxy| proxy.persisted(name))
    }

    /// Record the current values as the persisted state
    pub fn mark_persisted(&mut self) {
        let proxy = self.proxy.get_or_insert_with(ProxyState::default);
        for (name, value) in &self.values {
            proxy.mark_loaded(name, value.clone());
        }
    }

    /// Record a single field as loaded with the given persisted value
    pub fn mark_loaded(&mut self, name: &str) {
        let value = self.values.get(name).cloned().unwrap_or_default();
        self.proxy
            .get_or_insert_with(ProxyState::default)
            .mark_loaded(name, value);
    }

    /// Convert into a typed struct
    pub fn into_typed<T: FromEntry>(self) -> Result<T> {
        T::from_entry(self)
    }

    /// Scalar value of a required field, as a data error when missing
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.value(name)
            .ok_or_else(|| OrmError::Data(format!("{}.{} has no value", self.model, name)))
    }
}

impl FieldAccess for Entry {
    fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    fn set_field(&mut self, name: &str, value: FieldValue) {
        self.values.insert(name.to_string(), value);
    }
}
