//! Load state of entries read from storage.

use super::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which fields were loaded and what was last persisted for each of them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyState {
    loaded: BTreeSet<String>,
    persisted: BTreeMap<String, FieldValue>,
}

impl ProxyState {
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }

    /// A field counts as changed when it was never loaded and holds a value,
    /// or when its value differs from the persisted one. Unloaded fields still
    /// at their empty default are left alone.
    pub fn has_changed(&self, name: &str, value: &FieldValue) -> bool {
        if !self.is_loaded(name) {
            return !is_empty_default(value);
        }
        match self.persisted.get(name) {
            Some(persisted) => !same_value(persisted, value),
            None => true,
        }
    }

    pub fn persisted(&self, name: &str) -> Option<&FieldValue> {
        self.persisted.get(name)
    }

    pub fn mark_loaded(&mut self, name: &str, value: FieldValue) {
        self.loaded.insert(name.to_string());
        self.persisted.insert(name.to_string(), value);
    }

    /// Names of every loaded field
    pub fn loaded_fields(&self) -> impl Iterator<Item = &str> {
        self.loaded.iter().map(String::as_str)
    }
}

// Relations compare by reference: a nested entry and the raw foreign key of
// the same row are the same persisted value. Collections compare by ids.
fn same_value(persisted: &FieldValue, current: &FieldValue) -> bool {
    match (persisted, current) {
        (FieldValue::Entry(_), _) | (_, FieldValue::Entry(_)) => {
            persisted.reference_id() == current.reference_id()
        }
        (
            FieldValue::Entries(_) | FieldValue::Keyed(_),
            FieldValue::Entries(_) | FieldValue::Keyed(_),
        ) => collection_ids(persisted) == collection_ids(current),
        _ => persisted == current || (persisted.is_null() && current.is_null()),
    }
}

fn is_empty_default(value: &FieldValue) -> bool {
    match value {
        FieldValue::Entries(entries) => entries.is_empty(),
        FieldValue::Keyed(entries) => entries.is_empty(),
        other => other.is_null(),
    }
}

fn collection_ids(value: &FieldValue) -> Vec<Option<String>> {
    value
        .entries()
        .into_iter()
        .map(|entry| entry.id().map(|id| id.key()))
        .collect()
}
