//! Turning flat result rows back into entries.

use super::parser::{ALIAS_SEPARATOR, IS_LOCALIZED_COLUMN, LOCALIZED_ID_COLUMN};
use crate::engine::Row;
use crate::entry::{Entry, FieldValue};
use crate::error::Result;
use crate::schema::{ModelMeta, ModelRegister, RelationKind};
use crate::value::Value;
use std::collections::BTreeMap;

/// Materializes rows of one compiled query
pub struct ResultParser<'r> {
    registry: &'r ModelRegister,
    meta: &'r ModelMeta,
    locale: &'r str,
}

impl<'r> ResultParser<'r> {
    pub fn new(registry: &'r ModelRegister, meta: &'r ModelMeta, locale: &'r str) -> Self {
        Self {
            registry,
            meta,
            locale,
        }
    }

    /// One row into one entry
    ///
    /// Plain columns become fields of the entry, `<field>__<column>` columns
    /// are gathered into the related entry of `field`. Relation fields the row
    /// did not carry are set to their empty default without being marked as
    /// loaded.
    pub fn parse_row(&self, row: &Row) -> Result<Entry> {
        let model = self.registry.get(self.meta.model())?;
        let mut entry = Entry::new(model.name(), model.primary_key());
        let mut related: BTreeMap<&str, Vec<(&str, &Value)>> = BTreeMap::new();
        let mut is_localized = None;

        for (name, value) in &row.columns {
            if name == IS_LOCALIZED_COLUMN {
                is_localized = Some(value.is_truthy());
            } else if name == LOCALIZED_ID_COLUMN {
                entry.set_localized_id(Some(value.clone()));
            } else if let Some((prefix, column)) = name.split_once(ALIAS_SEPARATOR) {
                related.entry(prefix).or_default().push((column, value));
            } else {
                let value = decode(self.meta, name, value)?;
                entry.set(name, value);
            }
        }

        for (prefix, columns) in related {
            if !self.meta.is_relation(prefix)? {
                log::warn!(
                    "ignoring columns of {prefix}: not a relation of {}",
                    self.meta.model()
                );
                continue;
            }
            let relation = self.meta.relation_meta(prefix)?;
            if !relation.is_belongs_to() {
                log::warn!(
                    "ignoring columns of {prefix}: {}.{prefix} is not joined inline",
                    self.meta.model()
                );
                continue;
            }
            let value = self
                .parse_related(&relation.model, &columns)?
                .map_or(FieldValue::Null, FieldValue::from);
            entry.set(prefix, value);
        }

        if self.meta.is_localized()? {
            entry.set_locale(self.locale);
            // Only known when the localized shadow was joined
            if let Some(is_localized) = is_localized {
                entry.set_localized(is_localized);
            }
        }
        entry.mark_persisted();
        set_relation_defaults(self.meta, &mut entry)?;
        Ok(entry)
    }

    /// Entry of a joined relation, `None` when the join found no row
    fn parse_related(&self, model_name: &str, columns: &[(&str, &Value)]) -> Result<Option<Entry>> {
        let model = self.registry.get(model_name)?;
        let meta = self.registry.meta(model_name)?;
        let primary_key = model.primary_key();

        let mut values = columns
            .iter()
            .filter(|(column, _)| *column != primary_key)
            .map(|(_, value)| *value)
            .peekable();
        let materialized = if values.peek().is_some() {
            values.any(|value| !value.is_empty())
        } else {
            columns.iter().any(|(_, value)| !value.is_null())
        };
        if !materialized {
            return Ok(None);
        }

        let mut entry = Entry::new(model_name, primary_key);
        let mut translated = false;
        for (column, value) in columns {
            if !value.is_null() && meta.is_localized_field(column)? {
                translated = true;
            }
            let value = decode(&meta, column, value)?;
            entry.set(column, value);
        }
        if meta.is_localized()? {
            entry.set_locale(self.locale);
            entry.set_localized(translated);
        }
        entry.mark_persisted();
        set_relation_defaults(&meta, &mut entry)?;
        Ok(Some(entry))
    }
}

/// Column value into field value, deserializing serialized properties
fn decode(meta: &ModelMeta, name: &str, value: &Value) -> Result<FieldValue> {
    if !meta.serialized_fields()?.iter().any(|field| field == name) {
        return Ok(FieldValue::Scalar(value.clone()));
    }
    if value.is_empty() {
        return Ok(FieldValue::Null);
    }
    match value.as_str().map(serde_json::from_str::<serde_json::Value>) {
        Some(Ok(data)) => Ok(FieldValue::Data(data)),
        Some(Err(err)) => {
            log::warn!("{}.{name} holds invalid serialized data: {err}", meta.model());
            Ok(FieldValue::Scalar(value.clone()))
        }
        None => Ok(FieldValue::Scalar(value.clone())),
    }
}

/// Null or empty collections for relation fields missing from the entry
pub(crate) fn set_relation_defaults(meta: &ModelMeta, entry: &mut Entry) -> Result<()> {
    for relation in meta.relations()? {
        if entry.values().contains_key(&relation.field) {
            continue;
        }
        let default = match relation.kind {
            RelationKind::HasMany => FieldValue::Entries(Vec::new()),
            RelationKind::BelongsTo | RelationKind::HasOne => FieldValue::Null,
        };
        entry.set(&relation.field, default);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Model, PropertyType};
    use pretty_assertions::assert_eq;

    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn registry() -> ModelRegister {
        let mut registry = ModelRegister::new();
        registry
            .register(Model::new("Author").with_property("name", PropertyType::String))
            .expect("author");
        registry
            .register(
                Model::new("Post")
                    .with_property("title", PropertyType::String)
                    .with_property("extra", PropertyType::Serialize)
                    .with_field(Field::belongs_to("author", "Author"))
                    .with_field(Field::has_many("comments", "Comment")),
            )
            .expect("post");
        registry
            .register(
                Model::new("Comment")
                    .with_property("text", PropertyType::Text)
                    .with_field(Field::belongs_to("post", "Post")),
            )
            .expect("comment");
        registry
    }

    fn row(columns: &[(&str, Value)]) -> Row {
        Row {
            columns: columns
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_row_is_unflattened() {
        let registry = registry();
        let meta = registry.meta("Post").expect("meta");
        let parser = ResultParser::new(&registry, &meta, "en");
        let entry = parser
            .parse_row(&row(&[
                ("id", Value::Int(1)),
                ("title", "Hello".into()),
                ("extra", r#"{"pinned":true}"#.into()),
                ("author__id", Value::Int(7)),
                ("author__name", "Jane".into()),
            ]))
            .expect("parse");

        assert_eq!(entry.id(), Some(&Value::Int(1)));
        assert_eq!(
            entry.values().get("extra"),
            Some(&FieldValue::Data(serde_json::json!({"pinned": true})))
        );
        let author = entry.related("author").expect("author");
        assert_eq!(author.value("name"), Some(&Value::from("Jane")));
        assert!(author.is_clean());
        assert!(entry.is_field_loaded("author"));
        assert_eq!(entry.values().get("comments"), Some(&FieldValue::Entries(Vec::new())));
        assert!(!entry.is_field_loaded("comments"));
        assert!(entry.is_clean());
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_empty_join_yields_null_relation() {
        let registry = registry();
        let meta = registry.meta("Post").expect("meta");
        let parser = ResultParser::new(&registry, &meta, "en");
        let entry = parser
            .parse_row(&row(&[
                ("id", Value::Int(1)),
                ("extra", Value::Null),
                ("author__id", Value::Null),
                ("author__name", Value::Null),
            ]))
            .expect("parse");
        assert_eq!(entry.values().get("author"), Some(&FieldValue::Null));
        assert_eq!(entry.values().get("extra"), Some(&FieldValue::Null));
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_unknown_prefix_is_skipped() {
        let registry = registry();
        let meta = registry.meta("Post").expect("meta");
        let parser = ResultParser::new(&registry, &meta, "en");
        let entry = parser
            .parse_row(&row(&[("id", Value::Int(1)), ("title__x", Value::Int(3))]))
            .expect("parse");
        assert!(!entry.values().contains_key("title"));
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_has_many_columns_never_become_an_entry() {
        let registry = registry();
        let meta = registry.meta("Post").expect("meta");
        let parser = ResultParser::new(&registry, &meta, "en");
        let entry = parser
            .parse_row(&row(&[
                ("id", Value::Int(1)),
                ("author", Value::Int(7)),
                ("author.name", "Jane".into()),
                ("comments__text", "Nice".into()),
            ]))
            .expect("parse");
        assert_eq!(entry.values().get("comments"), Some(&FieldValue::Entries(Vec::new())));
        assert_eq!(entry.values().get("author"), Some(&FieldValue::Scalar(Value::Int(7))));
        assert_eq!(entry.value("author.name"), Some(&Value::from("Jane")));
    }
}
