//! Relation expansion after the main statement ran.
//!
//! Every relation the compiled statement did not join is fetched with one
//! sub-query per owning entry. Sub-queries inherit the locale settings and
//! run one hop shallower, so a query with depth N never materializes hop N+1.

use super::model_query::ModelQuery;
use super::parser::CompiledQuery;
use crate::entry::{Entry, FieldValue};
use crate::error::{OrmError, Result};
use crate::expr::{field, Order};
use crate::schema::{ForeignKey, RelationKind, RelationMeta};
use crate::value::Value;

/// Fetch the deferred relations of every entry
pub(crate) fn expand(query: &ModelQuery<'_>, compiled: &CompiledQuery, entries: &mut [Entry]) -> Result<()> {
    let depth = compiled.depth;
    for entry in entries.iter_mut() {
        for name in &compiled.deferred {
            let relation = query.meta().relation_meta(name)?;
            let value = fetch_belongs_to(query, relation, entry, depth)?;
            entry.set(name, value);
            entry.mark_loaded(name);
        }
        for name in &compiled.has {
            let relation = query.meta().relation_meta(name)?;
            let related = fetch_has(query, relation, entry, depth)?;
            let value = collect(relation, related);
            entry.set(name, value);
            entry.mark_loaded(name);
        }
    }
    Ok(())
}

fn fetch_belongs_to(
    query: &ModelQuery<'_>,
    relation: &RelationMeta,
    entry: &Entry,
    depth: u32,
) -> Result<FieldValue> {
    let Some(key) = entry.value(&relation.field).filter(|key| !key.is_null()) else {
        return Ok(FieldValue::Null);
    };
    let target = query.registry.get(&relation.model)?;
    let mut sub = query.sub_query(&relation.model, depth.saturating_sub(1))?;
    sub.add_condition(field(target.primary_key()).eq(key.clone()));
    Ok(sub.query_first()?.map_or(FieldValue::Null, FieldValue::from))
}

fn fetch_has(
    query: &ModelQuery<'_>,
    relation: &RelationMeta,
    entry: &Entry,
    depth: u32,
) -> Result<Vec<Entry>> {
    // Localized has-fields point at the localized row of the owner
    let owner = if relation.localized {
        entry.localized_id()
    } else {
        entry.id()
    };
    let Some(owner) = owner.cloned() else {
        return Ok(Vec::new());
    };

    match &relation.foreign_key {
        ForeignKey::Single { field: key } => {
            let mut sub = query.sub_query(&relation.model, depth.saturating_sub(1))?;
            sub.add_condition(field(key.as_str()).eq(owner));
            if depth == 1 {
                if let Some(order) = &relation.order {
                    sub.add_order(order)?;
                }
            }
            sub.query()
        }
        ForeignKey::Link { to_self, to_target } => {
            let mut sub = link_query(query, relation, depth)?;
            let link_key = query_key(&sub)?;
            sub.set_fields([link_key, to_target.clone()])
                .add_condition(field(to_self.as_str()).eq(owner));
            Ok(sub
                .query()?
                .into_iter()
                .filter_map(|mut link| take_related(&mut link, to_target))
                .collect())
        }
        ForeignKey::SelfLink { first, second } => {
            let mut sub = link_query(query, relation, depth)?;
            let link_key = query_key(&sub)?;
            sub.set_fields([link_key, first.clone(), second.clone()])
                .add_condition(
                    field(first.as_str())
                        .eq(owner.clone())
                        .or(field(second.as_str()).eq(owner.clone())),
                );
            Ok(sub
                .query()?
                .into_iter()
                .filter_map(|link| other_side(link, first, second, &owner))
                .collect())
        }
    }
}

/// Query on the link model of a relation, ordered by link id. The link
/// adds one hop, so the opposite side is resolved with the current depth.
fn link_query<'a>(query: &ModelQuery<'a>, relation: &RelationMeta, depth: u32) -> Result<ModelQuery<'a>> {
    let link_model = relation.link_model.as_deref().ok_or_else(|| {
        OrmError::Data(format!(
            "relation {}.{} has no link model",
            query.model(),
            relation.field
        ))
    })?;
    let mut sub = query.sub_query(link_model, depth)?;
    let primary_key = query_key(&sub)?;
    sub.add_order_by(field(primary_key), Order::Asc);
    Ok(sub)
}

fn query_key(query: &ModelQuery<'_>) -> Result<String> {
    Ok(query.registry.get(query.model())?.primary_key().to_string())
}

fn take_related(link: &mut Entry, name: &str) -> Option<Entry> {
    match link.remove_field(name)? {
        FieldValue::Entry(entry) => Some(*entry),
        _ => None,
    }
}

/// The side of a self-link row that is not the owner
fn other_side(mut link: Entry, first: &str, second: &str, owner: &Value) -> Option<Entry> {
    let is_owner = |entry: &Option<Entry>| {
        entry
            .as_ref()
            .and_then(Entry::id)
            .is_some_and(|id| id.key() == owner.key())
    };
    let first_entry = take_related(&mut link, first);
    let second_entry = take_related(&mut link, second);
    match (is_owner(&first_entry), is_owner(&second_entry)) {
        (true, true) => {
            log::warn!(
                "link {} of {} points at the owner on both sides",
                link.id().map(Value::to_string).unwrap_or_default(),
                link.model()
            );
            first_entry
        }
        (false, _) => first_entry,
        (true, false) => second_entry,
    }
}

/// Shape fetched entries for the relation kind
fn collect(relation: &RelationMeta, related: Vec<Entry>) -> FieldValue {
    match relation.kind {
        RelationKind::HasOne | RelationKind::BelongsTo => {
            related.into_iter().next().map_or(FieldValue::Null, FieldValue::from)
        }
        RelationKind::HasMany => match &relation.index_on {
            Some(index_on) => FieldValue::Keyed(
                related
                    .into_iter()
                    .map(|entry| {
                        let key = entry.value(index_on).map(Value::key).unwrap_or_default();
                        (key, entry)
                    })
                    .collect(),
            ),
            None => FieldValue::Entries(related),
        },
    }
}
