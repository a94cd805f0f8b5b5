//! Locale fallback for entries missing the requested locale.

use super::model_query::ModelQuery;
use crate::entry::Entry;
use crate::error::Result;
use crate::expr::field;
use crate::value::Value;
use std::collections::BTreeMap;

/// Fill the localized fields of unlocalized entries from the configured
/// locales, in preference order, until every entry found a translation.
///
/// Filled entries carry the locale their values came from and stay marked as
/// not localized.
pub(crate) fn fetch_unlocalized(query: &ModelQuery<'_>, entries: &mut [Entry]) -> Result<()> {
    let mut missing: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.is_localized() && entry.id().is_some())
        .map(|(index, _)| index)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let meta = query.meta();
    let primary_key = query.registry.get(query.model())?.primary_key().to_string();
    let properties = meta.properties()?;
    let localized: Vec<String> = meta
        .localized_fields()?
        .iter()
        .filter(|name| properties.contains(*name))
        .cloned()
        .collect();

    for locale in &query.config.locales {
        if missing.is_empty() {
            break;
        }
        if *locale == query.locale {
            continue;
        }

        let ids: Vec<Value> = missing
            .iter()
            .filter_map(|&index| entries[index].id().cloned())
            .collect();
        let mut sub = query.sub_query(query.model(), 0)?;
        sub.set_locale(locale.as_str())
            .set_include_unlocalized(false)
            .set_fields(std::iter::once(primary_key.clone()).chain(localized.iter().cloned()))
            .add_condition(field(primary_key.as_str()).is_in(ids));
        let found: BTreeMap<String, Entry> = sub
            .query()?
            .into_iter()
            .filter_map(|entry| Some((entry.id()?.key(), entry)))
            .collect();
        log::debug!(
            "{} of {} {} entries found in {locale}",
            found.len(),
            missing.len(),
            query.model()
        );

        missing.retain(|&index| {
            let entry = &mut entries[index];
            let Some(translation) = entry.id().and_then(|id| found.get(&id.key())) else {
                return true;
            };
            for name in &localized {
                if let Some(value) = translation.values().get(name) {
                    entry.set(name, value.clone());
                    entry.mark_loaded(name);
                }
            }
            entry.set_locale(locale.as_str());
            entry.set_localized(false);
            false
        });
    }
    Ok(())
}
