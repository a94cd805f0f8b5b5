//! Caching of compiled statements and query results.
//!
//! [`CacheableModelQuery`] decorates a [`ModelQuery`] with two cache levels
//! stored in any [`CachePool`]:
//!
//! - the compiled statement, keyed by the structural template of the query
//!   (bound values replaced by placeholders) and the registry generation, so
//!   queries differing only in their values share one compilation;
//! - the materialized result, keyed by the template, the bound values,
//!   limit/offset and the data generation the façade bumps on every write.
//!
//! Keys are SHA-256 digests in hexadecimal.

use crate::entry::Entry;
use crate::error::Result;
use crate::query::model_query::bind_placeholders;
use crate::query::{CompiledQuery, ModelQuery};
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One cached value with its validity flag and free-form metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    pub value: serde_json::Value,
    pub is_valid: bool,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl CacheItem {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            is_valid: true,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Key-value store for cache items
///
/// Implementations are externally synchronized; methods take `&self`.
pub trait CachePool: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheItem>;

    /// Store an item; `None` keeps it until invalidated
    fn set(&self, key: &str, item: CacheItem, ttl: Option<Duration>);

    fn invalidate(&self, key: &str);
}

/// Hit and miss counters of a [`MemoryCachePool`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub size: usize,
}

struct CachedEntry {
    item: CacheItem,
    expires_at: Option<Instant>,
}

/// Cache pool keeping items in process memory
#[derive(Default)]
pub struct MemoryCachePool {
    entries: Mutex<HashMap<String, CachedEntry>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MemoryCachePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.lock().map(|entries| entries.len()).unwrap_or_default(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl CachePool for MemoryCachePool {
    fn get(&self, key: &str) -> Option<CacheItem> {
        let mut entries = self.entries.lock().ok()?;
        let expired = entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|expires_at| expires_at <= Instant::now());
        if expired {
            entries.remove(key);
        }
        let item = entries.get(key).map(|entry| entry.item.clone());
        let counter = if item.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        item
    }

    fn set(&self, key: &str, item: CacheItem, ttl: Option<Duration>) {
        if let Ok(mut entries) = self.entries.lock() {
            let expires_at = ttl.map(|ttl| Instant::now() + ttl);
            entries.insert(key.to_string(), CachedEntry { item, expires_at });
        }
    }

    fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// A [`ModelQuery`] reading through a cache pool
pub struct CacheableModelQuery<'q, 'a> {
    query: ModelQuery<'a>,
    pool: &'q dyn CachePool,
    data_generation: u64,
    ttl: Option<Duration>,
}

impl<'q, 'a> CacheableModelQuery<'q, 'a> {
    /// Wrap `query`; `data_generation` must change whenever stored data does
    pub fn new(query: ModelQuery<'a>, pool: &'q dyn CachePool, data_generation: u64) -> Self {
        let ttl = match query.config.cache_ttl_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };
        Self {
            query,
            pool,
            data_generation,
            ttl,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn query_mut(&mut self) -> &mut ModelQuery<'a> {
        &mut self.query
    }

    pub fn inner(&self) -> &ModelQuery<'a> {
        &self.query
    }

    pub fn into_inner(self) -> ModelQuery<'a> {
        self.query
    }

    /// Key of the compiled statement of the query
    pub fn statement_key(&self) -> Result<String> {
        let (template, _) = self.query.template()?;
        let generation = self.query.registry.generation().to_string();
        Ok(digest(&["statement", &generation, &template]))
    }

    /// Key of the result of `kind` (`query` or `count`)
    pub fn result_key(&self, kind: &str) -> Result<String> {
        result_key(&self.query, kind, self.data_generation)
    }

    /// Compiled statement, from the pool when an equally shaped query was
    /// compiled before
    pub fn compile(&self) -> Result<CompiledQuery> {
        let key = self.statement_key()?;
        let (templated, variables) = self.query.templated()?;
        let mut compiled = match self.read::<CompiledQuery>(&key) {
            Some(compiled) => compiled,
            None => {
                let compiled = templated.compile()?;
                self.write(&key, &compiled)?;
                compiled
            }
        };
        bind_placeholders(&mut compiled, &variables);
        compiled.select.limit = self.query.limit;
        compiled.select.offset = (self.query.offset > 0).then_some(self.query.offset);
        Ok(compiled)
    }

    /// [`ModelQuery::query`] through the cache
    pub fn query(&self) -> Result<Vec<Entry>> {
        let key = self.result_key("query")?;
        if let Some(entries) = self.read::<Vec<Entry>>(&key) {
            return Ok(entries);
        }
        let compiled = self.compile()?;
        let entries = self.query.run(&compiled)?;
        self.write(&key, &entries)?;
        Ok(entries)
    }

    pub fn query_first(&self) -> Result<Option<Entry>> {
        let mut first = ModelQuery::clone(&self.query);
        first.limit = Some(1);
        first.offset = 0;
        let first = CacheableModelQuery {
            query: first,
            pool: self.pool,
            data_generation: self.data_generation,
            ttl: self.ttl,
        };
        Ok(first.query()?.into_iter().next())
    }

    /// [`ModelQuery::count`] through the cache
    pub fn count(&self) -> Result<u64> {
        let key = self.result_key("count")?;
        if let Some(count) = self.read::<u64>(&key) {
            return Ok(count);
        }
        let count = self.query.count()?;
        self.write(&key, &count)?;
        Ok(count)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let item = self.pool.get(key).filter(|item| item.is_valid)?;
        match serde_json::from_value(item.value) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("dropping unreadable cache item {key}: {err}");
                self.pool.invalidate(key);
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let item = CacheItem::new(serde_json::to_value(value)?).with_meta("model", self.query.model());
        self.pool.set(key, item, self.ttl);
        Ok(())
    }
}

fn result_key(query: &ModelQuery<'_>, kind: &str, data_generation: u64) -> Result<String> {
    let (template, variables) = query.template()?;
    let variables = serde_json::to_string(&variables)?;
    let generation = format!("{}:{}", query.registry.generation(), data_generation);
    let window = format!("{:?}:{}", query.limit, query.offset);
    Ok(digest(&["result", kind, &generation, &template, &variables, &window]))
}

/// Bound values rendered into a cache key part; exposed for pools that key
/// by readable text instead of digests
pub fn variables_key(variables: &[Value]) -> String {
    variables.iter().map(Value::key).collect::<Vec<_>>().join("\u{1f}")
}
