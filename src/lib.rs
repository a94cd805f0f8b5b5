//! # Trellis
//!
//! Relation-resolving ORM core: declare models and their relations, query
//! them as nested entry graphs and write them back.
//!
//! - [`schema`]: models, the registry synthesizing link and localized shadow
//!   models, and the resolved relation metadata
//! - [`query`]: the query builder, its statement compiler and the row
//!   unflattener, including relation expansion and locale fallback
//! - [`persist`]: the save/delete lifecycle
//! - [`cache`]: cache pools and the caching query decorator
//! - [`engine`]: the execution engine contract and the in-memory engine
//! - [`statement`]: abstract statements and their `sea-query` rendering
//!
//! ```
//! use trellis::engine::MemoryEngine;
//! use trellis::schema::{Field, Model, PropertyType};
//! use trellis::{Orm, OrmConfig};
//!
//! let mut orm = Orm::new(MemoryEngine::new(), OrmConfig::default());
//! orm.register(
//!     Model::new("Author")
//!         .with_property("name", PropertyType::String)
//!         .with_field(Field::has_many("posts", "Post")),
//! )
//! .unwrap();
//! orm.register(
//!     Model::new("Post")
//!         .with_property("title", PropertyType::String)
//!         .with_field(Field::belongs_to("author", "Author")),
//! )
//! .unwrap();
//!
//! let mut author = orm.create_entry("Author").unwrap();
//! author.set("name", "Jane");
//! orm.save(&mut author).unwrap();
//!
//! let mut post = orm.create_entry("Post").unwrap();
//! post.set("title", "Hello");
//! post.set("author", author.clone());
//! orm.save(&mut post).unwrap();
//!
//! let mut query = orm.create_query("Author").unwrap();
//! query.set_recursive_depth(Some(1)).unwrap();
//! let authors = query.query().unwrap();
//! assert_eq!(authors[0].related_all("posts").len(), 1);
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod expr;
pub mod orm;
pub mod persist;
pub mod query;
pub mod schema;
pub mod statement;
pub mod value;

pub use cache::{CacheItem, CachePool, CacheableModelQuery, MemoryCachePool};
pub use config::OrmConfig;
pub use engine::ExecutionEngine;
pub use entry::{Entry, FieldAccess, FieldValue, FromEntry};
pub use error::{OrmError, Result};
pub use orm::{ModelHandle, Orm};
pub use query::ModelQuery;
pub use value::Value;
