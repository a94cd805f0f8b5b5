//! Querying models.
//!
//! # Architecture
//!
//! - **ModelQuery**: fluent query state plus the relation fetch orchestration
//! - **Parser**: compiles a query into one SELECT or COUNT statement
//! - **Result**: unflattens result rows into entries
//! - **Fetch**: per-entry sub-queries for relations not joined inline
//! - **Locale**: fallback to other locales for untranslated entries
//!
//! # Examples
//!
//! ```
//! use trellis::engine::MemoryEngine;
//! use trellis::expr::field;
//! use trellis::schema::{Field, Model, PropertyType};
//! use trellis::{Orm, OrmConfig};
//!
//! let mut orm = Orm::new(MemoryEngine::new(), OrmConfig::default());
//! orm.register(Model::new("Author").with_property("name", PropertyType::String)).unwrap();
//! orm.register(
//!     Model::new("Post")
//!         .with_property("title", PropertyType::String)
//!         .with_field(Field::belongs_to("author", "Author")),
//! )
//! .unwrap();
//!
//! let mut query = orm.create_query("Post").unwrap();
//! query
//!     .add_condition(field("author.name").eq("Jane"))
//!     .set_recursive_depth(Some(1))
//!     .unwrap();
//! assert!(query.query().unwrap().is_empty());
//! ```

mod fetch;
mod locale;
pub mod model_query;
pub mod parser;
pub mod result;

pub use model_query::{ModelQuery, QueryField, QueryJoin};
pub use parser::{parse_order, CompiledQuery, QueryParser};
pub use result::ResultParser;
