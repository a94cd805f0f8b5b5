//! Integration tests for the ORM core
//!
//! Every test runs against the in-memory execution engine and a small blog
//! schema: authors write posts with a localized body, posts are tagged
//! through a synthesized link model, and comments point at posts without the
//! post declaring them.

mod cache;
mod locale;
mod persist;
mod query;
mod schema;

use trellis::engine::MemoryEngine;
use trellis::schema::{Field, Model, PropertyType};
use trellis::{Orm, OrmConfig, Value};

pub fn blog_models() -> Vec<Model> {
    vec![
        Model::new("Author")
            .with_property("name", PropertyType::String)
            .with_field(Field::has_many("posts", "Post").with_order("title ASC")),
        Model::new("Post")
            .with_property("title", PropertyType::String)
            .with_field(Field::property("body", PropertyType::Text).localized())
            .with_field(Field::belongs_to("author", "Author"))
            .with_field(Field::has_many("tags", "Tag")),
        Model::new("Tag")
            .with_property("name", PropertyType::String)
            .with_field(Field::has_many("posts", "Post")),
        Model::new("Comment")
            .with_property("text", PropertyType::Text)
            .with_field(Field::belongs_to("post", "Post").block_delete()),
    ]
}

#[allow(clippy::expect_used)] // Test code - expect is acceptable
pub fn blog(config: OrmConfig) -> Orm<MemoryEngine> {
    let mut orm = Orm::new(MemoryEngine::new(), config);
    for model in blog_models() {
        orm.register(model).expect("register blog model");
    }
    orm
}

/// One seeded row
pub fn row(columns: &[(&str, Value)]) -> Vec<(String, Value)> {
    columns
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub fn ids(entries: &[&trellis::Entry]) -> Vec<Value> {
    entries
        .iter()
        .filter_map(|entry| entry.id().cloned())
        .collect()
}
