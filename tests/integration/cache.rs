use crate::{blog, ids};
use pretty_assertions::assert_eq;
use trellis::engine::MemoryEngine;
use trellis::expr::field;
use trellis::{Entry, MemoryCachePool, Orm, OrmConfig, Value};

#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn tagged_post(orm: &Orm<MemoryEngine>) -> Entry {
    let mut tag = orm.create_entry("Tag").expect("tag");
    tag.set("name", "rust");
    let mut post = orm.create_entry("Post").expect("post");
    post.set("title", "Hello");
    post.set("tags", vec![tag]);
    orm.save(&mut post).expect("save post");
    post
}

#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn cached_posts(orm: &Orm<MemoryEngine>, pool: &MemoryCachePool) -> Vec<Entry> {
    let mut cached = orm.create_cacheable_query("Post", pool).expect("query");
    cached.query_mut().set_recursive_depth(Some(1)).expect("depth");
    cached.query().expect("posts")
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_nested_results_are_served_from_pool() {
    let orm = blog(OrmConfig::default());
    let post = tagged_post(&orm);
    let pool = MemoryCachePool::new();

    let first = cached_posts(&orm, &pool);
    let executed = orm.engine().statement_count();
    let second = cached_posts(&orm, &pool);

    assert_eq!(orm.engine().statement_count(), executed);
    assert_eq!(ids(&first.iter().collect::<Vec<_>>()), vec![post.id().cloned().expect("id")]);
    assert_eq!(
        ids(&second[0].related_all("tags")),
        ids(&first[0].related_all("tags"))
    );
    assert_eq!(second[0].value("title"), Some(&Value::from("Hello")));
    assert!(pool.stats().hits >= 1);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_saving_invalidates_cached_results() {
    let orm = blog(OrmConfig::default());
    tagged_post(&orm);
    let pool = MemoryCachePool::new();
    assert_eq!(cached_posts(&orm, &pool).len(), 1);

    let mut other = orm.create_entry("Post").expect("post");
    other.set("title", "Again");
    orm.save(&mut other).expect("save other");

    assert_eq!(cached_posts(&orm, &pool).len(), 2);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_counts_and_first_entries_go_through_pool() {
    let orm = blog(OrmConfig::default());
    let post = tagged_post(&orm);
    let pool = MemoryCachePool::new();

    let handle = orm.model("Post").expect("post model");
    let mut cached = handle.create_cacheable_query(&pool).expect("query");
    cached
        .query_mut()
        .add_condition(field("title").eq("Hello"))
        .set_recursive_depth(Some(0))
        .expect("depth");
    assert_eq!(cached.count().expect("count"), 1);
    let first = cached.query_first().expect("first").expect("post");
    assert_eq!(first.id(), post.id());

    let executed = orm.engine().statement_count();
    assert_eq!(cached.count().expect("cached count"), 1);
    assert_eq!(cached.query_first().expect("cached first").map(|entry| entry.id().cloned()), Some(post.id().cloned()));
    assert_eq!(orm.engine().statement_count(), executed);
}
