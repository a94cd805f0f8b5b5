use crate::{blog, ids, row};
use pretty_assertions::assert_eq;
use trellis::engine::MemoryEngine;
use trellis::expr::field;
use trellis::statement::Statement;
use trellis::schema::{Field, Model, PropertyType};
use trellis::{Entry, FieldValue, Orm, OrmConfig, Value};

/// Post 1 by author 9 tagged with 3 and 4, post 2 by author 9 untagged
fn seeded() -> Orm<MemoryEngine> {
    let orm = blog(OrmConfig::default());
    let engine = orm.engine();
    engine.seed("Author", [row(&[("id", 9.into()), ("name", "Ann".into())])]);
    engine.seed(
        "Post",
        [
            row(&[("id", 1.into()), ("title", "Hello".into()), ("author", 9.into())]),
            row(&[("id", 2.into()), ("title", "Again".into()), ("author", 9.into())]),
        ],
    );
    engine.seed(
        "PostLocalized",
        [
            row(&[("entry", 1.into()), ("locale", "en".into()), ("body", "Hi".into())]),
            row(&[("entry", 2.into()), ("locale", "en".into()), ("body", "Back".into())]),
        ],
    );
    engine.seed(
        "Tag",
        [
            row(&[("id", 3.into()), ("name", "rust".into())]),
            row(&[("id", 4.into()), ("name", "orm".into())]),
        ],
    );
    engine.seed(
        "PostTag",
        [
            row(&[("post", 1.into()), ("tag", 3.into())]),
            row(&[("post", 1.into()), ("tag", 4.into())]),
        ],
    );
    engine.clear_log();
    orm
}

fn selects(orm: &Orm<MemoryEngine>) -> usize {
    orm.engine()
        .statements()
        .iter()
        .filter(|statement| matches!(statement, Statement::Select(_)))
        .count()
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_post_with_author_and_tags_at_depth_one() {
    let orm = seeded();
    let mut query = orm.create_query("Post").expect("query");
    query
        .add_condition(field("id").eq(1))
        .set_recursive_depth(Some(1))
        .expect("depth");

    let compiled = query.compile().expect("compile");
    assert_eq!(compiled.joined, vec!["author".to_string()]);
    assert_eq!(compiled.has, vec!["tags".to_string()]);

    let post = query.query_first().expect("query").expect("post 1");
    let author = post.related("author").expect("author joined");
    assert_eq!(author.id(), Some(&Value::Int(9)));
    assert_eq!(author.value("name"), Some(&Value::from("Ann")));
    assert_eq!(post.value("body"), Some(&Value::from("Hi")));
    assert_eq!(ids(&post.related_all("tags")), vec![Value::Int(3), Value::Int(4)]);
    assert!(post.is_field_loaded("tags"));
    assert!(post.is_clean());
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_depth_zero_runs_one_statement() {
    let orm = seeded();
    let mut query = orm.create_query("Post").expect("query");
    query.set_recursive_depth(Some(0)).expect("depth");
    let posts = query.query().expect("query");

    assert_eq!(orm.engine().statement_count(), 1);
    assert_eq!(posts.len(), 2);
    for post in &posts {
        assert_eq!(post.values().get("author"), Some(&FieldValue::Null));
        assert_eq!(post.values().get("tags"), Some(&FieldValue::Entries(Vec::new())));
        assert!(!post.is_field_loaded("author"));
        assert!(!post.is_field_loaded("tags"));
    }
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_depth_limits_materialized_hops() {
    let orm = seeded();
    let mut query = orm.create_query("Author").expect("query");
    query.set_recursive_depth(Some(2)).expect("depth");
    let authors = query.query().expect("query");

    let posts = authors[0].related_all("posts");
    assert_eq!(posts.len(), 2);
    let post = posts
        .iter()
        .find(|post| post.id() == Some(&Value::Int(1)))
        .expect("post 1");
    assert_eq!(post.related("author").and_then(Entry::id), Some(&Value::Int(9)));

    let tags = post.related_all("tags");
    assert_eq!(ids(&tags), vec![Value::Int(3), Value::Int(4)]);
    // Third hop stays unresolved
    assert!(!tags[0].is_field_loaded("posts"));
    assert!(tags[0].related_all("posts").is_empty());
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_has_many_order_applies_on_last_hop() {
    let orm = seeded();
    let mut query = orm.create_query("Author").expect("query");
    query.set_recursive_depth(Some(1)).expect("depth");
    let authors = query.query().expect("query");

    let titles: Vec<Option<&Value>> = authors[0]
        .related_all("posts")
        .iter()
        .map(|post| post.value("title"))
        .collect();
    assert_eq!(titles, vec![Some(&Value::from("Again")), Some(&Value::from("Hello"))]);
    // Posts fetched on the last hop keep their author unresolved
    assert_eq!(authors[0].related_all("posts")[0].values().get("author"), Some(&FieldValue::Null));
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_count_matches_query_length() {
    let orm = seeded();
    for title in ["Hello", "Nothing"] {
        let mut query = orm.create_query("Post").expect("query");
        query.add_condition(field("title").eq(title));
        assert_eq!(query.count().expect("count"), query.query().expect("query").len() as u64);
    }

    let mut all = orm.create_query("Post").expect("query");
    all.set_recursive_depth(Some(0)).expect("depth");
    assert_eq!(all.count().expect("count"), 2);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_condition_on_link_relation_is_distinct() {
    let orm = seeded();
    let mut query = orm.create_query("Post").expect("query");
    query
        .add_condition(field("tags.name").is_in(["rust", "orm"]))
        .set_recursive_depth(Some(0))
        .expect("depth");

    let posts = query.query().expect("query");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id(), Some(&Value::Int(1)));
    assert_eq!(query.count().expect("count"), 1);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_condition_on_belongs_to_path() {
    let orm = seeded();
    let mut query = orm.create_query("Post").expect("query");
    query
        .add_condition(field("author.name").eq("Ann"))
        .add_order("title DESC")
        .expect("order");
    query.set_recursive_depth(Some(0)).expect("depth");

    let titles: Vec<Value> = query
        .query()
        .expect("query")
        .iter()
        .filter_map(|post| post.value("title").cloned())
        .collect();
    assert_eq!(titles, vec![Value::from("Hello"), Value::from("Again")]);
    assert_eq!(selects(&orm), 1);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_limit_and_first() {
    let orm = seeded();
    let mut query = orm.create_query("Post").expect("query");
    query
        .set_recursive_depth(Some(0))
        .expect("depth")
        .add_order("id ASC")
        .expect("order");
    query.set_limit(1, 1).expect("limit");

    let page: Vec<Entry> = query.query().expect("page");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id(), Some(&Value::Int(2)));
    assert_eq!(query.count().expect("count ignores limit"), 2);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_untranslated_entries_count_when_only_plain_fields_are_read() {
    let orm = seeded();
    orm.engine()
        .seed("Post", [row(&[("id", 5.into()), ("title", "Draft".into())])]);

    let mut query = orm.create_query("Post").expect("query");
    query
        .set_recursive_depth(Some(0))
        .expect("depth")
        .set_fields(["id", "title"]);
    let posts = query.query().expect("query");
    assert_eq!(ids(&posts.iter().collect::<Vec<_>>()), vec![Value::Int(1), Value::Int(2), Value::Int(5)]);
    assert_eq!(query.count().expect("count"), 3);

    // Reading the localized body still requires the translation
    let mut localized = orm.create_query("Post").expect("query");
    localized.set_recursive_depth(Some(0)).expect("depth");
    assert_eq!(localized.query().expect("query").len(), 2);
    assert_eq!(localized.count().expect("count"), 2);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_path_field_next_to_deferred_author() {
    let orm = seeded();
    let mut query = orm.create_query("Post").expect("query");
    query
        .add_condition(field("id").eq(1))
        .set_recursive_depth(Some(2))
        .expect("depth")
        .add_field("author.name")
        .expect("path field");

    let compiled = query.compile().expect("compile");
    assert_eq!(compiled.deferred, vec!["author".to_string()]);

    let post = query.query_first().expect("query").expect("post 1");
    assert_eq!(post.value("author.name"), Some(&Value::from("Ann")));
    let author = post.related("author").expect("author fetched");
    assert_eq!(author.id(), Some(&Value::Int(9)));
    assert_eq!(ids(&author.related_all("posts")), vec![Value::Int(2), Value::Int(1)]);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_has_many_path_field_leaves_relation_alone() {
    let orm = seeded();
    let mut query = orm.create_query("Post").expect("query");
    query
        .add_condition(field("tags.name").eq("rust"))
        .set_recursive_depth(Some(1))
        .expect("depth")
        .add_field("tags.name")
        .expect("path field");

    let posts = query.query().expect("query");
    assert_eq!(posts.len(), 1);
    let post = &posts[0];
    assert_eq!(post.value("tags.name"), Some(&Value::from("rust")));
    assert!(matches!(post.values().get("tags"), Some(FieldValue::Entries(_))));
    assert_eq!(ids(&post.related_all("tags")), vec![Value::Int(3), Value::Int(4)]);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_self_link_reads_both_sides() {
    let mut orm = Orm::new(MemoryEngine::new(), OrmConfig::default());
    orm.register(
        Model::new("Person")
            .with_property("name", PropertyType::String)
            .with_field(Field::has_many("friends", "Person")),
    )
    .expect("person");
    let engine = orm.engine();
    engine.seed(
        "Person",
        [
            row(&[("id", 1.into()), ("name", "Ann".into())]),
            row(&[("id", 2.into()), ("name", "Bob".into())]),
            row(&[("id", 3.into()), ("name", "Cid".into())]),
        ],
    );
    // Person 1 is the first side, then the second side, then both
    engine.seed(
        "PersonPerson",
        [
            row(&[("person1", 1.into()), ("person2", 2.into())]),
            row(&[("person1", 3.into()), ("person2", 1.into())]),
            row(&[("person1", 1.into()), ("person2", 1.into())]),
        ],
    );

    let mut query = orm.create_query("Person").expect("query");
    query
        .add_condition(field("id").eq(1))
        .set_recursive_depth(Some(1))
        .expect("depth");
    let person = query.query_first().expect("query").expect("person 1");
    let friends = person.related_all("friends");
    assert_eq!(ids(&friends), vec![Value::Int(2), Value::Int(3), Value::Int(1)]);
    assert_eq!(friends[1].value("name"), Some(&Value::from("Cid")));

    let mut bob = orm.create_query("Person").expect("query");
    bob.add_condition(field("id").eq(2))
        .set_recursive_depth(Some(1))
        .expect("depth");
    let bob = bob.query_first().expect("query").expect("person 2");
    assert_eq!(ids(&bob.related_all("friends")), vec![Value::Int(1)]);
}
