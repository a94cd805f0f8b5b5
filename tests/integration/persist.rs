use crate::{blog, ids};
use pretty_assertions::assert_eq;
use trellis::engine::MemoryEngine;
use trellis::expr::field;
use trellis::{Entry, Orm, OrmConfig, OrmError, Value};

#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn load(orm: &Orm<MemoryEngine>, model: &str, id: &Value) -> Entry {
    let mut query = orm.create_query(model).expect("query");
    query
        .add_condition(field("id").eq(id.clone()))
        .set_recursive_depth(Some(1))
        .expect("depth");
    query.query_first().expect("query").expect("entry")
}

#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn new_entry(orm: &Orm<MemoryEngine>, model: &str, name: &str, value: &str) -> Entry {
    let mut entry = orm.create_entry(model).expect("entry");
    entry.set(name, value);
    entry
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_many_to_many_round_trip() {
    let orm = blog(OrmConfig::default());
    let mut post = new_entry(&orm, "Post", "title", "Hello");
    post.set("tags", vec![new_entry(&orm, "Tag", "name", "rust")]);
    orm.save(&mut post).expect("save post");
    let post_id = post.id().cloned().expect("post id");
    let tag_id = post.related_all("tags")[0].id().cloned().expect("tag id");
    assert_eq!(orm.engine().rows("PostTag").len(), 1);

    let mut loaded = load(&orm, "Post", &post_id);
    assert_eq!(ids(&loaded.related_all("tags")), vec![tag_id.clone()]);

    loaded.set("tags", Vec::<Entry>::new());
    orm.save(&mut loaded).expect("unlink");
    assert!(orm.engine().rows("PostTag").is_empty());
    assert!(load(&orm, "Post", &post_id).related_all("tags").is_empty());
    // Unlinking never deletes the target
    let tag = orm.get_by_id("Tag", tag_id).expect("tag survives");
    assert_eq!(tag.value("name"), Some(&Value::from("rust")));
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_link_rows_are_visible_from_both_sides() {
    let orm = blog(OrmConfig::default());
    let mut post = new_entry(&orm, "Post", "title", "Hello");
    orm.save(&mut post).expect("save post");

    let mut tag = new_entry(&orm, "Tag", "name", "rust");
    tag.set("posts", vec![post.clone()]);
    orm.save(&mut tag).expect("save tag");

    let post_id = post.id().cloned().expect("post id");
    let loaded = load(&orm, "Post", &post_id);
    assert_eq!(ids(&loaded.related_all("tags")), vec![tag.id().cloned().expect("tag id")]);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_has_many_maintains_foreign_keys() {
    let orm = blog(OrmConfig::default());
    let mut author = new_entry(&orm, "Author", "name", "Ann");
    author.set(
        "posts",
        vec![
            new_entry(&orm, "Post", "title", "Hello"),
            new_entry(&orm, "Post", "title", "Again"),
        ],
    );
    orm.save(&mut author).expect("save author");
    let author_id = author.id().cloned().expect("author id");
    let authored: Vec<Value> = orm
        .engine()
        .rows("Post")
        .iter()
        .filter_map(|row| row.get("author").cloned())
        .collect();
    assert_eq!(authored, vec![author_id.clone(), author_id.clone()]);

    let mut loaded = load(&orm, "Author", &author_id);
    let kept: Vec<Entry> = loaded
        .related_all("posts")
        .into_iter()
        .filter(|post| post.value("title") == Some(&Value::from("Again")))
        .cloned()
        .collect();
    loaded.set("posts", kept);
    orm.save(&mut loaded).expect("drop a post");

    // Posts are not dependant on their author: the dropped one stays, orphaned
    let rows = orm.engine().rows("Post");
    assert_eq!(rows.len(), 2);
    for row in rows {
        let expected = if row.get("title") == Some(&Value::from("Again")) {
            author_id.clone()
        } else {
            Value::Null
        };
        assert_eq!(row.get("author").cloned().unwrap_or_default(), expected);
    }
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_comment_blocks_post_delete() {
    let orm = blog(OrmConfig::default());
    let mut post = new_entry(&orm, "Post", "title", "Hello");
    orm.save(&mut post).expect("save post");
    let mut comment = new_entry(&orm, "Comment", "text", "Nice");
    comment.set("post", post.clone());
    orm.save(&mut comment).expect("save comment");

    let err = orm.delete(&post).expect_err("blocked");
    match err {
        OrmError::DeleteBlocked { model, referenced_by, .. } => {
            assert_eq!(model, "Post");
            assert_eq!(referenced_by, "Comment.post");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orm.engine().rows("Post").len(), 1);

    orm.delete(&comment).expect("delete comment");
    orm.delete(&post).expect("delete post");
    assert!(orm.engine().rows("Post").is_empty());
    assert!(orm.engine().rows("PostLocalized").is_empty());
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_deleting_author_orphans_posts() {
    let orm = blog(OrmConfig::default());
    let mut author = new_entry(&orm, "Author", "name", "Ann");
    orm.save(&mut author).expect("save author");
    let mut post = new_entry(&orm, "Post", "title", "Hello");
    post.set("author", author.clone());
    orm.save(&mut post).expect("save post");

    orm.delete(&author).expect("delete author");
    let rows = orm.engine().rows("Post");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("author"), Some(&Value::Null));
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_loaded_entry_saves_only_its_changes() {
    let orm = blog(OrmConfig::default());
    let mut post = new_entry(&orm, "Post", "title", "Hello");
    post.set("body", "Hi");
    orm.save(&mut post).expect("save post");
    let post_id = post.id().cloned().expect("post id");

    let mut loaded = load(&orm, "Post", &post_id);
    orm.engine().clear_log();
    orm.save(&mut loaded).expect("clean save");
    assert_eq!(orm.engine().statement_count(), 0);

    loaded.set("body", "Hey");
    orm.save(&mut loaded).expect("save body");
    let posts = orm.engine().rows("Post");
    assert_eq!(posts[0].get("title"), Some(&Value::from("Hello")));
    let shadows = orm.engine().rows("PostLocalized");
    assert_eq!(shadows.len(), 1);
    assert_eq!(shadows[0].get("body"), Some(&Value::from("Hey")));
}
