use crate::blog;
use pretty_assertions::assert_eq;
use trellis::engine::MemoryEngine;
use trellis::{Entry, Orm, OrmConfig, Value};

fn multilingual() -> Orm<MemoryEngine> {
    blog(OrmConfig::with_locales(["en", "fr", "de"]))
}

#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn save_post(orm: &Orm<MemoryEngine>, title: &str, locale: &str, body: &str) -> Value {
    let mut post = orm.create_entry("Post").expect("post");
    post.set("title", title);
    post.set("body", body);
    post.set_locale(locale);
    orm.save(&mut post).expect("save post");
    post.id().cloned().expect("post id")
}

#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn english_posts(orm: &Orm<MemoryEngine>, fetch: bool) -> Vec<Entry> {
    let mut query = orm.create_query("Post").expect("query");
    query
        .set_recursive_depth(Some(0))
        .expect("depth")
        .set_locale("en")
        .set_include_unlocalized(true)
        .set_fetch_unlocalized(fetch);
    query.query().expect("posts")
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_missing_locale_is_filled_from_fallback() {
    let orm = multilingual();
    let id = save_post(&orm, "Gruss", "de", "Hallo");

    let posts = english_posts(&orm, true);
    assert_eq!(posts.len(), 1);
    let post = &posts[0];
    assert_eq!(post.id(), Some(&id));
    assert_eq!(post.value("body"), Some(&Value::from("Hallo")));
    assert_eq!(post.locale(), Some("de"));
    assert!(!post.is_localized());
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_unlocalized_entries_without_fallback_have_no_values() {
    let orm = multilingual();
    save_post(&orm, "Gruss", "de", "Hallo");

    let posts = english_posts(&orm, false);
    assert_eq!(posts.len(), 1);
    assert!(posts[0].value("body").map_or(true, Value::is_null));
    assert!(!posts[0].is_localized());
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_unlocalized_entries_are_excluded_by_default() {
    let orm = multilingual();
    save_post(&orm, "Gruss", "de", "Hallo");
    save_post(&orm, "Hello", "en", "Hi");

    let mut query = orm.create_query("Post").expect("query");
    query.set_recursive_depth(Some(0)).expect("depth");
    let posts = query.query().expect("posts");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].value("body"), Some(&Value::from("Hi")));
    assert_eq!(posts[0].locale(), Some("en"));
    assert!(posts[0].is_localized());
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_fallback_stops_once_every_entry_is_filled() {
    let orm = multilingual();
    save_post(&orm, "Salut", "fr", "Bonjour");
    orm.engine().clear_log();

    let posts = english_posts(&orm, true);
    assert_eq!(posts[0].value("body"), Some(&Value::from("Bonjour")));
    assert_eq!(posts[0].locale(), Some("fr"));
    // The main query plus the French lookup, German is never asked
    assert_eq!(orm.engine().statement_count(), 2);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_saving_in_second_locale_adds_shadow_row() {
    let orm = multilingual();
    let id = save_post(&orm, "Hello", "en", "Hi");

    let mut post = orm.get_by_id("Post", id.clone()).expect("post");
    post.set_locale("fr");
    post.set("body", "Salut");
    orm.save(&mut post).expect("save french");

    assert_eq!(orm.engine().rows("PostLocalized").len(), 2);
    let mut french = orm.create_query("Post").expect("query");
    french.set_recursive_depth(Some(0)).expect("depth").set_locale("fr");
    let posts = french.query().expect("french");
    assert_eq!(posts[0].value("body"), Some(&Value::from("Salut")));

    let english = orm.get_by_id("Post", id).expect("english");
    assert_eq!(english.value("body"), Some(&Value::from("Hi")));
}
