use crate::{blog, blog_models};
use pretty_assertions::assert_eq;
use trellis::engine::MemoryEngine;
use trellis::schema::{ForeignKey, JsonModelIo, ModelRegister, RelationKind};
use trellis::{Orm, OrmConfig};

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_link_model_name_does_not_depend_on_registration_order() {
    let mut forward = ModelRegister::new();
    let mut backward = ModelRegister::new();
    let models = blog_models();
    for model in models.iter().cloned() {
        forward.register(model).expect("forward");
    }
    for model in models.into_iter().rev() {
        backward.register(model).expect("backward");
    }

    for register in [&forward, &backward] {
        let tags = register.meta("Post").expect("post meta");
        let tags = tags.relation_meta("tags").expect("tags");
        assert_eq!(tags.link_model.as_deref(), Some("PostTag"));
        assert_eq!(
            tags.foreign_key,
            ForeignKey::Link {
                to_self: "post".to_string(),
                to_target: "tag".to_string()
            }
        );
    }
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_localized_model_metadata() {
    let orm = blog(OrmConfig::default());
    let post = orm.registry().meta("Post").expect("post");
    assert_eq!(post.localized_fields().expect("localized"), ["body".to_string()]);
    assert_eq!(post.localized_model().expect("shadow"), Some("PostLocalized"));

    let shadow = orm.registry().meta("PostLocalized").expect("shadow");
    assert!(shadow.localized_fields().expect("shadow localized").is_empty());
    assert!(shadow.properties().expect("properties").contains(&"body".to_string()));
    let entry = shadow.relation_meta("entry").expect("entry");
    assert_eq!(entry.kind, RelationKind::BelongsTo);
    assert!(entry.dependant);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_author_posts_use_direct_foreign_key() {
    let orm = blog(OrmConfig::default());
    let author = orm.registry().meta("Author").expect("author");
    let posts = author.relation_meta("posts").expect("posts");
    assert_eq!(posts.single_key(), Some("author"));
    assert_eq!(posts.link_model, None);
    assert_eq!(
        orm.registry().unlinked_models("Post").expect("unlinked"),
        ["PostLocalized".to_string(), "Comment".to_string()]
    );
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_models_round_trip_through_json_source() {
    let dir = tempfile::tempdir().expect("tempdir");
    let io = JsonModelIo::new(dir.path().join("blog.json"));
    blog(OrmConfig::default()).write_models(&io).expect("write");

    let mut reloaded = Orm::new(MemoryEngine::new(), OrmConfig::default());
    reloaded.load_models(&io).expect("load");
    for name in ["Author", "Post", "Tag", "Comment", "PostTag", "PostLocalized"] {
        assert!(reloaded.registry().has(name), "{name} is registered");
    }
}
