//! Polymorphic hierarchies: discriminator resolution and scoped search.

use remorm_testkit::fixtures::{self, Article, Video};
use remorm_testkit::FakeRemote;
use remorm_wire::{Record, Value};

fn row(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn seed_content(remote: &FakeRemote) {
    remote.seed(
        "content",
        row(&[
            ("id", Value::Int(1)),
            ("kind", Value::from("article")),
            ("title", Value::from("On Engines")),
            ("body", Value::from("Lorem ipsum")),
        ]),
    );
    remote.seed(
        "content",
        row(&[
            ("id", Value::Int(2)),
            ("kind", Value::from("video")),
            ("title", Value::from("Engine Talk")),
            ("duration", Value::Int(540)),
        ]),
    );
    // Unknown kind; scoped searches must never return it.
    remote.seed(
        "content",
        row(&[
            ("id", Value::Int(3)),
            ("kind", Value::from("audio")),
            ("title", Value::from("Engine Cast")),
        ]),
    );
}

#[test]
fn records_hydrate_to_their_concrete_subclasses() {
    let remote = fixtures::remote();
    seed_content(&remote);
    let em = fixtures::manager(remote);

    let all = em.repository("Content").unwrap().find_all().unwrap();
    assert_eq!(all.len(), 2);

    let mut classes: Vec<String> = all.iter().map(|e| e.class_name()).collect();
    classes.sort();
    assert_eq!(classes, vec!["Article".to_owned(), "Video".to_owned()]);
}

#[test]
fn subclass_searches_are_scoped_to_their_own_tags() {
    let remote = fixtures::remote();
    seed_content(&remote);
    let em = fixtures::manager(remote);

    let articles = em.repository("Article").unwrap().find_all().unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].class_name(), "Article");

    let typed: remorm_core::Ref<Article> = articles[0].typed().unwrap();
    assert_eq!(typed.get(|a| a.body.clone()).unwrap(), "Lorem ipsum");

    assert_eq!(em.repository("Video").unwrap().count(&Record::new()).unwrap(), 1);
}

#[test]
fn root_class_lookups_resolve_the_concrete_type() {
    let remote = fixtures::remote();
    seed_content(&remote);
    let em = fixtures::manager(remote);

    let entity = em.find_in("Content", 2).unwrap().unwrap();
    assert_eq!(entity.class_name(), "Video");

    let video: remorm_core::Ref<Video> = entity.typed().unwrap();
    assert_eq!(video.get(|v| v.duration).unwrap(), 540);
}

#[test]
fn root_and_subclass_lookups_share_the_identity_slot() {
    let remote = fixtures::remote();
    seed_content(&remote);
    let em = fixtures::manager(remote.clone());

    let via_root = em.find_in("Content", 1).unwrap().unwrap();
    let via_subclass = em.find_in("Article", 1).unwrap().unwrap();

    assert!(via_root.same_entity(&via_subclass));
    assert_eq!(remote.calls_to("content/find"), 1);
}
