//! Lazy references and lazy collections against a counting remote.

use remorm_core::CoreError;
use remorm_testkit::fixtures::{self, Comment, Post, User};
use remorm_testkit::FakeRemote;
use remorm_wire::{Record, Value};

fn row(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn seed_blog(remote: &FakeRemote) {
    remote.seed(
        "user",
        row(&[
            ("id", Value::from("u-1")),
            ("name", Value::from("Ada")),
            ("email", Value::Null),
        ]),
    );
    remote.seed(
        "post",
        row(&[
            ("id", Value::Int(1)),
            ("title", Value::from("first")),
            ("likes", Value::Int(3)),
            ("authorId", Value::from("u-1")),
        ]),
    );
    remote.seed(
        "post",
        row(&[
            ("id", Value::Int(2)),
            ("title", Value::from("second")),
            ("likes", Value::Int(0)),
            ("authorId", Value::Null),
        ]),
    );
    remote.seed(
        "comment",
        row(&[
            ("id", Value::Int(5)),
            ("body", Value::from("hi")),
            ("postId", Value::Int(1)),
        ]),
    );
    remote.seed(
        "comment",
        row(&[
            ("id", Value::Int(6)),
            ("body", Value::from("yo")),
            ("postId", Value::Int(1)),
        ]),
    );
}

#[test]
fn references_load_on_first_access_only() {
    let remote = fixtures::remote();
    seed_blog(&remote);
    let em = fixtures::manager(remote.clone());

    let user = em.reference::<User>("u-1").unwrap();
    assert_eq!(remote.total_calls(), 0);

    // Identifier reads never load.
    assert_eq!(user.raw().id_hash().as_deref(), Some("u-1"));
    assert!(!user.raw().is_initialized());
    assert_eq!(remote.total_calls(), 0);

    assert_eq!(user.get(|u| u.name.clone()).unwrap(), "Ada");
    assert_eq!(remote.calls_to("user/find"), 1);

    user.get(|u| u.email.clone()).unwrap();
    assert_eq!(remote.calls_to("user/find"), 1);
}

#[test]
fn missing_remote_record_fails_the_load() {
    let remote = fixtures::remote();
    let em = fixtures::manager(remote);

    let ghost = em.reference::<User>("ghost").unwrap();
    let err = ghost.get(|u| u.name.clone()).unwrap_err();
    assert!(matches!(err, CoreError::Fetch { .. }));
}

#[test]
fn collection_writes_before_the_load_stay_buffered() {
    let remote = fixtures::remote();
    seed_blog(&remote);
    let em = fixtures::manager(remote.clone());

    let user = em.find::<User>("u-1").unwrap().unwrap();
    let posts = user.get(|u| u.posts.clone()).unwrap().unwrap();

    let orphan = em.reference::<Post>(2).unwrap();
    posts.add(orphan.raw().clone());
    assert!(!posts.is_initialized());
    assert_eq!(remote.calls_to("post/search"), 0);

    // Counting a plain lazy collection loads it and merges the buffer.
    assert_eq!(posts.count().unwrap(), 2);
    assert!(posts.is_initialized());
    assert_eq!(remote.calls_to("post/search"), 1);
}

#[test]
fn extra_lazy_collections_answer_without_loading() {
    let remote = fixtures::remote();
    seed_blog(&remote);
    let em = fixtures::manager(remote.clone());

    let post = em.find::<Post>(1).unwrap().unwrap();
    let comments = post.get(|p| p.comments.clone()).unwrap().unwrap();

    assert_eq!(comments.count().unwrap(), 2);
    assert_eq!(remote.calls_to("comment/count"), 1);
    assert_eq!(remote.calls_to("comment/search"), 0);

    let known = em.reference::<Comment>(5).unwrap();
    assert!(comments.contains(known.raw()).unwrap());
    assert_eq!(remote.calls_to("comment/count"), 2);

    let page = comments.slice(1, 1).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id_hash().as_deref(), Some("6"));
    assert_eq!(remote.calls_to("comment/search"), 1);
    assert!(!comments.is_initialized());
}

#[test]
fn matching_loads_a_filtered_view() {
    let remote = fixtures::remote();
    seed_blog(&remote);
    let em = fixtures::manager(remote.clone());

    let post = em.find::<Post>(1).unwrap().unwrap();
    let comments = post.get(|p| p.comments.clone()).unwrap().unwrap();

    let mut criteria = Record::new();
    criteria.insert("body".to_owned(), Value::from("hi"));
    let view = comments.matching(criteria);

    let items = view.items().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id_hash().as_deref(), Some("5"));
    // The source collection stays untouched.
    assert!(!comments.is_initialized());
}
