//! Flush ordering: creates, deferred reference patches, field patches,
//! deletes, and collection synchronization.

use remorm_core::{CoreError, EntityState};
use remorm_testkit::fixtures::{self, Comment, Post, User};
use remorm_testkit::FakeRemote;
use remorm_wire::{Record, Value};

fn row(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn seed_user(remote: &FakeRemote, id: &str, name: &str) {
    remote.seed(
        "user",
        row(&[
            ("id", Value::from(id)),
            ("name", Value::from(name)),
            ("email", Value::Null),
        ]),
    );
}

fn seed_post(remote: &FakeRemote, id: i64, title: &str, author: Value) {
    remote.seed(
        "post",
        row(&[
            ("id", Value::Int(id)),
            ("title", Value::from(title)),
            ("likes", Value::Int(0)),
            ("authorId", author),
        ]),
    );
}

#[test]
fn create_with_a_natural_identifier() {
    let remote = fixtures::remote();
    let em = fixtures::manager(remote.clone());

    em.persist(User {
        id: Some("u-1".to_owned()),
        name: "Ada".to_owned(),
        email: None,
        posts: None,
    })
    .unwrap();
    assert_eq!(remote.total_calls(), 0);

    em.flush().unwrap();
    assert_eq!(remote.calls(), vec!["user/create"]);
    let saved = remote
        .row_where("user", "id", &Value::from("u-1"))
        .unwrap();
    assert_eq!(saved.get("name"), Some(&Value::from("Ada")));

    // Nothing changed, so a second flush is silent.
    em.flush().unwrap();
    assert_eq!(remote.total_calls(), 1);
}

#[test]
fn remote_identifiers_are_written_back() {
    let remote = fixtures::remote();
    remote.set_next_id("post", 241);
    let em = fixtures::manager(remote.clone());

    let post = em
        .persist(Post {
            id: None,
            title: "hello".to_owned(),
            likes: 0,
            author: None,
            comments: None,
            featured: None,
        })
        .unwrap();
    assert!(!post.raw().has_id());

    em.flush().unwrap();
    assert_eq!(post.get(|p| p.id).unwrap(), Some(241));
    assert_eq!(post.raw().id_hash().as_deref(), Some("241"));
    assert!(remote.row_where("post", "id", &Value::Int(241)).is_some());
}

#[test]
fn unchanged_entities_patch_nothing() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    let em = fixtures::manager(remote.clone());

    em.find::<User>("u-1").unwrap().unwrap();
    em.flush().unwrap();
    assert_eq!(remote.calls(), vec!["user/find"]);
}

#[test]
fn fields_missing_from_the_remote_record_do_not_patch() {
    let remote = fixtures::remote();
    // The seeded row carries no email key; it hydrates to null and has
    // to diff as null.
    remote.seed(
        "user",
        row(&[("id", Value::from("u-1")), ("name", Value::from("Ada"))]),
    );
    let em = fixtures::manager(remote.clone());

    em.find::<User>("u-1").unwrap().unwrap();
    em.flush().unwrap();
    assert_eq!(remote.calls(), vec!["user/find"]);
}

#[test]
fn only_changed_entities_are_patched() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    seed_user(&remote, "u-2", "Grace");
    let em = fixtures::manager(remote.clone());

    let first = em.find::<User>("u-1").unwrap().unwrap();
    em.find::<User>("u-2").unwrap().unwrap();
    first.set(|u| u.name = "Countess".to_owned()).unwrap();

    em.flush().unwrap();
    assert_eq!(remote.calls_to("user/patch"), 1);
    let patched = remote
        .row_where("user", "id", &Value::from("u-1"))
        .unwrap();
    assert_eq!(patched.get("name"), Some(&Value::from("Countess")));
    let untouched = remote
        .row_where("user", "id", &Value::from("u-2"))
        .unwrap();
    assert_eq!(untouched.get("name"), Some(&Value::from("Grace")));
}

#[test]
fn references_to_later_creates_are_patched_afterwards() {
    let remote = fixtures::remote();
    let em = fixtures::manager(remote.clone());

    // The comment is queued before the post it points at, so its create
    // has to emit null and patch once the post has an identifier.
    let comment = em
        .persist(Comment {
            id: None,
            body: "first!".to_owned(),
            post: None,
        })
        .unwrap();
    let post = em
        .persist(Post {
            id: None,
            title: "hello".to_owned(),
            likes: 0,
            author: None,
            comments: None,
            featured: None,
        })
        .unwrap();
    comment
        .set(|c| c.post = Some(post.raw().clone()))
        .unwrap();

    em.flush().unwrap();
    assert_eq!(
        remote.calls(),
        vec!["comment/create", "post/create", "comment/patch"]
    );
    let saved = remote.row_where("comment", "id", &Value::Int(1)).unwrap();
    assert_eq!(saved.get("postId"), Some(&Value::Int(1)));
}

#[test]
fn mutually_referencing_creates_settle_with_one_extra_patch() {
    let remote = fixtures::remote();
    let em = fixtures::manager(remote.clone());

    // Post and comment point at each other before either exists
    // remotely.
    let post = em
        .persist(Post {
            id: None,
            title: "hello".to_owned(),
            likes: 0,
            author: None,
            comments: None,
            featured: None,
        })
        .unwrap();
    let comment = em
        .persist(Comment {
            id: None,
            body: "first!".to_owned(),
            post: Some(post.raw().clone()),
        })
        .unwrap();
    post.set(|p| p.featured = Some(comment.raw().clone()))
        .unwrap();

    em.flush().unwrap();
    assert_eq!(
        remote.calls(),
        vec!["post/create", "comment/create", "post/patch"]
    );
    let post_row = remote.row_where("post", "id", &Value::Int(1)).unwrap();
    assert_eq!(post_row.get("featuredId"), Some(&Value::Int(1)));
    let comment_row = remote.row_where("comment", "id", &Value::Int(1)).unwrap();
    assert_eq!(comment_row.get("postId"), Some(&Value::Int(1)));

    // The cycle is settled; nothing further to write.
    remote.reset_calls();
    em.flush().unwrap();
    assert_eq!(remote.total_calls(), 0);
}

#[test]
fn narrowed_flush_defers_the_reference_to_the_next_full_flush() {
    let remote = fixtures::remote();
    let em = fixtures::manager(remote.clone());
    let uow = em.unit_of_work();

    let comment = em
        .persist(Comment {
            id: None,
            body: "early".to_owned(),
            post: None,
        })
        .unwrap();
    let post = em
        .persist(Post {
            id: None,
            title: "late".to_owned(),
            likes: 0,
            author: None,
            comments: None,
            featured: None,
        })
        .unwrap();
    comment
        .set(|c| c.post = Some(post.raw().clone()))
        .unwrap();

    // Only the comment flushes; its target still has no identifier.
    uow.flush_entity(comment.raw()).unwrap();
    assert_eq!(remote.calls(), vec!["comment/create"]);
    let saved = remote.row_where("comment", "id", &Value::Int(1)).unwrap();
    assert_eq!(saved.get("postId"), Some(&Value::Null));

    // The full flush creates the post and heals the reference.
    em.flush().unwrap();
    let healed = remote.row_where("comment", "id", &Value::Int(1)).unwrap();
    assert_eq!(healed.get("postId"), Some(&Value::Int(1)));
}

#[test]
fn collection_adds_patch_the_owning_side() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    seed_post(&remote, 1, "stray", Value::Null);
    let em = fixtures::manager(remote.clone());

    let user = em.find::<User>("u-1").unwrap().unwrap();
    let posts = user.get(|u| u.posts.clone()).unwrap().unwrap();
    let post = em.find::<Post>(1).unwrap().unwrap();
    posts.add(post.raw().clone());

    em.flush().unwrap();
    assert_eq!(remote.calls_to("post/patch"), 1);
    let claimed = remote.row_where("post", "id", &Value::Int(1)).unwrap();
    assert_eq!(claimed.get("authorId"), Some(&Value::from("u-1")));
    assert!(!posts.is_dirty());
}

#[test]
fn collection_removal_nulls_the_owning_side() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    seed_post(&remote, 1, "mine", Value::from("u-1"));
    let em = fixtures::manager(remote.clone());

    let user = em.find::<User>("u-1").unwrap().unwrap();
    let posts = user.get(|u| u.posts.clone()).unwrap().unwrap();
    let items = posts.items().unwrap();
    assert_eq!(items.len(), 1);
    posts.remove(&items[0]);

    em.flush().unwrap();
    let released = remote.row_where("post", "id", &Value::Int(1)).unwrap();
    assert_eq!(released.get("authorId"), Some(&Value::Null));
    // The post itself survives; only the link is severed.
    assert_eq!(remote.rows("post").len(), 1);
}

#[test]
fn orphan_removal_deletes_dropped_elements() {
    let remote = fixtures::remote();
    seed_post(&remote, 1, "hello", Value::Null);
    remote.seed(
        "comment",
        row(&[
            ("id", Value::Int(5)),
            ("body", Value::from("bye")),
            ("postId", Value::Int(1)),
        ]),
    );
    let em = fixtures::manager(remote.clone());
    let uow = em.unit_of_work();

    let post = em.find::<Post>(1).unwrap().unwrap();
    let comments = post.get(|p| p.comments.clone()).unwrap().unwrap();
    let items = comments.items().unwrap();
    assert_eq!(items.len(), 1);
    comments.remove(&items[0]);

    em.flush().unwrap();
    assert_eq!(remote.calls_to("comment/remove"), 1);
    assert!(remote.rows("comment").is_empty());
    assert_eq!(uow.state_of(&items[0]), EntityState::Detached);
}

#[test]
fn deletes_run_before_collection_patches() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    seed_post(&remote, 1, "stray", Value::Null);
    remote.seed(
        "comment",
        row(&[
            ("id", Value::Int(5)),
            ("body", Value::from("bye")),
            ("postId", Value::Null),
        ]),
    );
    let em = fixtures::manager(remote.clone());

    let doomed = em.find::<Comment>(5).unwrap().unwrap();
    em.remove(doomed.raw()).unwrap();

    let user = em.find::<User>("u-1").unwrap().unwrap();
    let posts = user.get(|u| u.posts.clone()).unwrap().unwrap();
    let post = em.find::<Post>(1).unwrap().unwrap();
    posts.add(post.raw().clone());

    em.flush().unwrap();
    let calls = remote.calls();
    let removed_at = calls.iter().position(|c| c == "comment/remove").unwrap();
    let patched_at = calls.iter().position(|c| c == "post/patch").unwrap();
    assert!(removed_at < patched_at);
}

#[test]
fn failed_steps_name_the_class_and_operation() {
    let remote = fixtures::remote();
    remote.fail_next("user/create", 500, "storage unavailable");
    let em = fixtures::manager(remote);

    em.persist(User {
        id: Some("u-1".to_owned()),
        name: "Ada".to_owned(),
        email: None,
        posts: None,
    })
    .unwrap();

    match em.flush().unwrap_err() {
        CoreError::CommitFailed {
            class, operation, ..
        } => {
            assert_eq!(class, "User");
            assert_eq!(operation, "create");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failed_creates_stay_queued_for_retry() {
    let remote = fixtures::remote();
    let em = fixtures::manager(remote.clone());

    em.persist(User {
        id: Some("u-1".to_owned()),
        name: "Ada".to_owned(),
        email: None,
        posts: None,
    })
    .unwrap();
    remote.fail_next("user/create", 500, "storage unavailable");
    assert!(em.flush().is_err());
    assert!(remote.rows("user").is_empty());

    em.flush().unwrap();
    let saved = remote
        .row_where("user", "id", &Value::from("u-1"))
        .unwrap();
    assert_eq!(saved.get("name"), Some(&Value::from("Ada")));
}

#[test]
fn failed_removals_stay_queued_for_retry() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    let em = fixtures::manager(remote.clone());

    let user = em.find::<User>("u-1").unwrap().unwrap();
    em.remove(user.raw()).unwrap();
    remote.fail_next("user/remove", 500, "storage unavailable");
    assert!(em.flush().is_err());
    assert_eq!(remote.rows("user").len(), 1);

    em.flush().unwrap();
    assert!(remote.rows("user").is_empty());
}

#[test]
fn narrowed_flush_leaves_other_pending_work_queued() {
    let remote = fixtures::remote();
    let em = fixtures::manager(remote.clone());
    let uow = em.unit_of_work();

    let first = em
        .persist(User {
            id: Some("u-1".to_owned()),
            name: "Ada".to_owned(),
            email: None,
            posts: None,
        })
        .unwrap();
    em.persist(User {
        id: Some("u-2".to_owned()),
        name: "Grace".to_owned(),
        email: None,
        posts: None,
    })
    .unwrap();

    uow.flush_entity(first.raw()).unwrap();
    assert_eq!(remote.rows("user").len(), 1);

    em.flush().unwrap();
    assert_eq!(remote.rows("user").len(), 2);
}
