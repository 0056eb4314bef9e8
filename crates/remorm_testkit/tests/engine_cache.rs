//! Read-through record caching across managers sharing one backend.

use remorm_core::{CacheBackend, InMemoryCache, KeyStrategy};
use remorm_testkit::fixtures::{self, Post, User};
use remorm_testkit::FakeRemote;
use remorm_wire::{Record, Value};
use std::sync::Arc;

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

#[test]
fn a_second_manager_reads_from_the_cache() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    let cache: Arc<InMemoryCache> = Arc::new(InMemoryCache::new());

    let first = fixtures::manager_with_cache(remote.clone(), cache.clone(), KeyStrategy::Scalar);
    first.find::<User>("u-1").unwrap().unwrap();
    assert_eq!(remote.calls_to("user/find"), 1);
    assert!(!cache.is_empty());

    let second = fixtures::manager_with_cache(remote.clone(), cache, KeyStrategy::Scalar);
    let cached = second.find::<User>("u-1").unwrap().unwrap();
    assert_eq!(cached.get(|u| u.name.clone()).unwrap(), "Ada");
    assert_eq!(remote.calls_to("user/find"), 1);
}

#[test]
fn patches_invalidate_the_cached_record() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    let cache: Arc<InMemoryCache> = Arc::new(InMemoryCache::new());

    let writer = fixtures::manager_with_cache(remote.clone(), cache.clone(), KeyStrategy::Scalar);
    let user = writer.find::<User>("u-1").unwrap().unwrap();
    user.set(|u| u.name = "Countess".to_owned()).unwrap();
    writer.flush().unwrap();

    let reader = fixtures::manager_with_cache(remote.clone(), cache, KeyStrategy::Scalar);
    let fresh = reader.find::<User>("u-1").unwrap().unwrap();
    assert_eq!(fresh.get(|u| u.name.clone()).unwrap(), "Countess");
    // The stale entry was dropped, so the read went remote again.
    assert_eq!(remote.calls_to("user/find"), 2);
}

#[test]
fn deletes_invalidate_the_cached_record() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    let cache: Arc<InMemoryCache> = Arc::new(InMemoryCache::new());

    let writer = fixtures::manager_with_cache(remote.clone(), cache.clone(), KeyStrategy::Scalar);
    let user = writer.find::<User>("u-1").unwrap().unwrap();
    writer.remove(user.raw()).unwrap();
    writer.flush().unwrap();

    let reader = fixtures::manager_with_cache(remote.clone(), cache, KeyStrategy::Scalar);
    assert!(reader.find::<User>("u-1").unwrap().is_none());
    assert_eq!(remote.calls_to("user/find"), 2);
}

#[test]
fn classes_without_cache_config_always_go_remote() {
    let remote = fixtures::remote();
    remote.seed(
        "post",
        row(&[
            ("id", Value::Int(1)),
            ("title", Value::from("hello")),
            ("likes", Value::Int(0)),
            ("authorId", Value::Null),
        ]),
    );
    let cache: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new());

    let first = fixtures::manager_with_cache(remote.clone(), cache.clone(), KeyStrategy::Scalar);
    first.find::<Post>(1).unwrap().unwrap();
    let second = fixtures::manager_with_cache(remote.clone(), cache, KeyStrategy::Scalar);
    second.find::<Post>(1).unwrap().unwrap();

    assert_eq!(remote.calls_to("post/find"), 2);
}

#[test]
fn hashed_keys_round_trip_like_scalar_ones() {
    let remote = fixtures::remote();
    seed_user(&remote, "u-1", "Ada");
    let cache: Arc<InMemoryCache> = Arc::new(InMemoryCache::new());

    let first = fixtures::manager_with_cache(remote.clone(), cache.clone(), KeyStrategy::Hashed);
    first.find::<User>("u-1").unwrap().unwrap();
    let second = fixtures::manager_with_cache(remote.clone(), cache, KeyStrategy::Hashed);
    second.find::<User>("u-1").unwrap().unwrap();

    assert_eq!(remote.calls_to("user/find"), 1);
}
