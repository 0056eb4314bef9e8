//! Criteria translation on repository searches.

use remorm_core::Ref;
use remorm_testkit::fixtures::{self, Deploy};
use remorm_wire::{Record, Value};
use time::macros::datetime;

fn row(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn seed_deploy(remote: &remorm_testkit::FakeRemote, id: i64, env: &str, build_at: i64) {
    remote.seed(
        "deploy",
        row(&[
            ("id", Value::Int(id)),
            ("env", Value::from(env)),
            ("buildAt", Value::Int(build_at)),
        ]),
    );
}

#[test]
fn association_criteria_convert_to_the_target_identifier_type() {
    let remote = fixtures::remote();
    seed_deploy(&remote, 1, "prod", 1_700_000_000);
    seed_deploy(&remote, 2, "staging", 1_700_000_500);
    let em = fixtures::manager(remote.clone());

    // Builds are keyed by a timestamp; the wire carries unix seconds.
    let mut criteria = Record::new();
    criteria.insert(
        "build".to_owned(),
        Value::DateTime(datetime!(2023-11-14 22:13:20 UTC)),
    );
    let found = em
        .repository("Deploy")
        .unwrap()
        .find_by(&criteria, &[], None, None)
        .unwrap();
    assert_eq!(found.len(), 1);
    let deploy: Ref<Deploy> = found[0].typed().unwrap();
    assert_eq!(deploy.get(|d| d.env.clone()).unwrap(), "prod");
}

#[test]
fn in_filters_convert_each_element() {
    let remote = fixtures::remote();
    seed_deploy(&remote, 1, "prod", 1_700_000_000);
    seed_deploy(&remote, 2, "staging", 1_700_000_500);
    seed_deploy(&remote, 3, "dev", 1_700_001_000);
    let em = fixtures::manager(remote.clone());

    let mut criteria = Record::new();
    criteria.insert(
        "build".to_owned(),
        Value::Array(vec![
            Value::DateTime(datetime!(2023-11-14 22:13:20 UTC)),
            Value::DateTime(datetime!(2023-11-14 22:21:40 UTC)),
        ]),
    );
    let found = em
        .repository("Deploy")
        .unwrap()
        .find_by(&criteria, &[], None, None)
        .unwrap();
    assert_eq!(found.len(), 2);
}
