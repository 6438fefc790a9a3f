mod common;

use common::{harness, options};
use entcache_model::{
    Accessor, ConstructionOptions, Id, InstanceOptions, Model, Record, ServiceOptions,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};

fn todos(h: &common::Harness) -> Model {
    h.cache.service(ServiceOptions::new("api/todos")).unwrap()
}

fn ids(h: &common::Harness, namespace: &str) -> Vec<Id> {
    h.store.with_state(namespace, |state| state.ids.clone()).unwrap()
}

// ── Identity resolution ─────────────────────────────────────────

#[test]
fn construct_with_known_id_returns_stored_instance() {
    let h = harness(options());
    let model = todos(&h);

    let first = model.instance(Record::new().with("id", 1).with("title", "a")).unwrap();
    let second = model.instance(Record::new().with("id", 1).with("done", true)).unwrap();

    assert!(first.same_record(&second));
    assert_eq!(first.to_value(), json!({"id": 1, "title": "a", "done": true}));
    assert_eq!(ids(&h, "todos"), vec![Id::Num(1)]);
}

#[test]
fn construct_without_id_gets_temp_id() {
    let h = harness(options());
    let model = todos(&h);

    let todo = model.instance(Record::new().with("title", "a")).unwrap();

    assert_eq!(todo.id(), None);
    let temp = todo.effective_id().unwrap();
    assert_eq!(todo.get("__id"), Some(temp.to_value()));
    let temps = h
        .store
        .with_state("todos", |state| state.temps_by_id.contains_key(&temp))
        .unwrap();
    assert!(temps);
    assert_eq!(ids(&h, "todos"), vec![temp]);
}

#[test]
fn construct_with_temp_id_resolves_to_temp_record() {
    let h = harness(options());
    let model = todos(&h);

    let todo = model.instance(Record::new().with("title", "a")).unwrap();
    let temp = todo.effective_id().unwrap();
    let again = model
        .instance(Record::new().with("__id", temp.to_value()).with("title", "b"))
        .unwrap();

    assert!(todo.same_record(&again));
    assert_eq!(todo.get("title"), Some(json!("b")));
    assert_eq!(ids(&h, "todos").len(), 1);
}

#[test]
fn uncommitted_instance_stays_out_of_state() {
    let h = harness(options());
    let model = todos(&h);

    let todo = model
        .construct(
            Record::new().with("id", 3),
            InstanceOptions::uncommitted(),
            ConstructionOptions::default(),
        )
        .unwrap();

    assert_eq!(todo.id(), Some(Id::Num(3)));
    assert!(ids(&h, "todos").is_empty());
    assert!(model.get_from_store(&Id::Num(3)).unwrap().is_none());
}

#[test]
fn merge_off_skips_incoming_data() {
    let h = harness(options());
    let model = h
        .cache
        .service(
            ServiceOptions::new("notes")
                .instance_defaults(|| Record::new().with("body", "")),
        )
        .unwrap();

    let note = model
        .construct(
            Record::new().with("body", "ignored"),
            InstanceOptions::uncommitted(),
            ConstructionOptions { merge: false },
        )
        .unwrap();

    assert_eq!(note.to_value(), json!({"body": ""}));
}

#[test]
fn draft_construction_skips_dedupe_and_commit() {
    let h = harness(options());
    let model = todos(&h);
    let stored = model.instance(Record::new().with("id", 1).with("title", "a")).unwrap();

    let draft = model
        .construct(
            Record::new().with("id", 1).with("title", "b"),
            InstanceOptions::draft(),
            ConstructionOptions::default(),
        )
        .unwrap();

    assert!(draft.is_clone());
    assert!(!draft.same_record(&stored));
    assert_eq!(stored.get("title"), Some(json!("a")));
    assert_eq!(ids(&h, "todos"), vec![Id::Num(1)]);
}

// ── Defaults and accessors ──────────────────────────────────────

fn people(h: &common::Harness) -> Model {
    h.cache
        .service(ServiceOptions::new("people").instance_defaults(|| {
            Record::new()
                .with("first", "")
                .with("last", "")
                .with("tags", json!([]))
                .with_accessor(
                    "full",
                    Accessor::getter(|record| {
                        let part = |key| record.get(key).and_then(|v| v.as_str().map(str::to_owned));
                        json!(format!(
                            "{} {}",
                            part("first").unwrap_or_default(),
                            part("last").unwrap_or_default()
                        ))
                    }),
                )
        }))
        .unwrap()
}

#[test]
fn defaults_fill_missing_fields() {
    let h = harness(options());
    let model = people(&h);

    let person = model.instance(Record::new().with("id", 1).with("first", "Ada")).unwrap();

    assert_eq!(person.get("last"), Some(json!("")));
    assert_eq!(person.get("tags"), Some(json!([])));
    assert_eq!(person.get("first"), Some(json!("Ada")));
}

#[test]
fn default_accessor_stays_live() {
    let h = harness(options());
    let model = people(&h);

    let person = model
        .instance(Record::new().with("id", 1).with("first", "Ada").with("last", "Byron"))
        .unwrap();
    assert_eq!(person.get("full"), Some(json!("Ada Byron")));
    assert!(person.entity().read().is_accessor("full"));

    person.set("last", "Lovelace").unwrap();
    assert_eq!(person.get("full"), Some(json!("Ada Lovelace")));
}

#[test]
fn data_cannot_overwrite_read_only_accessor() {
    let h = harness(options());
    let model = people(&h);

    let person = model
        .instance(Record::new().with("id", 1).with("first", "Ada").with("full", "frozen"))
        .unwrap();

    assert_eq!(person.get("full"), Some(json!("Ada ")));
}

#[tokio::test]
async fn records_from_the_service_receive_defaults() {
    let h = harness(options());
    let model = people(&h);
    h.transport.seed(vec![json!({"id": 4, "first": "Grace", "last": "Hopper"})]);

    let found = model.find(json!({})).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("full"), Some(json!("Grace Hopper")));
    assert_eq!(found[0].get("tags"), Some(json!([])));
}

#[tokio::test]
async fn default_accessor_may_read_its_own_service() {
    let h = harness(options());
    let handle: Arc<OnceLock<Model>> = Arc::default();
    let lookup = handle.clone();
    let nodes = h
        .cache
        .service(ServiceOptions::new("nodes").instance_defaults(move || {
            let lookup = lookup.clone();
            Record::new().with_accessor(
                "parentTitle",
                Accessor::getter(move |record| {
                    record
                        .get("parentId")
                        .and_then(|id| Id::from_value(&id))
                        .and_then(|id| lookup.get()?.get_from_store(&id).ok().flatten())
                        .and_then(|parent| parent.get("title"))
                        .unwrap_or(Value::Null)
                }),
            )
        }))
        .unwrap();
    assert!(handle.set(nodes.clone()).is_ok());
    h.transport.seed(vec![
        json!({"id": 1, "title": "root"}),
        json!({"id": 2, "title": "leaf", "parentId": 1}),
    ]);
    nodes.instance(Record::new().with("id", 1).with("title", "root")).unwrap();
    let child = nodes
        .instance(Record::new().with("id", 2).with("title", "leaf").with("parentId", 1))
        .unwrap();
    assert_eq!(child.get("parentTitle"), Some(json!("root")));

    let found = nodes.find_in_store(json!({"query": {"parentTitle": "root"}})).unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].same_record(&child));

    child.patch(json!({})).await.unwrap();
    let draft = child.clone().unwrap();
    draft.set("title", "leaf 2").unwrap();
    draft.save(json!({})).await.unwrap();

    let sent: Vec<Value> = h.transport.calls().into_iter().map(|call| call.data).collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], json!({"title": "leaf 2"}));
    assert_eq!(child.get("title"), Some(json!("leaf 2")));
}

// ── Finders ─────────────────────────────────────────────────────

#[test]
fn get_id_prefers_canonical_id() {
    let h = harness(options());
    let model = todos(&h);

    assert_eq!(model.get_id(&Record::new().with("id", 5).with("__id", "t")), Some(Id::Num(5)));
    assert_eq!(model.get_id(&Record::new().with("__id", "t")), Some(Id::from("t")));
    assert_eq!(model.get_id(&Record::new().with("id", Value::Null)), None);
}

#[test]
fn find_in_store_filters_cached_records() {
    let h = harness(options());
    let model = todos(&h);
    model.instance(Record::new().with("id", 1).with("done", true)).unwrap();
    model.instance(Record::new().with("id", 2).with("done", false)).unwrap();
    model.instance(Record::new().with("id", 3).with("done", true)).unwrap();

    let done = model.find_in_store(json!({"query": {"done": true}})).unwrap();

    let found: Vec<Option<Id>> = done.iter().map(|todo| todo.id()).collect();
    assert_eq!(found, vec![Some(Id::Num(1)), Some(Id::Num(3))]);
    assert!(h.transport.calls().is_empty());
}

#[test]
fn list_keeps_insertion_order() {
    let h = harness(options());
    let model = todos(&h);
    for id in [3, 1, 2] {
        model.instance(Record::new().with("id", id)).unwrap();
    }

    let listed: Vec<Option<Id>> = model.list().unwrap().iter().map(|t| t.id()).collect();
    assert_eq!(listed, vec![Some(Id::Num(3)), Some(Id::Num(1)), Some(Id::Num(2))]);
}

#[tokio::test]
async fn get_returns_cached_instance_for_same_id() {
    let h = harness(options());
    let model = todos(&h);
    let local = model.instance(Record::new().with("id", 9).with("title", "old")).unwrap();
    h.transport.seed(vec![json!({"id": 9, "title": "new"})]);

    let fetched = model.get(9, json!({})).await.unwrap();

    assert!(fetched.same_record(&local));
    assert_eq!(local.get("title"), Some(json!("new")));
}

// ── Properties ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn ids_never_repeat(keys in prop::collection::vec(0i64..8, 1..30)) {
        let h = harness(options());
        let model = todos(&h);
        for key in &keys {
            model.instance(Record::new().with("id", *key)).unwrap();
        }

        let listed = ids(&h, "todos");
        let mut distinct = keys.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(listed.len(), distinct.len());
        prop_assert!(h.store.with_state("todos", |s| s.is_consistent()).unwrap());
    }

    #[test]
    fn same_id_yields_same_record(key in 0i64..1000, title in "[a-z]{1,8}") {
        let h = harness(options());
        let model = todos(&h);
        let first = model.instance(Record::new().with("id", key)).unwrap();
        let second = model.instance(Record::new().with("id", key).with("title", title.as_str())).unwrap();

        prop_assert!(first.same_record(&second));
        prop_assert_eq!(first.get("title"), Some(json!(title)));
    }
}
