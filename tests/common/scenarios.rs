//! Behaviour every adapter must share, run against each backend.

use super::{id_of, names, record, seed_users, write_fixture};
use pathstore::adapter::{Adapter, AdapterError, SaveOptions, SaveOutcome, Selection};
use pathstore::mutation::{MutationError, UpdateMode};
use pathstore::path::PathError;
use pathstore::query::{Condition, SelectOptions, TranslationError};
use pathstore::Record;
use serde_json::{json, Value};

fn condition(value: Value) -> Condition {
    Condition::from_value(value).expect("conditions are JSON objects")
}

async fn select(store: &dyn Adapter, schema: &str, filter: Value) -> Vec<Record> {
    store
        .select(schema, Some(&condition(filter)), &SelectOptions::default())
        .await
        .expect("select should succeed")
        .into_records()
}

async fn patch(store: &dyn Adapter, id: &Value, values: Value, mode: UpdateMode) -> Record {
    store
        .save_one("user", id, &record(values), &SaveOptions::with_mode(mode))
        .await
        .expect("save_one should succeed")
}

pub async fn comparison_and_null_filters(store: &dyn Adapter) {
    seed_users(store).await;

    let older = select(store, "user", json!({ "age": [">", 10], "order_by": { "name": "asc" } })).await;
    assert_eq!(names(&older), vec!["alice", "carol"]);

    let unknown_age = select(store, "user", json!({ "age": ["==", "null"] })).await;
    assert_eq!(names(&unknown_age), vec!["dave"]);

    let paged = select(
        store,
        "user",
        json!({ "age": ["!=", "NULL"], "order_by": { "age": "DESC" }, "offset": 1, "limit": 2 }),
    )
    .await;
    assert_eq!(names(&paged), vec!["carol", "bob"]);

    let listed = store
        .count("user", Some(&condition(json!({ "name": ["in", "alice", "bob"] }))))
        .await
        .unwrap();
    assert_eq!(listed, 2);
    let listed = store
        .count("user", Some(&condition(json!({ "name": ["in", ["carol"]] }))))
        .await
        .unwrap();
    assert_eq!(listed, 1);
}

pub async fn reserved_keys_are_not_filters(store: &dyn Adapter) {
    let users = seed_users(store).await;
    let alice = id_of(&users[0]);

    let found = store
        .select(
            "user",
            Some(&condition(json!({ "_index": alice, "name": "bob" }))),
            &SelectOptions::default(),
        )
        .await
        .unwrap();
    match found {
        Selection::One(Some(user)) => assert_eq!(user["name"], json!("alice")),
        other => panic!("expected a single record, got {:?}", other),
    }

    let everyone = select(store, "user", json!({ "order_by": "name", "offset": 0, "limit": 10 })).await;
    assert_eq!(names(&everyone), vec!["alice", "bob", "carol", "dave"]);
}

pub async fn index_lookup_miss_is_empty(store: &dyn Adapter, missing: Value) {
    seed_users(store).await;
    let found = store
        .select("user", Some(&Condition::index(missing)), &SelectOptions::default())
        .await
        .unwrap();
    assert_eq!(found, Selection::One(None));
}

pub async fn projection_keeps_selected_columns(store: &dyn Adapter) {
    seed_users(store).await;
    let options = SelectOptions {
        select_columns: Some(vec!["name".to_string()]),
        ..SelectOptions::default()
    };
    let found = store.select("user", None, &options).await.unwrap().into_records();
    assert_eq!(found.len(), 4);
    for user in found {
        assert_eq!(user.keys().collect::<Vec<_>>(), vec!["name"]);
    }
}

pub async fn dump_then_sync(store: &dyn Adapter) {
    let dir = tempfile::tempdir().unwrap();
    let fixture = write_fixture(
        dir.path(),
        "users.json",
        json!([{ "name": "x", "age": 1 }, { "name": "y", "age": 2 }]),
    );

    assert_eq!(store.dump("user", &fixture).await.unwrap(), 2);
    assert_eq!(store.count("user", None).await.unwrap(), 2);

    store.sync("user").await.unwrap();
    let remaining = store
        .select("user", None, &SelectOptions::default())
        .await
        .unwrap();
    assert!(remaining.is_empty());

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, r#"{ "rows": [] }"#).unwrap();
    assert!(matches!(
        store.dump("user", &broken).await.unwrap_err(),
        AdapterError::Fixture { .. }
    ));
}

pub async fn update_modes(store: &dyn Adapter) {
    let erin = store
        .create(
            "user",
            record(json!({
                "name": "erin",
                "age": 30,
                "tags": ["a", "b", "c"],
                "profile": { "x": 1, "y": 2 },
                "items": [{ "sku": 1, "qty": 1 }, { "sku": 2, "qty": 4 }]
            })),
        )
        .await
        .unwrap();
    let id = id_of(&erin);

    let updated = patch(store, &id, json!({ "tags": "d" }), UpdateMode::Append).await;
    assert_eq!(updated["tags"], json!(["a", "b", "c", "d"]));

    let updated = patch(store, &id, json!({ "tags": ["e", "f"] }), UpdateMode::Append).await;
    assert_eq!(updated["tags"], json!(["a", "b", "c", "d", "e", "f"]));

    let updated = patch(store, &id, json!({ "tags[1]": null }), UpdateMode::Delete).await;
    assert_eq!(updated["tags"], json!(["a", "c", "d", "e", "f"]));

    let updated = patch(store, &id, json!({ "tags": "d" }), UpdateMode::Delete).await;
    assert_eq!(updated["tags"], json!(["a", "c", "e", "f"]));

    let updated = patch(store, &id, json!({ "profile": { "y": 9, "z": 3 } }), UpdateMode::Merge).await;
    assert_eq!(updated["profile"], json!({ "x": 1, "y": 9, "z": 3 }));

    let updated = patch(store, &id, json!({ "profile.x": 7 }), UpdateMode::Cover).await;
    assert_eq!(updated["profile"], json!({ "x": 7, "y": 9, "z": 3 }));

    let updated = patch(store, &id, json!({ "age": 5 }), UpdateMode::Append).await;
    assert_eq!(updated["age"], json!(35));

    let updated = patch(store, &id, json!({ "items[{sku:2}]": { "qty": 5 } }), UpdateMode::Merge).await;
    assert_eq!(updated["items"], json!([{ "sku": 1, "qty": 1 }, { "sku": 2, "qty": 5 }]));

    let updated = patch(store, &id, json!({ "name": null }), UpdateMode::Delete).await;
    assert_eq!(updated["name"], json!(""));
    assert!(updated["updatedAt"].is_string());

    let updated = patch(store, &id, json!({ "profile": null }), UpdateMode::Delete).await;
    assert!(updated.get("profile").map_or(true, Value::is_null));
    let stored = store
        .select("user", Some(&Condition::index(id.clone())), &SelectOptions::default())
        .await
        .unwrap()
        .into_records();
    assert!(stored[0].get("profile").map_or(true, Value::is_null));
    assert_eq!(stored[0]["tags"], json!(["a", "c", "e", "f"]));

    let error = store
        .save_one(
            "user",
            &id,
            &record(json!({ "items[{sku:9}].qty": 1 })),
            &SaveOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        AdapterError::Mutation(MutationError::Path(PathError::PathNotFound { .. }))
    ));

    // the failed patch left the stored record alone
    let stored = store
        .select("user", Some(&Condition::index(id)), &SelectOptions::default())
        .await
        .unwrap()
        .into_records();
    assert_eq!(stored[0]["items"][1]["qty"], json!(5));
}

pub async fn save_one_on_missing_record(store: &dyn Adapter, missing: Value) {
    let error = store
        .save_one("user", &missing, &record(json!({ "age": 1 })), &SaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, AdapterError::RecordNotFound { .. }));
}

pub async fn relations_populate_both_sides(store: &dyn Adapter) {
    let heart = store.create("organ", record(json!({ "name": "heart" }))).await.unwrap();
    let lung = store.create("organ", record(json!({ "name": "lung" }))).await.unwrap();
    let frank = store
        .create("user", record(json!({ "name": "frank", "organs": [id_of(&heart)] })))
        .await
        .unwrap();

    let found = store
        .select("user", Some(&Condition::index(id_of(&frank))), &SelectOptions::extended())
        .await
        .unwrap()
        .into_records();
    let organs = found[0]["organs"].as_array().unwrap();
    assert_eq!(organs.len(), 1);
    assert_eq!(organs[0]["name"], json!("heart"));

    let found = store
        .select("organ", Some(&Condition::index(id_of(&heart))), &SelectOptions::extended())
        .await
        .unwrap()
        .into_records();
    let users = found[0]["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], json!("frank"));

    // relate, then unrelate
    let related = patch(store, &id_of(&frank), json!({ "organs": id_of(&lung) }), UpdateMode::Append).await;
    let organ_names: Vec<&Value> = related["organs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|organ| &organ["name"])
        .collect();
    assert_eq!(organ_names, vec![&json!("heart"), &json!("lung")]);

    let unrelated = patch(store, &id_of(&frank), json!({ "organs": id_of(&heart) }), UpdateMode::Delete).await;
    let remaining = unrelated["organs"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["name"], json!("lung"));

    let lonely = store
        .select("organ", Some(&Condition::index(id_of(&heart))), &SelectOptions::extended())
        .await
        .unwrap()
        .into_records();
    assert_eq!(lonely[0]["users"], json!([]));
}

pub async fn save_dispatch(store: &dyn Adapter) {
    let users = seed_users(store).await;

    let outcome = store
        .save(
            "user",
            record(json!({ "age": 1 })),
            Some(&condition(json!({ "age": [">", 10] }))),
            &SaveOptions::with_mode(UpdateMode::Append),
        )
        .await
        .unwrap();
    match outcome {
        SaveOutcome::Batch(batch) => {
            assert_eq!(batch.updated.len(), 2);
            assert!(batch.failed.is_empty());
        }
        other => panic!("expected a batch outcome, got {:?}", other),
    }
    let everyone = select(store, "user", json!({ "order_by": { "name": "asc" } })).await;
    let ages: Vec<Value> = everyone
        .iter()
        .map(|user| user.get("age").cloned().unwrap_or(Value::Null))
        .collect();
    assert_eq!(ages, vec![json!(31), json!(8), json!(13), Value::Null]);

    let outcome = store
        .save(
            "user",
            record(json!({ "name": "robert" })),
            Some(&condition(json!({ "_index": id_of(&users[1]) }))),
            &SaveOptions::default(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SaveOutcome::Updated(ref user) if user["name"] == json!("robert")));

    let outcome = store
        .save("user", record(json!({ "name": "zoe" })), None, &SaveOptions::default())
        .await
        .unwrap();
    assert!(matches!(outcome, SaveOutcome::Created(_)));
    assert_eq!(store.count("user", None).await.unwrap(), 5);
}

/// One matching record cannot take the patch; the others still do.
pub async fn batch_save_reports_failures(store: &dyn Adapter) {
    seed_users(store).await;
    let eve = store
        .create("user", record(json!({ "name": "eve", "age": "unknown" })))
        .await
        .unwrap();

    let outcome = store
        .save(
            "user",
            record(json!({ "age": 1 })),
            Some(&condition(json!({ "name": ["in", ["alice", "eve"]] }))),
            &SaveOptions::with_mode(UpdateMode::Append),
        )
        .await
        .unwrap();
    let batch = match outcome {
        SaveOutcome::Batch(batch) => batch,
        other => panic!("expected a batch outcome, got {:?}", other),
    };

    assert_eq!(names(&batch.updated), vec!["alice"]);
    assert_eq!(batch.updated[0]["age"], json!(31));
    assert_eq!(batch.failed.len(), 1);
    let (failed_id, error) = &batch.failed[0];
    assert_eq!(failed_id, &id_of(&eve));
    assert!(matches!(
        error,
        AdapterError::Mutation(MutationError::InvalidValue { .. })
    ));

    let stored = select(store, "user", json!({ "name": "eve" })).await;
    assert_eq!(stored[0]["age"], json!("unknown"));
}

pub async fn remove_count_and_max(store: &dyn Adapter) {
    seed_users(store).await;

    assert_eq!(store.count("user", None).await.unwrap(), 4);
    assert_eq!(store.max("user", "age", None).await.unwrap(), json!(30));
    assert_eq!(
        store
            .max("user", "age", Some(&condition(json!({ "age": ["<", 20] }))))
            .await
            .unwrap(),
        json!(12)
    );

    let removed = store
        .remove("user", Some(&condition(json!({ "age": ["<", 10] }))))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.count("user", None).await.unwrap(), 3);

    assert_eq!(store.remove("user", None).await.unwrap(), 3);
    assert_eq!(store.count("user", None).await.unwrap(), 0);
    assert_eq!(store.max("user", "age", None).await.unwrap(), json!(0));
}

pub async fn scope_filters_by_creation_time(store: &dyn Adapter) {
    seed_users(store).await;
    store
        .create(
            "user",
            record(json!({ "name": "old", "createdAt": "2000-01-01T00:00:00Z" })),
        )
        .await
        .unwrap();

    let recent = store
        .count("user", Some(&condition(json!({ "scope": "week" }))))
        .await
        .unwrap();
    assert_eq!(recent, 4);

    let error = store
        .count("organ", Some(&condition(json!({ "scope": "year" }))))
        .await
        .unwrap_err();
    assert!(matches!(error, AdapterError::InvalidQuery { .. }));
}

pub async fn unknown_operator_is_rejected(store: &dyn Adapter) {
    let error = store
        .count("user", Some(&condition(json!({ "age": ["~", 1] }))))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        AdapterError::Translation(TranslationError::UnknownOperator { .. })
    ));
}
