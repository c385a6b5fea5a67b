//! Nested entity shaping.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use poplar_entity::{Entity, FieldOptions};
use serde_json::{Map, Value, json};

fn address() -> Entity {
    let mut entity = Entity::new();
    entity
        .add("city", FieldOptions::new())
        .unwrap()
        .add("zip", FieldOptions::new().with_type("string"))
        .unwrap();
    entity
}

#[test]
fn nested_entities_shape_objects_and_lists() {
    let mut user = Entity::new();
    user.add("name", FieldOptions::new())
        .unwrap()
        .add("home", FieldOptions::new().using(address()))
        .unwrap()
        .add("offices", FieldOptions::new().using(address()))
        .unwrap();

    let raw = json!({
        "name": "Felix",
        "home": {"city": "Paris", "zip": 75001, "secret": true},
        "offices": [{"city": "Lyon", "zip": 69001}, {"city": "Nice"}],
        "password": "hunter2"
    });

    assert_eq!(
        user.parse(raw, &Map::new(), None),
        json!({
            "name": "Felix",
            "home": {"city": "Paris", "zip": "75001"},
            "offices": [
                {"city": "Lyon", "zip": "69001"},
                {"city": "Nice", "zip": null}
            ]
        })
    );
}

#[test]
fn default_short_circuits_nested_entity() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let mut nested = Entity::new();
    nested
        .add_fn("touched", FieldOptions::new(), move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(json!(true))
        })
        .unwrap();

    let mut parent = Entity::new();
    parent
        .add_fn(
            "profile",
            FieldOptions::new().using(nested).default_value(json!("none")),
            |_, _| Ok(Value::Null),
        )
        .unwrap();

    assert_eq!(
        parent.parse(json!({}), &Map::new(), None),
        json!({"profile": "none"})
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn top_level_lists_are_mapped_in_order() {
    let mut entity = Entity::new();
    entity
        .add("id", FieldOptions::new().with_type("number"))
        .unwrap();
    assert_eq!(
        entity.parse(json!([{"id": "2"}, {"id": "1"}, null]), &Map::new(), None),
        json!([{"id": 2}, {"id": 1}, {"id": null}])
    );
}

#[test]
fn list_type_hints_wrap_scalars() {
    let mut entity = Entity::new();
    entity
        .add("tags", FieldOptions::new().with_type("[string]"))
        .unwrap();
    assert_eq!(
        entity.parse(json!({"tags": 7}), &Map::new(), None),
        json!({"tags": ["7"]})
    );
}
