//! End-to-end tests of the argument pipeline: coercion, sanitization,
//! validation and presentation, driven through the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use poplar_api::{
    ApiError, ArgSpec, Context, Dispatcher, Entity, FieldOptions, Handler, MethodDefinition,
    MethodRegistry, Presenter, ValidatorOption,
};
use serde_json::{Map, Value, json};

/// `users.info` requiring a numeric id; records the arguments it receives.
fn users_info(seen: Arc<Mutex<Vec<Value>>>) -> Dispatcher {
    let info = MethodDefinition::new(
        "info",
        Handler::sync(move |args| {
            seen.lock().push(Value::Object(args.clone()));
            Ok(json!({"id": args["id"], "name": "felix"}))
        }),
    )
    .unwrap()
    .accept(ArgSpec::new("id").with_type("number").required(true));

    let mut users = MethodRegistry::new("users").unwrap();
    users.define(info).unwrap();
    let mut dispatcher = Dispatcher::new();
    dispatcher.use_registry(users).unwrap();
    dispatcher
}

#[tokio::test]
async fn missing_required_argument_is_a_validation_error() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = users_info(Arc::clone(&seen));

    let mut ctx = Context::default();
    let error = dispatcher.invoke("users.info", &mut ctx).await.unwrap_err();

    assert_eq!(
        error.payload(),
        json!({
            "validations": {
                "message": "id: 'required' validation failed",
                "errors": {"id": {"required": "id: 'required' validation failed"}}
            }
        })
    );
    assert_eq!(ctx.error, Some(error));
    assert!(ctx.result.is_none());
    assert!(seen.lock().is_empty(), "business function must not run");
}

#[tokio::test]
async fn arguments_are_coerced_before_the_business_function() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = users_info(Arc::clone(&seen));

    let mut ctx = Context::from_json(json!({"id": "42"}));
    dispatcher.invoke("users.info", &mut ctx).await.unwrap();

    assert_eq!(*seen.lock(), vec![json!({"id": 42})]);
    assert_eq!(ctx.result, Some(json!({"id": 42, "name": "felix"})));
    assert_eq!(ctx.options["args"], json!({"id": 42}));
    assert!(ctx.error.is_none());
}

#[tokio::test]
async fn zero_is_present_for_required() {
    let dispatcher = users_info(Arc::new(Mutex::new(Vec::new())));

    let mut ctx = Context::from_json(json!({"id": 0}));
    dispatcher.invoke("users.info", &mut ctx).await.unwrap();
    assert_eq!(ctx.result, Some(json!({"id": 0, "name": "felix"})));

    let mut ctx = Context::from_json(json!({"id": ""}));
    assert!(dispatcher.invoke("users.info", &mut ctx).await.is_err());
}

#[tokio::test]
async fn sanitize_and_validate_run_once_per_invocation() {
    let sanitized = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sanitized);

    let method = MethodDefinition::new("echo", Handler::sync(|args| Ok(Value::Object(args))))
        .unwrap()
        .accept(
            ArgSpec::new("name")
                .with_type("string")
                .sanitize("trim", true)
                .sanitize_with("suffix", move |value, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(format!("{}!", value.as_str().unwrap_or_default())))
                }),
        );

    let mut invocation = method.invocation();
    let mut ctx = Context::from_json(json!({"name": "  felix "}));
    invocation.invoke(&mut ctx).await.unwrap();
    assert_eq!(ctx.result, Some(json!({"name": "felix!"})));

    invocation.invoke(&mut ctx).await.unwrap();
    assert_eq!(ctx.result, Some(json!({"name": "felix!"})));
    assert_eq!(sanitized.load(Ordering::SeqCst), 1);
    assert!(invocation.is_sanitized());
    assert!(invocation.is_validated());
}

#[tokio::test]
async fn failed_validation_is_cached() {
    let method = MethodDefinition::new("echo", Handler::sync(|args| Ok(Value::Object(args))))
        .unwrap()
        .accept(
            ArgSpec::new("email")
                .with_type("string")
                .validate("isEmail", ValidatorOption::from(true).with_message("bad email")),
        );

    let mut invocation = method.invocation();
    let mut ctx = Context::from_json(json!({"email": "nope"}));
    let first = invocation.invoke(&mut ctx).await.unwrap_err();

    // Raw arguments changing afterwards does not re-run the pipeline.
    ctx.args.insert("email".into(), json!("felix@example.com"));
    let second = invocation.invoke(&mut ctx).await.unwrap_err();

    assert_eq!(first, second);
    assert_eq!(
        first.validations().and_then(|errors| errors.field("email")).map(|f| f["isEmail"].clone()),
        Some("bad email".to_string())
    );
}

#[tokio::test]
async fn business_function_errors_propagate() {
    let method = MethodDefinition::new(
        "fail",
        Handler::new(|_| async { Err::<Value, _>(ApiError::new("boom")) }),
    )
    .unwrap();

    let mut ctx = Context::default();
    let error = method.invocation().invoke(&mut ctx).await.unwrap_err();
    assert_eq!(error, ApiError::new("boom"));
}

#[tokio::test]
async fn entity_presenter_shapes_lists() {
    let mut user = Entity::new();
    user.add("id", FieldOptions::new().with_type("number"))
        .unwrap()
        .add("name", FieldOptions::new().default_value(json!("anonymous")))
        .unwrap();

    let method = MethodDefinition::new(
        "list",
        Handler::new(|_| async {
            Ok::<_, ApiError>(json!([
                {"name": "felix", "id": "1", "password": "x"},
                {"id": 2}
            ]))
        }),
    )
    .unwrap()
    .returns(Presenter::entity(user));

    let mut ctx = Context::new(Map::new());
    method.invocation().invoke(&mut ctx).await.unwrap();
    assert_eq!(
        ctx.result,
        Some(json!([
            {"id": 1, "name": "felix"},
            {"id": 2, "name": "anonymous"}
        ]))
    );
}

#[tokio::test]
async fn missing_response_source_leaves_result_untouched() {
    let mut item = Entity::new();
    item.add("id", FieldOptions::new()).unwrap();

    let method = MethodDefinition::new("list", Handler::sync(|_| Ok(json!({"total": 0}))))
        .unwrap()
        .returns(item)
        .response_source("data.items");

    let mut ctx = Context::default();
    method.invocation().invoke(&mut ctx).await.unwrap();
    assert_eq!(ctx.result, Some(json!({"total": 0})));
}

#[tokio::test]
async fn nested_response_source_keeps_siblings() {
    let mut item = Entity::new();
    item.add("id", FieldOptions::new()).unwrap();

    let method = MethodDefinition::new(
        "list",
        Handler::sync(|_| Ok(json!({"data": {"items": [{"id": 1, "x": 1}], "page": 2}, "total": 1}))),
    )
    .unwrap()
    .returns(item)
    .response_source("data.items");

    let mut ctx = Context::default();
    method.invocation().invoke(&mut ctx).await.unwrap();
    assert_eq!(
        ctx.result,
        Some(json!({"data": {"items": [{"id": 1}], "page": 2}, "total": 1}))
    );
}
