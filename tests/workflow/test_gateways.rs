use serde_json::json;
use std::sync::Arc;
use weavergen::{
    handler_fn, Context, Engine, ErrorCategory, ExclusiveGateway, SpanStatus, Task, VarMap,
};

fn set_key_handler(key: &'static str, value: &'static str) -> Arc<dyn weavergen::ServiceHandler> {
    handler_fn(move |_vars: VarMap| async move {
        let mut out = VarMap::new();
        out.insert(key.to_string(), json!(value));
        Ok(out)
    })
}

#[tokio::test]
async fn parallel_merge_is_last_branch_wins() {
    let mut engine = Engine::new();
    engine.register_service_handler("SetsA", set_key_handler("k", "a"));
    engine.register_service_handler("SetsB", set_key_handler("k", "b"));
    let gateway = Task::parallel(
        "fan",
        "Fan Out",
        vec![
            vec![engine
                .create_service_task("TaskSetsA", "Sets A", "SetsA")
                .unwrap()],
            vec![engine
                .create_service_task("TaskSetsB", "Sets B", "SetsB")
                .unwrap()],
        ],
    );
    engine.register_workflow("Par", vec![gateway]);

    let ctx = engine
        .execute_workflow("Par", None)
        .await
        .expect("run succeeds");

    assert_eq!(ctx.get("k"), Some(&json!("b")));
    let names: Vec<&str> = ctx.spans.iter().map(|span| span.name.as_str()).collect();
    assert_eq!(
        names,
        ["service.TaskSetsA", "service.TaskSetsB", "parallel.fan"]
    );
    assert!(ctx.spans.iter().all(|span| span.status == SpanStatus::Ok));
}

#[tokio::test]
async fn parallel_merge_equals_fold_over_branch_outputs() {
    let mut engine = Engine::new();
    engine.register_service_handler("B0", set_key_handler("shared", "zero"));
    engine.register_service_handler("B1", {
        handler_fn(|_vars: VarMap| async move {
            let mut out = VarMap::new();
            out.insert("shared".to_string(), json!("one"));
            out.insert("only_b1".to_string(), json!(true));
            Ok(out)
        })
    });
    engine.register_service_handler("B2", set_key_handler("only_b2", "two"));
    let gateway = Task::parallel(
        "fan",
        "Fan Out",
        vec![
            vec![engine.create_service_task("t0", "T0", "B0").unwrap()],
            vec![engine.create_service_task("t1", "T1", "B1").unwrap()],
            vec![engine.create_service_task("t2", "T2", "B2").unwrap()],
        ],
    );
    engine.register_workflow("Fold", vec![gateway]);

    let mut initial = VarMap::new();
    initial.insert("seed".to_string(), json!("kept"));
    let ctx = engine
        .execute_workflow("Fold", Some(initial))
        .await
        .expect("run succeeds");

    // Fold of branch outputs over the initial dict, registration order.
    assert_eq!(ctx.get("seed"), Some(&json!("kept")));
    assert_eq!(ctx.get("shared"), Some(&json!("one")));
    assert_eq!(ctx.get("only_b1"), Some(&json!(true)));
    assert_eq!(ctx.get("only_b2"), Some(&json!("two")));
}

#[tokio::test]
async fn branch_restoring_initial_value_still_wins() {
    let mut engine = Engine::new();
    engine.register_service_handler("SetsA", set_key_handler("k", "a"));
    engine.register_service_handler("SetsInit", set_key_handler("k", "init"));
    let gateway = Task::parallel(
        "fan",
        "Fan Out",
        vec![
            vec![engine
                .create_service_task("overwrite", "Overwrite", "SetsA")
                .unwrap()],
            vec![engine
                .create_service_task("restore", "Restore", "SetsInit")
                .unwrap()],
        ],
    );
    engine.register_workflow("Restore", vec![gateway]);

    let mut initial = VarMap::new();
    initial.insert("k".to_string(), json!("init"));
    let ctx = engine
        .execute_workflow("Restore", Some(initial))
        .await
        .expect("run succeeds");

    // The last branch wrote "init" back; writing the pre-fork value is
    // still a write, so it beats the earlier branch's "a".
    assert_eq!(ctx.get("k"), Some(&json!("init")));
}

fn route_engine() -> Engine {
    let mut engine = Engine::new();
    engine.register_service_handler("MarkLt5", set_key_handler("path", "lt5"));
    engine.register_service_handler("MarkElse", set_key_handler("path", "else"));
    let lt5 = engine
        .create_service_task("mark_lt5", "Mark lt5", "MarkLt5")
        .unwrap();
    let fallback = engine
        .create_service_task("mark_else", "Mark else", "MarkElse")
        .unwrap();
    let gateway = ExclusiveGateway::new("route", "Route")
        .branch(
            "lt5",
            Arc::new(|ctx: &Context| {
                ctx.get("n").and_then(|v| v.as_i64()).map(|n| n < 5) == Some(true)
            }),
            vec![lt5],
        )
        .default_path("else", vec![fallback]);
    engine.register_workflow("Route", vec![gateway.into()]);
    engine
}

#[tokio::test]
async fn exclusive_gateway_takes_first_matching_branch() {
    let engine = route_engine();
    let mut initial = VarMap::new();
    initial.insert("n".to_string(), json!(3));
    let ctx = engine
        .execute_workflow("Route", Some(initial))
        .await
        .expect("run succeeds");

    assert_eq!(ctx.get("path"), Some(&json!("lt5")));
    let names: Vec<&str> = ctx.spans.iter().map(|span| span.name.as_str()).collect();
    assert_eq!(names, ["service.mark_lt5", "exclusive.route"]);
    // Non-selected branches leave no spans.
    assert!(!names.iter().any(|name| name.contains("mark_else")));
    assert_eq!(
        ctx.spans[1].attributes.get("selected_branch"),
        Some(&json!("lt5"))
    );
}

#[tokio::test]
async fn exclusive_gateway_falls_back_to_default_branch() {
    let engine = route_engine();
    let mut initial = VarMap::new();
    initial.insert("n".to_string(), json!(10));
    let ctx = engine
        .execute_workflow("Route", Some(initial))
        .await
        .expect("run succeeds");

    assert_eq!(ctx.get("path"), Some(&json!("else")));
    let names: Vec<&str> = ctx.spans.iter().map(|span| span.name.as_str()).collect();
    assert_eq!(names, ["service.mark_else", "exclusive.route"]);
}

#[tokio::test]
async fn exclusive_gateway_without_default_fails_on_no_match() {
    let mut engine = Engine::new();
    engine.register_service_handler("MarkLt5", set_key_handler("path", "lt5"));
    let lt5 = engine
        .create_service_task("mark_lt5", "Mark lt5", "MarkLt5")
        .unwrap();
    let gateway = ExclusiveGateway::new("route", "Route").branch(
        "lt5",
        Arc::new(|ctx: &Context| {
            ctx.get("n").and_then(|v| v.as_i64()).map(|n| n < 5) == Some(true)
        }),
        vec![lt5],
    );
    engine.register_workflow("Route", vec![gateway.into()]);

    let mut initial = VarMap::new();
    initial.insert("n".to_string(), json!(10));
    let failure = engine
        .execute_workflow("Route", Some(initial))
        .await
        .expect_err("no branch matches");

    assert_eq!(failure.error.category, ErrorCategory::NoMatchingBranch);
    assert_eq!(failure.error.code, "WG-GATE-001");
    let last = failure.context.spans.last().expect("gateway span recorded");
    assert_eq!(last.name, "exclusive.route");
    assert_eq!(last.status, SpanStatus::Error);
}
