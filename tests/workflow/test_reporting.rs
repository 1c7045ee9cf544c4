use serde_json::json;
use weavergen::core::workflow::diagram::{trace_to_dot, trace_to_mermaid};
use weavergen::core::workflow::report::{build_report, render_table};
use weavergen::{handler_fn, Engine, Span, Task, VarMap};

async fn finished_run() -> weavergen::Context {
    let mut engine = Engine::new();
    engine.register_service_handler(
        "SetX",
        handler_fn(|_vars: VarMap| async move {
            let mut out = VarMap::new();
            out.insert("x".to_string(), json!(1));
            Ok(out)
        }),
    );
    engine.register_service_handler(
        "SetY",
        handler_fn(|_vars: VarMap| async move {
            let mut out = VarMap::new();
            out.insert("y".to_string(), json!(2));
            Ok(out)
        }),
    );
    let tasks = vec![
        engine.create_service_task("a", "A", "SetX").unwrap(),
        Task::parallel(
            "fan",
            "Fan",
            vec![
                vec![engine.create_service_task("b", "B", "SetY").unwrap()],
                vec![engine.create_service_task("c", "C", "SetX").unwrap()],
            ],
        ),
    ];
    engine.register_workflow("Report", tasks);
    engine
        .execute_workflow("Report", None)
        .await
        .expect("run succeeds")
}

#[tokio::test]
async fn report_has_one_row_per_span_in_order() {
    let ctx = finished_run().await;
    let rows = build_report(&ctx);
    assert_eq!(rows.len(), ctx.spans.len());
    let names: Vec<&str> = rows.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(
        names,
        ["service.a", "service.b", "service.c", "parallel.fan"]
    );
    assert!(rows.iter().all(|row| row.status == "OK"));
    assert!(rows.iter().all(|row| row.duration_ms.is_some()));
}

#[tokio::test]
async fn table_renders_all_rows() {
    let ctx = finished_run().await;
    let table = render_table(&build_report(&ctx));
    assert!(table.contains("TASK"));
    assert!(table.contains("service.a"));
    assert!(table.contains("parallel.fan"));
}

#[tokio::test]
async fn diagrams_follow_span_order() {
    let ctx = finished_run().await;
    let dot = trace_to_dot(&ctx);
    assert!(dot.contains("service.a"));
    assert!(dot.contains("parallel.fan"));
    assert!(dot.contains("->"));

    let mermaid = trace_to_mermaid(&ctx);
    assert!(mermaid.starts_with("flowchart TD"));
    assert!(mermaid.contains("n0 --> n1"));
    assert!(mermaid.contains("n2 --> n3"));
}

#[tokio::test]
async fn variables_and_spans_round_trip_through_json() {
    let ctx = finished_run().await;

    let variables_json = serde_json::to_string(&ctx.variables).expect("serialize variables");
    let variables_back: VarMap = serde_json::from_str(&variables_json).expect("deserialize");
    assert_eq!(variables_back, ctx.variables);

    let spans_json = serde_json::to_string(&ctx.spans).expect("serialize spans");
    let spans_back: Vec<Span> = serde_json::from_str(&spans_json).expect("deserialize");
    assert_eq!(spans_back, ctx.spans);
}
