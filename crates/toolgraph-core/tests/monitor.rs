//! Integration tests for run monitoring.

mod support;

use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use toolgraph_core::monitor::{CallContext, Event, EventKind, MonitorFactory};
use toolgraph_core::resolver::Resolver;

use support::{MemoryFetcher, config};

fn ctx(id: &str, parent: Option<&str>, tool_id: &str) -> CallContext {
    CallContext {
        id: id.to_string(),
        parent_id: parent.map(str::to_string),
        tool_id: tool_id.to_string(),
    }
}

#[tokio::test]
async fn stop_writes_run_dump() {
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .file("/work/main.gpt", "tools: lister\n\nlist things\n---\nname: lister\n\nls"),
    );
    let program = Resolver::new(fetcher, config())
        .load("main.gpt", "", None)
        .await
        .unwrap();

    let temp = TempDir::new().unwrap();
    let dump_path = temp.path().join("state.json");
    let factory = MonitorFactory::new(Some(dump_path.clone()));
    let monitor = factory.start(&program, "hello");

    let root = ctx("1", None, "/work/main.gpt:1");
    let child = ctx("2", Some("1"), "/work/main.gpt:5");
    monitor.event(Event::now(
        root.clone(),
        EventKind::CallStart {
            input: "hello".to_string(),
        },
    ));
    monitor.event(Event::now(
        child.clone(),
        EventKind::CallStart {
            input: "{}".to_string(),
        },
    ));
    monitor.event(Event::now(
        child,
        EventKind::CallFinish {
            output: "a b c".to_string(),
        },
    ));
    monitor.event(Event::now(root, EventKind::CallContinue { tool_results: 1 }));

    assert_eq!(monitor.call_name("1"), "main");
    assert_eq!(monitor.call_name("2"), "lister(2)");

    monitor.stop("done", None).unwrap();

    let dump: Value = serde_json::from_str(&std::fs::read_to_string(&dump_path).unwrap()).unwrap();
    assert_eq!(dump["id"], "1");
    assert_eq!(dump["input"], "hello");
    assert_eq!(dump["output"], "done");
    assert!(dump.get("err").is_none());
    assert_eq!(dump["program"]["entryToolID"], "/work/main.gpt:1");

    let calls = dump["calls"].as_array().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1]["parentId"], "1");
    assert_eq!(calls[1]["output"], "a b c");
}

#[tokio::test]
async fn stop_records_error() {
    let fetcher = Arc::new(MemoryFetcher::new().file("/work/main.gpt", "hi"));
    let program = Resolver::new(fetcher, config())
        .load("main.gpt", "", None)
        .await
        .unwrap();

    let temp = TempDir::new().unwrap();
    let dump_path = temp.path().join("state.json");
    let monitor = MonitorFactory::new(Some(dump_path.clone())).start(&program, "");
    monitor.stop("", Some("model unavailable")).unwrap();

    let dump: Value = serde_json::from_str(&std::fs::read_to_string(&dump_path).unwrap()).unwrap();
    assert_eq!(dump["err"], "model unavailable");
    assert!(dump.get("calls").is_none());
}
