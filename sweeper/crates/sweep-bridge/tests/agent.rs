//! Collaborators against a fake in-page agent on a temp Unix socket.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use sweep_bridge::{BridgeSettings, InputKind, Side, connect_page, starter_parameters};
use sweep_core::{InputDriver, ResultReader, StepError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

/// `None` means the agent swallows the request and never answers.
type Handler = dyn Fn(&str, &Value) -> Option<Result<Value, String>> + Send + Sync;

struct FakeAgent {
    _dir: tempfile::TempDir,
    path: PathBuf,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    accepts: Arc<AtomicUsize>,
}

impl FakeAgent {
    fn spawn<H>(handler: H) -> Self
    where
        H: Fn(&str, &Value) -> Option<Result<Value, String>> + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let handler: Arc<Handler> = Arc::new(handler);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let accepts = Arc::new(AtomicUsize::new(0));

        let (h, c, a) = (handler, Arc::clone(&calls), Arc::clone(&accepts));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                a.fetch_add(1, Ordering::SeqCst);
                let (h, c) = (Arc::clone(&h), Arc::clone(&c));
                tokio::spawn(async move {
                    let (read_half, mut write_half) = tokio::io::split(stream);
                    let mut lines = BufReader::new(read_half).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let req: Value = serde_json::from_str(&line).unwrap();
                        let method = req["method"].as_str().unwrap_or_default().to_string();
                        let params = req["params"].clone();
                        c.lock().unwrap().push((method.clone(), params.clone()));
                        let Some(outcome) = h(&method, &params) else {
                            continue;
                        };
                        let resp = match outcome {
                            Ok(result) => json!({"id": req["id"], "ok": true, "result": result}),
                            Err(error) => json!({"id": req["id"], "ok": false, "error": error}),
                        };
                        let mut out = resp.to_string();
                        out.push('\n');
                        if write_half.write_all(out.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self {
            _dir: dir,
            path,
            calls,
            accepts,
        }
    }

    fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    fn params_of(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn settings(&self) -> BridgeSettings {
        fast_settings().with_socket_path(&self.path)
    }
}

fn fast_settings() -> BridgeSettings {
    BridgeSettings {
        element_timeout_ms: 150,
        poll_interval_ms: 10,
        post_apply_ms: 5,
        rpc_timeout_ms: 500,
        ..Default::default()
    }
}

/// A page with one input `length`, an apply button and rendered results.
fn tester_page(method: &str, params: &Value) -> Option<Result<Value, String>> {
    Some(Ok(match method {
        "find_input" => json!({"found": params["name"] == "length"}),
        "find_apply" | "find_results" => json!({"found": true}),
        "set_input" | "click_apply" => json!({}),
        "read_metrics" => json!({
            "found": true,
            "metrics": {
                "net_profit": "−1 234.50 USDT −1.23%",
                "total_trades": "87",
                "percent_profitable": "56.32%",
                "profit_factor": "1.214",
                "max_drawdown": "412.00 USDT 4.12%",
                "avg_trade": null,
                "avg_win_trade": "n/a",
            }
        }),
        "read_trades" => json!({
            "found": true,
            "rows": [
                ["2024-01-02 09:30", "Buy", "100.5", "2", "10.25"],
                ["2024-01-03 10:00", "Exit Short", "99", "2", "−3.5"],
                ["broken", "row"],
            ]
        }),
        "list_inputs" => json!({
            "found": true,
            "inputs": [
                {"name": "length", "label": "Length", "type": "number", "value": "14"},
                {"name": "src", "label": "Source", "type": "string", "value": "close"},
                {"name": "mult", "label": "Multiplier", "type": "number",
                 "value": "2", "min": "1", "max": "3", "step": "0.5"},
                {"name": "ma_type", "type": "select", "value": "EMA", "options": ["SMA", "EMA"]},
            ]
        }),
        "read_text" => match params["key"].as_str() {
            Some("balance") => json!({"found": true, "text": "10 512.75 USDT"}),
            _ => json!({"found": false, "text": null}),
        },
        other => return Some(Err(format!("unknown method {other}"))),
    }))
}

#[tokio::test]
async fn driver_sets_input_then_applies() {
    let agent = FakeAgent::spawn(tester_page);
    let (driver, _) = connect_page(agent.settings());

    driver.set_value("length", 12.5).await.unwrap();

    assert_eq!(
        agent.methods(),
        vec!["find_input", "set_input", "find_apply", "click_apply"]
    );
    assert_eq!(
        agent.params_of("set_input"),
        vec![json!({"name": "length", "value": "12.5"})]
    );
}

#[tokio::test]
async fn driver_polls_until_control_appears() {
    let lookups = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&lookups);
    let agent = FakeAgent::spawn(move |method, params| {
        if method == "find_input" {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            return Some(Ok(json!({"found": n >= 3})));
        }
        tester_page(method, params)
    });
    let (driver, _) = connect_page(agent.settings());

    driver.set_value("length", 3.0).await.unwrap();
    assert_eq!(lookups.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn missing_control_times_out_as_not_found() {
    let agent = FakeAgent::spawn(tester_page);
    let (driver, _) = connect_page(agent.settings());

    let err = driver.set_value("nope", 1.0).await.unwrap_err();
    assert_eq!(err, StepError::ControlNotFound { name: "nope".into() });
    assert!(!agent.methods().contains(&"set_input".to_string()));
}

#[tokio::test]
async fn missing_apply_is_reported() {
    let agent = FakeAgent::spawn(|method, params| {
        if method == "find_apply" {
            return Some(Ok(json!({"found": false})));
        }
        tester_page(method, params)
    });
    let (driver, _) = connect_page(agent.settings());

    assert_eq!(
        driver.set_value("length", 1.0).await,
        Err(StepError::ApplyNotFound)
    );
    assert!(!agent.methods().contains(&"click_apply".to_string()));
}

#[tokio::test]
async fn reader_parses_each_metric_independently() {
    let agent = FakeAgent::spawn(tester_page);
    let (_, reader) = connect_page(agent.settings());

    let snap = reader.read().await.unwrap();
    assert_eq!(snap.net_profit, Some(-1234.5));
    assert_eq!(snap.total_trades, Some(87.0));
    assert_eq!(snap.percent_profitable, Some(56.32));
    assert_eq!(snap.profit_factor, Some(1.214));
    assert_eq!(snap.max_drawdown, Some(412.0));
    assert_eq!(snap.avg_trade, None);
    assert_eq!(snap.avg_win_trade, None);
    assert_eq!(snap.avg_bars_in_trade, None);
}

#[tokio::test]
async fn results_never_rendered_is_unavailable() {
    let agent = FakeAgent::spawn(|method, params| {
        if method == "find_results" {
            return Some(Ok(json!({"found": false})));
        }
        tester_page(method, params)
    });
    let (_, reader) = connect_page(agent.settings());

    assert!(reader.read().await.is_none());
    assert!(!agent.methods().contains(&"read_metrics".to_string()));
}

#[tokio::test]
async fn current_results_combine_every_readout() {
    let agent = FakeAgent::spawn(tester_page);
    let (_, reader) = connect_page(agent.settings());

    let current = reader.read_current().await.unwrap();
    assert!(current.metrics.is_some());
    assert_eq!(current.trades.len(), 2);
    assert_eq!(current.trades[0].side, Side::Buy);
    assert_eq!(current.trades[1].side, Side::Sell);
    assert_eq!(current.trades[0].profit, 10.25);
    assert_eq!(current.trades[1].profit, -3.5);
    assert_eq!(current.balance, Some(10512.75));
    assert_eq!(current.drawdown, None);
}

#[tokio::test]
async fn connection_is_reused_across_calls() {
    let agent = FakeAgent::spawn(tester_page);
    let (driver, reader) = connect_page(agent.settings());

    driver.set_value("length", 1.0).await.unwrap();
    driver.set_value("length", 2.0).await.unwrap();
    reader.read().await.unwrap();
    assert_eq!(agent.accepts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn agent_error_surfaces_as_bridge_step_error() {
    let agent = FakeAgent::spawn(|method, params| {
        if method == "set_input" {
            return Some(Err("input is disabled".into()));
        }
        tester_page(method, params)
    });
    let (driver, _) = connect_page(agent.settings());

    match driver.set_value("length", 1.0).await {
        Err(StepError::Bridge(msg)) => assert!(msg.contains("input is disabled")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn silent_agent_times_out_and_reconnects() {
    let hang_once = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hang_once);
    let agent = FakeAgent::spawn(move |method, params| {
        if method == "find_input" && seen.fetch_add(1, Ordering::SeqCst) == 0 {
            return None;
        }
        tester_page(method, params)
    });
    let settings = BridgeSettings {
        rpc_timeout_ms: 50,
        ..agent.settings()
    };
    let (driver, _) = connect_page(settings);

    assert!(matches!(
        driver.set_value("length", 1.0).await,
        Err(StepError::Timeout { ref what, after_ms: 50 }) if what == "find_input"
    ));
    driver.set_value("length", 1.0).await.unwrap();
    assert_eq!(agent.accepts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn absent_agent_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings().with_socket_path(dir.path().join("missing.sock"));
    let (driver, reader) = connect_page(settings);

    assert!(matches!(
        driver.set_value("length", 1.0).await,
        Err(StepError::Bridge(_))
    ));
    assert!(reader.read().await.is_none());
}

#[tokio::test]
async fn trades_are_polled_until_list_renders() {
    let reads = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reads);
    let agent = FakeAgent::spawn(move |method, params| {
        if method == "read_trades" && seen.fetch_add(1, Ordering::SeqCst) < 2 {
            return Some(Ok(json!({"found": false})));
        }
        tester_page(method, params)
    });
    let (_, reader) = connect_page(agent.settings());

    let trades = reader.read_trades().await.unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(reads.load(Ordering::SeqCst), 3);
    assert_eq!(agent.params_of("read_trades").len(), 3);
}

#[tokio::test]
async fn trades_never_rendered_read_as_empty() {
    let agent = FakeAgent::spawn(|method, params| {
        if method == "read_trades" {
            return Some(Ok(json!({"found": false})));
        }
        tester_page(method, params)
    });
    let (_, reader) = connect_page(agent.settings());

    assert!(reader.read_trades().await.unwrap().is_empty());
    assert!(agent.params_of("read_trades").len() > 1);
}

#[tokio::test]
async fn readout_appearing_late_is_read() {
    let reads = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reads);
    let agent = FakeAgent::spawn(move |method, params| {
        if method == "read_text" && seen.fetch_add(1, Ordering::SeqCst) == 0 {
            return Some(Ok(json!({"found": false, "text": null})));
        }
        tester_page(method, params)
    });
    let (_, reader) = connect_page(agent.settings());

    assert_eq!(reader.read_current_balance().await.unwrap(), Some(10512.75));
    assert_eq!(
        agent.params_of("read_text"),
        vec![json!({"key": "balance"}), json!({"key": "balance"})]
    );
}

#[tokio::test]
async fn inputs_are_listed_once_dialog_opens() {
    let lists = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&lists);
    let agent = FakeAgent::spawn(move |method, params| {
        if method == "list_inputs" && seen.fetch_add(1, Ordering::SeqCst) == 0 {
            return Some(Ok(json!({"found": false})));
        }
        tester_page(method, params)
    });
    let (driver, _) = connect_page(agent.settings());

    let inputs = driver.list_inputs().await.unwrap();
    assert_eq!(lists.load(Ordering::SeqCst), 2);
    let names: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["length", "src", "mult", "ma_type"]);
    assert_eq!(inputs[1].kind, InputKind::Text);
    assert_eq!(inputs[3].options, vec!["SMA", "EMA"]);

    let params = starter_parameters(&inputs);
    assert_eq!(params.len(), 2);
    let length = params.get("length").unwrap();
    assert_eq!((length.min, length.max, length.step), (7.0, 28.0, 1.0));
    let mult = params.get("mult").unwrap();
    assert_eq!((mult.min, mult.max, mult.step), (1.0, 3.0, 0.5));
}

#[tokio::test]
async fn closed_dialog_lists_nothing() {
    let agent = FakeAgent::spawn(|method, params| {
        if method == "list_inputs" {
            return Some(Ok(json!({"found": false})));
        }
        tester_page(method, params)
    });
    let (driver, _) = connect_page(agent.settings());

    assert!(driver.list_inputs().await.unwrap().is_empty());
    assert!(agent.params_of("list_inputs").len() > 1);
}
