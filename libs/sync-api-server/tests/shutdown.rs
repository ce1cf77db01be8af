//! Drain-on-shutdown behaviour against a real listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sync_api::{AppendSuffix, Change, MarkProcessed, TransformError, Transformer};
use sync_api_server::AppState;
use sync_engine::{
    Coordinator, EngineConfig, EngineError, Lifecycle, ShutdownState, ShutdownSupervisor,
    WorkerPool,
};

/// `MarkProcessed` that takes its time.
struct SlowMark(Duration);

impl Transformer for SlowMark {
    type Item = Change;

    fn name(&self) -> &'static str {
        "slow-mark"
    }

    fn key(&self, item: &Change) -> String {
        item.id.clone()
    }

    fn transform(&self, item: Change) -> Result<Change, TransformError> {
        std::thread::sleep(self.0);
        MarkProcessed.transform(item)
    }
}

struct Harness {
    addr: SocketAddr,
    lifecycle: Lifecycle,
    supervisor: ShutdownSupervisor,
    server: JoinHandle<std::io::Result<()>>,
}

async fn start(delay: Duration, grace: Duration) -> Harness {
    let cfg = EngineConfig {
        workers: 2,
        max_batch_size: 16,
        grace_period: grace,
    };
    let lifecycle = Lifecycle::new();
    let stop_accepting = CancellationToken::new();
    let cancel_work = CancellationToken::new();

    let state = AppState {
        changes: Coordinator::new(Arc::new(WorkerPool::start(
            Arc::new(SlowMark(delay)),
            &cfg,
            cancel_work.clone(),
        ))),
        plain: Coordinator::new(Arc::new(WorkerPool::start(
            Arc::new(AppendSuffix::default()),
            &cfg,
            cancel_work.clone(),
        ))),
        lifecycle: lifecycle.clone(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(sync_api_server::run(listener, state, stop_accepting.clone()));

    let supervisor = ShutdownSupervisor::new(
        lifecycle.clone(),
        stop_accepting,
        cancel_work,
        cfg.grace_period,
    );
    Harness {
        addr,
        lifecycle,
        supervisor,
        server,
    }
}

fn one_change() -> Value {
    json!({"data": [{"type": "create", "data": {"_id": "1", "name": "x"}}]})
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_request_completes_and_new_ones_are_refused() {
    let h = start(Duration::from_millis(400), Duration::from_secs(3)).await;
    let url = format!("http://{}/sync", h.addr);

    let in_flight = tokio::spawn({
        let url = url.clone();
        async move {
            reqwest::Client::new()
                .post(url)
                .json(&one_change())
                .send()
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    let supervise = tokio::spawn(h.supervisor.supervise(
        async move {
            let _ = signal_rx.await;
        },
        h.server,
    ));
    signal_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_ne!(h.lifecycle.state(), ShutdownState::Running);

    // A fresh client cannot reuse the in-flight connection.
    let late = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap()
        .post(&url)
        .json(&one_change())
        .send()
        .await;
    match late {
        Err(_) => {}
        Ok(resp) => assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE),
    }

    let resp = in_flight.await.unwrap().expect("in-flight request was dropped");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"][0]["data"]["status"], "processed");

    supervise.await.unwrap().unwrap();
    assert_eq!(h.lifecycle.state(), ShutdownState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stuck_request_forces_timeout_after_grace() {
    let grace = Duration::from_millis(200);
    let h = start(Duration::from_millis(900), grace).await;
    let url = format!("http://{}/sync", h.addr);

    let _in_flight = tokio::spawn(async move {
        reqwest::Client::new()
            .post(url)
            .json(&one_change())
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    let err = h.supervisor.supervise(async {}, h.server).await.unwrap_err();

    let elapsed = start.elapsed();
    assert!(matches!(err, EngineError::ShutdownTimeout { .. }));
    assert!(elapsed >= grace, "gave up after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(800), "waited {elapsed:?}");
    assert_eq!(h.lifecycle.state(), ShutdownState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_server_stops_cleanly() {
    let h = start(Duration::ZERO, Duration::from_secs(2)).await;

    let resp = reqwest::get(format!("http://{}/health", h.addr)).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    drop(resp);

    h.supervisor.supervise(async {}, h.server).await.unwrap();
    assert_eq!(h.lifecycle.state(), ShutdownState::Stopped);
}
