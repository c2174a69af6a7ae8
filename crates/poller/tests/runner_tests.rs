//! Control-loop ticks against a stub controller.
//!
//! Each test drives [`Runner::tick`] directly and counts the REST calls
//! the stub receives, so the job-poll, filename-fetch and dispatch wiring
//! is checked without the push socket.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use printwatch_core::monitor::{Monitor, MonitorConfig};
use printwatch_core::profile::TelemetryProfile;
use printwatch_core::ticket::CommandKind;
use printwatch_core::trigger::PredictionTarget;
use printwatch_octoprint::api::OctoPrintApi;
use printwatch_octoprint::retry::RetryPolicy;
use printwatch_octoprint::session::{ControllerSession, Credentials};
use printwatch_poller::prediction::PredictionService;
use printwatch_poller::runner::Runner;
use printwatch_poller::store::CsvStore;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct Stub {
    state: Arc<Mutex<String>>,
    file: Arc<Mutex<Option<String>>>,
    job_calls: Arc<AtomicU32>,
    commands: Arc<Mutex<Vec<String>>>,
    fail_commands: Arc<AtomicBool>,
}

impl Stub {
    fn new(state: &str, file: Option<&str>) -> Self {
        Self {
            state: Arc::new(Mutex::new(state.into())),
            file: Arc::new(Mutex::new(file.map(str::to_string))),
            job_calls: Arc::new(AtomicU32::new(0)),
            commands: Arc::new(Mutex::new(Vec::new())),
            fail_commands: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set_job(&self, state: &str, file: Option<&str>) {
        *self.state.lock().unwrap() = state.into();
        *self.file.lock().unwrap() = file.map(str::to_string);
    }

    fn job_calls(&self) -> u32 {
        self.job_calls.load(Ordering::SeqCst)
    }

    fn take_commands(&self) -> Vec<String> {
        std::mem::take(&mut *self.commands.lock().unwrap())
    }
}

async fn job(State(stub): State<Stub>) -> Json<Value> {
    stub.job_calls.fetch_add(1, Ordering::SeqCst);
    let state = stub.state.lock().unwrap().clone();
    let file = stub.file.lock().unwrap().clone();
    Json(json!({
        "state": state,
        "job": { "file": { "name": file } },
    }))
}

async fn command(State(stub): State<Stub>, Json(body): Json<Value>) -> StatusCode {
    stub.commands
        .lock()
        .unwrap()
        .push(body["command"].as_str().unwrap_or_default().to_string());
    if stub.fail_commands.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn serve(stub: Stub) -> String {
    let app = Router::new()
        .route("/api/job", get(job))
        .route("/api/printer/command", post(command))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn runner(base_url: &str, dir: &std::path::Path) -> Runner {
    let cancel = CancellationToken::new();
    let retry = RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(10),
    };
    let api = OctoPrintApi::new(base_url, "test-key", Duration::from_secs(5)).unwrap();
    let session = ControllerSession::new(
        api,
        Credentials {
            user: "pi".into(),
            password: "raspberry".into(),
        },
        retry,
        cancel.clone(),
    );
    let predictions = PredictionService::new(
        Vec::<(PredictionTarget, String)>::new(),
        Duration::from_secs(5),
        retry,
        cancel.clone(),
    )
    .unwrap();

    let mut config = MonitorConfig::for_profile(TelemetryProfile::Feedrate);
    config.check_interval = Duration::ZERO;
    Runner::new(
        Monitor::new(config),
        session,
        CsvStore::new(dir.join("printer_data.csv"), TelemetryProfile::Feedrate),
        predictions,
        cancel,
    )
}

// ---------------------------------------------------------------------------
// Job polling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filename_fetched_once_when_print_starts() {
    let stub = Stub::new("Operational", None);
    let base_url = serve(stub.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner(&base_url, dir.path());

    runner.tick().await.unwrap();
    assert_eq!(stub.job_calls(), 1);
    assert!(stub.take_commands().is_empty());

    stub.set_job("Printing from SD", Some("zdm4ms~4.gco"));
    runner.tick().await.unwrap();
    assert_eq!(stub.job_calls(), 3, "status poll plus one filename fetch");
    assert_eq!(stub.take_commands(), vec!["M114", "M220"]);
    assert_eq!(runner.monitor().job().filename(), Some("zdm4ms~4"));

    runner.tick().await.unwrap();
    assert_eq!(stub.job_calls(), 4, "no filename fetch while the print continues");
    assert!(stub.take_commands().is_empty());
}

#[tokio::test]
async fn missing_filename_fetched_until_known() {
    let stub = Stub::new("Printing from SD", None);
    let base_url = serve(stub.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner(&base_url, dir.path());

    runner.tick().await.unwrap();
    runner.tick().await.unwrap();
    assert_eq!(stub.job_calls(), 4);
    assert_eq!(runner.monitor().job().filename(), Some("(no file)"));
    assert!(stub.take_commands().is_empty());

    stub.set_job("Printing from SD", Some("zdm4ms~4.gco"));
    runner.tick().await.unwrap();
    assert_eq!(stub.job_calls(), 6);
    assert_eq!(runner.monitor().job().filename(), Some("zdm4ms~4"));
    assert_eq!(stub.take_commands(), vec!["M114", "M220"]);

    runner.tick().await.unwrap();
    assert_eq!(stub.job_calls(), 7);
}

#[tokio::test]
async fn print_end_then_restart_fetches_filename_again() {
    let stub = Stub::new("Printing from SD", Some("zdm4ms~4.gco"));
    let base_url = serve(stub.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner(&base_url, dir.path());

    runner.tick().await.unwrap();
    stub.set_job("Operational", None);
    runner.tick().await.unwrap();
    assert_eq!(runner.monitor().job().filename(), None);

    stub.set_job("Printing from SD", Some("zd5b20~1.gco"));
    runner.tick().await.unwrap();
    assert_eq!(stub.job_calls(), 2 + 1 + 2);
    assert_eq!(runner.monitor().job().filename(), Some("zd5b20~1"));
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_commands_stay_pending_for_next_tick() {
    let stub = Stub::new("Printing from SD", Some("zdm4ms~4.gco"));
    stub.fail_commands.store(true, Ordering::SeqCst);
    let base_url = serve(stub.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut runner = runner(&base_url, dir.path());

    runner.tick().await.unwrap();
    assert_eq!(stub.take_commands(), vec!["M114", "M114", "M220", "M220"]);
    for kind in [CommandKind::Position, CommandKind::SpeedFactor] {
        assert!(runner.monitor().first_pending(kind));
        assert!(!runner.monitor().ticket(kind).unwrap().is_waiting());
    }

    stub.fail_commands.store(false, Ordering::SeqCst);
    runner.tick().await.unwrap();
    assert_eq!(stub.take_commands(), vec!["M114", "M220"]);
    for kind in [CommandKind::Position, CommandKind::SpeedFactor] {
        assert!(!runner.monitor().first_pending(kind));
        assert!(runner.monitor().ticket(kind).unwrap().is_waiting());
    }
}
