//! The control loop.
//!
//! [`Runner`] owns the [`Monitor`] and is the only code that mutates
//! telemetry state. It wakes once a second to poll the job and dispatch
//! due commands, and in between drains log lines from the stream task,
//! executing the effects the monitor hands back.

use std::time::{Duration, Instant};

use chrono::Local;
use printwatch_core::error::CoreError;
use printwatch_core::job::{JobTransition, NO_FILE};
use printwatch_core::monitor::{Effect, Monitor};
use printwatch_octoprint::api::{OctoPrintApi, OctoPrintApiError};
use printwatch_octoprint::client::StreamClient;
use printwatch_octoprint::events::StreamEvent;
use printwatch_octoprint::reconnect::ReconnectPolicy;
use printwatch_octoprint::session::{ControllerSession, Credentials};
use printwatch_octoprint::stream::spawn_stream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PollerConfig;
use crate::prediction::{PredictionError, PredictionService};
use crate::store::CsvStore;

/// Control-loop wake-up period.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the stream task after the loop ends.
const STREAM_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that end a session and trigger a restart.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Api(#[from] OctoPrintApiError),

    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error("Push socket task ended unexpectedly")]
    StreamEnded,

    #[error("No session token after login")]
    NoSession,
}

pub struct Runner {
    monitor: Monitor,
    session: ControllerSession,
    store: CsvStore,
    predictions: PredictionService,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(
        monitor: Monitor,
        session: ControllerSession,
        store: CsvStore,
        predictions: PredictionService,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            monitor,
            session,
            store,
            predictions,
            cancel,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Run until cancelled. Returns an error only if the session must be
    /// rebuilt.
    pub async fn run(mut self, mut events: mpsc::Receiver<StreamEvent>) -> Result<(), RunnerError> {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Control loop stopping");
                    return Ok(());
                }
                _ = ticker.tick() => self.tick().await?,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    // The stream task also stops on cancellation.
                    None if self.cancel.is_cancelled() => return Ok(()),
                    None => return Err(RunnerError::StreamEnded),
                },
            }
        }
    }

    /// Poll the job if due, then dispatch due commands.
    pub async fn tick(&mut self) -> Result<(), CoreError> {
        if self.monitor.poll_due(Instant::now()) {
            let state = self.session.poll_job_status().await;
            let transition = self.monitor.apply_job_state(state, Instant::now());
            let unnamed = self.monitor.job().filename() == Some(NO_FILE);
            if transition == JobTransition::Started || (self.monitor.job().is_printing() && unnamed)
            {
                let filename = self.session.fetch_active_filename().await;
                self.monitor.set_filename(filename);
            }
        }

        for kind in self.monitor.due_commands(Instant::now()) {
            if self.session.send_command(kind).await {
                self.monitor.command_sent(kind, Instant::now())?;
            } else {
                self.monitor.command_failed(kind, Instant::now())?;
            }
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => tracing::info!("Receiving printer log stream"),
            StreamEvent::Disconnected => tracing::warn!("Printer log stream interrupted"),
            StreamEvent::LogLine(line) => {
                for effect in self.monitor.handle_log_line(&line, Local::now()) {
                    self.execute(effect);
                }
            }
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Persist(record) => match self.store.append(&record) {
                Ok(()) => tracing::debug!(
                    kind = ?record.kind,
                    filename = %record.filename,
                    "Sample saved",
                ),
                Err(e) => tracing::error!(
                    error = %e,
                    path = %self.store.path().display(),
                    "Failed to save sample",
                ),
            },
            Effect::Predict(request) => {
                let target = request.target;
                if self.predictions.spawn(request).is_none() {
                    tracing::warn!(target = %target, "No endpoint configured for prediction");
                }
            }
        }
    }
}

/// Log in, start the stream task, and run the control loop.
///
/// Login is retried until it succeeds or `cancel` fires. Returns
/// `Ok(())` on cancellation.
pub async fn run_session(
    config: &PollerConfig,
    cancel: &CancellationToken,
) -> Result<(), RunnerError> {
    let api = OctoPrintApi::new(&config.octoprint_url, &config.api_key, config.http_timeout)?;
    let mut session = ControllerSession::new(
        api,
        Credentials {
            user: config.user.clone(),
            password: config.password.clone(),
        },
        config.retry_policy(),
        cancel.clone(),
    );

    while !session.login().await {
        tracing::warn!(
            retry_in_secs = config.retry_wait.as_secs(),
            "Could not log in, retrying",
        );
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(config.retry_wait) => {}
        }
    }
    let auth = session.stream_auth().ok_or(RunnerError::NoSession)?;

    let predictions = PredictionService::new(
        config
            .prediction_endpoints()
            .into_iter()
            .map(|(target, endpoint)| (target, endpoint.url.clone())),
        config.http_timeout,
        config.retry_policy(),
        cancel.clone(),
    )?;

    let stream_cancel = cancel.child_token();
    let (events, stream_handle) = spawn_stream(
        StreamClient::new(&config.octoprint_url, auth),
        ReconnectPolicy::fixed(config.retry_wait),
        stream_cancel.clone(),
    );

    let runner = Runner::new(
        Monitor::new(config.monitor_config()),
        session,
        CsvStore::new(config.csv_file.clone(), config.profile),
        predictions,
        cancel.clone(),
    );
    let result = runner.run(events).await;

    stream_cancel.cancel();
    if tokio::time::timeout(STREAM_SHUTDOWN_TIMEOUT, stream_handle)
        .await
        .is_err()
    {
        tracing::warn!("Push socket task did not stop in time");
    }
    result
}
