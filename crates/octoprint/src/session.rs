//! Authenticated controller session with degrading retries.
//!
//! Wraps [`OctoPrintApi`] with the shared [`RetryPolicy`]. Callers get
//! plain values back: exhausted retries become [`JobState::Unknown`],
//! [`NO_FILE`], or `false` instead of errors, so the control loop keeps
//! running through controller outages.

use printwatch_core::job::{normalize_filename, JobState, NO_FILE};
use printwatch_core::ticket::CommandKind;
use tokio_util::sync::CancellationToken;

use crate::api::OctoPrintApi;
use crate::retry::RetryPolicy;

/// Login credentials for the controller.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

pub struct ControllerSession {
    api: OctoPrintApi,
    credentials: Credentials,
    retry: RetryPolicy,
    cancel: CancellationToken,
    session: Option<String>,
}

impl ControllerSession {
    pub fn new(
        api: OctoPrintApi,
        credentials: Credentials,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            credentials,
            retry,
            cancel,
            session: None,
        }
    }

    /// Payload of the push-socket auth frame: `<user>:<session>`.
    pub fn stream_auth(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|session| format!("{}:{}", self.credentials.user, session))
    }

    /// Log in, retrying per policy. Returns `true` on success.
    pub async fn login(&mut self) -> bool {
        let api = &self.api;
        let creds = &self.credentials;
        let result = self
            .retry
            .run("login", &self.cancel, || {
                api.login(&creds.user, &creds.password)
            })
            .await;

        match result {
            Ok(session) => {
                tracing::info!(user = %creds.user, "Logged in to OctoPrint");
                self.session = Some(session);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Login failed");
                self.session = None;
                false
            }
        }
    }

    /// Current job state, or [`JobState::Unknown`] once retries run out.
    pub async fn poll_job_status(&self) -> JobState {
        let result = self
            .retry
            .run("job status", &self.cancel, || self.api.job())
            .await;

        match result {
            Ok(job) => JobState::from_controller(&job.state),
            Err(e) => {
                tracing::warn!(error = %e, "Job status unavailable, assuming unknown");
                JobState::Unknown
            }
        }
    }

    /// Normalised filename of the active job, or [`NO_FILE`].
    pub async fn fetch_active_filename(&self) -> String {
        let result = self
            .retry
            .run("job file", &self.cancel, || self.api.job())
            .await;

        match result {
            Ok(job) => normalize_filename(job.job.file.name.as_deref()),
            Err(e) => {
                tracing::warn!(error = %e, "Job file unavailable");
                NO_FILE.to_string()
            }
        }
    }

    /// Dispatch a telemetry command. Returns `true` once the controller
    /// accepted it.
    pub async fn send_command(&self, kind: CommandKind) -> bool {
        let gcode = kind.gcode();
        let result = self
            .retry
            .run("send command", &self.cancel, || self.api.send_command(gcode))
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(command = %kind, gcode, "Command accepted");
                true
            }
            Err(e) => {
                tracing::error!(command = %kind, gcode, error = %e, "Command not sent");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn session() -> ControllerSession {
        let api = OctoPrintApi::new("http://127.0.0.1:9", "key", Duration::from_secs(1)).unwrap();
        ControllerSession::new(
            api,
            Credentials {
                user: "pi".into(),
                password: "secret".into(),
            },
            RetryPolicy::default(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn stream_auth_requires_login() {
        let mut s = session();
        assert_eq!(s.stream_auth(), None);
        s.session = Some("abc123".into());
        assert_eq!(s.stream_auth().as_deref(), Some("pi:abc123"));
    }

    #[tokio::test]
    async fn cancelled_session_degrades_to_sentinels() {
        let s = session();
        s.cancel.cancel();
        assert_eq!(s.poll_job_status().await, JobState::Unknown);
        assert_eq!(s.fetch_active_filename().await, NO_FILE);
        assert!(!s.send_command(CommandKind::Position).await);
    }
}
