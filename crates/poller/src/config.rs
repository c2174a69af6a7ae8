use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use printwatch_core::error::CoreError;
use printwatch_core::gate::AllowList;
use printwatch_core::monitor::MonitorConfig;
use printwatch_core::profile::TelemetryProfile;
use printwatch_core::trigger::PredictionTarget;
use printwatch_octoprint::retry::RetryPolicy;

/// An optional prediction service and the layer height that triggers it.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionEndpoint {
    pub url: String,
    pub height: f64,
}

/// Poller configuration loaded from environment variables.
///
/// Everything except the controller credentials has a default.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Controller base URL (default: `http://localhost`).
    pub octoprint_url: String,
    pub api_key: String,
    pub user: String,
    pub password: String,
    /// Commands polled and CSV schema (default: `feedrate`).
    pub profile: TelemetryProfile,
    pub check_interval: Duration,
    pub position_interval: Duration,
    /// `None` reads settings once per job.
    pub settings_interval: Option<Duration>,
    pub command_timeout: Duration,
    pub max_retries: u32,
    pub retry_wait: Duration,
    pub http_timeout: Duration,
    pub csv_file: PathBuf,
    pub log_file: Option<PathBuf>,
    pub allow_list: AllowList,
    pub dimension_prediction: Option<PredictionEndpoint>,
    pub quality_prediction: Option<PredictionEndpoint>,
    pub state_log_interval: Duration,
    pub idle_log_interval: Duration,
    pub filename_warning_interval: Duration,
}

/// Errors raised while reading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error(transparent)]
    Profile(#[from] CoreError),
}

impl PollerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                          | Default                       |
    /// |----------------------------------|-------------------------------|
    /// | `OCTOPRINT_URL`                  | `http://localhost`            |
    /// | `OCTOPRINT_API_KEY`              | required                      |
    /// | `OCTOPRINT_USER`                 | required                      |
    /// | `OCTOPRINT_PASSWORD`             | required                      |
    /// | `TELEMETRY_PROFILE`              | `feedrate`                    |
    /// | `CHECK_INTERVAL_SECS`            | `5`                           |
    /// | `POSITION_INTERVAL_SECS`         | `5`                           |
    /// | `SETTINGS_INTERVAL_SECS`         | `30` (`0` for `motion`)       |
    /// | `COMMAND_TIMEOUT_SECS`           | `90`                          |
    /// | `MAX_RETRIES`                    | `5`                           |
    /// | `RETRY_WAIT_SECS`                | `10`                          |
    /// | `HTTP_TIMEOUT_SECS`              | `30`                          |
    /// | `CSV_FILE`                       | `data/printer_data.csv`       |
    /// | `LOG_FILE`                       | unset                         |
    /// | `ALLOWED_FILENAMES`              | `zdm4ms~4,zd5b20~1,zd2c72~1`  |
    /// | `PREDICTION_URL`                 | unset                         |
    /// | `PREDICTION_HEIGHT`              | `4.0`                         |
    /// | `QUALITY_PREDICTION_URL`         | unset                         |
    /// | `QUALITY_PREDICTION_HEIGHT`      | `1.0`                         |
    /// | `STATE_LOG_INTERVAL_SECS`        | `30`                          |
    /// | `IDLE_LOG_INTERVAL_SECS`         | `60`                          |
    /// | `FILENAME_WARNING_INTERVAL_SECS` | `300`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let profile: TelemetryProfile = env
            .optional("TELEMETRY_PROFILE")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(TelemetryProfile::Feedrate);

        let settings_interval =
            match env.parse::<u64>("SETTINGS_INTERVAL_SECS", "a whole number of seconds")? {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => MonitorConfig::for_profile(profile).settings_interval,
            };

        Ok(Self {
            octoprint_url: env
                .optional("OCTOPRINT_URL")
                .unwrap_or_else(|| "http://localhost".into()),
            api_key: env.required("OCTOPRINT_API_KEY")?,
            user: env.required("OCTOPRINT_USER")?,
            password: env.required("OCTOPRINT_PASSWORD")?,
            profile,
            check_interval: env.secs("CHECK_INTERVAL_SECS", 5)?,
            position_interval: env.secs("POSITION_INTERVAL_SECS", 5)?,
            settings_interval,
            command_timeout: env.secs("COMMAND_TIMEOUT_SECS", 90)?,
            max_retries: env
                .parse("MAX_RETRIES", "a positive integer")?
                .unwrap_or(5),
            retry_wait: env.secs("RETRY_WAIT_SECS", 10)?,
            http_timeout: env.secs("HTTP_TIMEOUT_SECS", 30)?,
            csv_file: env
                .optional("CSV_FILE")
                .map_or_else(|| PathBuf::from("data/printer_data.csv"), PathBuf::from),
            log_file: env.optional("LOG_FILE").map(PathBuf::from),
            allow_list: env
                .optional("ALLOWED_FILENAMES")
                .map(|v| AllowList::parse(&v))
                .unwrap_or_default(),
            dimension_prediction: env.endpoint("PREDICTION_URL", "PREDICTION_HEIGHT", 4.0)?,
            quality_prediction: env.endpoint(
                "QUALITY_PREDICTION_URL",
                "QUALITY_PREDICTION_HEIGHT",
                1.0,
            )?,
            state_log_interval: env.secs("STATE_LOG_INTERVAL_SECS", 30)?,
            idle_log_interval: env.secs("IDLE_LOG_INTERVAL_SECS", 60)?,
            filename_warning_interval: env.secs("FILENAME_WARNING_INTERVAL_SECS", 300)?,
        })
    }

    /// Configured prediction services, keyed by target.
    pub fn prediction_endpoints(&self) -> Vec<(PredictionTarget, &PredictionEndpoint)> {
        [
            (PredictionTarget::Quality, self.quality_prediction.as_ref()),
            (PredictionTarget::Dimensions, self.dimension_prediction.as_ref()),
        ]
        .into_iter()
        .filter_map(|(target, endpoint)| endpoint.map(|e| (target, e)))
        .collect()
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            profile: self.profile,
            check_interval: self.check_interval,
            position_interval: self.position_interval,
            settings_interval: self.settings_interval,
            command_timeout: self.command_timeout,
            allow_list: self.allow_list.clone(),
            triggers: self
                .prediction_endpoints()
                .into_iter()
                .map(|(target, endpoint)| (target, endpoint.height))
                .collect(),
            state_log_interval: self.state_log_interval,
            idle_log_interval: self.idle_log_interval,
            filename_warning_interval: self.filename_warning_interval,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            delay: self.retry_wait,
        }
    }
}

/// Typed access to a variable lookup. Blank values count as unset.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T: FromStr>(
        &self,
        name: &'static str,
        expected: &'static str,
    ) -> Result<Option<T>, ConfigError> {
        self.optional(name)
            .map(|value| {
                value.parse().map_err(|_| ConfigError::Invalid {
                    name,
                    expected,
                    value,
                })
            })
            .transpose()
    }

    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let secs = self
            .parse(name, "a whole number of seconds")?
            .unwrap_or(default);
        Ok(Duration::from_secs(secs))
    }

    fn endpoint(
        &self,
        url_name: &'static str,
        height_name: &'static str,
        default_height: f64,
    ) -> Result<Option<PredictionEndpoint>, ConfigError> {
        let Some(url) = self.optional(url_name) else {
            return Ok(None);
        };
        let height = self
            .parse(height_name, "a layer height in millimetres")?
            .unwrap_or(default_height);
        Ok(Some(PredictionEndpoint { url, height }))
    }
}
