//! The poller's state machine.
//!
//! [`Monitor`] owns every piece of mutable telemetry state: job status,
//! command tickets, the merged sample, and height triggers. The control
//! loop asks it which commands are due, reports what it dispatched, and
//! feeds it firmware log lines; the monitor answers with [`Effect`]s
//! (rows to persist, predictions to request) for the loop to execute.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::error::CoreError;
use crate::gate::{self, AllowList, Eligibility};
use crate::job::{JobState, JobTracker, JobTransition, NO_FILE};
use crate::parser::{parse_line, Reading};
use crate::profile::TelemetryProfile;
use crate::sample::{Record, Sample, SampleKind};
use crate::throttle::LogThrottle;
use crate::ticket::{CommandKind, CommandTicket};
use crate::trigger::{HeightTrigger, PredictionTarget};
use crate::types::{format_timestamp, Timestamp};

/// Default interval between job-status polls.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Default cadence for `M114`.
pub const DEFAULT_POSITION_INTERVAL: Duration = Duration::from_secs(5);
/// Default cadence for the settings command of the feedrate profile.
pub const DEFAULT_SETTINGS_INTERVAL: Duration = Duration::from_secs(30);
/// A command without a reply for longer than this is resent.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(90);

/// Tunables for a [`Monitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub profile: TelemetryProfile,
    pub check_interval: Duration,
    pub position_interval: Duration,
    /// `None` sends the settings command once per job (plus timeout resends).
    pub settings_interval: Option<Duration>,
    pub command_timeout: Duration,
    pub allow_list: AllowList,
    pub triggers: Vec<(PredictionTarget, f64)>,
    pub state_log_interval: Duration,
    pub idle_log_interval: Duration,
    pub filename_warning_interval: Duration,
}

impl MonitorConfig {
    /// Defaults for `profile`. The motion profile reads settings once per job.
    pub fn for_profile(profile: TelemetryProfile) -> Self {
        let settings_interval = match profile {
            TelemetryProfile::Motion => None,
            TelemetryProfile::Feedrate => Some(DEFAULT_SETTINGS_INTERVAL),
        };
        Self {
            profile,
            check_interval: DEFAULT_CHECK_INTERVAL,
            position_interval: DEFAULT_POSITION_INTERVAL,
            settings_interval,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            allow_list: AllowList::default(),
            triggers: Vec::new(),
            state_log_interval: Duration::from_secs(30),
            idle_log_interval: Duration::from_secs(60),
            filename_warning_interval: Duration::from_secs(300),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::for_profile(TelemetryProfile::Feedrate)
    }
}

/// A prediction call owed to an external service.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub target: PredictionTarget,
    pub start_time: Timestamp,
    pub filename: String,
}

/// Side effect requested by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append the record to the output.
    Persist(Record),
    /// Call a prediction service (fire and forget).
    Predict(PredictionRequest),
}

#[derive(Debug)]
struct CommandSlot {
    ticket: CommandTicket,
    interval: Option<Duration>,
    /// Send at the next opportunity regardless of cadence.
    first_pending: bool,
    last_attempt: Option<Instant>,
}

impl CommandSlot {
    fn new(kind: CommandKind, interval: Option<Duration>) -> Self {
        Self {
            ticket: CommandTicket::new(kind),
            interval,
            first_pending: true,
            last_attempt: None,
        }
    }

    fn cadence_elapsed(&self, now: Instant) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };
        self.last_attempt
            .map_or(true, |at| now.saturating_duration_since(at) >= interval)
    }

    fn reset(&mut self) {
        self.ticket.disarm();
        self.first_pending = true;
        self.last_attempt = None;
    }
}

/// Motion profile: which halves of the `M503` reply have arrived.
#[derive(Debug, Default, Clone, Copy)]
struct SettingsProgress {
    acceleration: bool,
    jerk: bool,
}

impl SettingsProgress {
    fn complete(self) -> bool {
        self.acceleration && self.jerk
    }
}

pub struct Monitor {
    config: MonitorConfig,
    job: JobTracker,
    slots: Vec<CommandSlot>,
    sample: Sample,
    settings: SettingsProgress,
    triggers: Vec<HeightTrigger>,
    last_poll: Option<Instant>,
    state_log: LogThrottle,
    idle_log: LogThrottle,
    filename_warning: LogThrottle,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        let profile = config.profile;
        let slots = profile
            .commands()
            .iter()
            .map(|&kind| {
                let interval = if kind == CommandKind::Position {
                    Some(config.position_interval)
                } else {
                    config.settings_interval
                };
                CommandSlot::new(kind, interval)
            })
            .collect();
        let triggers = config
            .triggers
            .iter()
            .map(|&(target, height)| HeightTrigger::new(target, height))
            .collect();

        Self {
            job: JobTracker::new(),
            slots,
            sample: Sample::default(),
            settings: SettingsProgress::default(),
            triggers,
            last_poll: None,
            state_log: LogThrottle::new(config.state_log_interval),
            idle_log: LogThrottle::new(config.idle_log_interval),
            filename_warning: LogThrottle::new(config.filename_warning_interval),
            config,
        }
    }

    pub fn job(&self) -> &JobTracker {
        &self.job
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn ticket(&self, kind: CommandKind) -> Option<&CommandTicket> {
        self.slots
            .iter()
            .find(|s| s.ticket.kind() == kind)
            .map(|s| &s.ticket)
    }

    /// Whether `kind` is waiting for its first send of the job.
    pub fn first_pending(&self, kind: CommandKind) -> bool {
        self.slots
            .iter()
            .any(|s| s.ticket.kind() == kind && s.first_pending)
    }

    /// Whether the active job's file is on the allow-list.
    pub fn filename_allowed(&self) -> bool {
        self.config.allow_list.contains(self.job.filename())
    }

    // -----------------------------------------------------------------------
    // Job status
    // -----------------------------------------------------------------------

    /// Whether the job status should be polled at `now`.
    pub fn poll_due(&self, now: Instant) -> bool {
        self.last_poll.map_or(true, |at| {
            now.saturating_duration_since(at) >= self.config.check_interval
        })
    }

    /// Record a polled job state.
    ///
    /// Entering or leaving the printing states resets tickets, first-send
    /// flags, settings progress, and height triggers.
    pub fn apply_job_state(&mut self, state: JobState, now: Instant) -> JobTransition {
        self.last_poll = Some(now);
        if self.state_log.ready(now) {
            info!(state = state.as_str(), "Printer state checked");
        }

        let transition = self.job.observe(state);
        match transition {
            JobTransition::Started => {
                info!(state = self.job.state().as_str(), "Print started");
                self.reset_job();
            }
            JobTransition::Finished => {
                info!(
                    state = self.job.state().as_str(),
                    "Printer left printing state, command tracking reset"
                );
                self.reset_job();
            }
            JobTransition::Unchanged => {}
        }

        if self.job.state().is_operational() && self.idle_log.ready(now) {
            info!("Printer operational, waiting for a print");
        }
        transition
    }

    fn reset_job(&mut self) {
        for slot in &mut self.slots {
            slot.reset();
        }
        self.settings = SettingsProgress::default();
        for trigger in &mut self.triggers {
            trigger.reset();
        }
        self.filename_warning.reset();
    }

    /// Cache the active job's filename (already normalised).
    pub fn set_filename(&mut self, filename: String) {
        if !self.job.is_printing() || self.job.filename() == Some(filename.as_str()) {
            return;
        }
        if self.config.allow_list.contains(Some(&filename)) {
            info!(filename = %filename, "Job file is allow-listed, capturing telemetry");
        } else {
            info!(filename = %filename, "Job file is not allow-listed");
        }
        self.job.set_filename(filename);
    }

    // -----------------------------------------------------------------------
    // Command dispatch
    // -----------------------------------------------------------------------

    /// Commands that should be sent at `now`, in dispatch order.
    ///
    /// Nothing is sent unless printing an allow-listed file. A timed-out
    /// ticket is always due; otherwise a waiting ticket is skipped, and an
    /// idle one is due on its first send of the job or when its cadence
    /// has elapsed.
    pub fn due_commands(&mut self, now: Instant) -> Vec<CommandKind> {
        if !self.job.is_printing() {
            return Vec::new();
        }
        if !self.filename_allowed() {
            if self.filename_warning.ready(now) {
                warn!(
                    filename = self.job.filename().unwrap_or(NO_FILE),
                    "Job file is not allow-listed, telemetry commands suppressed"
                );
            }
            return Vec::new();
        }

        let timeout = self.config.command_timeout;
        let mut due = Vec::new();
        for slot in &mut self.slots {
            let kind = slot.ticket.kind();
            if slot.ticket.check_timeout(now, timeout) {
                warn!(
                    command = %kind,
                    timeout_secs = timeout.as_secs(),
                    "No response within timeout, resending"
                );
                due.push(kind);
            } else if slot.ticket.is_waiting() {
                continue;
            } else if slot.first_pending || slot.cadence_elapsed(now) {
                due.push(kind);
            }
        }
        due
    }

    fn slot_mut(&mut self, kind: CommandKind) -> Result<&mut CommandSlot, CoreError> {
        let profile = self.config.profile;
        self.slots
            .iter_mut()
            .find(|s| s.ticket.kind() == kind)
            .ok_or(CoreError::CommandNotInProfile {
                command: kind,
                profile: profile.as_str(),
            })
    }

    /// The controller accepted `kind`; arm its ticket.
    pub fn command_sent(&mut self, kind: CommandKind, now: Instant) -> Result<(), CoreError> {
        let slot = self.slot_mut(kind)?;
        slot.ticket.arm(now);
        slot.first_pending = false;
        slot.last_attempt = Some(now);
        if kind == CommandKind::Settings {
            self.settings = SettingsProgress::default();
        }
        debug!(command = %kind, gcode = kind.gcode(), "Command dispatched");
        Ok(())
    }

    /// Sending `kind` failed after retries. The ticket is disarmed; a
    /// pending first send stays pending so the next tick tries again, and
    /// a command without a cadence becomes pending again.
    pub fn command_failed(&mut self, kind: CommandKind, now: Instant) -> Result<(), CoreError> {
        let slot = self.slot_mut(kind)?;
        slot.ticket.disarm();
        slot.last_attempt = Some(now);
        if slot.interval.is_none() {
            slot.first_pending = true;
        }
        warn!(command = %kind, "Command could not be sent, ticket disarmed");
        Ok(())
    }

    /// A once-per-job command whose reply was discarded is sent again.
    fn request_again(&mut self, kind: CommandKind) {
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.ticket.kind() == kind && s.interval.is_none())
        {
            slot.first_pending = true;
            debug!(command = %kind, "Reply discarded, command will be sent again");
        }
    }

    // -----------------------------------------------------------------------
    // Log lines
    // -----------------------------------------------------------------------

    /// Merge one firmware log line received at `at`.
    ///
    /// Temperature readings are always merged. Command replies are merged
    /// only while their ticket is waiting; a completed reply resolves the
    /// ticket and flushes a row through the persistence gate.
    pub fn handle_log_line(&mut self, line: &str, at: Timestamp) -> Vec<Effect> {
        let mut effects = Vec::new();
        for reading in parse_line(line) {
            match reading {
                Reading::Temperature(_) => self.sample.apply(&reading),
                Reading::Position(p) => {
                    if !self.resolve(CommandKind::Position) {
                        trace!(line, "Unsolicited position report ignored");
                        continue;
                    }
                    self.sample.apply(&reading);
                    info!(x = p.x, y = p.y, z = p.z, e = p.e, "Position received");
                    if let Some(record) = self.flush(SampleKind::Position, at) {
                        effects.push(Effect::Persist(record));
                        effects.extend(self.observe_height(p.z, at));
                    }
                }
                Reading::Acceleration(a) => {
                    if !self.is_waiting(CommandKind::Settings) {
                        trace!(line, "Unsolicited acceleration report ignored");
                        continue;
                    }
                    self.sample.apply(&reading);
                    self.settings.acceleration = true;
                    info!(
                        print = a.print,
                        retract = a.retract,
                        travel = a.travel,
                        "Acceleration settings received"
                    );
                    effects.extend(self.complete_settings(at));
                }
                Reading::Jerk(j) => {
                    if !self.is_waiting(CommandKind::Settings) {
                        trace!(line, "Unsolicited jerk report ignored");
                        continue;
                    }
                    self.sample.apply(&reading);
                    self.settings.jerk = true;
                    info!(x = j.x, y = j.y, "Jerk settings received");
                    effects.extend(self.complete_settings(at));
                }
                Reading::SpeedFactor(factor) => {
                    if !self.resolve(CommandKind::SpeedFactor) {
                        trace!(line, "Unsolicited speed factor report ignored");
                        continue;
                    }
                    self.sample.apply(&reading);
                    info!(speed_factor = factor, "Speed factor received");
                    if let Some(record) = self.flush(SampleKind::Settings, at) {
                        effects.push(Effect::Persist(record));
                    }
                }
            }
        }
        effects
    }

    fn is_waiting(&self, kind: CommandKind) -> bool {
        self.ticket(kind).is_some_and(CommandTicket::is_waiting)
    }

    fn resolve(&mut self, kind: CommandKind) -> bool {
        self.slots
            .iter_mut()
            .find(|s| s.ticket.kind() == kind)
            .is_some_and(|s| s.ticket.resolve())
    }

    /// Flush a settings row once both `M204` and `M205` have arrived.
    fn complete_settings(&mut self, at: Timestamp) -> Option<Effect> {
        if !self.settings.complete() {
            return None;
        }
        self.settings = SettingsProgress::default();
        self.resolve(CommandKind::Settings);
        self.flush(SampleKind::Settings, at).map(Effect::Persist)
    }

    fn flush(&mut self, kind: SampleKind, at: Timestamp) -> Option<Record> {
        let filename = self.job.filename().map(str::to_string);
        match gate::check(
            &self.config.allow_list,
            filename.as_deref(),
            self.job.is_printing(),
            &self.sample,
        ) {
            Eligibility::Eligible => {}
            Eligibility::NotAllowListed => {
                info!(
                    filename = filename.as_deref().unwrap_or(NO_FILE),
                    "Job file is not allow-listed, sample not saved"
                );
                return None;
            }
            Eligibility::NotPrinting | Eligibility::NoActiveTarget => {
                info!(?kind, "Printer not printing, response ignored");
                if kind == SampleKind::Settings && self.job.is_printing() {
                    self.request_again(self.config.profile.settings_command());
                }
                return None;
            }
        }

        if self.job.mark_started_at(at) {
            info!(start_time = %format_timestamp(&at), "Job start time recorded");
        }
        Some(Record {
            timestamp: at,
            kind,
            sample: self.sample.clone(),
            filename: filename?,
        })
    }

    fn observe_height(&mut self, z: f64, at: Timestamp) -> Vec<Effect> {
        let Some(filename) = self.job.filename().map(str::to_string) else {
            return Vec::new();
        };
        let start_time = self.job.start_time().unwrap_or(at);
        self.triggers
            .iter_mut()
            .filter_map(|trigger| {
                if !trigger.observe(z) {
                    return None;
                }
                info!(
                    target = %trigger.target(),
                    height = trigger.height(),
                    z,
                    "Height reached, requesting prediction"
                );
                Some(Effect::Predict(PredictionRequest {
                    target: trigger.target(),
                    start_time,
                    filename: filename.clone(),
                }))
            })
            .collect()
    }
}
