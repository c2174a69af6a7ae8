//! Print job identity and state transitions.

use crate::types::Timestamp;

/// Placeholder filename when the controller reports no file.
pub const NO_FILE: &str = "(no file)";

/// Suffix stripped from job filenames (SD-card 8.3 names).
const GCODE_SUFFIX: &str = ".gco";

/// Job state as reported by the controller's job endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Connected and idle.
    Operational,
    /// Actively printing.
    Printing,
    /// Print is being started (file selected, heating up).
    Starting,
    /// The state could not be determined (status poll exhausted retries).
    Unknown,
    /// Any other controller state (`Paused`, `Offline`, `Error`, ...).
    Other(String),
}

impl JobState {
    /// Classify a controller state string.
    pub fn from_controller(state: &str) -> Self {
        let state = state.trim();
        if state == "Operational" {
            Self::Operational
        } else if state.starts_with("Printing") {
            Self::Printing
        } else if state.starts_with("Starting") {
            Self::Starting
        } else if state.is_empty() || state == "Unknown" {
            Self::Unknown
        } else {
            Self::Other(state.to_string())
        }
    }

    /// `Printing` and `Starting` both count as printing.
    pub fn is_printing(&self) -> bool {
        matches!(self, Self::Printing | Self::Starting)
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Operational)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Operational => "Operational",
            Self::Printing => "Printing",
            Self::Starting => "Starting",
            Self::Unknown => "Unknown",
            Self::Other(s) => s,
        }
    }
}

/// Normalise a controller filename: strip a trailing `.gco`
/// (case-insensitive); a missing or empty name becomes [`NO_FILE`].
pub fn normalize_filename(name: Option<&str>) -> String {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return NO_FILE.to_string();
    };
    let cut = name.len().saturating_sub(GCODE_SUFFIX.len());
    match name.get(cut..) {
        Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(GCODE_SUFFIX) => name[..cut].to_string(),
        _ => name.to_string(),
    }
}

/// Outcome of observing a new job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
    /// Entered a printing state from a non-printing one.
    Started,
    /// Left a printing state.
    Finished,
    /// No change in printing status.
    Unchanged,
}

/// Tracks the active job across poll ticks.
///
/// The filename and start time are only meaningful while printing and
/// are dropped whenever the job leaves the printing states.
#[derive(Debug, Clone)]
pub struct JobTracker {
    state: JobState,
    printing: bool,
    filename: Option<String>,
    start_time: Option<Timestamp>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            state: JobState::Unknown,
            printing: false,
            filename: None,
            start_time: None,
        }
    }

    /// Record the latest polled state and report the transition.
    pub fn observe(&mut self, state: JobState) -> JobTransition {
        let was_printing = self.printing;
        let is_printing = state.is_printing();
        self.state = state;
        self.printing = is_printing;

        match (was_printing, is_printing) {
            (false, true) => {
                self.filename = None;
                self.start_time = None;
                JobTransition::Started
            }
            (true, false) => {
                self.filename = None;
                self.start_time = None;
                JobTransition::Finished
            }
            _ => JobTransition::Unchanged,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn is_printing(&self) -> bool {
        self.printing
    }

    /// Cache the filename fetched on entering a print. Ignored when not printing.
    pub fn set_filename(&mut self, filename: String) {
        if self.printing {
            self.filename = Some(filename);
        }
    }

    /// The active filename, only while printing.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref().filter(|_| self.printing)
    }

    pub fn start_time(&self) -> Option<Timestamp> {
        self.start_time
    }

    /// Record the job start time if it is not yet known. Returns `true` when set.
    pub fn mark_started_at(&mut self, at: Timestamp) -> bool {
        if self.start_time.is_some() || !self.printing {
            return false;
        }
        self.start_time = Some(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_controller_states() {
        assert_eq!(JobState::from_controller("Operational"), JobState::Operational);
        assert_eq!(JobState::from_controller("Printing from SD"), JobState::Printing);
        assert_eq!(JobState::from_controller("Printing"), JobState::Printing);
        assert_eq!(JobState::from_controller("Starting print from SD"), JobState::Starting);
        assert_eq!(JobState::from_controller("Unknown"), JobState::Unknown);
        assert_eq!(
            JobState::from_controller("Paused"),
            JobState::Other("Paused".into())
        );
    }

    #[test]
    fn printing_class() {
        assert!(JobState::Printing.is_printing());
        assert!(JobState::Starting.is_printing());
        assert!(!JobState::Operational.is_printing());
        assert!(!JobState::Unknown.is_printing());
    }

    #[test]
    fn strips_gco_suffix_case_insensitively() {
        assert_eq!(normalize_filename(Some("zdm4ms~4.gco")), "zdm4ms~4");
        assert_eq!(normalize_filename(Some("ZD5B20~1.GCO")), "ZD5B20~1");
        assert_eq!(normalize_filename(Some("part.gcode")), "part.gcode");
    }

    #[test]
    fn missing_filename_is_sentinel() {
        assert_eq!(normalize_filename(None), NO_FILE);
        assert_eq!(normalize_filename(Some("")), NO_FILE);
    }

    #[test]
    fn bare_suffix_is_kept() {
        assert_eq!(normalize_filename(Some(".gco")), ".gco");
    }

    #[test]
    fn transitions() {
        let mut job = JobTracker::new();
        assert_eq!(job.observe(JobState::Operational), JobTransition::Unchanged);
        assert_eq!(job.observe(JobState::Starting), JobTransition::Started);
        assert_eq!(job.observe(JobState::Printing), JobTransition::Unchanged);
        assert_eq!(job.observe(JobState::Operational), JobTransition::Finished);
    }

    #[test]
    fn unknown_poll_counts_as_leaving_print() {
        let mut job = JobTracker::new();
        job.observe(JobState::Printing);
        job.set_filename("zdm4ms~4".into());

        assert_eq!(job.observe(JobState::Unknown), JobTransition::Finished);
        assert!(!job.is_printing());
        assert_eq!(job.filename(), None);
        assert_eq!(job.observe(JobState::Printing), JobTransition::Started);
    }

    #[test]
    fn filename_only_trusted_while_printing() {
        let mut job = JobTracker::new();
        job.set_filename("ignored".into());
        assert_eq!(job.filename(), None);

        job.observe(JobState::Printing);
        job.set_filename("zdm4ms~4".into());
        assert_eq!(job.filename(), Some("zdm4ms~4"));

        job.observe(JobState::Operational);
        assert_eq!(job.filename(), None);
    }

    #[test]
    fn start_time_set_once_and_cleared_on_exit() {
        let mut job = JobTracker::new();
        job.observe(JobState::Printing);
        let first = chrono::Local::now();
        assert!(job.mark_started_at(first));
        assert!(!job.mark_started_at(first + chrono::Duration::seconds(5)));
        assert_eq!(job.start_time(), Some(first));

        job.observe(JobState::Operational);
        assert_eq!(job.start_time(), None);
    }
}
