//! Telemetry profiles: which commands are polled and which CSV schema
//! the samples are written with.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ticket::CommandKind;

/// CSV columns for the [`TelemetryProfile::Motion`] profile.
pub const MOTION_COLUMNS: [&str; 19] = [
    "timestamp",
    "temp_nozzle",
    "temp_target_nozzle",
    "temp_delta_nozzle",
    "pwm_nozzle",
    "temp_bed",
    "temp_target_bed",
    "temp_delta_bed",
    "pwm_bed",
    "X",
    "Y",
    "Z",
    "E",
    "accel_print",
    "accel_retract",
    "accel_travel",
    "jerk_x",
    "jerk_y",
    "filename",
];

/// CSV columns for the [`TelemetryProfile::Feedrate`] profile.
pub const FEEDRATE_COLUMNS: [&str; 15] = [
    "timestamp",
    "temp_nozzle",
    "temp_target_nozzle",
    "temp_delta_nozzle",
    "pwm_nozzle",
    "temp_bed",
    "temp_target_bed",
    "temp_delta_bed",
    "pwm_bed",
    "X",
    "Y",
    "Z",
    "E",
    "speed_factor",
    "filename",
];

/// Protocol generation of the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryProfile {
    /// `M114` + `M503`; settings rows carry acceleration and jerk.
    Motion,
    /// `M114` + `M220`; settings rows carry the speed factor.
    Feedrate,
}

impl TelemetryProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::Feedrate => "feedrate",
        }
    }

    /// Commands polled while printing, in dispatch order.
    pub fn commands(self) -> &'static [CommandKind] {
        match self {
            Self::Motion => &[CommandKind::Position, CommandKind::Settings],
            Self::Feedrate => &[CommandKind::Position, CommandKind::SpeedFactor],
        }
    }

    /// The command whose response produces a settings-class row.
    pub fn settings_command(self) -> CommandKind {
        match self {
            Self::Motion => CommandKind::Settings,
            Self::Feedrate => CommandKind::SpeedFactor,
        }
    }

    /// Fixed CSV header for this profile.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Motion => &MOTION_COLUMNS,
            Self::Feedrate => &FEEDRATE_COLUMNS,
        }
    }
}

impl fmt::Display for TelemetryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TelemetryProfile {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "motion" | "m503" => Ok(Self::Motion),
            "feedrate" | "m220" => Ok(Self::Feedrate),
            other => Err(CoreError::UnknownProfile(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("motion".parse::<TelemetryProfile>().unwrap(), TelemetryProfile::Motion);
        assert_eq!(" Feedrate ".parse::<TelemetryProfile>().unwrap(), TelemetryProfile::Feedrate);
        assert_eq!("M220".parse::<TelemetryProfile>().unwrap(), TelemetryProfile::Feedrate);
    }

    #[test]
    fn unknown_profile_rejected() {
        let err = "bogus".parse::<TelemetryProfile>().unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn column_widths() {
        assert_eq!(TelemetryProfile::Motion.columns().len(), 19);
        assert_eq!(TelemetryProfile::Feedrate.columns().len(), 15);
        assert_eq!(TelemetryProfile::Motion.columns().last(), Some(&"filename"));
    }

    #[test]
    fn settings_command_belongs_to_profile() {
        for profile in [TelemetryProfile::Motion, TelemetryProfile::Feedrate] {
            assert!(profile.commands().contains(&profile.settings_command()));
        }
        assert!(!TelemetryProfile::Motion
            .commands()
            .contains(&CommandKind::SpeedFactor));
    }
}
