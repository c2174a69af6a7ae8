//! The merged telemetry sample and the rows flushed from it.

use crate::parser::{
    AccelerationReading, JerkReading, PositionReading, Reading, TemperatureReading,
};
use crate::profile::TelemetryProfile;
use crate::types::{format_timestamp, Timestamp};

/// Most recent value of every telemetry field.
///
/// Overwritten in place as readings arrive; the latest parsed value wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub nozzle_temp: Option<f64>,
    pub nozzle_target: Option<f64>,
    pub nozzle_delta: Option<f64>,
    pub nozzle_pwm: Option<u32>,
    pub bed_temp: Option<f64>,
    pub bed_target: Option<f64>,
    pub bed_delta: Option<f64>,
    pub bed_pwm: Option<u32>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub e: Option<f64>,
    pub accel_print: Option<f64>,
    pub accel_retract: Option<f64>,
    pub accel_travel: Option<f64>,
    pub jerk_x: Option<f64>,
    pub jerk_y: Option<f64>,
    pub speed_factor: Option<f64>,
}

impl Sample {
    /// Merge any reading into the sample.
    pub fn apply(&mut self, reading: &Reading) {
        match reading {
            Reading::Temperature(t) => self.apply_temperature(t),
            Reading::Position(p) => self.apply_position(p),
            Reading::Acceleration(a) => self.apply_acceleration(a),
            Reading::Jerk(j) => self.apply_jerk(j),
            Reading::SpeedFactor(f) => self.speed_factor = Some(*f),
        }
    }

    pub fn apply_temperature(&mut self, t: &TemperatureReading) {
        self.nozzle_temp = Some(t.nozzle_current);
        self.nozzle_target = Some(t.nozzle_target);
        self.nozzle_delta = Some(t.nozzle_delta());
        self.nozzle_pwm = Some(t.nozzle_pwm);
        self.bed_temp = Some(t.bed_current);
        self.bed_target = Some(t.bed_target);
        self.bed_delta = Some(t.bed_delta());
        self.bed_pwm = Some(t.bed_pwm);
    }

    pub fn apply_position(&mut self, p: &PositionReading) {
        self.x = Some(p.x);
        self.y = Some(p.y);
        self.z = Some(p.z);
        self.e = Some(p.e);
    }

    pub fn apply_acceleration(&mut self, a: &AccelerationReading) {
        self.accel_print = Some(a.print);
        self.accel_retract = Some(a.retract);
        self.accel_travel = Some(a.travel);
    }

    pub fn apply_jerk(&mut self, j: &JerkReading) {
        self.jerk_x = Some(j.x);
        self.jerk_y = Some(j.y);
    }

    /// Both heaters report a non-zero target.
    ///
    /// After a print ends the firmware drops both targets to zero, so
    /// replies observed in that state describe an idle machine.
    pub fn has_active_targets(&self) -> bool {
        matches!(
            (self.nozzle_target, self.bed_target),
            (Some(n), Some(b)) if n != 0.0 && b != 0.0
        )
    }
}

/// Which field group a row carries.
///
/// A row never holds both position and settings fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// `M114` reply: X/Y/Z/E populated, settings columns empty.
    Position,
    /// `M503` / `M220` reply: settings populated, position columns empty.
    Settings,
}

/// A sample snapshot ready to be appended to the output.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: Timestamp,
    pub kind: SampleKind,
    pub sample: Sample,
    pub filename: String,
}

fn cell_f64(value: Option<f64>) -> String {
    value.map(|v| format!("{v:?}")).unwrap_or_default()
}

fn cell_u32(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl Record {
    /// Render the record as a row in `profile`'s column order.
    ///
    /// Unset fields and fields outside the record's [`SampleKind`]
    /// serialize as empty strings.
    pub fn to_row(&self, profile: TelemetryProfile) -> Vec<String> {
        let s = &self.sample;
        let position = self.kind == SampleKind::Position;
        let only_position = |v: Option<f64>| cell_f64(v.filter(|_| position));
        let only_settings = |v: Option<f64>| cell_f64(v.filter(|_| !position));

        let mut row = vec![
            format_timestamp(&self.timestamp),
            cell_f64(s.nozzle_temp),
            cell_f64(s.nozzle_target),
            cell_f64(s.nozzle_delta),
            cell_u32(s.nozzle_pwm),
            cell_f64(s.bed_temp),
            cell_f64(s.bed_target),
            cell_f64(s.bed_delta),
            cell_u32(s.bed_pwm),
            only_position(s.x),
            only_position(s.y),
            only_position(s.z),
            only_position(s.e),
        ];

        match profile {
            TelemetryProfile::Motion => row.extend([
                only_settings(s.accel_print),
                only_settings(s.accel_retract),
                only_settings(s.accel_travel),
                only_settings(s.jerk_x),
                only_settings(s.jerk_y),
            ]),
            TelemetryProfile::Feedrate => row.push(only_settings(s.speed_factor)),
        }

        row.push(self.filename.clone());
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;

    fn merged(lines: &[&str]) -> Sample {
        let mut sample = Sample::default();
        for line in lines {
            for reading in parse_line(line) {
                sample.apply(&reading);
            }
        }
        sample
    }

    fn record(kind: SampleKind, sample: Sample) -> Record {
        Record {
            timestamp: chrono::Local::now(),
            kind,
            sample,
            filename: "zdm4ms~4".into(),
        }
    }

    #[test]
    fn temperature_merge_recomputes_deltas() {
        let s = merged(&[
            "T:200.0 /210.0 B:50.0 /60.0 @:120 B@:30",
            "T:211.5 /210.0 B:60.0 /60.0 @:80 B@:10",
        ]);
        assert_eq!(s.nozzle_delta, Some(1.5));
        assert_eq!(s.bed_delta, Some(0.0));
        assert_eq!(s.nozzle_pwm, Some(80));
    }

    #[test]
    fn active_targets_require_both_heaters() {
        assert!(!Sample::default().has_active_targets());
        assert!(merged(&["T:25.0 /210.0 B:25.0 /60.0 @:0 B@:0"]).has_active_targets());
        assert!(!merged(&["T:25.0 /210.0 B:25.0 /0.0 @:0 B@:0"]).has_active_targets());
    }

    #[test]
    fn position_row_leaves_settings_empty() {
        let s = merged(&[
            "T:210.0 /210.0 B:60.0 /60.0 @:500 B@:40",
            "X:1.00 Y:2.00 Z:0.30 E:4.50",
            "FR:100%",
        ]);
        let row = record(SampleKind::Position, s).to_row(TelemetryProfile::Feedrate);
        assert_eq!(row.len(), TelemetryProfile::Feedrate.columns().len());
        assert_eq!(&row[9..13], &["1.0", "2.0", "0.3", "4.5"]);
        assert_eq!(row[13], "");
        assert_eq!(row[14], "zdm4ms~4");
    }

    #[test]
    fn settings_row_leaves_position_empty() {
        let s = merged(&[
            "X:1.00 Y:2.00 Z:0.30 E:4.50",
            "echo:  M204 P500.00 R1000.00 T1500.00",
            "echo:  M205 X10.00 Y10.00",
        ]);
        let row = record(SampleKind::Settings, s).to_row(TelemetryProfile::Motion);
        assert_eq!(row.len(), TelemetryProfile::Motion.columns().len());
        assert!(row[9..13].iter().all(String::is_empty));
        assert_eq!(&row[13..18], &["500.0", "1000.0", "1500.0", "10.0", "10.0"]);
    }

    #[test]
    fn unset_fields_serialize_empty() {
        let row = record(SampleKind::Position, Sample::default()).to_row(TelemetryProfile::Motion);
        assert!(row[1..18].iter().all(String::is_empty));
        assert!(!row[0].is_empty());
    }
}
