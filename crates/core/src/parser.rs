//! Firmware log line parser.
//!
//! Marlin answers status and report commands with free-form text lines
//! that the controller relays over its push socket. Each matcher below
//! recognises one field group anywhere in a line and returns a typed
//! reading. Matchers are independent: a single line may yield several
//! readings (an `M114` reply is often suffixed with a temperature
//! report), and a non-match simply yields nothing.

use std::sync::LazyLock;

use regex::Regex;

/// A signed decimal such as `-12`, `0.30` or `210.`.
const NUM: &str = r"-?\d+(?:\.\d*)?";

/// `T:210.0 /210.0 B:60.0 /60.0 @:127 B@:0`
static TEMPERATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"T:({NUM})\s*/({NUM})\s*B:({NUM})\s*/({NUM})\s*@:(\d+)\s*B@:(\d+)"
    ))
    .expect("valid regex")
});

/// `X:10.00 Y:20.00 Z:0.30 E:5.00`
static POSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"X:({NUM})\s+Y:({NUM})\s+Z:({NUM})\s+E:({NUM})"
    ))
    .expect("valid regex")
});

/// `M204 S1000` or `M204 P500.00 R1000.00 T1500.00`
static ACCELERATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"M204\s+(?:S({NUM})|P({NUM})\s+R({NUM})\s+T({NUM}))"
    ))
    .expect("valid regex")
});

/// `M205 B20000.00 S0.00 T0.00 X10.00 Y10.00 Z0.30 E5.00`
static JERK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"M205\b.*?\sX({NUM}).*?\sY({NUM})")).expect("valid regex")
});

/// `FR:100%`
static SPEED_FACTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"FR:({NUM})%")).expect("valid regex"));

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Hotend and bed temperatures with heater duty cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub nozzle_current: f64,
    pub nozzle_target: f64,
    pub bed_current: f64,
    pub bed_target: f64,
    pub nozzle_pwm: u32,
    pub bed_pwm: u32,
}

impl TemperatureReading {
    pub fn nozzle_delta(&self) -> f64 {
        self.nozzle_current - self.nozzle_target
    }

    pub fn bed_delta(&self) -> f64 {
        self.bed_current - self.bed_target
    }
}

/// Tool position and extruder length from an `M114` reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub e: f64,
}

/// Print / retract / travel acceleration from an `M204` report line.
///
/// The single-value form (`M204 S<n>`) applies to all three.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerationReading {
    pub print: f64,
    pub retract: f64,
    pub travel: f64,
}

/// X/Y jerk from an `M205` report line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JerkReading {
    pub x: f64,
    pub y: f64,
}

/// One field group recognised in a log line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Temperature(TemperatureReading),
    Position(PositionReading),
    Acceleration(AccelerationReading),
    Jerk(JerkReading),
    /// Feed-rate percentage from an `M220` reply.
    SpeedFactor(f64),
}

// ---------------------------------------------------------------------------
// Matchers
// ---------------------------------------------------------------------------

fn capture_f64(caps: &regex::Captures<'_>, idx: usize) -> Option<f64> {
    caps.get(idx)?.as_str().parse().ok()
}

fn capture_u32(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

pub fn parse_temperature(line: &str) -> Option<TemperatureReading> {
    let caps = TEMPERATURE_RE.captures(line)?;
    Some(TemperatureReading {
        nozzle_current: capture_f64(&caps, 1)?,
        nozzle_target: capture_f64(&caps, 2)?,
        bed_current: capture_f64(&caps, 3)?,
        bed_target: capture_f64(&caps, 4)?,
        nozzle_pwm: capture_u32(&caps, 5)?,
        bed_pwm: capture_u32(&caps, 6)?,
    })
}

pub fn parse_position(line: &str) -> Option<PositionReading> {
    let caps = POSITION_RE.captures(line)?;
    Some(PositionReading {
        x: capture_f64(&caps, 1)?,
        y: capture_f64(&caps, 2)?,
        z: capture_f64(&caps, 3)?,
        e: capture_f64(&caps, 4)?,
    })
}

pub fn parse_acceleration(line: &str) -> Option<AccelerationReading> {
    let caps = ACCELERATION_RE.captures(line)?;
    if let Some(shared) = capture_f64(&caps, 1) {
        return Some(AccelerationReading {
            print: shared,
            retract: shared,
            travel: shared,
        });
    }
    Some(AccelerationReading {
        print: capture_f64(&caps, 2)?,
        retract: capture_f64(&caps, 3)?,
        travel: capture_f64(&caps, 4)?,
    })
}

pub fn parse_jerk(line: &str) -> Option<JerkReading> {
    let caps = JERK_RE.captures(line)?;
    Some(JerkReading {
        x: capture_f64(&caps, 1)?,
        y: capture_f64(&caps, 2)?,
    })
}

pub fn parse_speed_factor(line: &str) -> Option<f64> {
    let caps = SPEED_FACTOR_RE.captures(line)?;
    capture_f64(&caps, 1)
}

/// Run every matcher against `line` and collect what matched.
///
/// Readings are returned in a fixed order (temperature, position,
/// acceleration, jerk, speed factor) so that a position reply carrying
/// a temperature suffix merges the fresh temperatures first.
pub fn parse_line(line: &str) -> Vec<Reading> {
    let mut readings = Vec::new();
    if let Some(t) = parse_temperature(line) {
        readings.push(Reading::Temperature(t));
    }
    if let Some(p) = parse_position(line) {
        readings.push(Reading::Position(p));
    }
    if let Some(a) = parse_acceleration(line) {
        readings.push(Reading::Acceleration(a));
    }
    if let Some(j) = parse_jerk(line) {
        readings.push(Reading::Jerk(j));
    }
    if let Some(s) = parse_speed_factor(line) {
        readings.push(Reading::SpeedFactor(s));
    }
    readings
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // -- temperature --

    #[test]
    fn temperature_at_target() {
        let t = parse_temperature("T:210.0 /210.0 B:60.0/60.0 @:500 B@:40").unwrap();
        assert_eq!(t.nozzle_delta(), 0.0);
        assert_eq!(t.bed_delta(), 0.0);
        assert_eq!(t.nozzle_pwm, 500);
        assert_eq!(t.bed_pwm, 40);
    }

    #[test]
    fn temperature_with_ok_prefix() {
        let t = parse_temperature("ok T:205.3 /210.0 B:59.5 /60.0 @:127 B@:0").unwrap();
        assert_eq!(t.nozzle_current, 205.3);
        assert_eq!(t.nozzle_target, 210.0);
        assert_eq!(t.nozzle_delta(), 205.3 - 210.0);
        assert_eq!(t.bed_delta(), 59.5 - 60.0);
    }

    #[test]
    fn temperature_delta_with_negative_inputs() {
        let t = parse_temperature("T:-3.5 /0.0 B:-1.25 /-2.0 @:0 B@:0").unwrap();
        assert_eq!(t.nozzle_delta(), -3.5);
        assert_eq!(t.bed_delta(), -1.25 - -2.0);
    }

    #[test]
    fn temperature_requires_pwm_fields() {
        assert!(parse_temperature("T:210.0 /210.0 B:60.0 /60.0").is_none());
    }

    // -- position --

    #[test]
    fn position_reply() {
        let p = parse_position("X:10.00 Y:-20.50 Z:0.30 E:5.00 Count X:800 Y:1600 Z:120").unwrap();
        assert_eq!(p, PositionReading { x: 10.0, y: -20.5, z: 0.3, e: 5.0 });
    }

    #[test]
    fn position_needs_all_axes() {
        assert!(parse_position("X:10.00 Y:20.00").is_none());
    }

    // -- acceleration --

    #[test]
    fn acceleration_shared_value() {
        let a = parse_acceleration("echo:  M204 S1000.00").unwrap();
        assert_eq!(a.print, 1000.0);
        assert_eq!(a.retract, 1000.0);
        assert_eq!(a.travel, 1000.0);
    }

    #[test]
    fn acceleration_distinct_values() {
        let a = parse_acceleration("echo:  M204 P500.00 R1000.00 T1500.00").unwrap();
        assert_eq!(
            a,
            AccelerationReading { print: 500.0, retract: 1000.0, travel: 1500.0 }
        );
    }

    // -- jerk --

    #[test]
    fn jerk_line() {
        let j = parse_jerk("echo:  M205 B20000.00 S0.00 T0.00 X10.00 Y8.00 Z0.30 E5.00").unwrap();
        assert_eq!(j, JerkReading { x: 10.0, y: 8.0 });
    }

    #[test]
    fn jerk_ignores_unrelated_lines() {
        assert!(parse_jerk("X:10.00 Y:8.00 Z:0.30 E:5.00").is_none());
    }

    // -- speed factor --

    #[test]
    fn speed_factor_line() {
        assert_eq!(parse_speed_factor("FR:100%"), Some(100.0));
        assert_eq!(parse_speed_factor("echo:FR:85.5%"), Some(85.5));
        assert_eq!(parse_speed_factor("FR:100"), None);
    }

    // -- parse_line --

    #[test]
    fn unrelated_line_yields_nothing() {
        assert!(parse_line("echo:busy: processing").is_empty());
        assert!(parse_line("").is_empty());
    }

    #[test]
    fn combined_line_yields_every_match_in_order() {
        let readings =
            parse_line("X:1.00 Y:2.00 Z:3.00 E:4.00 ok T:200.0 /210.0 B:55.0 /60.0 @:90 B@:12");
        assert_eq!(readings.len(), 2);
        assert_matches!(readings[0], Reading::Temperature(_));
        assert_matches!(readings[1], Reading::Position(PositionReading { z, .. }) if z == 3.0);
    }

    #[test]
    fn settings_lines_classified() {
        assert_matches!(parse_line("echo:  M204 S800").as_slice(), &[Reading::Acceleration(_)]);
        assert_matches!(
            parse_line("echo:  M205 X10.00 Y10.00").as_slice(),
            &[Reading::Jerk(JerkReading { x, y })] if x == 10.0 && y == 10.0
        );
        assert_matches!(parse_line("FR:90%").as_slice(), &[Reading::SpeedFactor(f)] if f == 90.0);
    }
}
