//! Height-crossing triggers for the external prediction services.

use std::fmt;

/// Which prediction service a trigger calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredictionTarget {
    /// Pass / fail quality estimate, fired early in the print.
    Quality,
    /// Dimensional estimate of the finished piece.
    Dimensions,
}

impl PredictionTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Dimensions => "dimensions",
        }
    }
}

impl fmt::Display for PredictionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fires once per job when Z crosses `height` upwards.
///
/// A crossing is `previous < height <= current`. The first observation
/// of a job only seeds `previous`, so a poller attached mid-print does
/// not fire for heights already passed.
#[derive(Debug, Clone)]
pub struct HeightTrigger {
    target: PredictionTarget,
    height: f64,
    last_z: Option<f64>,
    fired: bool,
}

impl HeightTrigger {
    pub fn new(target: PredictionTarget, height: f64) -> Self {
        Self {
            target,
            height,
            last_z: None,
            fired: false,
        }
    }

    pub fn target(&self) -> PredictionTarget {
        self.target
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Feed the latest Z; returns `true` exactly once, on the first crossing.
    pub fn observe(&mut self, z: f64) -> bool {
        let previous = self.last_z.replace(z);
        if self.fired {
            return false;
        }
        match previous {
            Some(prev) if prev < self.height && self.height <= z => {
                self.fired = true;
                true
            }
            _ => false,
        }
    }

    /// Re-arm for a new job.
    pub fn reset(&mut self) {
        self.last_z = None;
        self.fired = false;
    }
}
