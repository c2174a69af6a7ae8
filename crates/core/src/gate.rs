//! Persistence gate: decides whether a merged sample may be written.

use std::collections::BTreeSet;

use crate::sample::Sample;

/// Reference prints captured by default.
pub const DEFAULT_ALLOWED_FILENAMES: [&str; 3] = ["zdm4ms~4", "zd5b20~1", "zd2c72~1"];

/// Fixed set of job filenames eligible for data capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    names: BTreeSet<String>,
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_FILENAMES)
    }
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma-separated list, ignoring blanks.
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        )
    }

    /// `None` (no job file known) is never allowed.
    pub fn contains(&self, filename: Option<&str>) -> bool {
        filename.is_some_and(|name| self.names.contains(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Result of gating a sample for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// The active filename is missing or not allow-listed.
    NotAllowListed,
    /// The job is not in a printing state.
    NotPrinting,
    /// No real heater target has been observed (machine is idle).
    NoActiveTarget,
}

/// Gate a sample: allow-listed file, printing job, live heater targets.
pub fn check(
    allow_list: &AllowList,
    filename: Option<&str>,
    printing: bool,
    sample: &Sample,
) -> Eligibility {
    if !allow_list.contains(filename) {
        Eligibility::NotAllowListed
    } else if !printing {
        Eligibility::NotPrinting
    } else if !sample.has_active_targets() {
        Eligibility::NoActiveTarget
    } else {
        Eligibility::Eligible
    }
}
