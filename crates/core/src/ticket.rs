//! Command tickets: request/response correlation for printer commands.
//!
//! Marlin firmware gives no request identifiers, so a response line is
//! attributed to a command purely by whether a request of that kind is
//! outstanding. Each [`CommandTicket`] is a small state machine:
//!
//! ```text
//!           sent                  timeout elapsed
//!   Idle ---------> Armed -------------------------> TimedOut
//!    ^               |  ^                               |
//!    |   matched /   |  |            resent             |
//!    +---disarm------+  +-------------------------------+
//!    ^                                                  |
//!    +---------------- matched / disarm ----------------+
//! ```

use std::fmt;
use std::time::{Duration, Instant};

/// The printer commands the poller issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `M114`: report current position.
    Position,
    /// `M503`: report settings (acceleration `M204`, jerk `M205`).
    Settings,
    /// `M220`: report feed-rate (speed factor) percentage.
    SpeedFactor,
}

impl CommandKind {
    /// G-code sent to the controller for this command.
    pub fn gcode(self) -> &'static str {
        match self {
            Self::Position => "M114",
            Self::Settings => "M503",
            Self::SpeedFactor => "M220",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.gcode())
    }
}

/// Lifecycle state of a single ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    /// No request outstanding.
    Idle,
    /// A request was sent at `since` and no response has been matched.
    Armed { since: Instant },
    /// The request sent at `since` exceeded the timeout; a resend is due.
    TimedOut { since: Instant },
}

/// One outstanding request/response cycle for a command kind.
#[derive(Debug, Clone)]
pub struct CommandTicket {
    kind: CommandKind,
    state: TicketState,
    last_sent: Option<Instant>,
}

impl CommandTicket {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            state: TicketState::Idle,
            last_sent: None,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn state(&self) -> TicketState {
        self.state
    }

    /// When the command was last successfully dispatched.
    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    /// `true` while a response is still expected (armed or timed out).
    pub fn is_waiting(&self) -> bool {
        !matches!(self.state, TicketState::Idle)
    }

    /// Record a successful dispatch. Re-arms a timed-out ticket.
    pub fn arm(&mut self, now: Instant) {
        self.state = TicketState::Armed { since: now };
        self.last_sent = Some(now);
    }

    /// Consume a matching response.
    ///
    /// Returns `false` (and changes nothing) when no request is
    /// outstanding, i.e. the response was unsolicited.
    pub fn resolve(&mut self) -> bool {
        if !self.is_waiting() {
            return false;
        }
        self.state = TicketState::Idle;
        true
    }

    /// Force the ticket back to idle (send failure, job exit).
    pub fn disarm(&mut self) {
        self.state = TicketState::Idle;
    }

    /// Advance `Armed` to `TimedOut` once strictly more than `timeout`
    /// has elapsed since the send.
    ///
    /// Returns `true` while the ticket is timed out, so the caller keeps
    /// asking for a resend until one succeeds.
    pub fn check_timeout(&mut self, now: Instant, timeout: Duration) -> bool {
        match self.state {
            TicketState::Armed { since } if now.saturating_duration_since(since) > timeout => {
                self.state = TicketState::TimedOut { since };
                true
            }
            TicketState::TimedOut { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(90);

    #[test]
    fn gcode_mapping() {
        assert_eq!(CommandKind::Position.gcode(), "M114");
        assert_eq!(CommandKind::Settings.gcode(), "M503");
        assert_eq!(CommandKind::SpeedFactor.to_string(), "M220");
    }

    #[test]
    fn new_ticket_is_idle() {
        let ticket = CommandTicket::new(CommandKind::Position);
        assert_eq!(ticket.state(), TicketState::Idle);
        assert!(!ticket.is_waiting());
        assert!(ticket.last_sent().is_none());
    }

    #[test]
    fn arm_then_resolve() {
        let now = Instant::now();
        let mut ticket = CommandTicket::new(CommandKind::Position);
        ticket.arm(now);
        assert_eq!(ticket.state(), TicketState::Armed { since: now });
        assert!(ticket.resolve());
        assert_eq!(ticket.state(), TicketState::Idle);
        assert_eq!(ticket.last_sent(), Some(now));
    }

    #[test]
    fn unsolicited_response_is_rejected() {
        let mut ticket = CommandTicket::new(CommandKind::Position);
        assert!(!ticket.resolve());
        assert_eq!(ticket.state(), TicketState::Idle);
    }

    #[test]
    fn no_timeout_at_exact_boundary() {
        let start = Instant::now();
        let mut ticket = CommandTicket::new(CommandKind::Settings);
        ticket.arm(start);
        assert!(!ticket.check_timeout(start + TIMEOUT, TIMEOUT));
        assert_matches!(ticket.state(), TicketState::Armed { .. });
    }

    #[test]
    fn timeout_after_limit() {
        let start = Instant::now();
        let mut ticket = CommandTicket::new(CommandKind::Settings);
        ticket.arm(start);
        assert!(ticket.check_timeout(start + TIMEOUT + Duration::from_secs(1), TIMEOUT));
        assert_eq!(ticket.state(), TicketState::TimedOut { since: start });
        // Stays timed out until resent.
        assert!(ticket.check_timeout(start + TIMEOUT * 2, TIMEOUT));
    }

    #[test]
    fn resend_rearms_and_updates_last_sent() {
        let start = Instant::now();
        let later = start + TIMEOUT + Duration::from_secs(5);
        let mut ticket = CommandTicket::new(CommandKind::Position);
        ticket.arm(start);
        assert!(ticket.check_timeout(later, TIMEOUT));
        ticket.arm(later);
        assert_eq!(ticket.state(), TicketState::Armed { since: later });
        assert_eq!(ticket.last_sent(), Some(later));
        assert!(!ticket.check_timeout(later + Duration::from_secs(1), TIMEOUT));
    }

    #[test]
    fn late_response_resolves_timed_out_ticket() {
        let start = Instant::now();
        let mut ticket = CommandTicket::new(CommandKind::Position);
        ticket.arm(start);
        ticket.check_timeout(start + TIMEOUT * 2, TIMEOUT);
        assert!(ticket.resolve());
        assert!(!ticket.is_waiting());
    }

    #[test]
    fn idle_ticket_never_times_out() {
        let mut ticket = CommandTicket::new(CommandKind::Position);
        assert!(!ticket.check_timeout(Instant::now() + TIMEOUT * 10, TIMEOUT));
    }

    #[test]
    fn disarm_clears_waiting() {
        let mut ticket = CommandTicket::new(CommandKind::SpeedFactor);
        ticket.arm(Instant::now());
        ticket.disarm();
        assert!(!ticket.is_waiting());
    }
}
