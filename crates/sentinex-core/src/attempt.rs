//! Lifecycle of a single attendance attempt.
//!
//! ```text
//! Idle -> Authorizing -> Capturing -> Verifying -> Recording -> Idle
//!                     \-> Rejected -> Idle
//! ```
//!
//! A collaborator failure while capturing, verifying or recording ends the
//! attempt and returns to `Idle` without a record. Retrying is the caller's
//! decision; nothing here loops.

use crate::types::AttendanceStatus;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Idle,
    Authorizing,
    Capturing,
    Verifying,
    Recording,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    /// The user picked a status and a position reading (or its absence) is in hand.
    Begin,
    Authorized,
    Denied,
    SelfieCaptured,
    FaceVerified,
    Recorded,
    /// A camera, network or storage collaborator failed.
    Failed,
    /// The rejection has been surfaced to the user.
    Dismissed,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("illegal attempt transition: {event:?} while {phase:?}")]
pub struct AttemptError {
    pub phase: AttemptPhase,
    pub event: AttemptEvent,
}

impl AttemptPhase {
    /// Next phase for `event`, or an error if the event is not legal here.
    pub fn advance(self, event: AttemptEvent) -> Result<AttemptPhase, AttemptError> {
        use AttemptEvent as E;
        use AttemptPhase as P;

        let next = match (self, event) {
            (P::Idle, E::Begin) => P::Authorizing,
            (P::Authorizing, E::Authorized) => P::Capturing,
            (P::Authorizing, E::Denied) => P::Rejected,
            (P::Capturing, E::SelfieCaptured) => P::Verifying,
            (P::Verifying, E::FaceVerified) => P::Recording,
            (P::Recording, E::Recorded) => P::Idle,
            (P::Capturing | P::Verifying | P::Recording, E::Failed) => P::Idle,
            (P::Rejected, E::Dismissed) => P::Idle,
            (phase, event) => return Err(AttemptError { phase, event }),
        };
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Rejected)
    }
}

/// Tracks one attempt for one badge.
#[derive(Debug)]
pub struct Attempt {
    badge_id: String,
    status: AttendanceStatus,
    phase: AttemptPhase,
}

impl Attempt {
    pub fn new(badge_id: impl Into<String>, status: AttendanceStatus) -> Self {
        Self {
            badge_id: badge_id.into(),
            status,
            phase: AttemptPhase::Idle,
        }
    }

    pub fn badge_id(&self) -> &str {
        &self.badge_id
    }

    pub fn status(&self) -> AttendanceStatus {
        self.status
    }

    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    pub fn advance(&mut self, event: AttemptEvent) -> Result<AttemptPhase, AttemptError> {
        let next = self.phase.advance(event)?;
        tracing::debug!(
            badge = %self.badge_id,
            status = %self.status,
            from = ?self.phase,
            to = ?next,
            "attempt transition"
        );
        self.phase = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_returns_to_idle() {
        let mut attempt = Attempt::new("1042", AttendanceStatus::TimedIn);
        for event in [
            AttemptEvent::Begin,
            AttemptEvent::Authorized,
            AttemptEvent::SelfieCaptured,
            AttemptEvent::FaceVerified,
        ] {
            attempt.advance(event).unwrap();
            assert!(!attempt.phase().is_terminal());
        }
        assert_eq!(attempt.phase(), AttemptPhase::Recording);
        assert_eq!(attempt.advance(AttemptEvent::Recorded), Ok(AttemptPhase::Idle));
    }

    #[test]
    fn test_denied_goes_through_rejected() {
        let mut attempt = Attempt::new("1042", AttendanceStatus::PulledOut);
        attempt.advance(AttemptEvent::Begin).unwrap();
        assert_eq!(attempt.advance(AttemptEvent::Denied), Ok(AttemptPhase::Rejected));
        assert!(attempt.phase().is_terminal());
        assert_eq!(attempt.advance(AttemptEvent::Dismissed), Ok(AttemptPhase::Idle));
    }

    #[test]
    fn test_failure_aborts_from_each_working_phase() {
        for phase in [
            AttemptPhase::Capturing,
            AttemptPhase::Verifying,
            AttemptPhase::Recording,
        ] {
            assert_eq!(phase.advance(AttemptEvent::Failed), Ok(AttemptPhase::Idle));
        }
        assert!(AttemptPhase::Authorizing.advance(AttemptEvent::Failed).is_err());
    }

    #[test]
    fn test_cannot_skip_the_gate() {
        let err = AttemptPhase::Idle
            .advance(AttemptEvent::SelfieCaptured)
            .unwrap_err();
        assert_eq!(err.phase, AttemptPhase::Idle);
        assert_eq!(err.event, AttemptEvent::SelfieCaptured);

        assert!(AttemptPhase::Rejected.advance(AttemptEvent::Authorized).is_err());
        assert!(AttemptPhase::Authorizing.advance(AttemptEvent::Recorded).is_err());
    }

    #[test]
    fn test_failed_transition_keeps_phase() {
        let mut attempt = Attempt::new("7", AttendanceStatus::TimedIn);
        assert!(attempt.advance(AttemptEvent::Recorded).is_err());
        assert_eq!(attempt.phase(), AttemptPhase::Idle);
    }
}
