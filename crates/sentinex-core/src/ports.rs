//! Collaborators consumed by an attendance attempt.
//!
//! Positions, fence snapshots, face verification, wall-clock time and the
//! record log all live outside the gate. These traits are the seams the
//! daemon wires concrete implementations into.

use crate::types::{AttendanceRecord, FenceSnapshot, GeoCoordinate, PreparedSelfie};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;

/// Yields the current position fix. Permission errors and timeouts are `None`.
pub trait PositionSource {
    fn current_position(&self) -> Option<GeoCoordinate>;
}

/// A fix reported by the caller, or the lack of one.
impl PositionSource for Option<GeoCoordinate> {
    fn current_position(&self) -> Option<GeoCoordinate> {
        *self
    }
}

/// Yields the most recently delivered fence snapshot.
pub trait FenceSource {
    fn snapshot(&self) -> FenceSnapshot;
}

impl FenceSource for FenceSnapshot {
    fn snapshot(&self) -> FenceSnapshot {
        self.clone()
    }
}

/// Durable, append-only destination for attendance records.
pub trait RecordSink: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn append(
        &self,
        record: &AttendanceRecord,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Answer from the face comparison service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verification {
    /// The selfie matched the badge's reference image.
    Identified { name: String },
    /// The service declined; `reason` is its message, shown to the user as-is.
    Rejected { reason: String },
}

/// Compares a selfie against the reference image stored for a badge.
pub trait FaceVerifier: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn verify(
        &self,
        badge_id: &str,
        selfie: &PreparedSelfie,
    ) -> impl Future<Output = Result<Verification, Self::Error>> + Send;
}

/// Source of the timestamp stamped on records.
pub trait Clock: Send + Sync {
    fn now(&self) -> impl Future<Output = DateTime<Utc>> + Send;
}
