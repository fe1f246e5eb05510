//! sentinex-core: Geofence-gated attendance.
//!
//! Decides whether an attendance action may proceed from a position fix and
//! a snapshot of geofences, and builds the record to persist when it does.

pub mod attempt;
pub mod fence_file;
pub mod gate;
pub mod geo;
pub mod ports;
pub mod types;

pub use attempt::{Attempt, AttemptError, AttemptEvent, AttemptPhase};
pub use gate::{
    authorize_activity, build_record, evaluate_containment, AttendanceGate, Authorization, GateMode,
};
pub use geo::{haversine_distance, EARTH_RADIUS_METERS};
pub use ports::{Clock, FaceVerifier, FenceSource, PositionSource, RecordSink, Verification};
pub use types::{
    AttendanceRecord, AttendanceStatus, FenceSnapshot, GeoCoordinate, Geofence, Personnel,
    PreparedSelfie,
};
