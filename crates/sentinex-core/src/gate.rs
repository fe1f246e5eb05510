//! Attendance gate: geofence containment and record construction.
//!
//! Everything here is pure. The caller supplies the position fix and the
//! current fence snapshot; nothing is read from globals or the network.

use crate::geo::haversine_distance;
use crate::types::{AttendanceRecord, GeoCoordinate, Geofence};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether attendance actions are restricted to geofenced locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// A position fix inside one of the fences is required.
    #[default]
    Geofenced,
    /// Every attempt is authorized; fences are ignored.
    Unrestricted,
}

/// Outcome of [`authorize_activity`].
#[derive(Debug, Clone, PartialEq)]
pub struct Authorization {
    pub authorized: bool,
    pub matched_fence: Option<Geofence>,
}

impl Authorization {
    fn denied() -> Self {
        Self {
            authorized: false,
            matched_fence: None,
        }
    }
}

/// Return the first fence, in the order given, that contains `position`.
///
/// First match wins even when a later fence is closer. Fences with a
/// non-positive or non-finite radius are skipped.
pub fn evaluate_containment<'a>(
    position: &GeoCoordinate,
    fences: &'a [Geofence],
) -> Option<&'a Geofence> {
    fences.iter().find(|fence| {
        if !fence.has_valid_radius() {
            tracing::debug!(
                fence = %fence.id,
                radius = fence.radius_meters,
                "skipping fence with invalid radius"
            );
            return false;
        }
        haversine_distance(position, &fence.center) <= fence.radius_meters
    })
}

/// Decide whether an attendance action may proceed from `position`.
///
/// No fix means no authorization.
pub fn authorize_activity(position: Option<&GeoCoordinate>, fences: &[Geofence]) -> Authorization {
    let Some(position) = position else {
        return Authorization::denied();
    };

    match evaluate_containment(position, fences) {
        Some(fence) => Authorization {
            authorized: true,
            matched_fence: Some(fence.clone()),
        },
        None => Authorization::denied(),
    }
}

/// Assemble the record for a passed gate.
///
/// Address and deployment label come from the matched fence, if any.
pub fn build_record(
    badge_id: &str,
    status_flag: bool,
    timestamp: DateTime<Utc>,
    position: Option<GeoCoordinate>,
    matched_fence: Option<&Geofence>,
    subject_name: Option<&str>,
) -> AttendanceRecord {
    AttendanceRecord {
        badge_id: badge_id.to_string(),
        status_flag,
        timestamp,
        location: position,
        address: matched_fence.map(|f| f.address.clone()),
        deployment_label: matched_fence.map(|f| f.deployment_label.clone()),
        subject_name: subject_name.map(str::to_string),
        selfie_digest: None,
    }
}

/// The gate as configured for one deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttendanceGate {
    mode: GateMode,
}

impl AttendanceGate {
    pub fn new(mode: GateMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Apply the configured mode: geofenced deployments run
    /// [`authorize_activity`], unrestricted ones always pass.
    pub fn authorize(
        &self,
        position: Option<&GeoCoordinate>,
        fences: &[Geofence],
    ) -> Authorization {
        let auth = match self.mode {
            GateMode::Geofenced => authorize_activity(position, fences),
            GateMode::Unrestricted => Authorization {
                authorized: true,
                matched_fence: None,
            },
        };

        tracing::debug!(
            mode = ?self.mode,
            has_fix = position.is_some(),
            fences = fences.len(),
            authorized = auth.authorized,
            fence = auth.matched_fence.as_ref().map(|f| f.id.as_str()),
            "gate evaluated"
        );

        auth
    }
}
