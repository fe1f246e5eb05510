use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A position reading in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A circular region that gates where attendance may be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: String,
    pub center: GeoCoordinate,
    pub radius_meters: f64,
    pub address: String,
    pub deployment_label: String,
}

impl Geofence {
    /// A radius that is zero, negative, NaN or infinite never contains anything.
    pub fn has_valid_radius(&self) -> bool {
        self.radius_meters.is_finite() && self.radius_meters > 0.0
    }
}

/// An immutable set of geofences as delivered by the fence source.
///
/// Cloning is cheap: the fence list is shared. A reload never mutates an
/// existing snapshot, it produces a new one with the next version.
#[derive(Debug, Clone)]
pub struct FenceSnapshot {
    pub version: u64,
    fences: Arc<[Geofence]>,
}

impl Default for FenceSnapshot {
    fn default() -> Self {
        Self::new(0, Vec::new())
    }
}

impl FenceSnapshot {
    pub fn new(version: u64, fences: Vec<Geofence>) -> Self {
        Self {
            version,
            fences: fences.into(),
        }
    }

    /// Build the snapshot that replaces `self`.
    pub fn succeed(&self, fences: Vec<Geofence>) -> Self {
        Self::new(self.version + 1, fences)
    }

    pub fn fences(&self) -> &[Geofence] {
        &self.fences
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }
}

/// Attendance status selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[serde(rename = "Timed In")]
    TimedIn,
    #[serde(rename = "Pulled Out")]
    PulledOut,
}

impl AttendanceStatus {
    pub fn from_flag(flag: bool) -> Self {
        if flag {
            Self::TimedIn
        } else {
            Self::PulledOut
        }
    }

    pub fn flag(self) -> bool {
        matches!(self, Self::TimedIn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimedIn => "Timed In",
            Self::PulledOut => "Pulled Out",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Timed In" => Ok(Self::TimedIn),
            "Pulled Out" => Ok(Self::PulledOut),
            other => Err(format!("unknown attendance status '{other}'")),
        }
    }
}

/// One successful attendance action, ready to be appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub badge_id: String,
    /// `true` = Timed In, `false` = Pulled Out.
    pub status_flag: bool,
    pub timestamp: DateTime<Utc>,
    pub location: Option<GeoCoordinate>,
    pub address: Option<String>,
    pub deployment_label: Option<String>,
    pub subject_name: Option<String>,
    /// Hex SHA-256 of the selfie that was verified for this record.
    pub selfie_digest: Option<String>,
}

impl AttendanceRecord {
    pub fn status(&self) -> AttendanceStatus {
        AttendanceStatus::from_flag(self.status_flag)
    }

    pub fn with_selfie_digest(mut self, digest: impl Into<String>) -> Self {
        self.selfie_digest = Some(digest.into());
        self
    }
}

/// A registered badge holder and the last status recorded for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personnel {
    pub badge_id: String,
    pub name: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub last_location: Option<GeoCoordinate>,
}

/// A selfie resized and re-encoded for the face comparison service.
#[derive(Debug, Clone)]
pub struct PreparedSelfie {
    /// JPEG bytes.
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Hex SHA-256 of `jpeg`.
    pub digest: String,
}
