//! Geofence definitions in TOML.
//!
//! ```toml
//! [[fence]]
//! id = "hq-gate"
//! latitude = 8.4785
//! longitude = 124.6420
//! radius_meters = 50
//! address = "Corrales Ave, Cagayan de Oro"
//! deployment = "HQ Main Gate"
//! ```
//!
//! A radius that cannot be read as a number loads as NaN so the fence is
//! kept but never matches.

use crate::types::{GeoCoordinate, Geofence};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FenceFileError {
    #[error("failed to read fence file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid fence file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate fence id: {0}")]
    DuplicateId(String),
}

#[derive(Debug, Deserialize)]
struct FenceFile {
    #[serde(default)]
    fence: Vec<FenceEntry>,
}

#[derive(Debug, Deserialize)]
struct FenceEntry {
    id: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    radius_meters: Option<RawRadius>,
    #[serde(default)]
    address: String,
    #[serde(default)]
    deployment: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRadius {
    Number(f64),
    Text(String),
    Other(toml::Value),
}

impl RawRadius {
    fn meters(&self) -> f64 {
        match self {
            RawRadius::Number(n) => *n,
            RawRadius::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
            RawRadius::Other(value) => {
                tracing::debug!(%value, "radius is not a number");
                f64::NAN
            }
        }
    }
}

/// Parse fence definitions, preserving their order in the document.
pub fn parse_fences(src: &str) -> Result<Vec<Geofence>, FenceFileError> {
    let file: FenceFile = toml::from_str(src)?;
    let mut seen = HashSet::new();
    let mut fences = Vec::with_capacity(file.fence.len());

    for entry in file.fence {
        if !seen.insert(entry.id.clone()) {
            return Err(FenceFileError::DuplicateId(entry.id));
        }
        let radius_meters = entry
            .radius_meters
            .as_ref()
            .map(RawRadius::meters)
            .unwrap_or(f64::NAN);

        let fence = Geofence {
            id: entry.id,
            center: GeoCoordinate::new(entry.latitude, entry.longitude),
            radius_meters,
            address: entry.address,
            deployment_label: entry.deployment,
        };
        if !fence.has_valid_radius() {
            tracing::warn!(
                fence = %fence.id,
                "fence radius is not a positive number; it will never match"
            );
        }
        fences.push(fence);
    }

    Ok(fences)
}

/// Read and parse a fence file from disk.
pub fn load_fences(path: &Path) -> Result<Vec<Geofence>, FenceFileError> {
    let src = std::fs::read_to_string(path).map_err(|source| FenceFileError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let fences = parse_fences(&src)?;
    tracing::info!(path = %path.display(), count = fences.len(), "loaded fence file");
    Ok(fences)
}
