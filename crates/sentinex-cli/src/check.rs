//! Offline gate evaluation against a fence file.

use anyhow::Result;
use sentinex_core::{fence_file, haversine_distance, AttendanceGate, GateMode, GeoCoordinate};
use serde_json::json;
use std::path::Path;

pub fn evaluate(
    fences: &Path,
    position: GeoCoordinate,
    mode: GateMode,
) -> Result<serde_json::Value> {
    let fences = fence_file::load_fences(fences)?;
    let auth = AttendanceGate::new(mode).authorize(Some(&position), &fences);

    let distances: Vec<_> = fences
        .iter()
        .map(|f| {
            json!({
                "id": f.id,
                "distance_meters": haversine_distance(&position, &f.center),
                "radius_meters": f.radius_meters,
                "valid_radius": f.has_valid_radius(),
            })
        })
        .collect();

    Ok(json!({
        "position": position,
        "authorized": auth.authorized,
        "matched_fence": auth.matched_fence,
        "fences": distances,
    }))
}
