use crate::service::{AttendanceService, ServiceError};
use sentinex_core::{AttendanceStatus, GeoCoordinate};
use serde::Serialize;
use zbus::interface;

/// D-Bus interface for the Sentinex attendance daemon.
///
/// Bus name: org.sentinex.Attendance1
/// Object path: /org/sentinex/Attendance1
///
/// Every method replies with a JSON document. Selfies travel as encoded
/// image bytes so the daemon never opens files on a caller's behalf.
pub struct AttendanceInterface {
    service: AttendanceService,
}

impl AttendanceInterface {
    pub fn new(service: AttendanceService) -> Self {
        Self { service }
    }

    async fn attend(
        &self,
        badge: &str,
        status: AttendanceStatus,
        latitude: f64,
        longitude: f64,
        has_fix: bool,
        selfie: Vec<u8>,
    ) -> zbus::fdo::Result<String> {
        let position = reported_position(has_fix, latitude, longitude);
        tracing::info!(
            badge,
            status = %status,
            has_fix,
            bytes = selfie.len(),
            "attendance requested"
        );
        let record = self
            .service
            .attend(badge, status, position, selfie)
            .await
            .map_err(failed)?;
        to_json(&record)
    }
}

/// D-Bus has no optional arguments, so a missing fix arrives as a flag.
fn reported_position(has_fix: bool, latitude: f64, longitude: f64) -> Option<GeoCoordinate> {
    has_fix.then(|| GeoCoordinate::new(latitude, longitude))
}

fn optional_name(name: &str) -> Option<&str> {
    Some(name.trim()).filter(|n| !n.is_empty())
}

fn failed(err: ServiceError) -> zbus::fdo::Error {
    tracing::debug!(error = %err, "request failed");
    zbus::fdo::Error::Failed(err.to_string())
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.sentinex.Attendance1")]
impl AttendanceInterface {
    /// Look up a badge; fails if it is empty or unregistered.
    async fn login(&self, badge: &str) -> zbus::fdo::Result<String> {
        let person = self.service.login(badge).await.map_err(failed)?;
        to_json(&person)
    }

    async fn time_in(
        &self,
        badge: &str,
        latitude: f64,
        longitude: f64,
        has_fix: bool,
        selfie: Vec<u8>,
    ) -> zbus::fdo::Result<String> {
        self.attend(
            badge,
            AttendanceStatus::TimedIn,
            latitude,
            longitude,
            has_fix,
            selfie,
        )
        .await
    }

    async fn pull_out(
        &self,
        badge: &str,
        latitude: f64,
        longitude: f64,
        has_fix: bool,
        selfie: Vec<u8>,
    ) -> zbus::fdo::Result<String> {
        self.attend(
            badge,
            AttendanceStatus::PulledOut,
            latitude,
            longitude,
            has_fix,
            selfie,
        )
        .await
    }

    /// Add a badge to the registry. An empty name is stored as none.
    async fn register(&self, badge: &str, name: &str) -> zbus::fdo::Result<String> {
        let person = self
            .service
            .register(badge, optional_name(name))
            .await
            .map_err(failed)?;
        to_json(&person)
    }

    async fn list_fences(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.service.current_fences();
        Ok(serde_json::json!({
            "version": snapshot.version,
            "fences": snapshot.fences(),
        })
        .to_string())
    }

    async fn reload_fences(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.service.reload_fences().await.map_err(failed)?;
        Ok(serde_json::json!({
            "version": snapshot.version,
            "count": snapshot.len(),
        })
        .to_string())
    }

    /// Newest entries first. An empty badge lists every badge.
    async fn recent_logs(&self, badge: &str, limit: u32) -> zbus::fdo::Result<String> {
        let entries = self
            .service
            .recent_logs(Some(badge), limit as usize)
            .await
            .map_err(failed)?;
        to_json(&entries)
    }

    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.service.status().to_string())
    }
}
