//! Request handling behind the D-Bus interface.

use crate::engine::{AttemptRequest, EngineError, EngineHandle};
use sentinex_core::fence_file::{self, FenceFileError};
use sentinex_core::{
    AttendanceRecord, AttendanceStatus, FenceSnapshot, GateMode, GeoCoordinate, Personnel,
};
use sentinex_store::{LogEntry, Store, StoreError};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Please input your Badge Number first.")]
    EmptyBadge,
    #[error("Badge Number not registered.")]
    NotRegistered,
    #[error("Data is still being sent. Please wait.")]
    Busy,
    #[error("selfie is {0} bytes; the limit is {max}", max = MAX_SELFIE_BYTES)]
    SelfieTooLarge(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    FenceFile(#[from] FenceFileError),
}

/// Largest encoded selfie accepted from a client.
pub const MAX_SELFIE_BYTES: usize = 16 * 1024 * 1024;

/// Badges with an attempt currently running.
#[derive(Clone, Default)]
struct InFlightSet(Arc<Mutex<HashSet<String>>>);

impl InFlightSet {
    fn try_acquire(&self, badge: &str) -> Option<InFlightGuard> {
        let mut set = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(badge.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            badge: badge.to_string(),
        })
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Releases the badge when the attempt ends, however it ends.
struct InFlightGuard {
    set: InFlightSet,
    badge: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.badge);
    }
}

pub struct AttendanceService {
    store: Store,
    engine: EngineHandle,
    fences: watch::Sender<FenceSnapshot>,
    fences_file: Option<PathBuf>,
    gate_mode: GateMode,
    in_flight: InFlightSet,
}

impl AttendanceService {
    pub fn new(
        store: Store,
        engine: EngineHandle,
        fences: watch::Sender<FenceSnapshot>,
        fences_file: Option<PathBuf>,
        gate_mode: GateMode,
    ) -> Self {
        Self {
            store,
            engine,
            fences,
            fences_file,
            gate_mode,
            in_flight: InFlightSet::default(),
        }
    }

    async fn registered(&self, badge_id: &str) -> Result<Personnel, ServiceError> {
        let badge_id = badge_id.trim();
        if badge_id.is_empty() {
            return Err(ServiceError::EmptyBadge);
        }
        self.store
            .find_personnel(badge_id)
            .await?
            .ok_or(ServiceError::NotRegistered)
    }

    pub async fn login(&self, badge_id: &str) -> Result<Personnel, ServiceError> {
        let person = self.registered(badge_id).await?;
        tracing::info!(badge = %person.badge_id, "login");
        Ok(person)
    }

    pub async fn register(
        &self,
        badge_id: &str,
        name: Option<&str>,
    ) -> Result<Personnel, ServiceError> {
        let badge_id = badge_id.trim();
        if badge_id.is_empty() {
            return Err(ServiceError::EmptyBadge);
        }
        Ok(self.store.register_personnel(badge_id, name).await?)
    }

    /// Run one Time In or Pull Out attempt for a registered badge.
    pub async fn attend(
        &self,
        badge_id: &str,
        status: AttendanceStatus,
        position: Option<GeoCoordinate>,
        selfie: Vec<u8>,
    ) -> Result<AttendanceRecord, ServiceError> {
        if selfie.len() > MAX_SELFIE_BYTES {
            return Err(ServiceError::SelfieTooLarge(selfie.len()));
        }
        let person = self.registered(badge_id).await?;
        let Some(_guard) = self.in_flight.try_acquire(&person.badge_id) else {
            tracing::warn!(badge = %person.badge_id, "attempt already in flight");
            return Err(ServiceError::Busy);
        };

        let record = self
            .engine
            .attempt(AttemptRequest {
                badge_id: person.badge_id,
                status,
                position,
                selfie,
            })
            .await?;
        Ok(record)
    }

    pub fn current_fences(&self) -> FenceSnapshot {
        self.fences.borrow().clone()
    }

    /// Re-read the fence file into the store, if one is configured, then
    /// publish the stored set.
    pub async fn reload_fences(&self) -> Result<FenceSnapshot, ServiceError> {
        if let Some(path) = &self.fences_file {
            let fences = fence_file::load_fences(path)?;
            self.store.replace_fences(&fences).await?;
            tracing::info!(path = %path.display(), count = fences.len(), "fence file imported");
        }
        self.publish_stored_fences().await
    }

    /// Publish whatever the store holds as the next snapshot.
    pub async fn publish_stored_fences(&self) -> Result<FenceSnapshot, ServiceError> {
        let fences = self.store.load_fences().await?;
        let next = self.fences.borrow().succeed(fences);
        self.fences.send_replace(next.clone());
        tracing::info!(version = next.version, count = next.len(), "fence snapshot published");
        Ok(next)
    }

    pub async fn recent_logs(
        &self,
        badge_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LogEntry>, ServiceError> {
        let badge_id = badge_id.map(str::trim).filter(|b| !b.is_empty());
        Ok(self.store.recent_logs(badge_id, limit).await?)
    }

    pub fn status(&self) -> serde_json::Value {
        let snapshot = self.current_fences();
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "gate_mode": self.gate_mode,
            "fence_snapshot": snapshot.version,
            "fences": snapshot.len(),
            "fences_file": self.fences_file.as_ref().map(|p| p.display().to_string()),
            "attempts_in_flight": self.in_flight.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{spawn_engine, Engine, LiveFences};
    use crate::testing::{hq, noon, selfie_png, FakeVerifier, FixedClock};
    use sentinex_core::AttendanceGate;

    struct Fixture {
        service: AttendanceService,
        verifier: FakeVerifier,
        selfie: Vec<u8>,
        dir: tempfile::TempDir,
    }

    async fn fixture(fences_file: Option<&str>) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let fences_path = fences_file.map(|body| {
            let path = dir.path().join("fences.toml");
            std::fs::write(&path, body).unwrap();
            path
        });

        let store = Store::open_in_memory().await.unwrap();
        store.replace_fences(&[hq()]).await.unwrap();
        store.register_personnel("1042", Some("J. Cruz")).await.unwrap();

        let (tx, rx) = watch::channel(FenceSnapshot::default());
        let verifier = FakeVerifier::identifying("J. Cruz");
        let engine = spawn_engine(Engine {
            gate: AttendanceGate::new(GateMode::Geofenced),
            fences: LiveFences(rx),
            verifier: verifier.clone(),
            clock: FixedClock(noon()),
            sink: store.clone(),
        });
        let service = AttendanceService::new(store, engine, tx, fences_path, GateMode::Geofenced);
        service.publish_stored_fences().await.unwrap();

        Fixture {
            service,
            verifier,
            selfie: selfie_png(),
            dir,
        }
    }

    fn at_hq() -> Option<GeoCoordinate> {
        Some(GeoCoordinate::new(8.4785, 124.6420))
    }

    #[tokio::test]
    async fn test_login_messages() {
        let f = fixture(None).await;
        let err = f.service.login("   ").await.unwrap_err();
        assert_eq!(err.to_string(), "Please input your Badge Number first.");
        let err = f.service.login("9999").await.unwrap_err();
        assert_eq!(err.to_string(), "Badge Number not registered.");

        let person = f.service.login(" 1042 ").await.unwrap();
        assert_eq!(person.name.as_deref(), Some("J. Cruz"));
    }

    #[tokio::test]
    async fn test_time_in_then_pull_out_updates_personnel() {
        let f = fixture(None).await;
        let rec = f
            .service
            .attend("1042", AttendanceStatus::TimedIn, at_hq(), f.selfie.clone())
            .await
            .unwrap();
        assert_eq!(rec.deployment_label.as_deref(), Some("HQ Main Gate"));

        f.service
            .attend("1042", AttendanceStatus::PulledOut, at_hq(), f.selfie.clone())
            .await
            .unwrap();

        let person = f.service.login("1042").await.unwrap();
        assert_eq!(person.status, Some(AttendanceStatus::PulledOut));
        let logs = f.service.recent_logs(Some("1042"), 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].record.status(), AttendanceStatus::PulledOut);
        assert_eq!(f.service.in_flight.len(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_badge_never_reaches_engine() {
        let f = fixture(None).await;
        let err = f
            .service
            .attend("5555", AttendanceStatus::TimedIn, at_hq(), f.selfie.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotRegistered));
        assert_eq!(f.verifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_second_attempt_for_same_badge_is_busy() {
        let f = fixture(None).await;
        let held = f.service.in_flight.try_acquire("1042").unwrap();
        let err = f
            .service
            .attend("1042", AttendanceStatus::TimedIn, at_hq(), f.selfie.clone())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Data is still being sent. Please wait.");
        drop(held);

        assert!(f
            .service
            .attend("1042", AttendanceStatus::TimedIn, at_hq(), f.selfie.clone())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_oversized_selfie_is_refused() {
        let f = fixture(None).await;
        let err = f
            .service
            .attend(
                "1042",
                AttendanceStatus::TimedIn,
                at_hq(),
                vec![0u8; MAX_SELFIE_BYTES + 1],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SelfieTooLarge(n) if n == MAX_SELFIE_BYTES + 1));
        assert_eq!(f.verifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_released_after_rejection() {
        let f = fixture(None).await;
        let far = Some(GeoCoordinate::new(10.0, 120.0));
        let err = f
            .service
            .attend("1042", AttendanceStatus::TimedIn, far, f.selfie.clone())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Engine(EngineError::OutsideGeofence(_))
        ));
        assert_eq!(f.service.in_flight.len(), 0);
    }

    #[tokio::test]
    async fn test_reload_imports_file_and_bumps_version() {
        let f = fixture(Some(
            r#"
[[fence]]
id = "pier"
latitude = 8.4900
longitude = 124.6500
radius_meters = "100"
address = "Pier 2"
deployment = "Port Detail"
"#,
        ))
        .await;
        let before = f.service.current_fences();
        assert_eq!(before.fences()[0].id, "hq");

        let after = f.service.reload_fences().await.unwrap();
        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.fences()[0].id, "pier");
        assert_eq!(f.service.current_fences().version, after.version);

        let rec = f
            .service
            .attend(
                "1042",
                AttendanceStatus::TimedIn,
                Some(GeoCoordinate::new(8.4900, 124.6500)),
                f.selfie.clone(),
            )
            .await
            .unwrap();
        assert_eq!(rec.address.as_deref(), Some("Pier 2"));
    }

    #[tokio::test]
    async fn test_bad_fence_file_keeps_current_snapshot() {
        let f = fixture(Some("[[fence]]\nid = 3")).await;
        let before = f.service.current_fences();
        assert!(matches!(
            f.service.reload_fences().await,
            Err(ServiceError::FenceFile(_))
        ));
        let now = f.service.current_fences();
        assert_eq!(now.version, before.version);
        assert_eq!(now.fences(), before.fences());
        assert!(f.dir.path().join("fences.toml").exists());
    }

    #[tokio::test]
    async fn test_status_reports_snapshot() {
        let f = fixture(None).await;
        let status = f.service.status();
        assert_eq!(status["gate_mode"], "geofenced");
        assert_eq!(status["fences"], 1);
        assert_eq!(status["fence_snapshot"], 1);
        assert_eq!(status["attempts_in_flight"], 0);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let f = fixture(None).await;
        f.service.register("2001", None).await.unwrap();
        assert!(matches!(
            f.service.register("2001", None).await,
            Err(ServiceError::Store(StoreError::AlreadyRegistered(_)))
        ));
        assert!(matches!(
            f.service.register("", None).await,
            Err(ServiceError::EmptyBadge)
        ));
    }
}
