//! Fakes shared by the daemon's unit tests.

use chrono::{DateTime, TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sentinex_core::{Clock, FaceVerifier, GeoCoordinate, Geofence, PreparedSelfie, Verification};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error("service offline")]
pub struct Offline;

/// Answers every comparison with `verdict`, or fails when it is `None`.
#[derive(Clone)]
pub struct FakeVerifier {
    pub verdict: Option<Verification>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeVerifier {
    pub fn new(verdict: Option<Verification>) -> Self {
        Self {
            verdict,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn identifying(name: &str) -> Self {
        Self::new(Some(Verification::Identified { name: name.into() }))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceVerifier for FakeVerifier {
    type Error = Offline;

    async fn verify(
        &self,
        _badge_id: &str,
        _selfie: &PreparedSelfie,
    ) -> Result<Verification, Offline> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict.clone().ok_or(Offline)
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    async fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap()
}

pub fn hq() -> Geofence {
    Geofence {
        id: "hq".into(),
        center: GeoCoordinate::new(8.4785, 124.6420),
        radius_meters: 50.0,
        address: "Corrales Ave".into(),
        deployment_label: "HQ Main Gate".into(),
    }
}

/// A plain, well-lit PNG.
pub fn selfie_png() -> Vec<u8> {
    let img = RgbImage::from_fn(320, 240, |x, y| Rgb([200, (x % 256) as u8, (y % 256) as u8]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}
