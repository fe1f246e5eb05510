//! sentinex-remote: Collaborators outside the attendance gate.
//!
//! Selfie preparation (resize, re-encode, digest), the face comparison HTTP
//! client, and the world clock used to timestamp records.

pub mod clock;
pub mod face_api;
pub mod selfie;

#[cfg(test)]
mod test_server;

pub use clock::{ClockError, SystemClock, WorldClock};
pub use face_api::{FaceApiError, FaceCompareClient};
pub use selfie::{prepare_selfie, SelfieError};
