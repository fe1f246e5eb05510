//! Client for the face comparison service.
//!
//! `POST {base}/compare_faces` with a multipart form carrying the badge id
//! (`id`) and the selfie (`file`, `image.jpg`). The service answers with
//! `{"identified_name": "..."}` on a match or `{"error": "..."}` otherwise.

use reqwest::multipart::{Form, Part};
use reqwest::Url;
use sentinex_core::{FaceVerifier, PreparedSelfie, Verification};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const COMPARE_PATH: &str = "compare_faces";

#[derive(Error, Debug)]
pub enum FaceApiError {
    #[error("invalid face service url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("face service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("face service returned HTTP {0} without a readable body")]
    Status(u16),
    #[error("unexpected face service response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    identified_name: Option<String>,
}

/// Turn the service's JSON into a verdict. An `error` field wins over a name.
fn interpret(body: &[u8], http_status: u16) -> Result<Verification, FaceApiError> {
    let parsed: CompareResponse = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(_) if !(200..300).contains(&http_status) => {
            return Err(FaceApiError::Status(http_status))
        }
        Err(e) => return Err(FaceApiError::Malformed(e.to_string())),
    };

    match parsed {
        CompareResponse {
            error: Some(reason),
            ..
        } => Ok(Verification::Rejected { reason }),
        CompareResponse {
            identified_name: Some(name),
            ..
        } => Ok(Verification::Identified { name }),
        _ => Err(FaceApiError::Malformed(
            String::from_utf8_lossy(body).into_owned(),
        )),
    }
}

/// HTTP client for the face comparison endpoint.
#[derive(Clone)]
pub struct FaceCompareClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl FaceCompareClient {
    /// `base_url` is the service root, e.g. `http://192.168.0.29:5000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FaceApiError> {
        let endpoint = endpoint_url(base_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn compare(
        &self,
        badge_id: &str,
        selfie: &PreparedSelfie,
    ) -> Result<Verification, FaceApiError> {
        let file = Part::bytes(selfie.jpeg.clone())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().text("id", badge_id.to_string()).part("file", file);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        let verdict = interpret(&body, status)?;
        match &verdict {
            Verification::Identified { name } => {
                tracing::info!(badge = badge_id, name = %name, "face identified")
            }
            Verification::Rejected { reason } => {
                tracing::info!(badge = badge_id, reason = %reason, "face rejected")
            }
        }
        Ok(verdict)
    }
}

impl FaceVerifier for FaceCompareClient {
    type Error = FaceApiError;

    async fn verify(
        &self,
        badge_id: &str,
        selfie: &PreparedSelfie,
    ) -> Result<Verification, FaceApiError> {
        self.compare(badge_id, selfie).await
    }
}

fn endpoint_url(base_url: &str) -> Result<Url, FaceApiError> {
    let invalid = |reason: String| FaceApiError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };
    let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", base.scheme())));
    }
    // Without a trailing slash `join` would replace the last path segment.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(COMPARE_PATH).map_err(|e| invalid(e.to_string()))
}
