//! Wall-clock sources for record timestamps.
//!
//! Device clocks on field phones drift or get set by hand, so records are
//! stamped from a world time service when it answers and from the local
//! clock when it does not.

use chrono::{DateTime, Utc};
use reqwest::Url;
use sentinex_core::Clock;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClockError {
    #[error("invalid time service url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("time service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("time service returned an unreadable datetime '{value}': {reason}")]
    BadDatetime { value: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct WorldTime {
    datetime: String,
}

fn parse_world_time(body: WorldTime) -> Result<DateTime<Utc>, ClockError> {
    DateTime::parse_from_rfc3339(&body.datetime)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ClockError::BadDatetime {
            reason: e.to_string(),
            value: body.datetime,
        })
}

/// The host's clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    async fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `GET {base}/api/timezone/{zone}` against a worldtimeapi-compatible service.
#[derive(Clone)]
pub struct WorldClock {
    client: reqwest::Client,
    url: Url,
}

impl WorldClock {
    pub fn new(base_url: &str, zone: &str, timeout: Duration) -> Result<Self, ClockError> {
        let invalid = |reason: String| ClockError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let url = base
            .join(&format!("api/timezone/{}", zone.trim_matches('/')))
            .map_err(|e| invalid(e.to_string()))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Ask the service for the current time.
    pub async fn fetch(&self) -> Result<DateTime<Utc>, ClockError> {
        let body: WorldTime = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_world_time(body)
    }
}

impl Clock for WorldClock {
    /// Remote time, or the local clock if the service is unavailable.
    async fn now(&self) -> DateTime<Utc> {
        match self.fetch().await {
            Ok(now) => now,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    url = %self.url,
                    "world clock unavailable; using local clock"
                );
                Utc::now()
            }
        }
    }
}
