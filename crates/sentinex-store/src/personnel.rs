use crate::{conversion_error, format_timestamp, parse_timestamp, Store, StoreError};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use sentinex_core::{AttendanceStatus, GeoCoordinate, Personnel};

const PERSONNEL_COLUMNS: &str =
    "badge_id, name, status, last_timestamp, last_latitude, last_longitude";

fn row_to_personnel(row: &Row) -> rusqlite::Result<Personnel> {
    let status: Option<String> = row.get(2)?;
    let status = status
        .map(|s| s.parse::<AttendanceStatus>().map_err(|e| conversion_error(2, e)))
        .transpose()?;

    let last_timestamp: Option<String> = row.get(3)?;
    let last_timestamp = last_timestamp
        .map(|s| parse_timestamp(3, &s))
        .transpose()?;

    let lat: Option<f64> = row.get(4)?;
    let lon: Option<f64> = row.get(5)?;

    Ok(Personnel {
        badge_id: row.get(0)?,
        name: row.get(1)?,
        status,
        last_timestamp,
        last_location: lat.zip(lon).map(|(lat, lon)| GeoCoordinate::new(lat, lon)),
    })
}

impl Store {
    /// Add a badge to the registry. Badges must be registered before they can log in.
    pub async fn register_personnel(
        &self,
        badge_id: &str,
        name: Option<&str>,
    ) -> Result<Personnel, StoreError> {
        let badge = badge_id.to_string();
        let name = name.map(str::to_string);
        let now = format_timestamp(&Utc::now());

        let inserted = {
            let badge = badge.clone();
            let name = name.clone();
            self.conn
                .call(move |conn| {
                    let n = conn.execute(
                        "INSERT OR IGNORE INTO personnel (badge_id, name, created_at)
                         VALUES (?1, ?2, ?3)",
                        params![badge, name, now],
                    )?;
                    Ok(n == 1)
                })
                .await?
        };

        if !inserted {
            return Err(StoreError::AlreadyRegistered(badge));
        }
        tracing::info!(badge = %badge, "personnel registered");

        Ok(Personnel {
            badge_id: badge,
            name,
            status: None,
            last_timestamp: None,
            last_location: None,
        })
    }

    pub async fn find_personnel(&self, badge_id: &str) -> Result<Option<Personnel>, StoreError> {
        let badge = badge_id.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let person = conn
                    .query_row(
                        &format!("SELECT {PERSONNEL_COLUMNS} FROM personnel WHERE badge_id = ?1"),
                        params![badge],
                        row_to_personnel,
                    )
                    .optional()?;
                Ok(person)
            })
            .await?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_find() {
        let store = Store::open_in_memory().await.unwrap();
        let p = store.register_personnel("1042", Some("J. Cruz")).await.unwrap();
        assert_eq!(p.badge_id, "1042");
        assert!(p.status.is_none());

        let found = store.find_personnel("1042").await.unwrap().unwrap();
        assert_eq!(found, p);
    }

    #[tokio::test]
    async fn test_unknown_badge_is_none() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.find_personnel("0000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_an_error() {
        let store = Store::open_in_memory().await.unwrap();
        store.register_personnel("1042", None).await.unwrap();
        let err = store.register_personnel("1042", Some("Other")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyRegistered(b) if b == "1042"));

        let kept = store.find_personnel("1042").await.unwrap().unwrap();
        assert!(kept.name.is_none());
    }
}
