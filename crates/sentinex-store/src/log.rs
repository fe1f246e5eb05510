use crate::{conversion_error, format_timestamp, parse_timestamp, Store, StoreError};
use rusqlite::{params, Row};
use sentinex_core::{AttendanceRecord, AttendanceStatus, GeoCoordinate, RecordSink};
use serde::Serialize;
use uuid::Uuid;

/// One appended attendance record and the id it was filed under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    #[serde(flatten)]
    pub record: AttendanceRecord,
}

fn row_to_entry(row: &Row) -> rusqlite::Result<LogEntry> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id).map_err(|e| conversion_error(0, e.to_string()))?;
    let status: String = row.get(2)?;
    let status = status
        .parse::<AttendanceStatus>()
        .map_err(|e| conversion_error(2, e))?;
    let timestamp: String = row.get(3)?;
    let lat: Option<f64> = row.get(4)?;
    let lon: Option<f64> = row.get(5)?;

    Ok(LogEntry {
        id,
        record: AttendanceRecord {
            badge_id: row.get(1)?,
            status_flag: status.flag(),
            timestamp: parse_timestamp(3, &timestamp)?,
            location: lat.zip(lon).map(|(lat, lon)| GeoCoordinate::new(lat, lon)),
            address: row.get(6)?,
            deployment_label: row.get(7)?,
            subject_name: row.get(8)?,
            selfie_digest: row.get(9)?,
        },
    })
}

impl Store {
    /// File a record: refresh the badge's personnel row and append a log
    /// entry, both or neither.
    pub async fn append_record(&self, record: &AttendanceRecord) -> Result<LogEntry, StoreError> {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            record: record.clone(),
        };
        let row = entry.clone();

        let updated = self
            .conn
            .call(move |conn| {
                let rec = &row.record;
                let status = rec.status().as_str();
                let timestamp = format_timestamp(&rec.timestamp);
                let lat = rec.location.map(|l| l.latitude);
                let lon = rec.location.map(|l| l.longitude);

                let tx = conn.transaction()?;
                let n = tx.execute(
                    "UPDATE personnel
                     SET status = ?2, last_timestamp = ?3, last_latitude = ?4, last_longitude = ?5
                     WHERE badge_id = ?1",
                    params![rec.badge_id, status, timestamp, lat, lon],
                )?;
                if n == 0 {
                    return Ok(false);
                }
                tx.execute(
                    "INSERT INTO attendance_log
                        (entry_id, badge_id, status, timestamp, latitude, longitude,
                         address, deployment, subject_name, selfie_digest)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        row.id.to_string(),
                        rec.badge_id,
                        status,
                        timestamp,
                        lat,
                        lon,
                        rec.address,
                        rec.deployment_label,
                        rec.subject_name,
                        rec.selfie_digest,
                    ],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if !updated {
            return Err(StoreError::UnknownBadge(record.badge_id.clone()));
        }

        tracing::info!(
            entry = %entry.id,
            badge = %record.badge_id,
            status = %record.status(),
            deployment = record.deployment_label.as_deref().unwrap_or("-"),
            "attendance recorded"
        );
        Ok(entry)
    }

    /// Newest entries first, optionally for one badge only.
    pub async fn recent_logs(
        &self,
        badge_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let badge = badge_id.map(str::to_string);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT entry_id, badge_id, status, timestamp, latitude, longitude,
                            address, deployment, subject_name, selfie_digest
                     FROM attendance_log
                     WHERE ?1 IS NULL OR badge_id = ?1
                     ORDER BY seq DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![badge, limit], row_to_entry)?;
                let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }
}

impl RecordSink for Store {
    type Error = StoreError;

    async fn append(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        self.append_record(record).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sentinex_core::build_record;

    fn record(badge: &str, flag: bool, hour: u32) -> AttendanceRecord {
        build_record(
            badge,
            flag,
            Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            Some(GeoCoordinate::new(8.4785, 124.6420)),
            None,
            Some("J. Cruz"),
        )
    }

    #[tokio::test]
    async fn test_append_updates_personnel_and_log() {
        let store = Store::open_in_memory().await.unwrap();
        store.register_personnel("1042", Some("J. Cruz")).await.unwrap();

        let rec = record("1042", true, 8).with_selfie_digest("abc123");
        let entry = store.append_record(&rec).await.unwrap();
        assert_eq!(entry.record, rec);

        let person = store.find_personnel("1042").await.unwrap().unwrap();
        assert_eq!(person.status, Some(AttendanceStatus::TimedIn));
        assert_eq!(person.last_timestamp, Some(rec.timestamp));
        assert_eq!(person.last_location, rec.location);

        let logs = store.recent_logs(Some("1042"), 10).await.unwrap();
        assert_eq!(logs, vec![entry]);
    }

    #[tokio::test]
    async fn test_unknown_badge_writes_nothing() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store.append_record(&record("9999", true, 8)).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownBadge(b) if b == "9999"));
        assert!(store.recent_logs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_logs_newest_first_and_filtered() {
        let store = Store::open_in_memory().await.unwrap();
        store.register_personnel("1", None).await.unwrap();
        store.register_personnel("2", None).await.unwrap();

        store.append_record(&record("1", true, 8)).await.unwrap();
        store.append_record(&record("2", true, 9)).await.unwrap();
        store.append_record(&record("1", false, 17)).await.unwrap();

        let all = store.recent_logs(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].record.badge_id, "1");
        assert!(!all[0].record.status_flag);
        assert_eq!(all[2].record.timestamp.format("%H").to_string(), "08");

        let one = store.recent_logs(Some("1"), 1).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].record.status(), AttendanceStatus::PulledOut);

        let person = store.find_personnel("1").await.unwrap().unwrap();
        assert_eq!(person.status, Some(AttendanceStatus::PulledOut));
    }

    #[tokio::test]
    async fn test_store_is_a_record_sink() {
        let store = Store::open_in_memory().await.unwrap();
        store.register_personnel("5", None).await.unwrap();
        let rec = build_record("5", false, Utc::now(), None, None, None);
        RecordSink::append(&store, &rec).await.unwrap();

        let logs = store.recent_logs(Some("5"), 5).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].record.location.is_none());
        assert!(logs[0].record.subject_name.is_none());
    }
}
