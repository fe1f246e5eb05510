use crate::{Store, StoreError};
use rusqlite::params;
use sentinex_core::{GeoCoordinate, Geofence};

impl Store {
    /// Replace the whole fence set. Order is kept as given.
    pub async fn replace_fences(&self, fences: &[Geofence]) -> Result<(), StoreError> {
        let fences = fences.to_vec();
        let count = fences.len();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM geofences", [])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO geofences
                            (position, id, latitude, longitude, radius_meters, address, deployment)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for (position, fence) in fences.iter().enumerate() {
                        // SQLite has no NaN; an unreadable radius is stored as NULL.
                        let radius = (!fence.radius_meters.is_nan()).then_some(fence.radius_meters);
                        stmt.execute(params![
                            position as i64,
                            fence.id,
                            fence.center.latitude,
                            fence.center.longitude,
                            radius,
                            fence.address,
                            fence.deployment_label,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        tracing::info!(count, "geofences replaced");
        Ok(())
    }

    /// All fences in snapshot order.
    pub async fn load_fences(&self) -> Result<Vec<Geofence>, StoreError> {
        let fences = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, latitude, longitude, radius_meters, address, deployment
                     FROM geofences ORDER BY position ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    let radius: Option<f64> = row.get(3)?;
                    Ok(Geofence {
                        id: row.get(0)?,
                        center: GeoCoordinate::new(row.get(1)?, row.get(2)?),
                        radius_meters: radius.unwrap_or(f64::NAN),
                        address: row.get(4)?,
                        deployment_label: row.get(5)?,
                    })
                })?;
                let fences = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(fences)
            })
            .await?;
        Ok(fences)
    }
}
