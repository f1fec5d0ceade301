use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, types::Value as SqlValue, Row};

use crate::db::{
    helpers::{parse_datetime, sql_to_json},
    models::{GeofenceRow, NewGeofence},
    Database,
};
use crate::feed::GeofenceFeed;
use crate::models::GeofenceRecord;

const GEOFENCE_COLUMNS: &str = "id, name, description, latitude, longitude, radius, is_active,
     state, city, created_by, created_at, updated_at";

fn row_to_geofence(row: &Row) -> Result<GeofenceRow> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(GeofenceRow {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        latitude: sql_to_json(row.get::<_, SqlValue>("latitude")?),
        longitude: sql_to_json(row.get::<_, SqlValue>("longitude")?),
        radius: sql_to_json(row.get::<_, SqlValue>("radius")?),
        is_active: row.get::<_, i64>("is_active")? != 0,
        state: row.get("state")?,
        city: row.get("city")?,
        created_by: row.get("created_by")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Register a geofence and return the stored row.
    pub async fn insert_geofence(&self, geofence: NewGeofence) -> Result<GeofenceRow> {
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO geofences (name, description, latitude, longitude, radius, is_active,
                                        state, city, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8, ?9, ?9)",
                params![
                    geofence.name,
                    geofence.description,
                    geofence.latitude,
                    geofence.longitude,
                    geofence.radius,
                    geofence.state,
                    geofence.city,
                    geofence.created_by,
                    now,
                ],
            )?;

            let id = conn.last_insert_rowid();
            let mut stmt = conn.prepare(&format!(
                "SELECT {GEOFENCE_COLUMNS} FROM geofences WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => row_to_geofence(row),
                None => Err(anyhow!("Geofence not found after insert")),
            }
        })
        .await
    }

    /// Every stored geofence, active or not, oldest first.
    pub async fn list_geofences(&self) -> Result<Vec<GeofenceRow>> {
        self.query_geofences(false).await
    }

    pub async fn list_active_geofences(&self) -> Result<Vec<GeofenceRow>> {
        self.query_geofences(true).await
    }

    pub async fn set_geofence_active(&self, geofence_id: i64, active: bool) -> Result<()> {
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE geofences SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active as i64, Utc::now().to_rfc3339(), geofence_id],
            )?;
            if rows_affected == 0 {
                return Err(anyhow!("Geofence {geofence_id} not found"));
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_geofence(&self, geofence_id: i64) -> Result<()> {
        self.execute(move |conn| {
            let rows_affected =
                conn.execute("DELETE FROM geofences WHERE id = ?1", params![geofence_id])?;
            if rows_affected == 0 {
                return Err(anyhow!("Geofence {geofence_id} not found"));
            }
            Ok(())
        })
        .await
    }

    async fn query_geofences(&self, active_only: bool) -> Result<Vec<GeofenceRow>> {
        self.execute(move |conn| {
            let filter = if active_only { "WHERE is_active = 1" } else { "" };
            let mut stmt = conn.prepare(&format!(
                "SELECT {GEOFENCE_COLUMNS} FROM geofences {filter} ORDER BY id ASC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut geofences = Vec::new();
            while let Some(row) = rows.next()? {
                geofences.push(row_to_geofence(row)?);
            }
            Ok(geofences)
        })
        .await
    }
}

#[async_trait]
impl GeofenceFeed for Database {
    async fn fetch(&self) -> Result<Vec<GeofenceRecord>> {
        Ok(self
            .list_active_geofences()
            .await?
            .into_iter()
            .map(GeofenceRecord::from)
            .collect())
    }
}
