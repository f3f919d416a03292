use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{EventLog, HistoryStore, StoreResult, WriteBatch};
use crate::types::{EventId, LocationEvent, LocationHistory, Point, StoredEvent, VehicleBatch};

/// Advisory lock serializing raw event inserts.
pub const APPEND_LOCK_KEY: i64 = 0x6c6f_6361_7469_6f6e;

/// A storage engine on top of two PostgreSQL tables.
/// `location_events` is the raw log, capped by deleting the oldest rows on insert.
/// `location_history` holds consolidated histories.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    capacity: i64,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    vehicle_id: String,
    count: i32,
    start_time: i64,
    end_time: i64,
    timestamps: Vec<i64>,
    lons: Vec<f64>,
    lats: Vec<f64>,
}

impl TryFrom<HistoryRow> for LocationHistory {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let count = usize::try_from(row.count)
            .map_err(|_| StoreError::Corrupt(format!("history {} has count {}", row.id, row.count)))?;

        if row.timestamps.len() != count || row.lons.len() != count || row.lats.len() != count {
            return Err(StoreError::Corrupt(format!(
                "history {} holds {} samples, expected {}",
                row.id,
                row.timestamps.len(),
                count
            )));
        }

        Ok(LocationHistory {
            id: row.id,
            vehicle_id: row.vehicle_id,
            count,
            start_time: row.start_time,
            end_time: row.end_time,
            timestamps: row.timestamps,
            coordinates: row
                .lons
                .into_iter()
                .zip(row.lats)
                .map(|(lon, lat)| Point { lon, lat })
                .collect(),
        })
    }
}

fn query_error(command: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |error| StoreError::QueryError {
        command: command.to_owned(),
        error,
    }
}

fn to_event_id(id: i64) -> StoreResult<EventId> {
    EventId::try_from(id).map_err(|_| StoreError::Corrupt(format!("negative event id {}", id)))
}

fn to_row_id(id: EventId) -> StoreResult<i64> {
    i64::try_from(id).map_err(|_| StoreError::Corrupt(format!("event id {} out of range", id)))
}

fn to_row_count(history: &LocationHistory) -> StoreResult<i32> {
    i32::try_from(history.count).map_err(|_| {
        StoreError::Corrupt(format!("history {} count {} out of range", history.id, history.count))
    })
}

fn split_coordinates(coordinates: &[Point]) -> (Vec<f64>, Vec<f64>) {
    coordinates.iter().map(|p| (p.lon, p.lat)).unzip()
}

impl PgStore {
    /// Connect to PostgreSQL at `url`.
    pub async fn new(url: &str, capacity: usize, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self::from_pool(pool, capacity))
    }

    pub fn from_pool(pool: PgPool, capacity: usize) -> Self {
        Self {
            pool,
            capacity: i64::try_from(capacity.max(1)).unwrap_or(i64::MAX),
        }
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl EventLog for PgStore {
    async fn append(&self, event: LocationEvent) -> StoreResult<EventId> {
        let mut tx = self.pool.begin().await.map_err(query_error("BEGIN"))?;

        // Held until commit, so ids become visible in the order they are handed out and a
        // watermark never covers a row that is still in flight.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(query_error("LOCK"))?;

        let id: i64 = sqlx::query_scalar(
            r#"
INSERT INTO location_events
    (vehicle_id, timestamp_ms, lon, lat)
VALUES
    ($1, $2, $3, $4)
RETURNING id
            "#,
        )
        .bind(&event.vehicle_id)
        .bind(event.timestamp_ms)
        .bind(event.point.lon)
        .bind(event.point.lat)
        .fetch_one(&mut *tx)
        .await
        .map_err(|error| match error {
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
                StoreError::DuplicateKey {
                    vehicle_id: event.vehicle_id.clone(),
                    timestamp_ms: event.timestamp_ms,
                }
            }
            error => StoreError::QueryError {
                command: "INSERT".to_owned(),
                error,
            },
        })?;

        sqlx::query(
            r#"
DELETE FROM location_events
WHERE id IN (
    SELECT id FROM location_events ORDER BY id DESC OFFSET $1
)
            "#,
        )
        .bind(self.capacity)
        .execute(&mut *tx)
        .await
        .map_err(query_error("DELETE"))?;

        tx.commit().await.map_err(query_error("COMMIT"))?;

        to_event_id(id)
    }

    async fn list_pending(&self) -> StoreResult<Vec<StoredEvent>> {
        let rows: Vec<(i64, String, i64, f64, f64)> = sqlx::query_as(
            "SELECT id, vehicle_id, timestamp_ms, lon, lat FROM location_events ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))?;

        rows.into_iter()
            .map(|(id, vehicle_id, timestamp_ms, lon, lat)| {
                Ok(StoredEvent {
                    id: to_event_id(id)?,
                    event: LocationEvent {
                        vehicle_id,
                        timestamp_ms,
                        point: Point { lon, lat },
                    },
                })
            })
            .collect()
    }

    async fn pending_batches(&self) -> StoreResult<Vec<VehicleBatch>> {
        #[allow(clippy::type_complexity)]
        let rows: Vec<(String, i64, i64, Vec<i64>, Vec<f64>, Vec<f64>, i64)> = sqlx::query_as(
            r#"
SELECT
    vehicle_id,
    MIN(timestamp_ms),
    MAX(timestamp_ms),
    ARRAY_AGG(timestamp_ms ORDER BY timestamp_ms),
    ARRAY_AGG(lon ORDER BY timestamp_ms),
    ARRAY_AGG(lat ORDER BY timestamp_ms),
    MAX(id)
FROM
    location_events
GROUP BY
    vehicle_id
ORDER BY
    vehicle_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))?;

        rows.into_iter()
            .map(
                |(vehicle_id, start_time, end_time, timestamps, lons, lats, max_id)| {
                    Ok(VehicleBatch {
                        vehicle_id,
                        start_time,
                        end_time,
                        timestamps,
                        coordinates: lons
                            .into_iter()
                            .zip(lats)
                            .map(|(lon, lat)| Point { lon, lat })
                            .collect(),
                        max_source_id: to_event_id(max_id)?,
                    })
                },
            )
            .collect()
    }

    async fn delete_up_to(&self, watermark: EventId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM location_events WHERE id <= $1")
            .bind(to_row_id(watermark)?)
            .execute(&self.pool)
            .await
            .map_err(query_error("DELETE"))?;

        Ok(result.rows_affected())
    }

    async fn pending_count(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM location_events")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("SELECT"))?;

        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn latest_history(&self, vehicle_id: &str) -> StoreResult<Option<LocationHistory>> {
        let row: Option<HistoryRow> = sqlx::query_as(
            r#"
SELECT
    id, vehicle_id, count, start_time, end_time, timestamps, lons, lats
FROM
    location_history
WHERE
    vehicle_id = $1
ORDER BY
    end_time DESC, id DESC
LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error("SELECT"))?;

        row.map(LocationHistory::try_from).transpose()
    }

    async fn histories(&self, vehicle_id: &str) -> StoreResult<Vec<LocationHistory>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
SELECT
    id, vehicle_id, count, start_time, end_time, timestamps, lons, lats
FROM
    location_history
WHERE
    vehicle_id = $1
ORDER BY
    start_time, id
            "#,
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))?;

        rows.into_iter().map(LocationHistory::try_from).collect()
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Err(StoreError::EmptyBatch);
        }

        // Dropping the transaction without committing rolls everything back.
        let mut tx = self.pool.begin().await.map_err(query_error("BEGIN"))?;

        for update in &batch.updates {
            let history = &update.history;
            let (lons, lats) = split_coordinates(&history.coordinates);

            let result = sqlx::query(
                r#"
UPDATE location_history
SET
    count = $2,
    end_time = $3,
    timestamps = $4,
    lons = $5,
    lats = $6
WHERE
    id = $1 AND end_time = $7
                "#,
            )
            .bind(history.id)
            .bind(to_row_count(history)?)
            .bind(history.end_time)
            .bind(&history.timestamps)
            .bind(&lons)
            .bind(&lats)
            .bind(update.expected_end_time)
            .execute(&mut *tx)
            .await
            .map_err(query_error("UPDATE"))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(history.id));
            }
        }

        for history in &batch.inserts {
            let (lons, lats) = split_coordinates(&history.coordinates);

            sqlx::query(
                r#"
INSERT INTO location_history
    (id, vehicle_id, count, start_time, end_time, timestamps, lons, lats)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(history.id)
            .bind(&history.vehicle_id)
            .bind(to_row_count(history)?)
            .bind(history.start_time)
            .bind(history.end_time)
            .bind(&history.timestamps)
            .bind(&lons)
            .bind(&lats)
            .execute(&mut *tx)
            .await
            .map_err(query_error("INSERT"))?;
        }

        tx.commit().await.map_err(query_error("COMMIT"))?;

        Ok(())
    }
}
