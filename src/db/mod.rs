use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, Pool, Postgres};
use tracing::debug;
use uuid::Uuid;

use crate::models::stop::Stop;
use crate::models::tour::Tour;
use crate::store::{StoreError, TourStore};

pub mod queries;

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

#[derive(Debug, FromRow)]
struct TourRow {
    tour_id: Uuid,
    meeting_point: String,
    meeting_point_lat: Option<f64>,
    meeting_point_lng: Option<f64>,
    meeting_point_confirmed: bool,
    meeting_point_confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct PgTourStore {
    pool: DbPool,
}

impl PgTourStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Explains a guarded update that touched no rows.
    async fn conflict_or_missing(&self, tour_id: Uuid, detail: String) -> StoreError {
        match sqlx::query_scalar::<_, bool>(queries::TOUR_EXISTS)
            .bind(tour_id)
            .fetch_one(&self.pool)
            .await
        {
            Ok(true) => StoreError::Conflict { tour_id, detail },
            Ok(false) => StoreError::TourNotFound(tour_id),
            Err(e) => StoreError::Database(e),
        }
    }
}

#[async_trait]
impl TourStore for PgTourStore {
    async fn load_tour(&self, tour_id: Uuid) -> Result<Option<Tour>, StoreError> {
        let row = sqlx::query_as::<_, TourRow>(queries::SELECT_TOUR)
            .bind(tour_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stops = sqlx::query_as::<_, Stop>(queries::SELECT_TOUR_STOPS)
            .bind(tour_id)
            .fetch_all(&self.pool)
            .await?;

        let mut tour = Tour {
            tour_id: row.tour_id,
            meeting_point: row.meeting_point,
            meeting_point_latitude: row.meeting_point_lat,
            meeting_point_longitude: row.meeting_point_lng,
            meeting_point_confirmed: row.meeting_point_confirmed,
            meeting_point_confirmed_at: row.meeting_point_confirmed_at,
            stops,
        };
        tour.normalize()?;

        debug!(%tour_id, stops = tour.stops.len(), "Loaded tour");
        Ok(Some(tour))
    }

    async fn save_meeting_point(
        &self,
        tour_id: Uuid,
        confirmed: bool,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(queries::UPDATE_MEETING_POINT)
            .bind(tour_id)
            .bind(confirmed)
            .bind(confirmed_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .conflict_or_missing(
                    tour_id,
                    format!("meeting point already has confirmed = {}", confirmed),
                )
                .await);
        }
        Ok(())
    }

    async fn save_stop_completion(
        &self,
        tour_id: Uuid,
        order: i32,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(queries::UPDATE_STOP_COMPLETION)
            .bind(tour_id)
            .bind(order)
            .bind(completed)
            .bind(completed_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .conflict_or_missing(
                    tour_id,
                    format!("stop {} missing or already has completed = {}", order, completed),
                )
                .await);
        }
        Ok(())
    }
}
