use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::tour::{Tour, TourError};

#[cfg(test)]
pub mod memory;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Tour {0} not found")]
    TourNotFound(Uuid),

    #[error("Write conflict on tour {tour_id}: {detail}")]
    Conflict { tour_id: Uuid, detail: String },

    #[error("Stored tour is invalid: {0}")]
    InvalidTour(#[from] TourError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Backing store for tour progress. Writes are field-level: one meeting point or one stop at a time.
#[async_trait]
pub trait TourStore: Send + Sync {
    async fn load_tour(&self, tour_id: Uuid) -> Result<Option<Tour>, StoreError>;

    async fn save_meeting_point(
        &self,
        tour_id: Uuid,
        confirmed: bool,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn save_stop_completion(
        &self,
        tour_id: Uuid,
        order: i32,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}
