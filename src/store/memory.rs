use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::{StoreError, TourStore};
use crate::models::tour::Tour;

/// In-memory store with switchable write failures. Writes are guarded on the
/// current value the same way the SQL updates are.
#[derive(Default)]
pub struct MemoryTourStore {
    tours: Mutex<HashMap<Uuid, Tour>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryTourStore {
    pub fn with_tour(tour: Tour) -> Self {
        let store = Self::default();
        store.insert(tour);
        store
    }

    pub fn insert(&self, tour: Tour) {
        self.tours.lock().unwrap().insert(tour.tour_id, tour);
    }

    pub fn stored(&self, tour_id: Uuid) -> Option<Tour> {
        self.tours.lock().unwrap().get(&tour_id).cloned()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TourStore for MemoryTourStore {
    async fn load_tour(&self, tour_id: Uuid) -> Result<Option<Tour>, StoreError> {
        Ok(self.stored(tour_id))
    }

    async fn save_meeting_point(
        &self,
        tour_id: Uuid,
        confirmed: bool,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut tours = self.tours.lock().unwrap();
        let tour = tours
            .get_mut(&tour_id)
            .ok_or(StoreError::TourNotFound(tour_id))?;
        if tour.meeting_point_confirmed == confirmed {
            return Err(StoreError::Conflict {
                tour_id,
                detail: format!("meeting point already has confirmed = {}", confirmed),
            });
        }
        tour.meeting_point_confirmed = confirmed;
        tour.meeting_point_confirmed_at = confirmed_at;
        Ok(())
    }

    async fn save_stop_completion(
        &self,
        tour_id: Uuid,
        order: i32,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut tours = self.tours.lock().unwrap();
        let tour = tours
            .get_mut(&tour_id)
            .ok_or(StoreError::TourNotFound(tour_id))?;
        let stop = tour
            .stop_mut(order)
            .filter(|stop| stop.completed != completed)
            .ok_or_else(|| StoreError::Conflict {
                tour_id,
                detail: format!("stop {} missing or already has completed = {}", order, completed),
            })?;
        stop.completed = completed;
        stop.completed_at = completed_at;
        Ok(())
    }
}
