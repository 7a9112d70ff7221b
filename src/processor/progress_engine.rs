use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::marker::{project_markers, MarkerSpec};
use crate::models::tour::{ProgressCounts, Tour};
use crate::store::{StoreError, TourStore};

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("tour {tour_id} has no stop {order}")]
    StopNotFound { tour_id: Uuid, order: i32 },

    #[error("stop {order} of tour {tour_id} is already completed")]
    StopAlreadyCompleted { tour_id: Uuid, order: i32 },

    #[error("meeting point of tour {tour_id} must be confirmed before any stop")]
    MeetingPointNotConfirmed { tour_id: Uuid },

    #[error("stop {order} of tour {tour_id} is out of order, next pending stop is {expected}")]
    OutOfOrder {
        tour_id: Uuid,
        order: i32,
        expected: i32,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProgressError {
    /// True for local precondition violations, which never reach the store.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ProgressError::Store(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    AlreadyConfirmed,
}

/// Rules that are off in the field app but can be switched on per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub require_meeting_point_first: bool,
    pub enforce_stop_order: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEventKind {
    MeetingPointConfirmed,
    StopCompleted { order: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub tour_id: Uuid,
    pub kind: ProgressEventKind,
    pub counts: ProgressCounts,
    /// Map projection of the tour after the change.
    pub markers: Vec<MarkerSpec>,
    pub at: DateTime<Utc>,
}

pub fn compute_counts(tour: &Tour) -> ProgressCounts {
    tour.counts()
}

pub struct ProgressEngine {
    store: Arc<dyn TourStore>,
    policy: ConfirmationPolicy,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressEngine {
    pub fn new(store: Arc<dyn TourStore>, policy: ConfirmationPolicy, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            store,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub async fn load_tour(&self, tour_id: Uuid) -> Result<Option<Tour>, ProgressError> {
        Ok(self.store.load_tour(tour_id).await?)
    }

    /// Confirms the meeting point. A tour that is already confirmed is left untouched.
    pub async fn confirm_meeting_point(&self, tour: &mut Tour) -> Result<Confirmation, ProgressError> {
        if tour.meeting_point_confirmed {
            info!(tour_id = %tour.tour_id, "Meeting point already confirmed");
            return Ok(Confirmation::AlreadyConfirmed);
        }

        let prior = (tour.meeting_point_confirmed, tour.meeting_point_confirmed_at);
        let now = Utc::now();
        tour.meeting_point_confirmed = true;
        tour.meeting_point_confirmed_at = Some(now);

        if let Err(e) = self
            .store
            .save_meeting_point(tour.tour_id, true, Some(now))
            .await
        {
            tour.meeting_point_confirmed = prior.0;
            tour.meeting_point_confirmed_at = prior.1;

            if let StoreError::Conflict { .. } = e {
                if let Some(confirmed_at) = self.stored_meeting_point_confirmation(tour.tour_id).await {
                    tour.meeting_point_confirmed = true;
                    tour.meeting_point_confirmed_at = Some(confirmed_at);
                    info!(tour_id = %tour.tour_id, "Meeting point was already confirmed in store");
                    return Ok(Confirmation::AlreadyConfirmed);
                }
            }

            error!(tour_id = %tour.tour_id, "Failed to confirm meeting point, reverted: {}", e);
            return Err(e.into());
        }

        info!(tour_id = %tour.tour_id, "Meeting point confirmed");
        self.publish(tour, ProgressEventKind::MeetingPointConfirmed, now);
        Ok(Confirmation::Confirmed)
    }

    /// Marks stop `order` completed and persists only that stop.
    pub async fn confirm_stop(&self, tour: &mut Tour, order: i32) -> Result<ProgressCounts, ProgressError> {
        let tour_id = tour.tour_id;
        self.check_stop_preconditions(tour, order)?;

        let now = Utc::now();
        let prior = {
            let stop = tour
                .stop_mut(order)
                .ok_or(ProgressError::StopNotFound { tour_id, order })?;
            let prior = stop.snapshot();
            stop.mark_completed(now);
            prior
        };

        if let Err(e) = self
            .store
            .save_stop_completion(tour_id, order, true, Some(now))
            .await
        {
            if let Some(stop) = tour.stop_mut(order) {
                stop.restore(prior);
            }
            error!(%tour_id, order, "Failed to confirm stop, reverted: {}", e);
            return Err(e.into());
        }

        let counts = tour.counts();
        info!(
            %tour_id,
            order,
            completed = counts.completed_count,
            total = counts.total,
            "Stop confirmed"
        );
        if tour.is_finished() {
            info!(%tour_id, "All stops completed");
        }
        self.publish(tour, ProgressEventKind::StopCompleted { order }, now);
        Ok(counts)
    }

    /// Stored confirmation timestamp, if the store already has the meeting point confirmed.
    async fn stored_meeting_point_confirmation(&self, tour_id: Uuid) -> Option<DateTime<Utc>> {
        match self.store.load_tour(tour_id).await {
            Ok(Some(stored)) if stored.meeting_point_confirmed => stored.meeting_point_confirmed_at,
            Ok(_) => None,
            Err(e) => {
                warn!(%tour_id, "Could not reload tour after conflict: {}", e);
                None
            }
        }
    }

    fn check_stop_preconditions(&self, tour: &Tour, order: i32) -> Result<(), ProgressError> {
        let tour_id = tour.tour_id;
        let stop = tour
            .stop(order)
            .ok_or(ProgressError::StopNotFound { tour_id, order })?;

        if stop.completed {
            warn!(%tour_id, order, "Stop already completed");
            return Err(ProgressError::StopAlreadyCompleted { tour_id, order });
        }

        if self.policy.require_meeting_point_first && !tour.meeting_point_confirmed {
            return Err(ProgressError::MeetingPointNotConfirmed { tour_id });
        }

        if self.policy.enforce_stop_order {
            if let Some(next) = tour.next_pending_stop() {
                if next.order != order {
                    return Err(ProgressError::OutOfOrder {
                        tour_id,
                        order,
                        expected: next.order,
                    });
                }
            }
        }

        Ok(())
    }

    fn publish(&self, tour: &Tour, kind: ProgressEventKind, at: DateTime<Utc>) {
        // No receivers is fine.
        let _ = self.events.send(ProgressEvent {
            tour_id: tour.tour_id,
            kind,
            counts: compute_counts(tour),
            markers: project_markers(tour),
            at,
        });
    }
}
