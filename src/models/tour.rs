use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::stop::Stop;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TourError {
    #[error("stop orders must run 1..n without gaps: expected {expected}, found {found}")]
    OrderSequence { expected: i32, found: i32 },

    #[error("stop {order} has an empty name")]
    EmptyStopName { order: i32 },

    #[error("stop {order} has coordinates out of range ({latitude}, {longitude})")]
    InvalidCoordinates {
        order: i32,
        latitude: f64,
        longitude: f64,
    },

    #[error("meeting point coordinates out of range ({latitude}, {longitude})")]
    InvalidMeetingPointCoordinates { latitude: f64, longitude: f64 },

    #[error("stop {order} completion flag and timestamp disagree")]
    InconsistentStop { order: i32 },

    #[error("meeting point confirmation flag and timestamp disagree")]
    InconsistentMeetingPoint,
}

/// Total and completed stop counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCounts {
    pub total: usize,
    pub completed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TourDocument")]
pub struct Tour {
    pub tour_id: Uuid,
    pub meeting_point: String,
    pub meeting_point_latitude: Option<f64>,
    pub meeting_point_longitude: Option<f64>,
    pub meeting_point_confirmed: bool,
    pub meeting_point_confirmed_at: Option<DateTime<Utc>>,
    pub stops: Vec<Stop>,
}

/// Wire shape of a tour. Converting it into a [`Tour`] sorts and validates the stops.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TourDocument {
    tour_id: Uuid,
    meeting_point: String,
    #[serde(default)]
    meeting_point_latitude: Option<f64>,
    #[serde(default)]
    meeting_point_longitude: Option<f64>,
    #[serde(default)]
    meeting_point_confirmed: bool,
    #[serde(default)]
    meeting_point_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    stops: Vec<Stop>,
}

impl TryFrom<TourDocument> for Tour {
    type Error = TourError;

    fn try_from(doc: TourDocument) -> Result<Self, Self::Error> {
        let mut tour = Self {
            tour_id: doc.tour_id,
            meeting_point: doc.meeting_point,
            meeting_point_latitude: doc.meeting_point_latitude,
            meeting_point_longitude: doc.meeting_point_longitude,
            meeting_point_confirmed: doc.meeting_point_confirmed,
            meeting_point_confirmed_at: doc.meeting_point_confirmed_at,
            stops: doc.stops,
        };
        tour.normalize()?;
        Ok(tour)
    }
}

impl Tour {
    /// Builds an unconfirmed tour. Stops are sorted by order before validation.
    pub fn new(
        tour_id: Uuid,
        meeting_point: impl Into<String>,
        meeting_point_coords: Option<(f64, f64)>,
        stops: Vec<Stop>,
    ) -> Result<Self, TourError> {
        let (meeting_point_latitude, meeting_point_longitude) = match meeting_point_coords {
            Some((lat, lng)) => (Some(lat), Some(lng)),
            None => (None, None),
        };
        let mut tour = Self {
            tour_id,
            meeting_point: meeting_point.into(),
            meeting_point_latitude,
            meeting_point_longitude,
            meeting_point_confirmed: false,
            meeting_point_confirmed_at: None,
            stops,
        };
        tour.normalize()?;
        Ok(tour)
    }

    /// Sorts stops by order and checks every aggregate invariant.
    pub fn normalize(&mut self) -> Result<(), TourError> {
        self.stops.sort_by_key(|s| s.order);
        self.validate()
    }

    pub fn validate(&self) -> Result<(), TourError> {
        if self.meeting_point_confirmed != self.meeting_point_confirmed_at.is_some() {
            return Err(TourError::InconsistentMeetingPoint);
        }
        if let (Some(latitude), Some(longitude)) =
            (self.meeting_point_latitude, self.meeting_point_longitude)
        {
            if !coordinates_in_range(latitude, longitude) {
                return Err(TourError::InvalidMeetingPointCoordinates {
                    latitude,
                    longitude,
                });
            }
        }

        for (idx, stop) in self.stops.iter().enumerate() {
            let expected = idx as i32 + 1;
            if stop.order != expected {
                return Err(TourError::OrderSequence {
                    expected,
                    found: stop.order,
                });
            }
            if stop.name.trim().is_empty() {
                return Err(TourError::EmptyStopName { order: stop.order });
            }
            if !coordinates_in_range(stop.latitude, stop.longitude) {
                return Err(TourError::InvalidCoordinates {
                    order: stop.order,
                    latitude: stop.latitude,
                    longitude: stop.longitude,
                });
            }
            if !stop.is_consistent() {
                return Err(TourError::InconsistentStop { order: stop.order });
            }
        }
        Ok(())
    }

    pub fn stop(&self, order: i32) -> Option<&Stop> {
        self.stops.iter().find(|s| s.order == order)
    }

    pub fn stop_mut(&mut self, order: i32) -> Option<&mut Stop> {
        self.stops.iter_mut().find(|s| s.order == order)
    }

    /// Lowest-order stop still pending.
    pub fn next_pending_stop(&self) -> Option<&Stop> {
        self.stops.iter().find(|s| !s.completed)
    }

    pub fn counts(&self) -> ProgressCounts {
        ProgressCounts {
            total: self.stops.len(),
            completed_count: self.stops.iter().filter(|s| s.completed).count(),
        }
    }

    /// A tour with no stops is never finished.
    pub fn is_finished(&self) -> bool {
        !self.stops.is_empty() && self.stops.iter().all(|s| s.completed)
    }
}

fn coordinates_in_range(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}
