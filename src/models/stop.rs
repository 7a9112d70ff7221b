use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    #[sqlx(rename = "stop_order")]
    pub order: i32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[sqlx(rename = "lat")]
    pub latitude: f64,
    #[sqlx(rename = "lng")]
    pub longitude: f64,
    /// Planned minutes at the stop.
    #[serde(default)]
    #[sqlx(rename = "stop_duration_minutes")]
    pub stop_duration: Option<i32>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Completion fields of a stop, captured before an optimistic change so it can be put back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSnapshot {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Stop {
    pub fn new(order: i32, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            order,
            name: name.into(),
            description: None,
            latitude,
            longitude,
            stop_duration: None,
            completed: false,
            completed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, minutes: i32) -> Self {
        self.stop_duration = Some(minutes);
        self
    }

    pub fn snapshot(&self) -> CompletionSnapshot {
        CompletionSnapshot {
            completed: self.completed,
            completed_at: self.completed_at,
        }
    }

    /// Stamps the stop as completed. Returns false, leaving the stop untouched,
    /// when it was already completed.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_at = Some(at);
        true
    }

    pub fn restore(&mut self, snapshot: CompletionSnapshot) {
        self.completed = snapshot.completed;
        self.completed_at = snapshot.completed_at;
    }

    pub fn is_consistent(&self) -> bool {
        self.completed == self.completed_at.is_some()
    }
}
