use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::geo::{Coordinate, CoordinateValue};

pub const DEFAULT_GEOFENCE_RADIUS_M: f64 = 200.0;
pub const DEFAULT_DURATION_MINUTES: i64 = 60;
/// Longest session a teacher may open: one day.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// Accepted lecture length in minutes.
pub fn is_valid_duration(minutes: i64) -> bool {
    (1..=MAX_DURATION_MINUTES).contains(&minutes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LectureStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lecture {
    pub id: String,
    pub teacher_id: String,
    pub class_name: String,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub geofence_radius: f64,
    pub duration_minutes: i64,
    pub status: LectureStatus,
    #[serde(skip_serializing)]
    pub passcode: Option<String>,
    #[serde(skip_serializing)]
    pub passcode_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Lecture {
    pub fn is_active(&self) -> bool {
        self.status == LectureStatus::Active
    }

    pub fn anchor(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Persisted closure deadline: `created_at + duration`. Saturates at the
    /// latest representable instant for out-of-range rows.
    pub fn deadline(&self) -> DateTime<Utc> {
        Duration::try_minutes(self.duration_minutes)
            .and_then(|d| self.created_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now >= self.deadline()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLectureRequest {
    pub class_name: String,
    #[serde(alias = "lectureName")]
    pub title: String,
    pub latitude: Option<CoordinateValue>,
    pub longitude: Option<CoordinateValue>,
    pub duration: Option<i64>,
    pub geofence_radius: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLectureRequest {
    pub title: Option<String>,
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasscodeView {
    pub passcode: String,
    pub updated_at: DateTime<Utc>,
}
