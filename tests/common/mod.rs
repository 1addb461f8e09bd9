#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use attendance_backend::db::{self, repository};
use attendance_backend::error::AppError;
use attendance_backend::models::{Lecture, LectureStatus, Role, User};
use attendance_backend::notify::{LectureEvent, Notifier, PushGateway, PushMessage, PushTarget};

pub const TEACHER_ID: &str = "teacher-1";
pub const OTHER_TEACHER_ID: &str = "teacher-2";
pub const STUDENT_ID: &str = "student-1";
pub const ANCHOR_LAT: f64 = 12.0;
pub const ANCHOR_LNG: f64 = 77.0;

/// Captures every published event instead of broadcasting it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(String, LectureEvent)>>,
}

impl RecordingNotifier {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|(_, e)| e.name()).collect()
    }

    pub fn channels(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, channel: &str, event: &LectureEvent) -> Result<(), AppError> {
        self.events.lock().unwrap().push((channel.to_string(), event.clone()));
        Ok(())
    }
}

/// Always fails, as an unreachable broadcast relay would.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn publish(&self, _channel: &str, _event: &LectureEvent) -> Result<(), AppError> {
        Err(AppError::Notification("relay unreachable".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<(PushTarget, PushMessage)>>,
}

impl RecordingPush {
    pub fn targets(&self) -> Vec<PushTarget> {
        self.sent.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl PushGateway for RecordingPush {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), AppError> {
        self.sent.lock().unwrap().push((target.clone(), message.clone()));
        Ok(())
    }
}

pub struct FailingPush;

#[async_trait]
impl PushGateway for FailingPush {
    async fn send(&self, _target: &PushTarget, _message: &PushMessage) -> Result<(), AppError> {
        Err(AppError::Notification("push gateway down".to_string()))
    }
}

pub async fn setup_test_db() -> SqlitePool {
    db::connect_in_memory().await.expect("Failed to create test db")
}

pub async fn seed_user(pool: &SqlitePool, id: &str, role: Role, device_token: Option<&str>) -> User {
    let user = User {
        id: id.to_string(),
        email: format!("{}@school.test", id),
        name: Some(format!("Name of {}", id)),
        role,
        device_token: device_token.map(str::to_string),
        class_name: None,
        created_at: Utc::now(),
    };
    repository::upsert_user(pool, &user).await.expect("Failed to seed user")
}

/// Active lecture anchored at (12.0, 77.0) with a 200 m radius, created at
/// `created_at`.
pub fn lecture_at(id: &str, created_at: DateTime<Utc>, duration_minutes: i64) -> Lecture {
    Lecture {
        id: id.to_string(),
        teacher_id: TEACHER_ID.to_string(),
        class_name: "CS101".to_string(),
        title: "Graph Theory".to_string(),
        latitude: ANCHOR_LAT,
        longitude: ANCHOR_LNG,
        geofence_radius: 200.0,
        duration_minutes,
        status: LectureStatus::Active,
        passcode: Some("4321".to_string()),
        passcode_updated_at: Some(created_at),
        created_at,
        started_at: Some(created_at),
        ended_at: None,
    }
}

pub async fn seed_lecture(pool: &SqlitePool, id: &str) -> Lecture {
    let lecture = lecture_at(id, Utc::now(), 60);
    repository::insert_lecture(pool, &lecture).await.expect("Failed to seed lecture");
    lecture
}

/// Active lecture whose deadline passed `minutes_ago` minutes ago.
pub async fn seed_overdue_lecture(pool: &SqlitePool, id: &str, minutes_ago: i64) -> Lecture {
    let lecture = lecture_at(id, Utc::now() - Duration::minutes(60 + minutes_ago), 60);
    repository::insert_lecture(pool, &lecture).await.expect("Failed to seed lecture");
    lecture
}

pub fn notifier() -> Arc<RecordingNotifier> {
    Arc::new(RecordingNotifier::default())
}

pub fn push() -> Arc<RecordingPush> {
    Arc::new(RecordingPush::default())
}
