use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::db::repository;
use crate::error::AppError;
use crate::geo::{self, Coordinate};
use crate::models::{
    AttemptContext, AttendanceRecord, GeofenceEventType, GeofenceLog, JoinOutcome, Lecture,
    LocationSnapshot, PingResult, Role,
};
use crate::notify::{LectureEvent, Notifier, lecture_channel};
use crate::services::ensure_owner;

/// Owns the per-student attendance records of a lecture.
pub struct PresenceLedger {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl PresenceLedger {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    async fn lecture(&self, lecture_id: &str) -> Result<Lecture, AppError> {
        repository::find_lecture(&self.db, lecture_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lecture".to_string()))
    }

    /// Joins a student to an active lecture when they stand inside its geofence.
    /// Every attempt, accepted or not, lands in the attempt audit trail.
    pub async fn join(
        &self,
        lecture_id: &str,
        student_id: &str,
        position: Coordinate,
        accuracy: Option<f64>,
        context: &AttemptContext,
    ) -> Result<JoinOutcome, AppError> {
        let lecture = self.lecture(lecture_id).await?;
        if !lecture.is_active() {
            return Err(AppError::LectureNotActive);
        }

        let now = Utc::now();
        let distance = geo::distance(&position, &lecture.anchor());
        info!(
            "distance check: student {} at ({}, {}) vs anchor ({}, {}) = {}m",
            student_id,
            position.latitude,
            position.longitude,
            lecture.latitude,
            lecture.longitude,
            distance.round()
        );

        if distance > lecture.geofence_radius {
            repository::insert_attempt(&self.db, lecture_id, student_id, Some(distance), false, context, now)
                .await?;
            return Err(AppError::OutsideGeofence {
                distance,
                radius: lecture.geofence_radius,
            });
        }

        repository::insert_attempt(&self.db, lecture_id, student_id, Some(distance), true, context, now)
            .await?;

        let snapshot = LocationSnapshot {
            lat: position.latitude,
            lng: position.longitude,
            accuracy,
        };
        let (record, created) =
            repository::insert_join_record(&self.db, lecture_id, student_id, now, &snapshot).await?;

        if !created {
            info!("student {} already joined lecture {}", student_id, lecture_id);
            return Ok(JoinOutcome { already_joined: true, record });
        }

        info!(
            "student {} joined lecture {}, initial checkScore: {}",
            student_id, lecture_id, record.check_score
        );

        let student_name = repository::find_user(&self.db, student_id)
            .await?
            .and_then(|u| u.name)
            .unwrap_or_else(|| "Unknown".to_string());
        let event = LectureEvent::StudentJoined {
            lecture_id: lecture_id.to_string(),
            student_id: student_id.to_string(),
            student_name,
            join_time: record.join_time.unwrap_or(now),
        };
        self.publish(lecture_id, &event).await;

        Ok(JoinOutcome { already_joined: false, record })
    }

    /// Logs a location sample and credits the student's score when it is
    /// inside the geofence. Pings never create a record, and once the lecture
    /// has ended they are logged only.
    pub async fn ping(
        &self,
        lecture_id: &str,
        student_id: &str,
        position: Coordinate,
        accuracy: Option<f64>,
    ) -> Result<PingResult, AppError> {
        let lecture = self.lecture(lecture_id).await?;

        let is_valid = geo::is_within_radius(&position, &lecture.anchor(), lecture.geofence_radius);
        let now = Utc::now();

        repository::insert_ping(
            &self.db,
            lecture_id,
            student_id,
            position.latitude,
            position.longitude,
            is_valid,
            now,
        )
        .await?;

        let snapshot = LocationSnapshot {
            lat: position.latitude,
            lng: position.longitude,
            accuracy,
        };
        match repository::apply_ping(&self.db, lecture_id, student_id, is_valid, &snapshot).await? {
            Some(score) => info!(
                "ping from student {} in lecture {}: valid={}, checkScore={}",
                student_id, lecture_id, is_valid, score
            ),
            None if !lecture.is_active() => info!(
                "ping from student {} after lecture {} ended; logged only",
                student_id, lecture_id
            ),
            None => warn!(
                "ping from student {} in lecture {} before joining; logged only",
                student_id, lecture_id
            ),
        }

        Ok(PingResult { is_valid })
    }

    pub async fn record_geofence_event(
        &self,
        lecture_id: &str,
        student_id: &str,
        event_type: GeofenceEventType,
    ) -> Result<GeofenceLog, AppError> {
        let lecture = self.lecture(lecture_id).await?;
        if !lecture.is_active() {
            return Err(AppError::LectureNotActive);
        }

        let log = repository::insert_geofence_log(&self.db, lecture_id, student_id, event_type, Utc::now())
            .await?;
        info!("geofence {:?} for student {} in lecture {}", event_type, student_id, lecture_id);
        Ok(log)
    }

    /// Teacher override. Skips the geofence entirely.
    pub async fn manual_mark(
        &self,
        lecture_id: &str,
        student_id: &str,
        teacher: &AuthUser,
    ) -> Result<AttendanceRecord, AppError> {
        let lecture = self.lecture(lecture_id).await?;
        ensure_owner(&lecture, teacher, "manually add attendance")?;
        let student = self.student_by_id(student_id).await?;
        self.apply_manual(&lecture, &student, teacher).await
    }

    /// Resolves a student by id or email through the directory, then marks
    /// them present as [`Self::manual_mark`] does.
    pub async fn manual_mark_by_lookup(
        &self,
        lecture_id: &str,
        student_id: Option<&str>,
        student_email: Option<&str>,
        teacher: &AuthUser,
    ) -> Result<AttendanceRecord, AppError> {
        let lecture = self.lecture(lecture_id).await?;
        ensure_owner(&lecture, teacher, "manually add attendance")?;

        let student_id = match (student_id, student_email) {
            (Some(id), _) if !id.trim().is_empty() => self.student_by_id(id).await?,
            (_, Some(email)) if !email.trim().is_empty() => {
                repository::find_user_by_email(&self.db, email)
                    .await?
                    .filter(|u| u.role == Role::Student)
                    .map(|u| u.id)
                    .ok_or_else(|| AppError::NotFound("Student with this email".to_string()))?
            }
            _ => {
                return Err(AppError::BadRequest(
                    "studentId or studentEmail is required".to_string(),
                ));
            }
        };

        self.apply_manual(&lecture, &student_id, teacher).await
    }

    /// Directory id of an existing student account.
    async fn student_by_id(&self, student_id: &str) -> Result<String, AppError> {
        repository::find_user(&self.db, student_id.trim())
            .await?
            .filter(|u| u.role == Role::Student)
            .map(|u| u.id)
            .ok_or_else(|| AppError::NotFound("Student".to_string()))
    }

    async fn apply_manual(
        &self,
        lecture: &Lecture,
        student_id: &str,
        teacher: &AuthUser,
    ) -> Result<AttendanceRecord, AppError> {
        let record = repository::upsert_manual_attendance(&self.db, &lecture.id, student_id, Utc::now()).await?;
        info!("manual attendance for student {} in lecture {} by {}", student_id, lecture.id, teacher.id);
        Ok(record)
    }

    /// Final passcode confirmation, accepted only once the lecture has ended.
    pub async fn submit(
        &self,
        lecture_id: &str,
        student_id: &str,
        passcode: &str,
    ) -> Result<AttendanceRecord, AppError> {
        let lecture = self.lecture(lecture_id).await?;

        if repository::find_attendance(&self.db, lecture_id, student_id).await?.is_none() {
            return Err(AppError::NotJoined);
        }
        if lecture.is_active() {
            return Err(AppError::PasscodeNotAvailable);
        }
        match lecture.passcode.as_deref() {
            Some(code) if code == passcode.trim() => {}
            _ => return Err(AppError::InvalidPasscode),
        }

        let record = repository::mark_submitted(&self.db, lecture_id, student_id, Utc::now())
            .await?
            .ok_or(AppError::NotJoined)?;
        info!("student {} confirmed attendance for lecture {}", student_id, lecture_id);
        Ok(record)
    }

    async fn publish(&self, lecture_id: &str, event: &LectureEvent) {
        if let Err(e) = self.notifier.publish(&lecture_channel(lecture_id), event).await {
            warn!("failed to publish {} for lecture {}: {:?}", event.name(), lecture_id, e);
        }
    }
}
