use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::repository;
use crate::error::AppError;
use crate::geo::Coordinate;
use crate::models::{
    AttendanceRosterEntry, Class, Lecture, LectureStatus, NewLectureRequest, Role,
    StudentClassRequest, UpdateLectureRequest, User,
    DEFAULT_DURATION_MINUTES, DEFAULT_GEOFENCE_RADIUS_M, MAX_DURATION_MINUTES, is_valid_duration,
};
use crate::notify::{LectureEvent, Notifier, PushGateway, PushMessage, PushTarget, lecture_channel};
use crate::passcode::generate_passcode;
use crate::services::ensure_owner;

/// Owns lecture state and the one-way `active -> ended` transition.
#[derive(Clone)]
pub struct LifecycleController {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
    push: Arc<dyn PushGateway>,
}

impl LifecycleController {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>, push: Arc<dyn PushGateway>) -> Self {
        Self { db, notifier, push }
    }

    async fn lecture(&self, lecture_id: &str) -> Result<Lecture, AppError> {
        repository::find_lecture(&self.db, lecture_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lecture".to_string()))
    }

    pub async fn create_lecture(
        &self,
        teacher: &AuthUser,
        req: NewLectureRequest,
    ) -> Result<Lecture, AppError> {
        teacher.require_teacher("create lectures")?;

        let class_name = req.class_name.trim();
        let title = req.title.trim();
        if class_name.is_empty() || title.is_empty() {
            return Err(AppError::BadRequest(
                "Class name and lecture name cannot be empty".to_string(),
            ));
        }

        let anchor = Coordinate::from_parts(req.latitude.as_ref(), req.longitude.as_ref())?;
        let duration_minutes = req.duration.unwrap_or(DEFAULT_DURATION_MINUTES);
        if !is_valid_duration(duration_minutes) {
            return Err(duration_out_of_range());
        }
        let geofence_radius = req.geofence_radius.unwrap_or(DEFAULT_GEOFENCE_RADIUS_M);
        if !geofence_radius.is_finite() || geofence_radius <= 0.0 {
            return Err(AppError::BadRequest("Geofence radius must be positive".to_string()));
        }

        let class = repository::ensure_class(&self.db, class_name, Some(&teacher.id)).await?;

        let now = Utc::now();
        let lecture = Lecture {
            id: Uuid::new_v4().to_string(),
            teacher_id: teacher.id.clone(),
            class_name: class.name,
            title: title.to_string(),
            latitude: anchor.latitude,
            longitude: anchor.longitude,
            geofence_radius,
            duration_minutes,
            status: LectureStatus::Active,
            passcode: Some(generate_passcode()),
            passcode_updated_at: Some(now),
            created_at: now,
            started_at: Some(now),
            ended_at: None,
        };
        repository::insert_lecture(&self.db, &lecture).await?;
        info!("lecture created: {} by teacher: {}", lecture.id, teacher.id);

        let message = PushMessage {
            title: format!("Attend {} Lecture Now !!", lecture.title),
            body: format!("Duration {}", lecture.duration_minutes),
            data: Some(serde_json::json!({ "lectureId": lecture.id })),
        };
        if let Err(e) = self.push.send(&PushTarget::Topic(lecture.class_name.clone()), &message).await {
            warn!("failed to push lecture start to class {}: {:?}", lecture.class_name, e);
        }

        Ok(lecture)
    }

    /// Title and duration are the only fields a teacher may change, and only
    /// while the lecture is active.
    pub async fn update_lecture(
        &self,
        lecture_id: &str,
        teacher: &AuthUser,
        req: UpdateLectureRequest,
    ) -> Result<Lecture, AppError> {
        let lecture = self.lecture(lecture_id).await?;
        ensure_owner(&lecture, teacher, "update lectures")?;
        if !lecture.is_active() {
            return Err(AppError::LectureNotActive);
        }

        if req.duration.is_some_and(|d| d > MAX_DURATION_MINUTES) {
            return Err(duration_out_of_range());
        }
        let title = req.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let duration = req.duration.filter(|d| is_valid_duration(*d));
        if title.is_none() && duration.is_none() {
            return Err(AppError::BadRequest(
                "No valid fields to update. Only title and duration can be updated.".to_string(),
            ));
        }

        let updated = repository::update_active_lecture(&self.db, lecture_id, title, duration)
            .await?
            .ok_or(AppError::LectureNotActive)?;
        info!("lecture updated: {} by teacher: {}", lecture_id, teacher.id);
        Ok(updated)
    }

    /// Explicit "end now" by the owning teacher.
    pub async fn end_lecture(&self, lecture_id: &str, teacher: &AuthUser) -> Result<Lecture, AppError> {
        let lecture = self.lecture(lecture_id).await?;
        ensure_owner(&lecture, teacher, "end lectures")?;
        if !lecture.is_active() {
            return Err(AppError::AlreadyEnded);
        }

        let ended = self.close(lecture_id).await?;
        info!("lecture ended: {} by teacher: {}", lecture_id, teacher.id);
        Ok(ended)
    }

    /// Scheduled closure. A no-op unless the lecture is still active and its
    /// persisted deadline has passed. Returns whether this call closed it.
    pub async fn close_if_due(&self, lecture_id: &str) -> Result<bool, AppError> {
        let Some(lecture) = repository::find_lecture(&self.db, lecture_id).await? else {
            debug!("closure skipped, lecture {} no longer exists", lecture_id);
            return Ok(false);
        };
        if !lecture.is_overdue(Utc::now()) {
            debug!("closure skipped, lecture {} is ended or not yet due", lecture_id);
            return Ok(false);
        }

        match self.close(lecture_id).await {
            Ok(_) => {
                info!("lecture auto-closed: {} (deadline {})", lecture_id, lecture.deadline());
                Ok(true)
            }
            Err(AppError::AlreadyEnded) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Ends the lecture, finalizes attendance and tells observers. Delivery
    /// failures are logged and never undo the transition.
    async fn close(&self, lecture_id: &str) -> Result<Lecture, AppError> {
        let now = Utc::now();
        let finalized = repository::close_lecture(&self.db, lecture_id, now)
            .await?
            .ok_or(AppError::AlreadyEnded)?;
        info!("lecture {} closed, {} incomplete records marked absent", lecture_id, finalized);

        let lecture = self.lecture(lecture_id).await?;
        let ended_at = lecture.ended_at.unwrap_or(now);

        let event = LectureEvent::LectureEnded {
            lecture_id: lecture_id.to_string(),
            status: "ended".to_string(),
            ended_at,
        };
        if let Err(e) = self.notifier.publish(&lecture_channel(lecture_id), &event).await {
            warn!("failed to publish lectureEnded for {}: {:?}", lecture_id, e);
        }

        self.push_teacher(&lecture, finalized).await;
        Ok(lecture)
    }

    async fn push_teacher(&self, lecture: &Lecture, absent: u64) {
        let teacher = match repository::find_user(&self.db, &lecture.teacher_id).await {
            Ok(teacher) => teacher,
            Err(e) => {
                warn!("could not load teacher {} for push: {}", lecture.teacher_id, e);
                return;
            }
        };
        let Some(token) = teacher.and_then(|t| t.device_token) else {
            debug!("teacher {} has no device token, skipping push", lecture.teacher_id);
            return;
        };

        let message = PushMessage {
            title: format!("{} has ended", lecture.title),
            body: format!("{} students without confirmation were marked absent", absent),
            data: Some(serde_json::json!({
                "lectureId": lecture.id,
                "status": "ended",
            })),
        };
        if let Err(e) = self.push.send(&PushTarget::Token(token), &message).await {
            warn!("failed to push closure of {} to teacher: {:?}", lecture.id, e);
        }
    }

    pub async fn delete_lecture(&self, lecture_id: &str, teacher: &AuthUser) -> Result<(), AppError> {
        let lecture = self.lecture(lecture_id).await?;
        ensure_owner(&lecture, teacher, "delete lectures")?;
        if lecture.is_active() {
            return Err(AppError::BadRequest(
                "Only ended lectures can be deleted. Please end the lecture first.".to_string(),
            ));
        }

        if !repository::delete_ended_lecture(&self.db, lecture_id).await? {
            return Err(AppError::NotFound("Lecture".to_string()));
        }
        info!("lecture and all related records deleted: {} by teacher: {}", lecture_id, teacher.id);
        Ok(())
    }

    pub async fn lecture_details(&self, lecture_id: &str) -> Result<Lecture, AppError> {
        self.lecture(lecture_id).await
    }

    pub async fn active_lectures(&self, teacher: &AuthUser) -> Result<Vec<Lecture>, AppError> {
        teacher.require_teacher("fetch their active lectures")?;
        let lectures = repository::fetch_active_lectures_for_teacher(&self.db, &teacher.id).await?;
        debug!("fetched {} active lectures for teacher: {}", lectures.len(), teacher.id);
        Ok(lectures)
    }

    pub async fn attendance_roster(
        &self,
        lecture_id: &str,
        teacher: &AuthUser,
    ) -> Result<Vec<AttendanceRosterEntry>, AppError> {
        let lecture = self.lecture(lecture_id).await?;
        ensure_owner(&lecture, teacher, "fetch attendance records")?;
        Ok(repository::fetch_roster(&self.db, lecture_id).await?)
    }

    /// Full history of the teacher's lectures, ended ones included, newest first.
    pub async fn all_lectures(&self, teacher: &AuthUser) -> Result<Vec<Lecture>, AppError> {
        teacher.require_teacher("fetch their lectures")?;
        Ok(repository::fetch_lectures_for_teacher(&self.db, &teacher.id).await?)
    }

    /// Active lectures of the class the student belongs to. A student without a
    /// class sees nothing.
    pub async fn student_lectures(&self, student: &AuthUser) -> Result<Vec<Lecture>, AppError> {
        student.require_student("fetch class lectures")?;
        let user = self.student(&student.id).await?;
        let Some(class_name) = user.class_name else {
            debug!("student {} has no class yet", student.id);
            return Ok(Vec::new());
        };
        Ok(repository::fetch_active_lectures_for_class(&self.db, &class_name).await?)
    }

    /// Moves a student into a class, creating the class without a teacher if
    /// nobody has used the name yet.
    pub async fn set_student_class(
        &self,
        student: &AuthUser,
        req: StudentClassRequest,
    ) -> Result<User, AppError> {
        student.require_student("update their class")?;
        let class_name = req.class_name.trim();
        if class_name.is_empty() {
            return Err(AppError::BadRequest("Class name cannot be empty".to_string()));
        }

        let user = self.student(&student.id).await?;
        let class = repository::ensure_class(&self.db, class_name, None).await?;
        repository::set_user_class(&self.db, &user.id, &class.name).await?;
        info!("student {} moved to class {}", user.id, class.name);

        self.student(&user.id).await
    }

    pub async fn teacher_classes(&self, teacher: &AuthUser) -> Result<Vec<Class>, AppError> {
        teacher.require_teacher("fetch their classes")?;
        Ok(repository::fetch_classes_for_teacher(&self.db, &teacher.id).await?)
    }

    pub async fn all_classes(&self) -> Result<Vec<Class>, AppError> {
        Ok(repository::fetch_classes(&self.db).await?)
    }

    async fn student(&self, student_id: &str) -> Result<User, AppError> {
        repository::find_user(&self.db, student_id)
            .await?
            .filter(|u| u.role == Role::Student)
            .ok_or_else(|| AppError::NotFound("Student".to_string()))
    }
}

fn duration_out_of_range() -> AppError {
    AppError::BadRequest(format!(
        "Duration must be between 1 and {} minutes",
        MAX_DURATION_MINUTES
    ))
}
