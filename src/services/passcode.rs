use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::auth::AuthUser;
use crate::db::repository;
use crate::error::AppError;
use crate::models::PasscodeView;
use crate::notify::{LectureEvent, Notifier, lecture_channel};
use crate::passcode::{generate_passcode, needs_refresh};
use crate::services::ensure_owner;

/// Issues the post-lecture confirmation code to the owning teacher.
pub struct PasscodeRotator {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl PasscodeRotator {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Withheld while the lecture is active. Once ended, the code rotates
    /// whenever the stored one is older than the refresh interval.
    pub async fn current_passcode(
        &self,
        lecture_id: &str,
        teacher: &AuthUser,
    ) -> Result<PasscodeView, AppError> {
        let lecture = repository::find_lecture(&self.db, lecture_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lecture".to_string()))?;
        ensure_owner(&lecture, teacher, "access the passcode")?;

        if lecture.is_active() {
            return Err(AppError::PasscodeNotAvailable);
        }

        let now = Utc::now();
        let current = lecture.passcode.clone().filter(|p| !p.is_empty());
        if let Some(passcode) = current.filter(|_| !needs_refresh(lecture.passcode_updated_at, now)) {
            debug!("passcode for lecture {} is still fresh", lecture_id);
            return Ok(PasscodeView {
                passcode,
                updated_at: lecture.passcode_updated_at.unwrap_or(now),
            });
        }

        let passcode = generate_passcode();
        repository::set_passcode(&self.db, lecture_id, &passcode, now).await?;
        info!("passcode rotated for lecture {}", lecture_id);

        let event = LectureEvent::PasscodeRefresh {
            lecture_id: lecture_id.to_string(),
            passcode: passcode.clone(),
            updated_at: now,
        };
        if let Err(e) = self.notifier.publish(&lecture_channel(lecture_id), &event).await {
            warn!("failed to publish passcodeRefresh for {}: {:?}", lecture_id, e);
        }

        Ok(PasscodeView { passcode, updated_at: now })
    }
}
