pub mod lifecycle;
pub mod passcode;
pub mod presence;
pub mod scheduler;

pub use lifecycle::LifecycleController;
pub use passcode::PasscodeRotator;
pub use presence::PresenceLedger;
pub use scheduler::{ClosureScheduler, RecoveryStats};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::Lecture;

/// Only the teacher who created a lecture may act on it as its owner.
pub(crate) fn ensure_owner(lecture: &Lecture, user: &AuthUser, action: &str) -> Result<(), AppError> {
    user.require_teacher(action)?;
    if lecture.teacher_id != user.id {
        return Err(AppError::Forbidden(format!(
            "You don't have permission to {} for this lecture",
            action
        )));
    }
    Ok(())
}
