use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::models::Role;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Caller identity as resolved by the upstream identity service, which
/// authenticates the request and forwards the result in trusted headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

impl AuthUser {
    pub fn teacher(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Teacher }
    }

    pub fn student(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Student }
    }

    pub fn require_teacher(&self, action: &str) -> Result<(), AppError> {
        if self.role != Role::Teacher {
            return Err(AppError::Forbidden(format!("Only teachers can {}", action)));
        }
        Ok(())
    }

    pub fn require_student(&self, action: &str) -> Result<(), AppError> {
        if self.role != Role::Student {
            return Err(AppError::Forbidden(format!("Only students can {}", action)));
        }
        Ok(())
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let id = header(USER_ID_HEADER).ok_or(AppError::Unauthorized)?;
        let role = match header(USER_ROLE_HEADER).as_deref() {
            Some("teacher") => Role::Teacher,
            Some("student") => Role::Student,
            _ => return Err(AppError::Unauthorized),
        };

        Ok(AuthUser { id, role })
    }
}

/// Best-effort client address for the attempt audit trail.
pub fn client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
