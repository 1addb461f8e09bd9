use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Lecture is not active")]
    LectureNotActive,

    #[error("Lecture has already been ended")]
    AlreadyEnded,

    #[error("You are too far from the class ({}m). Must be within {radius}m.", .distance.round())]
    OutsideGeofence { distance: f64, radius: f64 },

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Passcode is only available after lecture ends")]
    PasscodeNotAvailable,

    #[error("Invalid passcode")]
    InvalidPasscode,

    #[error("Student has not joined this lecture")]
    NotJoined,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Notification delivery failed: {0}")]
    Notification(String),
}

impl AppError {
    /// Stable machine-readable kind sent alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Internal",
            AppError::Unauthorized => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "NotFound",
            AppError::LectureNotActive => "LectureNotActive",
            AppError::AlreadyEnded => "AlreadyEnded",
            AppError::OutsideGeofence { .. } => "OutsideGeofence",
            AppError::InvalidCoordinate(_) => "InvalidCoordinate",
            AppError::PasscodeNotAvailable => "PasscodeNotAvailable",
            AppError::InvalidPasscode => "InvalidPasscode",
            AppError::NotJoined => "NotJoined",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Notification(_) => "Internal",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::OutsideGeofence { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyEnded => StatusCode::CONFLICT,
            AppError::LectureNotActive
            | AppError::InvalidCoordinate(_)
            | AppError::PasscodeNotAvailable
            | AppError::InvalidPasscode
            | AppError::NotJoined
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(e) => {
                error!("database error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Notification(e) => {
                error!("notification error: {}", e);
                StatusCode::BAD_GATEWAY
            }
        };

        let message = match &self {
            AppError::Database(_) => "Database error occurred".to_string(),
            other => other.to_string(),
        };

        let details = match &self {
            AppError::OutsideGeofence { distance, radius } => Some(serde_json::json!({
                "distance": distance.round(),
                "radius": radius,
            })),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}
