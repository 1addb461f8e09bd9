use axum::Json;
use axum::extract::Path;
use axum::http::HeaderMap;
use axum::routing::{post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde_json::{Value, json};
use tracing::error;

use crate::auth::{AuthUser, client_ip};
use crate::db::repository;
use crate::error::AppError;
use crate::geo::Coordinate;
use crate::models::*;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/lectures", get(all_lectures).post(create_lecture))
        .route("/lectures/active", get(active_lectures))
        .route(
            "/lectures/{id}",
            get(lecture_details).put(update_lecture).delete(delete_lecture),
        )
        .route("/lectures/{id}/end", put(end_lecture))
        .route("/lectures/{id}/passcode", get(current_passcode))
        .route("/lectures/{id}/attendance", get(lecture_attendance))
        .route("/lectures/{id}/attendance/manual", post(manual_attendance))
        .route("/attendance/join", post(join_lecture))
        .route("/attendance/ping", post(ping))
        .route("/attendance/geofence", post(geofence_event))
        .route("/attendance/submit", post(submit_attendance))
        .route("/users/me/device-token", put(update_device_token))
        .route("/users/me/class", put(update_student_class))
        .route("/students/me/lectures", get(student_lectures))
        .route("/classes", get(all_classes))
        .route("/classes/mine", get(teacher_classes))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("select 1").execute(&state.db).await {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            error!("health check failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn create_lecture(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NewLectureRequest>,
) -> Result<(StatusCode, Json<Lecture>), AppError> {
    let lecture = state.lifecycle().create_lecture(&user, req).await?;
    state.scheduler.schedule(&lecture);
    Ok((StatusCode::CREATED, Json(lecture)))
}

async fn active_lectures(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Lecture>>, AppError> {
    let lectures = state.lifecycle().active_lectures(&user).await?;
    Ok(Json(lectures))
}

async fn all_lectures(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Lecture>>, AppError> {
    let lectures = state.lifecycle().all_lectures(&user).await?;
    Ok(Json(lectures))
}

async fn lecture_details(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Lecture>, AppError> {
    let lecture = state.lifecycle().lecture_details(&id).await?;
    Ok(Json(lecture))
}

async fn update_lecture(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateLectureRequest>,
) -> Result<Json<Lecture>, AppError> {
    let duration_changed = req.duration.is_some();
    let lecture = state.lifecycle().update_lecture(&id, &user, req).await?;
    if duration_changed {
        state.scheduler.schedule(&lecture);
    }
    Ok(Json(lecture))
}

async fn delete_lecture(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.lifecycle().delete_lecture(&id, &user).await?;
    state.scheduler.cancel(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn end_lecture(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Lecture>, AppError> {
    let lecture = state.lifecycle().end_lecture(&id, &user).await?;
    state.scheduler.cancel(&id);
    Ok(Json(lecture))
}

async fn current_passcode(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PasscodeView>, AppError> {
    let view = state.passcodes().current_passcode(&id, &user).await?;
    Ok(Json(view))
}

async fn lecture_attendance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<AttendanceRosterEntry>>, AppError> {
    let roster = state.lifecycle().attendance_roster(&id, &user).await?;
    Ok(Json(roster))
}

async fn manual_attendance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ManualAttendanceRequest>,
) -> Result<Json<AttendanceRecord>, AppError> {
    let record = state
        .presence()
        .manual_mark_by_lookup(&id, req.student_id.as_deref(), req.student_email.as_deref(), &user)
        .await?;
    Ok(Json(record))
}

async fn join_lecture(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(req): Json<JoinRequest>,
) -> Result<(StatusCode, Json<JoinOutcome>), AppError> {
    let position = Coordinate::from_parts(req.latitude.as_ref(), req.longitude.as_ref())?;
    let context = AttemptContext {
        ip_address: client_ip(&headers),
        device_info: req.device_info,
    };

    let outcome = state
        .presence()
        .join(&req.lecture_id, &user.id, position, req.accuracy, &context)
        .await?;
    let status = if outcome.already_joined {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

async fn ping(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PingRequest>,
) -> Result<Json<PingResult>, AppError> {
    let position = Coordinate::from_parts(req.latitude.as_ref(), req.longitude.as_ref())?;
    let result = state
        .presence()
        .ping(&req.lecture_id, &user.id, position, req.accuracy)
        .await?;
    Ok(Json(result))
}

async fn geofence_event(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<GeofenceEventRequest>,
) -> Result<(StatusCode, Json<GeofenceLog>), AppError> {
    let log = state
        .presence()
        .record_geofence_event(&req.lecture_id, &user.id, req.event_type)
        .await?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn submit_attendance(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<AttendanceRecord>, AppError> {
    let record = state
        .presence()
        .submit(&req.lecture_id, &user.id, &req.passcode)
        .await?;
    Ok(Json(record))
}

async fn update_device_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<DeviceTokenRequest>,
) -> Result<Json<Value>, AppError> {
    let token = req.device_token.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("Device token is required".to_string()));
    }
    if !repository::set_device_token(&state.db, &user.id, token).await? {
        return Err(AppError::NotFound("User".to_string()));
    }
    Ok(Json(json!({ "message": "Device token updated successfully" })))
}

async fn update_student_class(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<StudentClassRequest>,
) -> Result<Json<User>, AppError> {
    let updated = state.lifecycle().set_student_class(&user, req).await?;
    Ok(Json(updated))
}

async fn student_lectures(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Lecture>>, AppError> {
    let lectures = state.lifecycle().student_lectures(&user).await?;
    Ok(Json(lectures))
}

async fn teacher_classes(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Class>>, AppError> {
    let classes = state.lifecycle().teacher_classes(&user).await?;
    Ok(Json(classes))
}

async fn all_classes(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<Class>>, AppError> {
    let classes = state.lifecycle().all_classes().await?;
    Ok(Json(classes))
}
