use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::geo::CoordinateValue;

/// Cap for scores accumulated through automatic pings.
pub const MAX_CHECK_SCORE: i64 = 7;
/// Sentinel score given to records created by a teacher override.
pub const MANUAL_FULL_SCORE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AttendanceMethod {
    Manual,
    Auto,
    Oauth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum GeofenceEventType {
    Exit,
    Enter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub lecture_id: String,
    pub student_id: String,
    pub join_time: Option<DateTime<Utc>>,
    pub submit_time: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub check_score: i64,
    pub method: AttendanceMethod,
    pub location_snapshot: Option<Json<LocationSnapshot>>,
    pub extra: Option<Json<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendancePing {
    pub id: String,
    pub lecture_id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceLog {
    pub id: String,
    pub lecture_id: String,
    pub student_id: String,
    pub event_type: GeofenceEventType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceAttempt {
    pub id: String,
    pub lecture_id: String,
    pub student_id: String,
    pub attempt_time: DateTime<Utc>,
    pub distance_meters: Option<f64>,
    pub success: bool,
    pub ip_address: Option<String>,
    pub device_info: Option<Json<serde_json::Value>>,
}

/// Roster row: an attendance record joined with the student's directory entry.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRosterEntry {
    pub id: String,
    pub student_id: String,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub join_time: Option<DateTime<Utc>>,
    pub submit_time: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub check_score: i64,
    pub method: AttendanceMethod,
    pub location_snapshot: Option<Json<LocationSnapshot>>,
}

/// Client context captured for the attempt audit trail.
#[derive(Debug, Clone, Default)]
pub struct AttemptContext {
    pub ip_address: Option<String>,
    pub device_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub lecture_id: String,
    pub latitude: Option<CoordinateValue>,
    pub longitude: Option<CoordinateValue>,
    pub accuracy: Option<f64>,
    pub device_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    pub lecture_id: String,
    pub latitude: Option<CoordinateValue>,
    pub longitude: Option<CoordinateValue>,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub is_valid: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceEventRequest {
    pub lecture_id: String,
    pub event_type: GeofenceEventType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub lecture_id: String,
    pub passcode: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAttendanceRequest {
    pub student_id: Option<String>,
    pub student_email: Option<String>,
}

/// Outcome of a join: either a fresh record or the one already on file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    pub already_joined: bool,
    pub record: AttendanceRecord,
}
