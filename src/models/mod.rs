pub mod attendance;
pub mod lecture;
pub mod user;

pub use attendance::{
    AttemptContext, AttendanceAttempt, AttendanceMethod, AttendancePing, AttendanceRecord,
    AttendanceRosterEntry, AttendanceStatus, GeofenceEventRequest, GeofenceEventType, GeofenceLog,
    JoinOutcome, JoinRequest, LocationSnapshot, ManualAttendanceRequest, PingRequest, PingResult,
    SubmitRequest, MANUAL_FULL_SCORE, MAX_CHECK_SCORE,
};
pub use lecture::{
    Lecture, LectureStatus, NewLectureRequest, PasscodeView, UpdateLectureRequest,
    DEFAULT_DURATION_MINUTES, DEFAULT_GEOFENCE_RADIUS_M, MAX_DURATION_MINUTES, is_valid_duration,
};
pub use user::{Class, DeviceTokenRequest, Role, StudentClassRequest, User};
