use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{
    AttendanceAttempt, AttendancePing, AttendanceRecord, AttendanceRosterEntry, AttemptContext,
    Class, GeofenceEventType, GeofenceLog, Lecture, LocationSnapshot, User, MANUAL_FULL_SCORE,
    MAX_CHECK_SCORE,
};

// ---------------------------------------------------------------------------
// users / classes
// ---------------------------------------------------------------------------

pub async fn upsert_user(db: &SqlitePool, user: &User) -> Result<User, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, role, device_token, class_name, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            email = excluded.email,
            name = excluded.name,
            role = excluded.role,
            device_token = excluded.device_token,
            class_name = COALESCE(excluded.class_name, users.class_name)
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(user.role)
    .bind(&user.device_token)
    .bind(&user.class_name)
    .bind(user.created_at)
    .execute(db)
    .await?;

    find_user(db, &user.id)
        .await?
        .ok_or_else(|| sqlx::Error::RowNotFound)
}

const USER_COLUMNS: &str = "id, email, name, role, device_token, class_name, created_at";

pub async fn find_user(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(email.trim())
        .fetch_optional(db)
        .await
}

pub async fn set_device_token(db: &SqlitePool, user_id: &str, token: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET device_token = ?1 WHERE id = ?2")
        .bind(token)
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Points a user at a class. Returns `false` when the user does not exist.
pub async fn set_user_class(db: &SqlitePool, user_id: &str, class_name: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET class_name = ?1 WHERE id = ?2")
        .bind(class_name)
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Returns the class with this name, creating it when absent. A class created
/// without a teacher is claimed by the first teacher who passes one.
pub async fn ensure_class(
    db: &SqlitePool,
    name: &str,
    teacher_id: Option<&str>,
) -> Result<Class, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO classes (name, teacher_id, created_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(name) DO UPDATE SET
            teacher_id = COALESCE(classes.teacher_id, excluded.teacher_id)
        "#,
    )
    .bind(name)
    .bind(teacher_id)
    .bind(Utc::now())
    .execute(db)
    .await?;

    sqlx::query_as::<_, Class>("SELECT name, teacher_id, created_at FROM classes WHERE name = ?")
        .bind(name)
        .fetch_one(db)
        .await
}

pub async fn fetch_classes(db: &SqlitePool) -> Result<Vec<Class>, sqlx::Error> {
    sqlx::query_as::<_, Class>("SELECT name, teacher_id, created_at FROM classes ORDER BY name")
        .fetch_all(db)
        .await
}

pub async fn fetch_classes_for_teacher(
    db: &SqlitePool,
    teacher_id: &str,
) -> Result<Vec<Class>, sqlx::Error> {
    sqlx::query_as::<_, Class>(
        "SELECT name, teacher_id, created_at FROM classes WHERE teacher_id = ? ORDER BY name",
    )
    .bind(teacher_id)
    .fetch_all(db)
    .await
}

// ---------------------------------------------------------------------------
// lectures
// ---------------------------------------------------------------------------

const LECTURE_COLUMNS: &str = "id, teacher_id, class_name, title, latitude, longitude, \
    geofence_radius, duration_minutes, status, passcode, passcode_updated_at, created_at, \
    started_at, ended_at";

pub async fn insert_lecture(db: &SqlitePool, lecture: &Lecture) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO lectures
            (id, teacher_id, class_name, title, latitude, longitude, geofence_radius,
            duration_minutes, status, passcode, passcode_updated_at, created_at, started_at, ended_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&lecture.id)
    .bind(&lecture.teacher_id)
    .bind(&lecture.class_name)
    .bind(&lecture.title)
    .bind(lecture.latitude)
    .bind(lecture.longitude)
    .bind(lecture.geofence_radius)
    .bind(lecture.duration_minutes)
    .bind(lecture.status)
    .bind(&lecture.passcode)
    .bind(lecture.passcode_updated_at)
    .bind(lecture.created_at)
    .bind(lecture.started_at)
    .bind(lecture.ended_at)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn find_lecture(db: &SqlitePool, id: &str) -> Result<Option<Lecture>, sqlx::Error> {
    let sql = format!("SELECT {} FROM lectures WHERE id = ?", LECTURE_COLUMNS);
    sqlx::query_as::<_, Lecture>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_active_lectures(db: &SqlitePool) -> Result<Vec<Lecture>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM lectures WHERE status = 'active' ORDER BY created_at",
        LECTURE_COLUMNS
    );
    sqlx::query_as::<_, Lecture>(&sql).fetch_all(db).await
}

pub async fn fetch_active_lectures_for_teacher(
    db: &SqlitePool,
    teacher_id: &str,
) -> Result<Vec<Lecture>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM lectures WHERE teacher_id = ? AND status = 'active' ORDER BY created_at",
        LECTURE_COLUMNS
    );
    sqlx::query_as::<_, Lecture>(&sql)
        .bind(teacher_id)
        .fetch_all(db)
        .await
}

/// Every lecture of a teacher, newest first.
pub async fn fetch_lectures_for_teacher(
    db: &SqlitePool,
    teacher_id: &str,
) -> Result<Vec<Lecture>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM lectures WHERE teacher_id = ? ORDER BY created_at DESC, rowid DESC",
        LECTURE_COLUMNS
    );
    sqlx::query_as::<_, Lecture>(&sql)
        .bind(teacher_id)
        .fetch_all(db)
        .await
}

pub async fn fetch_active_lectures_for_class(
    db: &SqlitePool,
    class_name: &str,
) -> Result<Vec<Lecture>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM lectures WHERE class_name = ? AND status = 'active' ORDER BY created_at",
        LECTURE_COLUMNS
    );
    sqlx::query_as::<_, Lecture>(&sql)
        .bind(class_name)
        .fetch_all(db)
        .await
}

/// Applies title/duration changes to a lecture that is still active.
/// Returns `None` when no active lecture matched.
pub async fn update_active_lecture(
    db: &SqlitePool,
    id: &str,
    title: Option<&str>,
    duration_minutes: Option<i64>,
) -> Result<Option<Lecture>, sqlx::Error> {
    let updated = sqlx::query(
        r#"
        UPDATE lectures
        SET title = COALESCE(?1, title),
            duration_minutes = COALESCE(?2, duration_minutes)
        WHERE id = ?3 AND status = 'active'
        "#,
    )
    .bind(title)
    .bind(duration_minutes)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    if updated == 0 {
        return Ok(None);
    }
    find_lecture(db, id).await
}

pub async fn set_passcode(
    db: &SqlitePool,
    id: &str,
    passcode: &str,
    updated_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE lectures SET passcode = ?1, passcode_updated_at = ?2 WHERE id = ?3")
        .bind(passcode)
        .bind(updated_at)
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Ends an active lecture and finalizes its attendance in one transaction.
///
/// The status guard lives in the UPDATE itself, so concurrent closers race on
/// a single row write and exactly one of them observes `Some`.
/// Returns the number of records moved from `incomplete` to `absent`.
pub async fn close_lecture(
    db: &SqlitePool,
    id: &str,
    ended_at: DateTime<Utc>,
) -> Result<Option<u64>, sqlx::Error> {
    let mut tx = db.begin().await?;

    let closed = sqlx::query(
        "UPDATE lectures SET status = 'ended', ended_at = ?1 WHERE id = ?2 AND status = 'active'",
    )
    .bind(ended_at)
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if closed == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    let finalized = finalize_attendance(&mut *tx, id).await?;

    tx.commit().await?;
    Ok(Some(finalized))
}

/// Set-based finalize: every `incomplete` record of the lecture becomes `absent`.
/// Takes any executor so the close transaction can run it on its own connection.
pub async fn finalize_attendance<'e, E>(executor: E, lecture_id: &str) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE attendance SET status = 'absent' WHERE lecture_id = ?1 AND status = 'incomplete'",
    )
    .bind(lecture_id)
    .execute(executor)
    .await?
    .rows_affected();

    Ok(result)
}

/// Deletes an ended lecture and every child row, children first.
/// Returns false when the lecture is missing or still active.
pub async fn delete_ended_lecture(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let mut tx = db.begin().await?;

    let ended: Option<String> =
        sqlx::query_scalar("SELECT id FROM lectures WHERE id = ?1 AND status = 'ended'")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    if ended.is_none() {
        tx.rollback().await?;
        return Ok(false);
    }

    for table in ["attendance_pings", "geofence_logs", "attendance_attempts", "attendance"] {
        let sql = format!("DELETE FROM {} WHERE lecture_id = ?1", table);
        sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
    }

    sqlx::query("DELETE FROM lectures WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// attendance records
// ---------------------------------------------------------------------------

const ATTENDANCE_COLUMNS: &str = "id, lecture_id, student_id, join_time, submit_time, status, \
    check_score, method, location_snapshot, extra";

pub async fn find_attendance(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM attendance WHERE lecture_id = ? AND student_id = ?",
        ATTENDANCE_COLUMNS
    );
    sqlx::query_as::<_, AttendanceRecord>(&sql)
        .bind(lecture_id)
        .bind(student_id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_attendance_for_lecture(
    db: &SqlitePool,
    lecture_id: &str,
) -> Result<Vec<AttendanceRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM attendance WHERE lecture_id = ? ORDER BY join_time",
        ATTENDANCE_COLUMNS
    );
    sqlx::query_as::<_, AttendanceRecord>(&sql)
        .bind(lecture_id)
        .fetch_all(db)
        .await
}

pub async fn fetch_roster(
    db: &SqlitePool,
    lecture_id: &str,
) -> Result<Vec<AttendanceRosterEntry>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRosterEntry>(
        r#"
        SELECT
            a.id, a.student_id, u.name AS student_name, u.email AS student_email,
            a.join_time, a.submit_time, a.status, a.check_score, a.method, a.location_snapshot
        FROM attendance a
        LEFT JOIN users u ON u.id = a.student_id
        WHERE a.lecture_id = ?
        ORDER BY a.join_time
        "#,
    )
    .bind(lecture_id)
    .fetch_all(db)
    .await
}

/// Inserts the join record unless one already exists for the pair.
/// Returns the stored record and whether this call created it.
pub async fn insert_join_record(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
    joined_at: DateTime<Utc>,
    snapshot: &LocationSnapshot,
) -> Result<(AttendanceRecord, bool), sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO attendance
            (id, lecture_id, student_id, join_time, submit_time, status, check_score, method,
            location_snapshot, extra)
        VALUES (?1, ?2, ?3, ?4, NULL, 'incomplete', 1, 'auto', ?5, NULL)
        ON CONFLICT(lecture_id, student_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(lecture_id)
    .bind(student_id)
    .bind(joined_at)
    .bind(Json(snapshot))
    .execute(db)
    .await?
    .rows_affected();

    let record = find_attendance(db, lecture_id, student_id)
        .await?
        .ok_or_else(|| sqlx::Error::RowNotFound)?;

    Ok((record, inserted > 0))
}

/// Records the latest location and, for a valid sample, bumps the score by one
/// without ever passing the cap. Returns the stored score, or `None` when the
/// student has no record or the lecture is no longer active.
pub async fn apply_ping(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
    is_valid: bool,
    snapshot: &LocationSnapshot,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        UPDATE attendance
        SET check_score = CASE
                WHEN ?1 AND check_score < ?2 THEN check_score + 1
                ELSE check_score
            END,
            location_snapshot = ?3
        WHERE lecture_id = ?4 AND student_id = ?5
            AND EXISTS (SELECT 1 FROM lectures WHERE id = ?4 AND status = 'active')
        RETURNING check_score
        "#,
    )
    .bind(is_valid)
    .bind(MAX_CHECK_SCORE)
    .bind(Json(snapshot))
    .bind(lecture_id)
    .bind(student_id)
    .fetch_optional(db)
    .await
}

/// Teacher override: creates a present/manual record at full score, or flips
/// an existing one to present/manual leaving its score alone.
pub async fn upsert_manual_attendance(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attendance
            (id, lecture_id, student_id, join_time, submit_time, status, check_score, method)
        VALUES (?1, ?2, ?3, ?4, ?4, 'present', ?5, 'manual')
        ON CONFLICT(lecture_id, student_id) DO UPDATE SET
            status = 'present',
            method = 'manual',
            submit_time = excluded.submit_time
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(lecture_id)
    .bind(student_id)
    .bind(now)
    .bind(MANUAL_FULL_SCORE)
    .execute(db)
    .await?;

    find_attendance(db, lecture_id, student_id)
        .await?
        .ok_or_else(|| sqlx::Error::RowNotFound)
}

pub async fn mark_submitted(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    let updated = sqlx::query(
        r#"
        UPDATE attendance
        SET status = 'present', submit_time = ?1
        WHERE lecture_id = ?2 AND student_id = ?3
        "#,
    )
    .bind(now)
    .bind(lecture_id)
    .bind(student_id)
    .execute(db)
    .await?
    .rows_affected();

    if updated == 0 {
        return Ok(None);
    }
    find_attendance(db, lecture_id, student_id).await
}

// ---------------------------------------------------------------------------
// audit trails
// ---------------------------------------------------------------------------

pub async fn insert_ping(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
    latitude: f64,
    longitude: f64,
    is_valid: bool,
    at: DateTime<Utc>,
) -> Result<AttendancePing, sqlx::Error> {
    let ping = AttendancePing {
        id: Uuid::new_v4().to_string(),
        lecture_id: lecture_id.to_string(),
        student_id: student_id.to_string(),
        timestamp: at,
        latitude,
        longitude,
        is_valid,
    };

    sqlx::query(
        r#"
        INSERT INTO attendance_pings (id, lecture_id, student_id, timestamp, latitude, longitude, is_valid)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&ping.id)
    .bind(&ping.lecture_id)
    .bind(&ping.student_id)
    .bind(ping.timestamp)
    .bind(ping.latitude)
    .bind(ping.longitude)
    .bind(ping.is_valid)
    .execute(db)
    .await?;

    Ok(ping)
}

pub async fn fetch_pings(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
) -> Result<Vec<AttendancePing>, sqlx::Error> {
    sqlx::query_as::<_, AttendancePing>(
        r#"
        SELECT id, lecture_id, student_id, timestamp, latitude, longitude, is_valid
        FROM attendance_pings
        WHERE lecture_id = ? AND student_id = ?
        ORDER BY timestamp, rowid
        "#,
    )
    .bind(lecture_id)
    .bind(student_id)
    .fetch_all(db)
    .await
}

pub async fn insert_geofence_log(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
    event_type: GeofenceEventType,
    at: DateTime<Utc>,
) -> Result<GeofenceLog, sqlx::Error> {
    let log = GeofenceLog {
        id: Uuid::new_v4().to_string(),
        lecture_id: lecture_id.to_string(),
        student_id: student_id.to_string(),
        event_type,
        timestamp: at,
    };

    sqlx::query(
        r#"
        INSERT INTO geofence_logs (id, lecture_id, student_id, event_type, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&log.id)
    .bind(&log.lecture_id)
    .bind(&log.student_id)
    .bind(log.event_type)
    .bind(log.timestamp)
    .execute(db)
    .await?;

    Ok(log)
}

pub async fn fetch_geofence_logs(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
) -> Result<Vec<GeofenceLog>, sqlx::Error> {
    sqlx::query_as::<_, GeofenceLog>(
        r#"
        SELECT id, lecture_id, student_id, event_type, timestamp
        FROM geofence_logs
        WHERE lecture_id = ? AND student_id = ?
        ORDER BY timestamp, rowid
        "#,
    )
    .bind(lecture_id)
    .bind(student_id)
    .fetch_all(db)
    .await
}

pub async fn insert_attempt(
    db: &SqlitePool,
    lecture_id: &str,
    student_id: &str,
    distance_meters: Option<f64>,
    success: bool,
    context: &AttemptContext,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attendance_attempts
            (id, lecture_id, student_id, attempt_time, distance_meters, success, ip_address, device_info)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(lecture_id)
    .bind(student_id)
    .bind(at)
    .bind(distance_meters)
    .bind(success)
    .bind(&context.ip_address)
    .bind(context.device_info.as_ref().map(Json))
    .execute(db)
    .await?;

    Ok(())
}

pub async fn fetch_attempts(
    db: &SqlitePool,
    lecture_id: &str,
) -> Result<Vec<AttendanceAttempt>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceAttempt>(
        r#"
        SELECT id, lecture_id, student_id, attempt_time, distance_meters, success, ip_address, device_info
        FROM attendance_attempts
        WHERE lecture_id = ?
        ORDER BY attempt_time, rowid
        "#,
    )
    .bind(lecture_id)
    .fetch_all(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::models::{AttendanceMethod, AttendanceStatus, LectureStatus, Role};

    async fn setup_test_db() -> SqlitePool {
        connect_in_memory().await.expect("Failed to create test db")
    }

    fn test_lecture(id: &str) -> Lecture {
        let now = Utc::now();
        Lecture {
            id: id.to_string(),
            teacher_id: "teacher-1".to_string(),
            class_name: "CS101".to_string(),
            title: "Graphs".to_string(),
            latitude: 12.0,
            longitude: 77.0,
            geofence_radius: 200.0,
            duration_minutes: 60,
            status: LectureStatus::Active,
            passcode: Some("1234".to_string()),
            passcode_updated_at: Some(now),
            created_at: now,
            started_at: Some(now),
            ended_at: None,
        }
    }

    fn snapshot() -> LocationSnapshot {
        LocationSnapshot { lat: 12.0001, lng: 77.0, accuracy: Some(8.0) }
    }

    #[tokio::test]
    async fn test_insert_and_find_lecture() {
        let pool = setup_test_db().await;
        let lecture = test_lecture("lec-1");
        insert_lecture(&pool, &lecture).await.expect("Failed to insert lecture");

        let found = find_lecture(&pool, "lec-1")
            .await
            .expect("Failed to fetch lecture")
            .expect("Lecture not found");
        assert_eq!(found.title, "Graphs");
        assert_eq!(found.status, LectureStatus::Active);
        assert_eq!(found.latitude, 12.0);
        assert!(found.ended_at.is_none());

        let active = fetch_active_lectures(&pool).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_join_record_is_unique_per_pair() {
        let pool = setup_test_db().await;
        insert_lecture(&pool, &test_lecture("lec-1")).await.unwrap();

        let (first, created) = insert_join_record(&pool, "lec-1", "stu-1", Utc::now(), &snapshot())
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.check_score, 1);
        assert_eq!(first.status, AttendanceStatus::Incomplete);
        assert_eq!(first.method, AttendanceMethod::Auto);

        let (second, created) = insert_join_record(&pool, "lec-1", "stu-1", Utc::now(), &snapshot())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.join_time, first.join_time);

        let all = fetch_attendance_for_lecture(&pool, "lec-1").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_ping_caps_score() {
        let pool = setup_test_db().await;
        insert_lecture(&pool, &test_lecture("lec-1")).await.unwrap();
        insert_join_record(&pool, "lec-1", "stu-1", Utc::now(), &snapshot())
            .await
            .unwrap();

        let mut last = 1;
        for _ in 0..20 {
            let score = apply_ping(&pool, "lec-1", "stu-1", true, &snapshot())
                .await
                .unwrap()
                .expect("record exists");
            assert!(score >= last);
            assert!(score <= MAX_CHECK_SCORE);
            last = score;
        }
        assert_eq!(last, MAX_CHECK_SCORE);

        let unchanged = apply_ping(&pool, "lec-1", "stu-1", false, &snapshot())
            .await
            .unwrap();
        assert_eq!(unchanged, Some(MAX_CHECK_SCORE));
    }

    #[tokio::test]
    async fn test_apply_ping_without_record() {
        let pool = setup_test_db().await;
        let score = apply_ping(&pool, "lec-1", "ghost", true, &snapshot()).await.unwrap();
        assert_eq!(score, None);
        assert!(find_attendance(&pool, "lec-1", "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_ping_ignored_after_close() {
        let pool = setup_test_db().await;
        insert_lecture(&pool, &test_lecture("lec-1")).await.unwrap();
        insert_join_record(&pool, "lec-1", "stu-1", Utc::now(), &snapshot())
            .await
            .unwrap();
        close_lecture(&pool, "lec-1", Utc::now()).await.unwrap();

        let score = apply_ping(&pool, "lec-1", "stu-1", true, &snapshot()).await.unwrap();
        assert_eq!(score, None);

        let record = find_attendance(&pool, "lec-1", "stu-1").await.unwrap().unwrap();
        assert_eq!(record.check_score, 1);
        assert_eq!(record.status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn test_manual_upsert_keeps_existing_score() {
        let pool = setup_test_db().await;
        insert_lecture(&pool, &test_lecture("lec-1")).await.unwrap();
        insert_join_record(&pool, "lec-1", "stu-1", Utc::now(), &snapshot())
            .await
            .unwrap();

        let updated = upsert_manual_attendance(&pool, "lec-1", "stu-1", Utc::now()).await.unwrap();
        assert_eq!(updated.status, AttendanceStatus::Present);
        assert_eq!(updated.method, AttendanceMethod::Manual);
        assert_eq!(updated.check_score, 1);
        assert!(updated.submit_time.is_some());

        let created = upsert_manual_attendance(&pool, "lec-1", "stu-2", Utc::now()).await.unwrap();
        assert_eq!(created.check_score, MANUAL_FULL_SCORE);
        assert_eq!(created.join_time, created.submit_time);
    }

    #[tokio::test]
    async fn test_close_lecture_finalizes_once() {
        let pool = setup_test_db().await;
        insert_lecture(&pool, &test_lecture("lec-1")).await.unwrap();
        insert_join_record(&pool, "lec-1", "stu-1", Utc::now(), &snapshot()).await.unwrap();
        insert_join_record(&pool, "lec-1", "stu-2", Utc::now(), &snapshot()).await.unwrap();
        upsert_manual_attendance(&pool, "lec-1", "stu-2", Utc::now()).await.unwrap();

        let finalized = close_lecture(&pool, "lec-1", Utc::now()).await.unwrap();
        assert_eq!(finalized, Some(1));

        let lecture = find_lecture(&pool, "lec-1").await.unwrap().unwrap();
        assert_eq!(lecture.status, LectureStatus::Ended);
        assert!(lecture.ended_at.is_some());

        let s1 = find_attendance(&pool, "lec-1", "stu-1").await.unwrap().unwrap();
        let s2 = find_attendance(&pool, "lec-1", "stu-2").await.unwrap().unwrap();
        assert_eq!(s1.status, AttendanceStatus::Absent);
        assert_eq!(s2.status, AttendanceStatus::Present);

        assert_eq!(close_lecture(&pool, "lec-1", Utc::now()).await.unwrap(), None);
        assert_eq!(finalize_attendance(&pool, "lec-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_requires_ended_and_cascades() {
        let pool = setup_test_db().await;
        insert_lecture(&pool, &test_lecture("lec-1")).await.unwrap();
        insert_join_record(&pool, "lec-1", "stu-1", Utc::now(), &snapshot()).await.unwrap();
        insert_ping(&pool, "lec-1", "stu-1", 12.0, 77.0, true, Utc::now()).await.unwrap();
        insert_geofence_log(&pool, "lec-1", "stu-1", GeofenceEventType::Exit, Utc::now())
            .await
            .unwrap();
        insert_attempt(&pool, "lec-1", "stu-1", Some(10.0), true, &AttemptContext::default(), Utc::now())
            .await
            .unwrap();

        assert!(!delete_ended_lecture(&pool, "lec-1").await.unwrap());
        assert!(find_lecture(&pool, "lec-1").await.unwrap().is_some());

        close_lecture(&pool, "lec-1", Utc::now()).await.unwrap();
        assert!(delete_ended_lecture(&pool, "lec-1").await.unwrap());

        assert!(find_lecture(&pool, "lec-1").await.unwrap().is_none());
        assert!(fetch_attendance_for_lecture(&pool, "lec-1").await.unwrap().is_empty());
        assert!(fetch_pings(&pool, "lec-1", "stu-1").await.unwrap().is_empty());
        assert!(fetch_geofence_logs(&pool, "lec-1", "stu-1").await.unwrap().is_empty());
        assert!(fetch_attempts(&pool, "lec-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_lookup_and_roster() {
        let pool = setup_test_db().await;
        let student = User {
            id: "stu-1".to_string(),
            email: "asha@school.test".to_string(),
            name: Some("Asha".to_string()),
            role: Role::Student,
            device_token: None,
            class_name: None,
            created_at: Utc::now(),
        };
        upsert_user(&pool, &student).await.unwrap();

        let by_email = find_user_by_email(&pool, " asha@school.test ").await.unwrap().unwrap();
        assert_eq!(by_email.id, "stu-1");
        assert!(set_device_token(&pool, "stu-1", "tok").await.unwrap());
        assert!(!set_device_token(&pool, "nobody", "tok").await.unwrap());

        insert_lecture(&pool, &test_lecture("lec-1")).await.unwrap();
        insert_join_record(&pool, "lec-1", "stu-1", Utc::now(), &snapshot()).await.unwrap();
        insert_join_record(&pool, "lec-1", "stu-unknown", Utc::now(), &snapshot()).await.unwrap();

        let roster = fetch_roster(&pool, "lec-1").await.unwrap();
        assert_eq!(roster.len(), 2);
        let asha = roster.iter().find(|r| r.student_id == "stu-1").unwrap();
        assert_eq!(asha.student_name.as_deref(), Some("Asha"));
        assert_eq!(
            asha.location_snapshot.as_ref().map(|s| s.0.clone()),
            Some(snapshot())
        );
    }

    #[tokio::test]
    async fn test_ownerless_class_is_claimed_once() {
        let pool = setup_test_db().await;

        let class = ensure_class(&pool, "CS101", None).await.unwrap();
        assert_eq!(class.teacher_id, None);

        let claimed = ensure_class(&pool, "CS101", Some("teacher-1")).await.unwrap();
        assert_eq!(claimed.teacher_id.as_deref(), Some("teacher-1"));

        let kept = ensure_class(&pool, "CS101", Some("teacher-2")).await.unwrap();
        assert_eq!(kept.teacher_id.as_deref(), Some("teacher-1"));

        ensure_class(&pool, "BIO200", Some("teacher-2")).await.unwrap();
        let names: Vec<_> = fetch_classes(&pool).await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["BIO200", "CS101"]);

        let mine = fetch_classes_for_teacher(&pool, "teacher-1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "CS101");
    }

    #[tokio::test]
    async fn test_lecture_listings_by_teacher_and_class() {
        let pool = setup_test_db().await;
        let mut older = test_lecture("lec-old");
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        insert_lecture(&pool, &older).await.unwrap();
        insert_lecture(&pool, &test_lecture("lec-new")).await.unwrap();
        let mut other = test_lecture("lec-other");
        other.class_name = "BIO200".to_string();
        insert_lecture(&pool, &other).await.unwrap();

        close_lecture(&pool, "lec-old", Utc::now()).await.unwrap();

        let all: Vec<_> = fetch_lectures_for_teacher(&pool, "teacher-1")
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().map(String::as_str), Some("lec-old"));

        let active: Vec<_> = fetch_active_lectures_for_class(&pool, "CS101")
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(active, vec!["lec-new"]);
    }

    #[tokio::test]
    async fn test_set_user_class_requires_user() {
        let pool = setup_test_db().await;
        assert!(!set_user_class(&pool, "nobody", "CS101").await.unwrap());
    }
}
