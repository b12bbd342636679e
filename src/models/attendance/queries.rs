use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::{MeetingId, RecordId};
use super::types::*;

const ATTENDANCE_COLUMNS: &str = "id, member_id, meeting_id, attended, online, away, memo, \
    snap_age_category, snap_baptized, snap_unit_id, snap_is_local";

/// All attendance rows attached to any of the given meetings.
pub async fn find_by_meetings(
    pool: &PgPool,
    meeting_ids: &[MeetingId],
) -> Result<Vec<AttendanceRecord>, AppError> {
    let sql = format!(
        "SELECT {} FROM attendance_records WHERE meeting_id = ANY($1) ORDER BY id",
        ATTENDANCE_COLUMNS
    );
    let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(meeting_ids)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(AttendanceRecord::from).collect())
}

/// Insert a record. If another operator already created one for the same
/// (meeting, member), their row is updated instead and its snapshot kept.
pub async fn insert(pool: &PgPool, new: &NewAttendance) -> Result<AttendanceRecord, AppError> {
    let sql = format!(
        "INSERT INTO attendance_records \
         (member_id, meeting_id, attended, online, away, memo, \
          snap_age_category, snap_baptized, snap_unit_id, snap_is_local) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (meeting_id, member_id) DO UPDATE SET \
           attended = EXCLUDED.attended, online = EXCLUDED.online, away = EXCLUDED.away, \
           memo = EXCLUDED.memo, updated_at = NOW() \
         RETURNING {}",
        ATTENDANCE_COLUMNS
    );
    let row = sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(new.member_id)
        .bind(new.meeting_id)
        .bind(new.attended)
        .bind(new.online && new.attended)
        .bind(new.away && new.attended)
        .bind(&new.memo)
        .bind(&new.snapshot.age_category)
        .bind(new.snapshot.baptized)
        .bind(new.snapshot.unit_id)
        .bind(new.snapshot.is_local)
        .fetch_one(pool)
        .await?;
    Ok(row.into())
}

/// Update an existing record by id.
pub async fn update(pool: &PgPool, id: RecordId, update: &AttendanceUpdate) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE attendance_records \
         SET meeting_id = $2, attended = $3, online = $4, away = $5, memo = $6, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(update.meeting_id)
    .bind(update.attended)
    .bind(update.online && update.attended)
    .bind(update.away && update.attended)
    .bind(&update.memo)
    .execute(pool)
    .await;

    let result = match result {
        Ok(result) => result,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => return Err(update.collision(id)),
        Err(e) => return Err(e.into()),
    };
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Delete a single record (an operator reverted the member to unrecorded).
pub async fn delete(pool: &PgPool, id: RecordId) -> Result<(), AppError> {
    sqlx::query("DELETE FROM attendance_records WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Bulk delete every record of the given meetings. Meeting rows are kept.
pub async fn delete_by_meetings(pool: &PgPool, meeting_ids: &[MeetingId]) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM attendance_records WHERE meeting_id = ANY($1)")
        .bind(meeting_ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete individual records by id. Returns how many rows went.
pub async fn delete_by_ids(pool: &PgPool, ids: &[RecordId]) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM attendance_records WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
