use std::collections::HashMap;

use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::MeetingId;
use super::types::*;

const MEETING_COLUMNS: &str = "id, event_date, kind, unit_id, locality_id, name";

fn key_filter(key: &MeetingKey) -> &'static str {
    match key.scope {
        MeetingScope::Unit(_) => "event_date = $1 AND kind = $2 AND unit_id = $3",
        MeetingScope::Locality(_) => "event_date = $1 AND kind = $2 AND locality_id = $3 AND unit_id IS NULL",
    }
}

fn scope_id(key: &MeetingKey) -> i64 {
    match key.scope {
        MeetingScope::Unit(id) | MeetingScope::Locality(id) => id,
    }
}

/// Every meeting row matching the key, oldest first. More than one row
/// means duplicates slipped past the unique index (legacy data or migrations).
pub async fn find_by_key(pool: &PgPool, key: &MeetingKey) -> Result<Vec<Meeting>, AppError> {
    let sql = format!(
        "SELECT {} FROM meetings WHERE {} ORDER BY id",
        MEETING_COLUMNS,
        key_filter(key)
    );
    let rows = sqlx::query_as::<_, MeetingRow>(&sql)
        .bind(key.event_date)
        .bind(key.kind.as_str())
        .bind(scope_id(key))
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(Meeting::try_from).collect()
}

/// Point lookup: the first matching meeting, if any.
pub async fn find_one_by_key(pool: &PgPool, key: &MeetingKey) -> Result<Option<Meeting>, AppError> {
    let sql = format!(
        "SELECT {} FROM meetings WHERE {} ORDER BY id LIMIT 1",
        MEETING_COLUMNS,
        key_filter(key)
    );
    let row = sqlx::query_as::<_, MeetingRow>(&sql)
        .bind(key.event_date)
        .bind(key.kind.as_str())
        .bind(scope_id(key))
        .fetch_optional(pool)
        .await?;
    row.map(Meeting::try_from).transpose()
}

/// Insert a meeting. A unique violation comes back as `InsertOutcome::UniqueViolation`.
pub async fn insert(pool: &PgPool, new: &NewMeeting) -> Result<InsertOutcome, AppError> {
    let (unit_id, locality_id) = new.key.scope.columns();
    let sql = format!(
        "INSERT INTO meetings (event_date, kind, unit_id, locality_id, name) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {}",
        MEETING_COLUMNS
    );
    let result = sqlx::query_as::<_, MeetingRow>(&sql)
        .bind(new.key.event_date)
        .bind(new.key.kind.as_str())
        .bind(unit_id)
        .bind(locality_id)
        .bind(&new.name)
        .fetch_one(pool)
        .await;

    match result {
        Ok(row) => Ok(InsertOutcome::Inserted(Meeting::try_from(row)?)),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(InsertOutcome::UniqueViolation),
        Err(e) => Err(e.into()),
    }
}

/// Attendance row count per meeting. Meetings without rows are absent from the map.
pub async fn count_attendance(
    pool: &PgPool,
    meeting_ids: &[MeetingId],
) -> Result<HashMap<MeetingId, i64>, AppError> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT meeting_id, COUNT(*) AS cnt FROM attendance_records \
         WHERE meeting_id = ANY($1) GROUP BY meeting_id",
    )
    .bind(meeting_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}
