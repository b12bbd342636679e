use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::{LocalityId, MemberId, UnitId};
use super::types::*;

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    name: String,
    sort_key: String,
    baptized: bool,
    age_category: String,
    unit_id: Option<UnitId>,
    locality_id: Option<LocalityId>,
}

#[derive(sqlx::FromRow)]
struct PeriodRow {
    member_id: i64,
    starts_on: NaiveDate,
    ends_on: Option<NaiveDate>,
}

const MEMBER_SELECT: &str = "\
SELECT id, name, sort_key, baptized, age_category, unit_id, locality_id \
FROM members";

/// Attach enrollment history to bare member rows with a single extra query.
async fn with_enrollment(pool: &PgPool, rows: Vec<MemberRow>) -> Result<Vec<Member>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let periods = sqlx::query_as::<_, PeriodRow>(
        "SELECT member_id, starts_on, ends_on FROM enrollment_periods \
         WHERE member_id = ANY($1) ORDER BY member_id, starts_on",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_member: HashMap<MemberId, Vec<EnrollmentPeriod>> = HashMap::new();
    for p in periods {
        by_member.entry(p.member_id).or_default().push(EnrollmentPeriod {
            starts_on: p.starts_on,
            ends_on: p.ends_on,
        });
    }

    let members = rows
        .into_iter()
        .map(|row| Member {
            enrollment: by_member.remove(&row.id).unwrap_or_default(),
            id: row.id,
            name: row.name,
            sort_key: row.sort_key,
            baptized: row.baptized,
            age_category: row.age_category,
            unit_id: row.unit_id,
            locality_id: row.locality_id,
        })
        .collect();
    Ok(members)
}

/// All members assigned to any of the given units, ordered by unit then reading.
pub async fn find_by_units(pool: &PgPool, unit_ids: &[UnitId]) -> Result<Vec<Member>, AppError> {
    let sql = format!(
        "{} WHERE unit_id = ANY($1) ORDER BY unit_id, sort_key, id",
        MEMBER_SELECT
    );
    let rows = sqlx::query_as::<_, MemberRow>(&sql)
        .bind(unit_ids)
        .fetch_all(pool)
        .await?;
    with_enrollment(pool, rows).await
}

/// Point lookup for a set of members (guests, search results).
pub async fn find_by_ids(pool: &PgPool, ids: &[MemberId]) -> Result<Vec<Member>, AppError> {
    let sql = format!("{} WHERE id = ANY($1) ORDER BY sort_key, id", MEMBER_SELECT);
    let rows = sqlx::query_as::<_, MemberRow>(&sql)
        .bind(ids)
        .fetch_all(pool)
        .await?;
    with_enrollment(pool, rows).await
}
