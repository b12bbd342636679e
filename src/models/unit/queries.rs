use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::UnitId;
use super::types::*;

const UNIT_SELECT: &str = "\
SELECT u.id, u.name, u.locality_id, l.name AS locality_name \
FROM units u \
JOIN localities l ON l.id = u.locality_id";

/// Find a single unit with its locality name.
pub async fn find_by_id(pool: &PgPool, id: UnitId) -> Result<Option<Unit>, AppError> {
    let sql = format!("{} WHERE u.id = $1", UNIT_SELECT);
    let unit = sqlx::query_as::<_, Unit>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(unit)
}

/// All units, ordered the way rosters list them.
pub async fn find_all(pool: &PgPool) -> Result<Vec<Unit>, AppError> {
    let sql = format!("{} ORDER BY u.sort_order, u.id", UNIT_SELECT);
    let units = sqlx::query_as::<_, Unit>(&sql).fetch_all(pool).await?;
    Ok(units)
}
