use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::UnitId;
use super::types::*;

/// The three membership lists for all given units in one round trip.
pub async fn find_by_units(pool: &PgPool, unit_ids: &[UnitId]) -> Result<Vec<TierMembership>, AppError> {
    let rows: Vec<(i64, i64, String)> = sqlx::query_as(
        "SELECT unit_id, member_id, tier FROM tier_memberships \
         WHERE unit_id = ANY($1) ORDER BY unit_id, member_id",
    )
    .bind(unit_ids)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(unit_id, member_id, tier)| {
            let tier = Tier::parse(&tier).ok_or_else(|| {
                AppError::InvalidState(format!("unknown tier '{}' for member {}", tier, member_id))
            })?;
            Ok(TierMembership { unit_id, member_id, tier })
        })
        .collect()
}
