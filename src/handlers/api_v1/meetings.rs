use actix_web::{web, HttpResponse};

use crate::engine::MeetingResolver;
use crate::errors::AppError;
use crate::store::AttendanceStore;
use super::types::{ResolveQuery, ResolveResponse};

/// GET /api/v1/meetings/resolve - Authoritative meeting id for a unit and date.
/// Query params: date (YYYY-MM-DD), unit, combined (bool, default false).
pub async fn resolve<S: AttendanceStore + 'static>(
    store: web::Data<S>,
    query: web::Query<ResolveQuery>,
) -> Result<HttpResponse, AppError> {
    let unit = store.find_unit(query.unit).await?.ok_or(AppError::NotFound)?;
    let meeting_id = MeetingResolver::new(store.get_ref())
        .resolve(query.date, &unit, query.combined)
        .await?;

    Ok(HttpResponse::Ok().json(ResolveResponse { unit_id: unit.id, meeting_id }))
}
