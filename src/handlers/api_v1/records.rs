use actix_web::{web, HttpResponse};

use crate::engine::{delete_all_records_for_resolved_meetings, EnrollmentHistory, RosterScope};
use crate::errors::AppError;
use crate::store::AttendanceStore;
use super::types::DeleteRecordsRequest;

/// POST /api/v1/records/delete - Wipe the attendance a roster load would show.
/// The body's `confirmation` must match the phrase for the scope and date.
pub async fn delete<S: AttendanceStore + 'static>(
    store: web::Data<S>,
    body: web::Json<DeleteRecordsRequest>,
) -> Result<HttpResponse, AppError> {
    let scope: RosterScope = body.scope.parse()?;
    let report =
        delete_all_records_for_resolved_meetings(store.get_ref(), &EnrollmentHistory, body.date, scope, &body.confirmation)
            .await?;
    Ok(HttpResponse::Ok().json(report))
}
