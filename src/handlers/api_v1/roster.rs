use actix_session::Session;
use actix_web::{web, HttpResponse};

use crate::engine::{CombinedModes, EnrollmentHistory, Reconciler, RosterScope};
use crate::errors::AppError;
use crate::store::AttendanceStore;
use super::types::{RosterQuery, RosterResponse};
use super::views::{view_key, ViewRegistry};

/// GET /api/v1/roster - Load a roster into the caller's view.
/// Query params: scope (unit id or `__all__`), date, combined (locality ids, comma separated).
///
/// The view is not locked while the store is queried; if another load for
/// the same view starts meanwhile, this one answers 409 and changes nothing.
pub async fn load<S: AttendanceStore + 'static>(
    store: web::Data<S>,
    views: web::Data<ViewRegistry>,
    session: Session,
    query: web::Query<RosterQuery>,
) -> Result<HttpResponse, AppError> {
    let scope: RosterScope = query.scope.parse()?;
    let combined = CombinedModes::parse_list(&query.combined)?;
    let view = views.open(&view_key(&session)?);

    let ticket = view.lock().await.begin_load();
    let load = Reconciler::new(store.get_ref(), &EnrollmentHistory)
        .load_roster(scope, query.date, &combined, &ticket)
        .await?;

    let mut view = view.lock().await;
    let edit = view.apply(&ticket, load)?;
    Ok(HttpResponse::Ok().json(RosterResponse::from_session(edit)))
}
