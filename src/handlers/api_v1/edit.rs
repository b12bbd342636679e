use actix_session::Session;
use actix_web::{web, HttpResponse};

use crate::engine::{EditSession, RosterScope};
use crate::errors::AppError;
use crate::store::AttendanceStore;
use super::types::*;
use super::views::{current_view_key, existing_view_key, ViewRegistry};

/// Run a synchronous edit operation against the caller's session and
/// answer with the updated roster.
async fn with_session<F>(views: &ViewRegistry, session: &Session, op: F) -> Result<HttpResponse, AppError>
where
    F: FnOnce(&mut EditSession) -> Result<(), AppError>,
{
    let view = views.get(&current_view_key(session)?)?;
    let mut view = view.lock().await;
    let edit = view.session_mut()?;
    op(edit)?;
    Ok(HttpResponse::Ok().json(RosterResponse::from_session(edit)))
}

/// POST /api/v1/edit/enter - Snapshot the current maps and start editing.
pub async fn enter(views: web::Data<ViewRegistry>, session: Session) -> Result<HttpResponse, AppError> {
    with_session(&views, &session, |s| s.enter_edit()).await
}

/// POST /api/v1/edit/attendance - Set present / absent / unrecorded.
pub async fn attendance(
    views: web::Data<ViewRegistry>,
    session: Session,
    body: web::Json<AttendanceRequest>,
) -> Result<HttpResponse, AppError> {
    with_session(&views, &session, |s| s.set_attendance(body.member_id, body.choice)).await
}

/// POST /api/v1/edit/memo - Set or clear a memo (empty string clears).
pub async fn memo(
    views: web::Data<ViewRegistry>,
    session: Session,
    body: web::Json<MemoRequest>,
) -> Result<HttpResponse, AppError> {
    with_session(&views, &session, |s| s.set_memo(body.member_id, &body.memo)).await
}

/// POST /api/v1/edit/online
pub async fn online(
    views: web::Data<ViewRegistry>,
    session: Session,
    body: web::Json<MemberRequest>,
) -> Result<HttpResponse, AppError> {
    with_session(&views, &session, |s| s.toggle_online(body.member_id).map(|_| ())).await
}

/// POST /api/v1/edit/away
pub async fn away(
    views: web::Data<ViewRegistry>,
    session: Session,
    body: web::Json<MemberRequest>,
) -> Result<HttpResponse, AppError> {
    with_session(&views, &session, |s| s.toggle_away(body.member_id).map(|_| ())).await
}

/// POST /api/v1/edit/remove
pub async fn remove(
    views: web::Data<ViewRegistry>,
    session: Session,
    body: web::Json<MemberRequest>,
) -> Result<HttpResponse, AppError> {
    with_session(&views, &session, |s| s.remove(body.member_id)).await
}

/// POST /api/v1/edit/guest - Add a member from search as a present guest.
pub async fn guest<S: AttendanceStore + 'static>(
    store: web::Data<S>,
    views: web::Data<ViewRegistry>,
    session: Session,
    body: web::Json<GuestRequest>,
) -> Result<HttpResponse, AppError> {
    let member = store
        .find_members_by_ids(&[body.member_id])
        .await?
        .into_iter()
        .next()
        .ok_or(AppError::NotFound)?;

    with_session(&views, &session, |s| {
        let unit_id = match (body.unit_id, s.scope()) {
            (Some(unit_id), _) => unit_id,
            (None, RosterScope::Unit(unit_id)) => unit_id,
            (None, RosterScope::All) => member.unit_id.ok_or_else(|| {
                AppError::InvalidInput("unit_id is required for members without a unit".to_string())
            })?,
        };
        s.add_guest(member, unit_id)
    })
    .await
}

/// POST /api/v1/edit/discard - Restore the snapshot. Answers
/// `needs_confirmation` instead when there are unsaved changes and
/// `confirmed` is not set.
pub async fn discard(
    views: web::Data<ViewRegistry>,
    session: Session,
    body: web::Json<DiscardRequest>,
) -> Result<HttpResponse, AppError> {
    let view = views.get(&current_view_key(&session)?)?;
    let mut view = view.lock().await;
    let edit = view.session_mut()?;
    let outcome = edit.discard(body.confirmed)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "discard": outcome,
        "roster": RosterResponse::from_session(edit),
    })))
}

/// POST /api/v1/edit/commit - Write dirty members to their meetings.
pub async fn commit<S: AttendanceStore + 'static>(
    store: web::Data<S>,
    views: web::Data<ViewRegistry>,
    session: Session,
) -> Result<HttpResponse, AppError> {
    let view = views.get(&current_view_key(&session)?)?;
    let mut view = view.lock().await;
    let edit = view.session_mut()?;
    let report = edit.commit(store.get_ref()).await?;
    Ok(HttpResponse::Ok().json(CommitResponse { report, roster: RosterResponse::from_session(edit) }))
}

/// GET /api/v1/edit/status - Dirty set, polled by the page's leave guard.
pub async fn status(views: web::Data<ViewRegistry>, session: Session) -> Result<HttpResponse, AppError> {
    let view = views.get(&current_view_key(&session)?)?;
    let view = view.lock().await;
    let edit = view.session()?;
    Ok(HttpResponse::Ok().json(EditStatusResponse {
        state: edit.state(),
        dirty: edit.dirty_members(),
        unsaved_changes: edit.has_unsaved_changes(),
    }))
}

/// POST /api/v1/edit/close - Tear down the caller's view. Unsaved edits are
/// dropped; the page's leave guard asks before calling this.
pub async fn close(views: web::Data<ViewRegistry>, session: Session) -> Result<HttpResponse, AppError> {
    let closed = match existing_view_key(&session)?.and_then(|key| views.remove(&key)) {
        Some(view) => {
            view.lock().await.close();
            true
        }
        None => false,
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({ "closed": closed })))
}
