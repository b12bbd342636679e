pub mod edit;
pub mod meetings;
pub mod records;
pub mod roster;
pub mod types;
pub mod views;

pub use views::ViewRegistry;

use actix_web::{
    web, Error, HttpResponse,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::{header, Method},
    middleware::Next,
};

use crate::store::AttendanceStore;

/// Edits and deletions only accept JSON bodies. A cross-site form post
/// cannot set that content type, so session cookies alone cannot trigger
/// a write.
async fn require_json_content_type(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let is_write = matches!(*req.method(), Method::POST | Method::PUT | Method::DELETE);
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_write && !is_json {
        log::debug!("Rejected {} {} without a JSON body", req.method(), req.path());
        let response = HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Attendance changes must be sent as application/json"
        }));
        return Ok(req.into_response(response).map_into_right_body());
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}

/// Configure API v1 routes over the given store.
pub fn configure<S: AttendanceStore + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/meetings/resolve", web::get().to(meetings::resolve::<S>));
    cfg.route("/roster", web::get().to(roster::load::<S>));
    cfg.service(
        web::scope("/edit")
            .wrap(actix_web::middleware::from_fn(require_json_content_type))
            .route("/status", web::get().to(edit::status))
            .route("/enter", web::post().to(edit::enter))
            .route("/attendance", web::post().to(edit::attendance))
            .route("/memo", web::post().to(edit::memo))
            .route("/online", web::post().to(edit::online))
            .route("/away", web::post().to(edit::away))
            .route("/guest", web::post().to(edit::guest::<S>))
            .route("/remove", web::post().to(edit::remove))
            .route("/discard", web::post().to(edit::discard))
            .route("/commit", web::post().to(edit::commit::<S>))
            .route("/close", web::post().to(edit::close))
    );
    cfg.service(
        web::scope("/records")
            .wrap(actix_web::middleware::from_fn(require_json_content_type))
            .route("/delete", web::post().to(records::delete::<S>))
    );
}
