//! HTTP tests for the `/api/v1` routes over an in-memory store.
//!
//! Each test builds its own app with a fresh cookie key; the session cookie
//! from the first response is carried on every later request so the same
//! roster view is addressed.

mod common;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Cookie, Key};
use actix_web::{App, http::StatusCode, test, web};
use serde_json::{Value, json};

use rollcall::handlers::api_v1::{self, ViewRegistry};
use rollcall::models::meeting::MeetingKey;
use rollcall::store::MemoryStore;

use common::*;

macro_rules! init_app {
    ($store:expr, $views:expr) => {
        test::init_service(
            App::new()
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
                        .cookie_secure(false)
                        .build(),
                )
                .app_data($store.clone())
                .app_data($views.clone())
                .service(web::scope("/api/v1").configure(api_v1::configure::<MemoryStore>)),
        )
        .await
    };
}

fn roster_uri(scope: &str) -> String {
    format!("/api/v1/roster?scope={}&date={}", scope, MEETING_DAY)
}

fn session_cookie<B>(resp: &actix_web::dev::ServiceResponse<B>) -> Cookie<'static> {
    resp.response()
        .cookies()
        .next()
        .map(|c| c.into_owned())
        .expect("session cookie set on first request")
}

// ---------------------------------------------------------------------------
// Edit lifecycle
// ---------------------------------------------------------------------------

#[actix_rt::test]
async fn test_api_load_edit_commit() {
    let w = world();
    let (alice, unit_a) = (w.alice, w.unit_a);
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&roster_uri(&unit_a.to_string())).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["state"], "viewing");
    assert_eq!(body["members"].as_array().map(Vec::len), Some(2));

    let req = test::TestRequest::post().uri("/api/v1/edit/enter").cookie(cookie.clone()).set_json(json!({}));
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/v1/edit/attendance")
        .cookie(cookie.clone())
        .set_json(json!({ "member_id": alice, "choice": "present" }));
    let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
    assert_eq!(body["dirty"], json!([alice]));
    assert_eq!(body["unsaved_changes"], true);

    let req = test::TestRequest::get().uri("/api/v1/edit/status").cookie(cookie.clone());
    let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
    assert_eq!(body["state"], "editing");
    assert_eq!(body["unsaved_changes"], true);

    let req = test::TestRequest::post().uri("/api/v1/edit/commit").cookie(cookie.clone()).set_json(json!({}));
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["report"]["written"], json!([alice]));
    assert_eq!(body["roster"]["state"], "viewing");

    let meetings = store.meetings_for(&MeetingKey::unit(meeting_day(), unit_a));
    let rows = store.records_for(meetings[0].id);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].member_id, alice);
    assert!(rows[0].attended);
}

#[actix_rt::test]
async fn test_api_discard_asks_for_confirmation() {
    let w = world();
    let (alice, unit_a) = (w.alice, w.unit_a);
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&roster_uri(&unit_a.to_string())).to_request()).await;
    let cookie = session_cookie(&resp);
    for (uri, payload) in [
        ("/api/v1/edit/enter", json!({})),
        ("/api/v1/edit/attendance", json!({ "member_id": alice, "choice": "absent" })),
    ] {
        let req = test::TestRequest::post().uri(uri).cookie(cookie.clone()).set_json(payload);
        assert_eq!(test::call_service(&app, req.to_request()).await.status(), StatusCode::OK);
    }

    let req = test::TestRequest::post().uri("/api/v1/edit/discard").cookie(cookie.clone()).set_json(json!({}));
    let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
    assert_eq!(body["discard"]["outcome"], "needs_confirmation");
    assert_eq!(body["discard"]["dirty"], 1);

    let req = test::TestRequest::post()
        .uri("/api/v1/edit/discard")
        .cookie(cookie.clone())
        .set_json(json!({ "confirmed": true }));
    let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
    assert_eq!(body["discard"]["outcome"], "discarded");
    assert_eq!(body["roster"]["unsaved_changes"], false);
}

#[actix_rt::test]
async fn test_api_memo_on_unrecorded_member_conflicts() {
    let w = world();
    let (alice, unit_a) = (w.alice, w.unit_a);
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&roster_uri(&unit_a.to_string())).to_request()).await;
    let cookie = session_cookie(&resp);
    let req = test::TestRequest::post().uri("/api/v1/edit/enter").cookie(cookie.clone()).set_json(json!({}));
    test::call_service(&app, req.to_request()).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/edit/memo")
        .cookie(cookie.clone())
        .set_json(json!({ "member_id": alice, "memo": "late" }));
    let resp = test::call_service(&app, req.to_request()).await;

    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Guards and errors
// ---------------------------------------------------------------------------

#[actix_rt::test]
async fn test_api_mutation_requires_json_content_type() {
    let w = world();
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let req = test::TestRequest::post()
        .uri("/api/v1/edit/enter")
        .insert_header(("content-type", "application/x-www-form-urlencoded"))
        .set_payload("member_id=1");
    let resp = test::call_service(&app, req.to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_api_edit_without_roster_conflicts() {
    let w = world();
    let alice = w.alice;
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/edit/status").to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    for (uri, payload) in [
        ("/api/v1/edit/enter", json!({})),
        ("/api/v1/edit/attendance", json!({ "member_id": alice, "choice": "present" })),
        ("/api/v1/edit/commit", json!({})),
    ] {
        let req = test::TestRequest::post().uri(uri).set_json(payload);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT, "{uri}");
    }

    assert!(views.is_empty(), "requests without a roster open no views");
}

#[actix_rt::test]
async fn test_api_close_drops_the_view() {
    let w = world();
    let unit_a = w.unit_a;
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&roster_uri(&unit_a.to_string())).to_request()).await;
    let cookie = session_cookie(&resp);
    assert_eq!(views.len(), 1);

    let req = test::TestRequest::post().uri("/api/v1/edit/close").cookie(cookie.clone()).set_json(json!({}));
    let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
    assert_eq!(body["closed"], true);
    assert!(views.is_empty());

    let req = test::TestRequest::get().uri("/api/v1/edit/status").cookie(cookie.clone());
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&roster_uri(&unit_a.to_string())).cookie(cookie).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK, "a new load reopens the view");
    assert_eq!(views.len(), 1);
}

#[actix_rt::test]
async fn test_api_resolve_meeting() {
    let w = world();
    let (unit_a, locality) = (w.unit_a, w.locality);
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let uri = format!("/api/v1/meetings/resolve?date={}&unit={}&combined=true", MEETING_DAY, unit_a);
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;

    let meetings = store.meetings_for(&MeetingKey::unit(meeting_day(), unit_a));
    assert_eq!(body["meeting_id"], meetings[0].id);
    assert_eq!(store.meetings_for(&MeetingKey::locality(meeting_day(), locality)).len(), 1);
}

#[actix_rt::test]
async fn test_api_resolve_unknown_unit_is_404() {
    let w = world();
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let uri = format!("/api/v1/meetings/resolve?date={}&unit=9999", MEETING_DAY);
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_api_bad_scope_is_400() {
    let w = world();
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&roster_uri("everyone")).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_api_store_outage_is_503() {
    let w = world();
    let unit_a = w.unit_a;
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);
    store.set_unavailable(true);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&roster_uri(&unit_a.to_string())).to_request()).await;

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["retryable"], true);
}

#[actix_rt::test]
async fn test_api_delete_records() {
    let w = world();
    let (alice, unit_a) = (w.alice, w.unit_a);
    let meeting = unit_meeting(&w.store, unit_a).await;
    w.store.seed_attendance(meeting, alice, true);
    let store = web::Data::new(w.store);
    let views = web::Data::new(ViewRegistry::new());
    let app = init_app!(store, views);

    let req = test::TestRequest::post().uri("/api/v1/records/delete").set_json(json!({
        "date": MEETING_DAY,
        "scope": unit_a.to_string(),
        "confirmation": "delete",
    }));
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.records_for(meeting).len(), 1);

    let req = test::TestRequest::post().uri("/api/v1/records/delete").set_json(json!({
        "date": MEETING_DAY,
        "scope": unit_a.to_string(),
        "confirmation": format!("delete {} unit {}", MEETING_DAY, unit_a),
    }));
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["deleted"], 1);
    assert!(store.records_for(meeting).is_empty());
}
