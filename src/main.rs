use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::{App, HttpServer, middleware, web};

use rollcall::config::AppConfig;
use rollcall::handlers::api_v1::{self, ViewRegistry};
use rollcall::store::PgStore;
use rollcall::db;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = AppConfig::from_env().map_err(std::io::Error::other)?;

    let pool = db::init_pool(&config).await.map_err(std::io::Error::other)?;
    db::run_migrations(&pool).await.map_err(std::io::Error::other)?;

    let store = web::Data::new(PgStore::new(pool));
    let views = web::Data::new(ViewRegistry::with_limits(config.view_idle, config.max_views));
    let secret_key = config.cookie_key();

    log::info!("Starting server at http://{}", config.bind_addr);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(
            CookieSessionStore::default(),
            secret_key.clone(),
        )
        .cookie_secure(false)
        .cookie_http_only(true)
        .build();

        App::new()
            .wrap(session_mw)
            .wrap(middleware::Logger::default())
            .app_data(store.clone())
            .app_data(views.clone())
            .service(web::scope("/api/v1").configure(api_v1::configure::<PgStore>))
            .default_service(web::to(|| async {
                actix_web::HttpResponse::NotFound().json(serde_json::json!({ "error": "Not Found" }))
            }))
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
