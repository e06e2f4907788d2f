pub mod auth;
pub mod db;
pub mod errors;
pub mod guards;
pub mod ids;
pub mod models;
pub mod routes;
pub mod sales;
pub mod state;
pub mod templates;

use actix_web::{http::header, web, HttpResponse};

/// Wires every route module onto an actix `App`. The binary and the
/// integration tests share this so they exercise the same surface.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/health").route(web::get().to(health)))
        .configure(routes::login::configure)
        .configure(routes::register::configure)
        .configure(routes::services::configure)
        .configure(routes::products::configure)
        .configure(routes::reports::configure)
        .configure(routes::barbers::configure)
        .configure(routes::sales::configure)
        .configure(routes::payments::configure)
        .configure(routes::specialties::configure)
        .configure(routes::appointments::configure)
        .configure(routes::clients::configure);
}

async fn home() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/servicios/menu"))
        .finish()
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}
