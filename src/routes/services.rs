use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use askama::Template;
use serde::Deserialize;

use crate::{
    errors::AppError,
    guards::require_staff,
    ids::{next_id, Entity},
    models::ServiceRow,
    state::AppState,
    templates::render,
};

#[derive(Template)]
#[template(path = "services_menu.html")]
struct ServicesMenuTemplate {
    services: Vec<ServiceRow>,
}

#[derive(Deserialize)]
struct ServiceForm {
    #[serde(rename = "Nombre", default)]
    name: String,
    #[serde(rename = "Descripcion", default)]
    description: String,
    #[serde(rename = "Precio", default)]
    price: String,
    #[serde(rename = "DuracionMinutos", default)]
    duration_minutes: String,
    #[serde(rename = "Imagen", default)]
    image: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // /menu and /api stay outside the gate: the public catalog never asks
    // for a session.
    cfg.service(
        web::scope("/servicios")
            .service(web::resource("/menu").route(web::get().to(menu)))
            .service(web::resource("/api").route(web::get().to(api)))
            .service(
                web::scope("")
                    .wrap(from_fn(require_staff))
                    .service(web::resource("").route(web::get().to(list)))
                    .service(web::resource("/agregar").route(web::post().to(create)))
                    .service(web::resource("/editar/{id}").route(web::post().to(update)))
                    .service(web::resource("/eliminar/{id}").route(web::post().to(delete))),
            ),
    );
}

async fn fetch_all(state: &AppState) -> Result<Vec<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(
        r#"SELECT id, name, description, price, duration_minutes, image
           FROM services
           ORDER BY name"#,
    )
    .fetch_all(&state.db)
    .await
}

async fn menu(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let services = fetch_all(&state).await?;
    Ok(render(ServicesMenuTemplate { services }))
}

async fn api(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let services = fetch_all(&state).await?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(services))
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let services = fetch_all(&state).await?;
    Ok(HttpResponse::Ok().json(services))
}

async fn create(
    state: web::Data<AppState>,
    form: web::Form<ServiceForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let (name, price, duration) = validated(&form)?;

    let id = next_id(&state.db, Entity::Service).await?;
    sqlx::query(
        r#"INSERT INTO services (id, name, description, price, duration_minutes, image)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(name)
    .bind(form.description.trim())
    .bind(price)
    .bind(duration)
    .bind(optional(&form.image))
    .execute(&state.db)
    .await?;

    Ok(see_other("/servicios"))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<ServiceForm>,
) -> Result<HttpResponse, AppError> {
    let service_id = path.into_inner();
    let form = form.into_inner();
    let (name, price, duration) = validated(&form)?;

    let result = sqlx::query(
        r#"UPDATE services
              SET name = ?, description = ?, price = ?, duration_minutes = ?, image = ?
            WHERE id = ?"#,
    )
    .bind(name)
    .bind(form.description.trim())
    .bind(price)
    .bind(duration)
    .bind(optional(&form.image))
    .bind(&service_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/servicios"))
}

async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let service_id = path.into_inner();

    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(&service_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/servicios"))
}

fn validated(form: &ServiceForm) -> Result<(&str, f64, i64), AppError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Nombre requerido".into()));
    }
    let price: f64 = form
        .price
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput("Precio inválido".into()))?;
    let duration: i64 = form
        .duration_minutes
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput("Duración inválida".into()))?;
    if price < 0.0 || duration <= 0 {
        return Err(AppError::InvalidInput("Precio o duración inválidos".into()));
    }
    Ok((name, price, duration))
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location.to_owned()))
        .finish()
}
