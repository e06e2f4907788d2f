use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::Session,
    errors::AppError,
    guards::require_staff,
    ids::{next_id, Entity},
    models::{BarberRow, STATUS_ACTIVE},
    state::AppState,
};

#[derive(Deserialize)]
struct BarberForm {
    #[serde(rename = "Nombre", default)]
    first_name: String,
    #[serde(rename = "Apellido1", default)]
    last_name1: String,
    #[serde(rename = "Apellido2", default)]
    last_name2: String,
    #[serde(rename = "Telefono", default)]
    phone: String,
    #[serde(rename = "CorreoElectronico", default)]
    email: String,
    #[serde(rename = "FechaNacimiento", default)]
    birth_date: String,
    #[serde(rename = "Estado", default)]
    status: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/barberos")
            .wrap(from_fn(require_staff))
            .service(web::resource("").route(web::get().to(list)))
            .service(web::resource("/agregar").route(web::post().to(create)))
            .service(web::resource("/editar/{id}").route(web::post().to(update)))
            .service(web::resource("/eliminar/{id}").route(web::post().to(delete))),
    );
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let rows = sqlx::query_as::<_, BarberRow>(
        r#"SELECT id, first_name, last_name1, last_name2, phone, email,
                  birth_date, hired_on, status, registered_by
           FROM barbers
           ORDER BY first_name, last_name1"#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Form<BarberForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    if form.first_name.trim().is_empty() {
        return Err(AppError::InvalidInput("Nombre requerido".into()));
    }

    let id = next_id(&state.db, Entity::Barber).await?;
    sqlx::query(
        r#"INSERT INTO barbers
               (id, first_name, last_name1, last_name2, phone, email, birth_date,
                hired_on, status, registered_by)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(form.first_name.trim())
    .bind(form.last_name1.trim())
    .bind(form.last_name2.trim())
    .bind(form.phone.trim())
    .bind(form.email.trim())
    .bind(optional(&form.birth_date))
    .bind(Utc::now().format("%Y-%m-%d").to_string())
    .bind(STATUS_ACTIVE)
    .bind(&session.username)
    .execute(&state.db)
    .await?;

    Ok(see_other("/barberos?msg=creado"))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<BarberForm>,
) -> Result<HttpResponse, AppError> {
    let barber_id = path.into_inner();
    let form = form.into_inner();
    let status = if form.status.trim().is_empty() {
        STATUS_ACTIVE.to_owned()
    } else {
        form.status.trim().to_owned()
    };

    let result = sqlx::query(
        r#"UPDATE barbers
              SET first_name = ?, last_name1 = ?, last_name2 = ?, phone = ?,
                  email = ?, birth_date = ?, status = ?
            WHERE id = ?"#,
    )
    .bind(form.first_name.trim())
    .bind(form.last_name1.trim())
    .bind(form.last_name2.trim())
    .bind(form.phone.trim())
    .bind(form.email.trim())
    .bind(optional(&form.birth_date))
    .bind(&status)
    .bind(&barber_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/barberos?msg=actualizado"))
}

async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let barber_id = path.into_inner();

    let result = sqlx::query("DELETE FROM barbers WHERE id = ?")
        .bind(&barber_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/barberos?msg=eliminado"))
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
