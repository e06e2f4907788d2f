use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::Session,
    errors::AppError,
    guards::{require_auth, scope_client, ScopeContext},
    ids::{next_id, Entity},
    models::{ClientRow, STATUS_ACTIVE},
    state::AppState,
};

#[derive(Deserialize)]
struct ClientForm {
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
    #[serde(rename = "Direccion", default)]
    address: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/clientes")
            .wrap(from_fn(scope_client))
            .wrap(from_fn(require_auth))
            .service(web::resource("").route(web::get().to(list)))
            .service(web::resource("/agregar").route(web::post().to(create)))
            .service(web::resource("/editar/{id}").route(web::post().to(update)))
            .service(web::resource("/eliminar/{id}").route(web::post().to(delete))),
    );
}

/// A client sees their own record; staff see the full roster.
async fn list(
    state: web::Data<AppState>,
    scope: web::ReqData<ScopeContext>,
) -> Result<HttpResponse, AppError> {
    const SELECT: &str = r#"SELECT id, first_name, last_name1, last_name2, phone, email,
       birth_date, address, status, registered_on, registered_by
FROM clients"#;

    let rows = if let Some(own) = scope.client_id.as_deref() {
        sqlx::query_as::<_, ClientRow>(&format!("{SELECT} WHERE id = ?"))
            .bind(own)
            .fetch_all(&state.db)
            .await?
    } else {
        sqlx::query_as::<_, ClientRow>(&format!("{SELECT} ORDER BY first_name, last_name1"))
            .fetch_all(&state.db)
            .await?
    };

    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Form<ClientForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    if form.first_name.trim().is_empty() || form.last_name1.trim().is_empty() {
        return Err(AppError::InvalidInput("Nombre y apellido requeridos".into()));
    }

    let id = next_id(&state.db, Entity::Client).await?;
    sqlx::query(
        r#"INSERT INTO clients
               (id, first_name, last_name1, last_name2, phone, email, birth_date,
                address, status, registered_on, registered_by)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(form.first_name.trim())
    .bind(form.last_name1.trim())
    .bind(form.last_name2.trim())
    .bind(form.phone.trim())
    .bind(form.email.trim())
    .bind(optional(&form.birth_date))
    .bind(form.address.trim())
    .bind(STATUS_ACTIVE)
    .bind(Utc::now().format("%Y-%m-%d").to_string())
    .bind(&session.username)
    .execute(&state.db)
    .await?;

    Ok(see_other("/clientes"))
}

async fn update(
    state: web::Data<AppState>,
    scope: web::ReqData<ScopeContext>,
    path: web::Path<String>,
    form: web::Form<ClientForm>,
) -> Result<HttpResponse, AppError> {
    let client_id = path.into_inner();
    let form = form.into_inner();

    const UPDATE_BASE: &str = r#"UPDATE clients
       SET first_name = ?, last_name1 = ?, last_name2 = ?, phone = ?,
           email = ?, birth_date = ?, address = ?
     WHERE id = ?"#;

    let result = if let Some(own) = scope.client_id.as_deref() {
        sqlx::query(&format!("{UPDATE_BASE} AND id = ?"))
            .bind(form.first_name.trim())
            .bind(form.last_name1.trim())
            .bind(form.last_name2.trim())
            .bind(form.phone.trim())
            .bind(form.email.trim())
            .bind(optional(&form.birth_date))
            .bind(form.address.trim())
            .bind(&client_id)
            .bind(own)
            .execute(&state.db)
            .await?
    } else {
        sqlx::query(UPDATE_BASE)
            .bind(form.first_name.trim())
            .bind(form.last_name1.trim())
            .bind(form.last_name2.trim())
            .bind(form.phone.trim())
            .bind(form.email.trim())
            .bind(optional(&form.birth_date))
            .bind(form.address.trim())
            .bind(&client_id)
            .execute(&state.db)
            .await?
    };

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/clientes"))
}

async fn delete(
    state: web::Data<AppState>,
    scope: web::ReqData<ScopeContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let client_id = path.into_inner();

    let result = if let Some(own) = scope.client_id.as_deref() {
        sqlx::query("DELETE FROM clients WHERE id = ? AND id = ?")
            .bind(&client_id)
            .bind(own)
            .execute(&state.db)
            .await?
    } else {
        sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(&client_id)
            .execute(&state.db)
            .await?
    };

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/clientes"))
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
