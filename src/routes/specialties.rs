use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::AppError,
    guards::require_staff,
    models::SpecialtyRow,
    state::AppState,
};

#[derive(Deserialize)]
struct SpecialtyForm {
    #[serde(rename = "Nombre", default)]
    name: String,
    #[serde(rename = "Codigo", default)]
    code: String,
}

/// Checkbox sets arrive as one value or a list depending on how many were
/// ticked.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdSelection {
    Many(Vec<i64>),
    One(i64),
}

impl IdSelection {
    fn into_vec(self) -> Vec<i64> {
        match self {
            IdSelection::Many(ids) => ids,
            IdSelection::One(id) => vec![id],
        }
    }
}

#[derive(Deserialize)]
struct AssignmentBody {
    #[serde(default)]
    especialidades: Option<IdSelection>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/especialidades")
            .wrap(from_fn(require_staff))
            .service(web::resource("").route(web::get().to(list)))
            .service(web::resource("/agregar").route(web::post().to(create)))
            .service(web::resource("/editar/{id}").route(web::post().to(update)))
            .service(
                web::resource("/barbero/{barbero_id}")
                    .route(web::get().to(barber_assignments))
                    .route(web::post().to(save_assignments)),
            ),
    );
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let rows = sqlx::query_as::<_, SpecialtyRow>(
        "SELECT id, code, name FROM specialties ORDER BY code, name",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    form: web::Form<SpecialtyForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    if form.name.trim().is_empty() {
        return Err(AppError::InvalidInput("Nombre requerido".into()));
    }

    sqlx::query("INSERT INTO specialties (code, name) VALUES (?, ?)")
        .bind(form.code.trim())
        .bind(form.name.trim())
        .execute(&state.db)
        .await?;

    Ok(see_other("/especialidades"))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    form: web::Form<SpecialtyForm>,
) -> Result<HttpResponse, AppError> {
    let specialty_id = path.into_inner();
    let form = form.into_inner();

    let result = sqlx::query("UPDATE specialties SET name = ?, code = ? WHERE id = ?")
        .bind(form.name.trim())
        .bind(form.code.trim())
        .bind(specialty_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/especialidades"))
}

async fn barber_assignments(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let barber_id = path.into_inner();

    let all = sqlx::query_as::<_, SpecialtyRow>(
        "SELECT id, code, name FROM specialties ORDER BY code, name",
    )
    .fetch_all(&state.db)
    .await?;

    let assigned: Vec<i64> = sqlx::query_scalar(
        "SELECT specialty_id FROM barber_specialties WHERE barber_id = ?",
    )
    .bind(&barber_id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "barberoId": barber_id,
        "especialidades": all,
        "asignadas": assigned,
    })))
}

/// Replaces a barber's assignments wholesale; delete and reinsert inside one
/// transaction.
async fn save_assignments(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AssignmentBody>,
) -> Result<HttpResponse, AppError> {
    let barber_id = path.into_inner();
    let ids = body
        .into_inner()
        .especialidades
        .map(IdSelection::into_vec)
        .unwrap_or_default();

    let mut tx = state.db.begin().await?;

    sqlx::query("DELETE FROM barber_specialties WHERE barber_id = ?")
        .bind(&barber_id)
        .execute(&mut *tx)
        .await?;

    for specialty_id in ids {
        sqlx::query("INSERT INTO barber_specialties (barber_id, specialty_id) VALUES (?, ?)")
            .bind(&barber_id)
            .bind(specialty_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(see_other(&format!("/especialidades/barbero/{barber_id}?ok=1")))
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location.to_owned()))
        .finish()
}
