use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use serde::Deserialize;

use crate::{
    auth::Session,
    errors::AppError,
    guards::{require_auth, scope_barber, scope_client, ScopeContext},
    ids::{next_id, Entity},
    models::{AppointmentRow, Role, APPT_PENDING},
    state::AppState,
};

const LIST_SELECT: &str = r#"SELECT a.id, a.client_id, a.barber_id, a.service_id,
       a.date, a.start_time, a.end_time, a.status, a.notes,
       c.first_name || ' ' || c.last_name1 AS client_name,
       b.first_name || ' ' || b.last_name1 AS barber_name,
       s.name AS service_name
FROM appointments a
JOIN clients c ON c.id = a.client_id
JOIN barbers b ON b.id = a.barber_id
JOIN services s ON s.id = a.service_id"#;

const LIST_ORDER: &str = "ORDER BY a.date DESC, a.start_time ASC";

#[derive(Deserialize)]
struct AppointmentForm {
    #[serde(rename = "ClienteID", default)]
    client_id: String,
    #[serde(rename = "BarberoID", default)]
    barber_id: String,
    #[serde(rename = "ServicioID", default)]
    service_id: String,
    #[serde(rename = "Fecha", default)]
    date: String,
    #[serde(rename = "HoraInicio", default)]
    start_time: String,
    #[serde(rename = "HoraFin", default)]
    end_time: String,
    #[serde(rename = "Estado", default)]
    status: Option<String>,
    #[serde(rename = "Notas", default)]
    notes: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/citas")
            .wrap(from_fn(scope_barber))
            .wrap(from_fn(scope_client))
            .wrap(from_fn(require_auth))
            .service(web::resource("").route(web::get().to(list)))
            .service(web::resource("/agregar").route(web::post().to(create)))
            .service(web::resource("/editar/{id}").route(web::post().to(update)))
            .service(web::resource("/eliminar/{id}").route(web::post().to(delete))),
    );
}

/// Clients and barbers see their own rows; admins see everything.
async fn list(
    state: web::Data<AppState>,
    scope: web::ReqData<ScopeContext>,
) -> Result<HttpResponse, AppError> {
    let rows = if let Some(client_id) = scope.client_id.as_deref() {
        sqlx::query_as::<_, AppointmentRow>(&format!(
            "{LIST_SELECT}\nWHERE a.client_id = ?\n{LIST_ORDER}"
        ))
        .bind(client_id)
        .fetch_all(&state.db)
        .await?
    } else if let Some(barber_id) = scope.barber_id.as_deref() {
        sqlx::query_as::<_, AppointmentRow>(&format!(
            "{LIST_SELECT}\nWHERE a.barber_id = ?\n{LIST_ORDER}"
        ))
        .bind(barber_id)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, AppointmentRow>(&format!("{LIST_SELECT}\n{LIST_ORDER}"))
            .fetch_all(&state.db)
            .await?
    };

    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Form<AppointmentForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let (client_id, barber_id) = forced_identities(&session, &form)?;
    let (start, end) = validated_times(&form)?;

    if client_id.is_empty() || barber_id.is_empty() || form.service_id.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "Cliente, barbero y servicio son requeridos".into(),
        ));
    }
    if form.date.trim().is_empty() {
        return Err(AppError::InvalidInput("Fecha requerida".into()));
    }

    let status = form
        .status
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(APPT_PENDING)
        .to_owned();

    let id = next_id(&state.db, Entity::Appointment).await?;
    sqlx::query(
        r#"INSERT INTO appointments
               (id, client_id, barber_id, service_id, date, start_time, end_time, status, notes, created_by)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&client_id)
    .bind(&barber_id)
    .bind(form.service_id.trim())
    .bind(form.date.trim())
    .bind(&start)
    .bind(&end)
    .bind(&status)
    .bind(form.notes.as_deref().unwrap_or(""))
    .bind(&session.username)
    .execute(&state.db)
    .await?;

    Ok(see_other("/citas"))
}

async fn update(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    scope: web::ReqData<ScopeContext>,
    path: web::Path<String>,
    form: web::Form<AppointmentForm>,
) -> Result<HttpResponse, AppError> {
    let appointment_id = path.into_inner();
    let form = form.into_inner();
    let (client_id, barber_id) = forced_identities(&session, &form)?;
    let (start, end) = validated_times(&form)?;

    let status = form
        .status
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(APPT_PENDING)
        .to_owned();
    let notes = form.notes.unwrap_or_default();

    const UPDATE_BASE: &str = r#"UPDATE appointments
       SET client_id = ?, barber_id = ?, service_id = ?, date = ?,
           start_time = ?, end_time = ?, status = ?, notes = ?
     WHERE id = ?"#;

    // The scope predicate rides along in the WHERE clause; "not yours" and
    // "does not exist" both come back as zero affected rows.
    let result = if let Some(own) = scope.client_id.as_deref() {
        sqlx::query(&format!("{UPDATE_BASE} AND client_id = ?"))
            .bind(&client_id)
            .bind(&barber_id)
            .bind(form.service_id.trim())
            .bind(form.date.trim())
            .bind(&start)
            .bind(&end)
            .bind(&status)
            .bind(&notes)
            .bind(&appointment_id)
            .bind(own)
            .execute(&state.db)
            .await?
    } else if let Some(own) = scope.barber_id.as_deref() {
        sqlx::query(&format!("{UPDATE_BASE} AND barber_id = ?"))
            .bind(&client_id)
            .bind(&barber_id)
            .bind(form.service_id.trim())
            .bind(form.date.trim())
            .bind(&start)
            .bind(&end)
            .bind(&status)
            .bind(&notes)
            .bind(&appointment_id)
            .bind(own)
            .execute(&state.db)
            .await?
    } else {
        sqlx::query(UPDATE_BASE)
            .bind(&client_id)
            .bind(&barber_id)
            .bind(form.service_id.trim())
            .bind(form.date.trim())
            .bind(&start)
            .bind(&end)
            .bind(&status)
            .bind(&notes)
            .bind(&appointment_id)
            .execute(&state.db)
            .await?
    };

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/citas"))
}

async fn delete(
    state: web::Data<AppState>,
    scope: web::ReqData<ScopeContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let appointment_id = path.into_inner();

    let result = if let Some(own) = scope.client_id.as_deref() {
        sqlx::query("DELETE FROM appointments WHERE id = ? AND client_id = ?")
            .bind(&appointment_id)
            .bind(own)
            .execute(&state.db)
            .await?
    } else if let Some(own) = scope.barber_id.as_deref() {
        sqlx::query("DELETE FROM appointments WHERE id = ? AND barber_id = ?")
            .bind(&appointment_id)
            .bind(own)
            .execute(&state.db)
            .await?
    } else {
        sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(&appointment_id)
            .execute(&state.db)
            .await?
    };

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/citas"))
}

/// Non-admin callers cannot pick identities: whatever the payload says, the
/// session's own linked IDs win.
fn forced_identities(
    session: &Session,
    form: &AppointmentForm,
) -> Result<(String, String), AppError> {
    let mut client_id = form.client_id.trim().to_owned();
    let mut barber_id = form.barber_id.trim().to_owned();
    match session.role {
        Role::Client => {
            client_id = session.client_id.clone().ok_or(AppError::Forbidden)?;
        }
        Role::Barber => {
            barber_id = session.barber_id.clone().ok_or(AppError::Forbidden)?;
        }
        Role::Admin => {}
    }
    Ok((client_id, barber_id))
}

fn validated_times(form: &AppointmentForm) -> Result<(String, String), AppError> {
    let start = parse_time(&form.start_time)
        .ok_or_else(|| AppError::InvalidInput("Hora inválida".into()))?;
    let end = parse_time(&form.end_time)
        .ok_or_else(|| AppError::InvalidInput("Hora inválida".into()))?;
    if minutes_of(end) <= minutes_of(start) {
        return Err(AppError::InvalidInput(
            "HoraInicio debe ser menor que HoraFin".into(),
        ));
    }
    Ok((format_time(start), format_time(end)))
}

/// "H:MM" or "HH:MM", 24-hour.
fn parse_time(value: &str) -> Option<(u32, u32)> {
    let (hours, mins) = value.trim().split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || mins.len() != 2 {
        return None;
    }
    let h: u32 = hours.parse().ok()?;
    let m: u32 = mins.parse().ok()?;
    (h <= 23 && m <= 59).then_some((h, m))
}

fn minutes_of((h, m): (u32, u32)) -> u32 {
    h * 60 + m
}

fn format_time((h, m): (u32, u32)) -> String {
    format!("{h:02}:{m:02}")
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location.to_owned()))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_parse_and_normalize() {
        assert_eq!(parse_time("9:30"), Some((9, 30)));
        assert_eq!(parse_time("09:30"), Some((9, 30)));
        assert_eq!(parse_time("23:59"), Some((23, 59)));
        assert_eq!(parse_time("24:00"), None);
        assert_eq!(parse_time("9:5"), None);
        assert_eq!(parse_time("930"), None);
        assert_eq!(parse_time(""), None);
        assert_eq!(format_time((9, 5)), "09:05");
    }
}
