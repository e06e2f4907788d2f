use actix_web::{http::StatusCode, web, HttpResponse, Result};
use askama::Template;
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::hash_password,
    errors::AppError,
    ids::{next_id, Entity},
    models::{Role, STATUS_ACTIVE},
    state::AppState,
    templates::{render, render_status},
};

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    error: String,
    has_error: bool,
    success: String,
    has_success: bool,
    username: String,
    email: String,
}

impl RegisterTemplate {
    fn blank() -> Self {
        Self {
            error: String::new(),
            has_error: false,
            success: String::new(),
            has_success: false,
            username: String::new(),
            email: String::new(),
        }
    }

    fn failed(form: &RegisterForm, error: &str) -> Self {
        Self {
            error: error.to_owned(),
            has_error: true,
            success: String::new(),
            has_success: false,
            username: form.username.clone(),
            email: form.email.clone(),
        }
    }
}

#[derive(Deserialize)]
struct RegisterForm {
    #[serde(rename = "nombreUsuario", default)]
    username: String,
    #[serde(rename = "correo", default)]
    email: String,
    #[serde(rename = "contrasena", default)]
    password: String,
    #[serde(rename = "rol", default)]
    role: String,
    #[serde(rename = "nombre", default)]
    first_name: String,
    #[serde(rename = "apellido1", default)]
    last_name1: String,
    #[serde(rename = "apellido2", default)]
    last_name2: String,
    #[serde(rename = "telefono", default)]
    phone: String,
    #[serde(rename = "fechaNacimiento", default)]
    birth_date: String,
    #[serde(rename = "direccion", default)]
    address: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/registro")
            .route(web::get().to(show))
            .route(web::post().to(submit)),
    );
}

async fn show() -> Result<HttpResponse> {
    Ok(render(RegisterTemplate::blank()))
}

async fn submit(
    state: web::Data<AppState>,
    form: web::Form<RegisterForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();

    let Some(role) = Role::parse(form.role.trim()) else {
        return Ok(reject(&form, "Rol inválido."));
    };
    if form.username.trim().is_empty() || form.email.trim().is_empty() || form.password.is_empty() {
        return Ok(reject(&form, "Complete usuario, correo y contraseña."));
    }
    if matches!(role, Role::Client | Role::Barber) {
        if !valid_name(&form.first_name) {
            return Ok(reject(&form, "Nombre inválido (solo letras y espacios)."));
        }
        if !valid_name(&form.last_name1) {
            return Ok(reject(&form, "Primer apellido inválido."));
        }
        if !form.last_name2.trim().is_empty() && !valid_name(&form.last_name2) {
            return Ok(reject(&form, "Segundo apellido inválido."));
        }
        if !form.phone.trim().is_empty() && !valid_phone(&form.phone) {
            return Ok(reject(&form, "Teléfono inválido."));
        }
    }

    let username = form.username.trim().to_owned();
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let birth_date = if form.birth_date.trim().is_empty() {
        None
    } else {
        Some(form.birth_date.trim().to_owned())
    };

    let mut tx = state.db.begin().await?;

    let duplicate: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(&mut *tx)
        .await?;
    if duplicate.is_some() {
        // Transaction drops here; nothing was written.
        return Ok(render_status(
            RegisterTemplate::failed(&form, "El nombre de usuario ya existe."),
            StatusCode::BAD_REQUEST,
        ));
    }

    match role {
        Role::Client => {
            let client_id = next_id(&mut *tx, Entity::Client).await?;
            sqlx::query(
                r#"INSERT INTO clients
                       (id, first_name, last_name1, last_name2, phone, email, birth_date,
                        address, status, registered_on, registered_by)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&client_id)
            .bind(form.first_name.trim())
            .bind(form.last_name1.trim())
            .bind(form.last_name2.trim())
            .bind(form.phone.trim())
            .bind(form.email.trim())
            .bind(&birth_date)
            .bind(form.address.trim())
            .bind(STATUS_ACTIVE)
            .bind(&today)
            .bind(&username)
            .execute(&mut *tx)
            .await?;
        }
        Role::Barber => {
            let barber_id = next_id(&mut *tx, Entity::Barber).await?;
            sqlx::query(
                r#"INSERT INTO barbers
                       (id, first_name, last_name1, last_name2, phone, email, birth_date,
                        hired_on, status, registered_by)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&barber_id)
            .bind(form.first_name.trim())
            .bind(form.last_name1.trim())
            .bind(form.last_name2.trim())
            .bind(form.phone.trim())
            .bind(form.email.trim())
            .bind(&birth_date)
            .bind(&today)
            .bind(STATUS_ACTIVE)
            .bind(&username)
            .execute(&mut *tx)
            .await?;
        }
        Role::Admin => {}
    }

    let password_hash = hash_password(&form.password)
        .map_err(|_| AppError::InvalidInput("No se pudo procesar la contraseña.".into()))?;
    let user_id = next_id(&mut *tx, Entity::User).await?;

    // The pre-check above can race another registration; the UNIQUE index
    // on username is the backstop.
    if let Err(err) = sqlx::query(
        r#"INSERT INTO users (id, username, password_hash, role, email, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&user_id)
    .bind(&username)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(form.email.trim())
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await
    {
        if err
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation())
        {
            return Err(AppError::DuplicateUser);
        }
        return Err(err.into());
    }

    tx.commit().await?;

    let mut page = RegisterTemplate::blank();
    page.success = "Usuario registrado correctamente. Ya puedes iniciar sesión.".to_owned();
    page.has_success = true;
    Ok(render(page))
}

fn reject(form: &RegisterForm, message: &str) -> HttpResponse {
    render_status(
        RegisterTemplate::failed(form, message),
        StatusCode::BAD_REQUEST,
    )
}

/// Letters (including Spanish accents) and spaces, 2 to 50 chars.
fn valid_name(value: &str) -> bool {
    let value = value.trim();
    let count = value.chars().count();
    (2..=50).contains(&count)
        && value
            .chars()
            .all(|c| c.is_alphabetic() || c.is_whitespace())
}

/// Digits plus the usual phone punctuation, 7 to 20 chars.
fn valid_phone(value: &str) -> bool {
    let value = value.trim();
    (7..=20).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '(' | ')' | '+' | '-' | ' '))
}
