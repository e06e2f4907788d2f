use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use askama::Template;
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::{
        clear_session_cookie, create_session, destroy_session, load_session, safe_next,
        session_cookie, verify_password,
    },
    errors::AppError,
    models::{Role, UserRow},
    state::AppState,
    templates::{render, render_status},
};

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: String,
    has_error: bool,
    signed_out: bool,
    next: String,
    username: String,
}

impl LoginTemplate {
    fn blank(next: &str, signed_out: bool) -> Self {
        Self {
            error: String::new(),
            has_error: false,
            signed_out,
            next: next.to_owned(),
            username: String::new(),
        }
    }

    fn failed(next: &str, username: &str, error: &str) -> Self {
        Self {
            error: error.to_owned(),
            has_error: true,
            signed_out: false,
            next: next.to_owned(),
            username: username.to_owned(),
        }
    }
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
    out: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(rename = "nombreUsuario")]
    username: String,
    #[serde(rename = "contrasena")]
    password: String,
    #[serde(rename = "recordarme")]
    remember: Option<String>,
    next: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/login")
            .service(
                web::resource("")
                    .route(web::get().to(show))
                    .route(web::post().to(submit)),
            )
            .service(web::resource("/logout").route(web::get().to(logout))),
    );
}

/// Re-requesting the login page with a live session goes straight to the
/// role's landing page.
async fn show(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> Result<HttpResponse> {
    if let Some(session) = load_session(&state.db, &req).await {
        return Ok(HttpResponse::Found()
            .append_header((header::LOCATION, session.role.landing()))
            .finish());
    }

    let next = query.next.as_deref().map(safe_next).unwrap_or("");
    let signed_out = query.out.as_deref() == Some("1");
    Ok(render(LoginTemplate::blank(next, signed_out)))
}

async fn submit(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let username = form.username.trim().to_owned();
    let next = query
        .next
        .as_deref()
        .or(form.next.as_deref())
        .map(safe_next)
        .unwrap_or("")
        .to_owned();

    if username.is_empty() || form.password.is_empty() {
        return Ok(render_status(
            LoginTemplate::failed(&next, &username, "Ingrese usuario y contraseña."),
            actix_web::http::StatusCode::BAD_REQUEST,
        ));
    }

    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, password_hash, role, email, created_at, last_login
           FROM users
           WHERE username = ?
           LIMIT 1"#,
    )
    .bind(&username)
    .fetch_optional(&state.db)
    .await?;

    let Some(user) = user else {
        return Ok(failed_login(&next, &username));
    };
    if !verify_password(&form.password, &user.password_hash) {
        return Ok(failed_login(&next, &username));
    }
    let Some(role) = Role::parse(&user.role) else {
        log::error!("User {} carries unknown role {:?}", user.id, user.role);
        return Ok(failed_login(&next, &username));
    };

    // Client and barber logins must resolve to a domain record; a dangling
    // account cannot be scoped and is rejected outright.
    let mut client_id = None;
    let mut barber_id = None;
    match role {
        Role::Client => {
            client_id = sqlx::query_scalar::<_, String>(
                "SELECT id FROM clients WHERE registered_by = ? LIMIT 1",
            )
            .bind(&user.username)
            .fetch_optional(&state.db)
            .await?;
            if client_id.is_none() {
                return Ok(render_status(
                    LoginTemplate::failed(
                        &next,
                        &username,
                        "Tu usuario no está vinculado a ningún cliente. Contacta al administrador.",
                    ),
                    actix_web::http::StatusCode::BAD_REQUEST,
                ));
            }
        }
        Role::Barber => {
            barber_id = sqlx::query_scalar::<_, String>(
                "SELECT id FROM barbers WHERE registered_by = ? LIMIT 1",
            )
            .bind(&user.username)
            .fetch_optional(&state.db)
            .await?;
            if barber_id.is_none() {
                return Ok(render_status(
                    LoginTemplate::failed(
                        &next,
                        &username,
                        "Tu usuario no está vinculado a ningún barbero. Contacta al administrador.",
                    ),
                    actix_web::http::StatusCode::BAD_REQUEST,
                ));
            }
        }
        Role::Admin => {}
    }

    let token = create_session(
        &state.db,
        &user.id,
        &user.username,
        role,
        client_id.as_deref(),
        barber_id.as_deref(),
    )
    .await?;

    let _ = sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&user.id)
        .execute(&state.db)
        .await;

    let target = if next.is_empty() {
        role.landing().to_owned()
    } else {
        next
    };

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, target))
        .cookie(session_cookie(&req, &token, form.remember.is_some()))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish())
}

fn failed_login(next: &str, username: &str) -> HttpResponse {
    render_status(
        LoginTemplate::failed(next, username, "Usuario o contraseña incorrectos."),
        actix_web::http::StatusCode::UNAUTHORIZED,
    )
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    destroy_session(&state.db, &req).await;
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/login?out=1"))
        .cookie(clear_session_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}
