use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{http::header, HttpRequest};
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand_core::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::Role;

pub const SESSION_COOKIE: &str = "barberia_session";

/// Server-side sessions outlive browser-session cookies by at most this much;
/// "remember me" cookies carry the same bound.
const SESSION_DAYS: i64 = 30;

/// Authenticated identity resolved from the session cookie. Inserted into
/// request extensions by the auth gate.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub client_id: Option<String>,
    pub barber_id: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    user_id: String,
    username: String,
    role: String,
    client_id: Option<String>,
    barber_id: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Mints a session row for a verified login and returns its opaque token.
pub async fn create_session(
    pool: &SqlitePool,
    user_id: &str,
    username: &str,
    role: Role,
    client_id: Option<&str>,
    barber_id: Option<&str>,
) -> Result<String, sqlx::Error> {
    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires = now + chrono::Duration::days(SESSION_DAYS);

    sqlx::query(
        r#"INSERT INTO sessions (token, user_id, username, role, client_id, barber_id, created_at, expires_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&token)
    .bind(user_id)
    .bind(username)
    .bind(role.as_str())
    .bind(client_id)
    .bind(barber_id)
    .bind(now.to_rfc3339())
    .bind(expires.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(token)
}

/// Resolves the session cookie against the store. Expired or unknown tokens
/// yield `None`; expired rows are dropped opportunistically.
pub async fn load_session(pool: &SqlitePool, req: &HttpRequest) -> Option<Session> {
    let token = req.cookie(SESSION_COOKIE)?.value().to_owned();
    let now = Utc::now().to_rfc3339();

    let row = sqlx::query_as::<_, SessionRow>(
        r#"SELECT user_id, username, role, client_id, barber_id
           FROM sessions
           WHERE token = ? AND expires_at > ?
           LIMIT 1"#,
    )
    .bind(&token)
    .bind(&now)
    .fetch_optional(pool)
    .await
    .ok()??;

    let role = Role::parse(&row.role)?;
    Some(Session {
        user_id: row.user_id,
        username: row.username,
        role,
        client_id: row.client_id,
        barber_id: row.barber_id,
    })
}

pub async fn destroy_session(pool: &SqlitePool, req: &HttpRequest) {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        let _ = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(cookie.value())
            .execute(pool)
            .await;
    }
}

pub fn session_cookie(req: &HttpRequest, token: &str, remember: bool) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, token.to_owned())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    if remember {
        builder = builder.max_age(Duration::days(SESSION_DAYS));
    }
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_session_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

/// XHR/fetch callers get structured errors; navigations get redirects and
/// plain text.
pub fn wants_json(req: &HttpRequest) -> bool {
    let accepts_json = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false);
    let is_xhr = req
        .headers()
        .get("X-Requested-With")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("XMLHttpRequest"))
        .unwrap_or(false);
    accepts_json || is_xhr
}

/// Keeps the post-login redirect target on this site. Anything absolute,
/// protocol-relative or pointing back at /login is discarded.
pub fn safe_next(url: &str) -> &str {
    if url.is_empty()
        || !url.starts_with('/')
        || url.starts_with("//")
        || url.starts_with("/login")
    {
        return "";
    }
    url
}

/// Percent-encodes a path for use inside the `next` query parameter.
pub fn encode_next(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("other", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("whatever", "not-a-phc-string"));
    }

    #[test]
    fn next_targets_stay_local() {
        assert_eq!(safe_next("/citas"), "/citas");
        assert_eq!(safe_next("https://evil.example"), "");
        assert_eq!(safe_next("//evil.example"), "");
        assert_eq!(safe_next("/login?next=/x"), "");
        assert_eq!(safe_next(""), "");
        assert_eq!(safe_next("citas"), "");
    }

    #[test]
    fn next_paths_are_percent_encoded() {
        assert_eq!(encode_next("/citas"), "%2Fcitas");
        assert_eq!(encode_next("/ventas/nueva"), "%2Fventas%2Fnueva");
    }
}
