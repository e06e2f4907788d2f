use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::auth::hash_password;
use crate::ids::{next_id, Entity};
use crate::models::Role;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Creates the parent directory of a file-backed sqlite URL so the first
/// connect does not fail on a missing path.
pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let Some(raw) = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };

    let raw = raw.split('?').next().unwrap_or(raw);
    let raw = raw.strip_prefix("file:").unwrap_or(raw);
    if raw.is_empty() || raw == ":memory:" {
        return Ok(());
    }

    if let Some(parent) = Path::new(raw).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Makes sure an admin login exists so a fresh database is reachable.
pub async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Admin.as_str())
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash =
        hash_password(&password).map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let user_id = next_id(pool, Entity::User).await?;

    sqlx::query(
        r#"INSERT INTO users (id, username, password_hash, role, email, created_at)
           VALUES (?, ?, ?, ?, '', ?)"#,
    )
    .bind(user_id)
    .bind(username)
    .bind(password_hash)
    .bind(Role::Admin.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Expired sessions pile up only until the next boot.
pub async fn prune_sessions(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
