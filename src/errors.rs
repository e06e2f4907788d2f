use actix_web::{http::StatusCode, HttpResponse, ResponseError};

/// Request-level failures. Business-rule violations map to 400-class
/// responses with their message; database errors are logged server-side and
/// surfaced as an opaque 500. Missing-session failures never reach this type:
/// the auth gate answers those itself so it can negotiate between a JSON 401
/// and a login redirect.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authorized")]
    Forbidden,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0} does not exist")]
    ReferenceNotFound(String),
    #[error("Insufficient stock for product {0}")]
    InsufficientStock(String),
    #[error("Username is already taken")]
    DuplicateUser,
    #[error("The operation timed out")]
    Timeout,
    #[error("database error")]
    Db(#[from] sqlx::Error),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidInput(_)
            | AppError::ReferenceNotFound(_)
            | AppError::InsufficientStock(_)
            | AppError::DuplicateUser => StatusCode::BAD_REQUEST,
            AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Db(err) => {
                log::error!("Database error: {err}");
                HttpResponse::InternalServerError().body("Internal server error")
            }
            other => HttpResponse::build(other.status_code()).body(other.to_string()),
        }
    }
}
