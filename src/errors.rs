use actix_web::{HttpResponse, ResponseError};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Db(sqlx::Error),
    Migrate(sqlx::migrate::MigrateError),
    /// The backing store could not be reached. Retryable by the operator.
    StoreUnavailable(String),
    /// A meeting row could not be created or resolved.
    RegistrationFailed(String),
    /// A superseded load tried to write view state.
    StaleLoad,
    InvalidInput(String),
    InvalidState(String),
    ConfirmationMismatch,
    Session(String),
    NotFound,
}

impl AppError {
    /// Whether a caller may simply retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_) | AppError::RegistrationFailed(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Db(e) => write!(f, "Database error: {e}"),
            AppError::Migrate(e) => write!(f, "Migration error: {e}"),
            AppError::StoreUnavailable(e) => write!(f, "Backing store unavailable: {e}"),
            AppError::RegistrationFailed(e) => write!(f, "Meeting registration failed: {e}"),
            AppError::StaleLoad => write!(f, "Superseded load discarded"),
            AppError::InvalidInput(e) => write!(f, "Invalid input: {e}"),
            AppError::InvalidState(e) => write!(f, "Invalid state: {e}"),
            AppError::ConfirmationMismatch => write!(f, "Confirmation text does not match"),
            AppError::Session(e) => write!(f, "Session error: {e}"),
            AppError::NotFound => write!(f, "Not found"),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::NotFound => HttpResponse::NotFound().json(serde_json::json!({ "error": "Not Found" })),
            AppError::InvalidInput(_) | AppError::ConfirmationMismatch => {
                HttpResponse::BadRequest().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::InvalidState(_) | AppError::StaleLoad => {
                HttpResponse::Conflict().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::StoreUnavailable(_) | AppError::RegistrationFailed(_) => {
                log::warn!("{self}");
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "Attendance could not be saved right now. Please try again.",
                    "retryable": true,
                }))
            }
            _ => {
                log::error!("{self}");
                HttpResponse::InternalServerError().json(serde_json::json!({ "error": "Internal Server Error" }))
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AppError::StoreUnavailable(e.to_string()),
            other => AppError::Db(other),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::Migrate(e)
    }
}
