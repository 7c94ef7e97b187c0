use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lazy_static::lazy_static;
use tracing::error;

lazy_static! {
    /// Full error detail is only rendered outside production.
    static ref DEV_MODE: bool = std::env::var("APP_ENV")
        .map(|v| v != "production")
        .unwrap_or(true);
}

/// Operational error taxonomy. Every domain error carries its own
/// user-facing message; `Internal` wraps everything unexpected.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid input data. {}", .0.join(". "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Conflict(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Store errors arrive wrapped in anyhow; recover the sqlx detail
    /// (missing rows, duplicate keys) when there is one.
    pub fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<sqlx::Error>() {
            Ok(db) => db.into(),
            Err(err) => Self::Internal(err),
        }
    }

    /// "fail" for 4xx, "error" for everything else.
    fn status_label(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "fail"
        } else {
            "error"
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                Self::NotFound("No document found with that ID".into())
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                Self::Conflict(duplicate_key_message(db.constraint()))
            }
            _ => Self::Internal(err.into()),
        }
    }
}

/// Turns a unique-constraint name like `users_email_key` into a
/// field-specific message.
fn duplicate_key_message(constraint: Option<&str>) -> String {
    let field = constraint
        .and_then(|c| {
            c.strip_suffix("_key")
                .and_then(|c| c.split_once('_'))
                .map(|(_, field)| field)
        })
        .unwrap_or("value");
    format!("Duplicate value for {field}. Please use another value")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let label = self.status_label();

        let body = match &self {
            Self::Internal(err) => {
                error!(error = ?err, "internal error");
                if *DEV_MODE {
                    serde_json::json!({
                        "status": label,
                        "message": err.to_string(),
                        "detail": format!("{err:?}"),
                    })
                } else {
                    serde_json::json!({
                        "status": label,
                        "message": "Something went wrong",
                    })
                }
            }
            _ => serde_json::json!({
                "status": label,
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
