use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::validate::ValidationError;

#[derive(Debug, Error, Diagnostic)]
pub enum GateError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(guestgate::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(guestgate::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(guestgate::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(guestgate::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("{0}")]
    #[diagnostic(code(guestgate::other))]
    Other(String),
}

/// Outcome taxonomy of a refused or failed issuance.
///
/// Only the first three variants carry a client-facing message; storage and
/// internal failures collapse to a generic 500 body.
#[derive(Debug, Error, Diagnostic)]
pub enum IssueError {
    #[error(transparent)]
    #[diagnostic(code(guestgate::issue::validation_failed))]
    Validation(#[from] ValidationError),

    #[error("Login not found or inactive")]
    #[diagnostic(
        code(guestgate::issue::login_not_found),
        help("Named logins are provisioned by the operator; check the username and its active flag")
    )]
    LoginNotFound,

    #[error("No vouchers available")]
    #[diagnostic(
        code(guestgate::issue::no_vouchers_available),
        help("Import more codes with --vouchers <file>")
    )]
    NoVouchersAvailable,

    #[error("Store unavailable: {0}")]
    #[diagnostic(code(guestgate::issue::store_unavailable))]
    StoreUnavailable(#[source] GateError),

    #[error("Internal error: {0}")]
    #[diagnostic(code(guestgate::issue::internal))]
    Internal(String),
}

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

impl IssueError {
    pub fn status(&self) -> StatusCode {
        match self {
            IssueError::Validation(_)
            | IssueError::LoginNotFound
            | IssueError::NoVouchersAvailable => StatusCode::BAD_REQUEST,
            IssueError::StoreUnavailable(_) | IssueError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand back to the guest.
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::BAD_REQUEST => self.to_string(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<GateError> for IssueError {
    fn from(value: GateError) -> Self {
        match value {
            GateError::Db(_) => IssueError::StoreUnavailable(value),
            other => IssueError::Internal(other.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for IssueError {
    fn from(value: sea_orm::DbErr) -> Self {
        IssueError::StoreUnavailable(GateError::Db(value))
    }
}

impl IntoResponse for IssueError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Issuance failed");
        }
        let body = json!({ "message": self.public_message() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_errors_are_client_errors() {
        assert_eq!(IssueError::LoginNotFound.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            IssueError::NoVouchersAvailable.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IssueError::Validation(ValidationError::InvalidPhone).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn storage_detail_is_not_exposed() {
        let err: IssueError =
            sea_orm::DbErr::Custom("disk I/O error at /var/lib/guestgate.db".into()).into();
        assert!(matches!(err, IssueError::StoreUnavailable(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn validation_message_passes_through() {
        let err = IssueError::from(ValidationError::InvalidEmail);
        assert_eq!(err.public_message(), "Invalid email address");
    }
}
