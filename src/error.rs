use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

/// A single field that failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Unique keys of a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Npm,
    Email,
}

impl UniqueField {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniqueField::Npm => "npm",
            UniqueField::Email => "email",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            UniqueField::Npm => "NPM already exists",
            UniqueField::Email => "Email already exists",
        }
    }

    /// Picks the offending column out of a SQLite unique-constraint message,
    /// e.g. `UNIQUE constraint failed: users.npm`.
    fn from_constraint_message(message: &str) -> Option<Self> {
        if message.contains("users.npm") {
            Some(UniqueField::Npm)
        } else if message.contains("users.email") {
            Some(UniqueField::Email)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    Sqlx(sqlx::Error),
    PasswordHash(argon2::password_hash::Error),
    Jwt(jsonwebtoken::errors::Error),
    Io(std::io::Error),
    Validation {
        errors: Vec<FieldError>,
        payload: Option<Value>,
    },
    BadRequest(String),
    NotFound(&'static str),
    Conflict(UniqueField),
    LoginFail,
    Unauthorized,
    InvalidToken,
    Forbidden(&'static str),
}

impl AppError {
    pub fn invalid_field(field: &str, message: &str) -> Self {
        AppError::Validation {
            errors: vec![FieldError {
                field: field.to_string(),
                message: message.to_string(),
            }],
            payload: None,
        }
    }

    /// Attaches the submitted payload to a validation failure so the client
    /// can see what was rejected. Other errors pass through untouched.
    pub fn with_payload(self, echo: Option<Value>) -> Self {
        match self {
            AppError::Validation { errors, .. } => AppError::Validation {
                errors,
                payload: echo,
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Sqlx(_) | AppError::PasswordHash(_) | AppError::Jwt(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Validation { .. } | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::LoginFail | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::InvalidToken | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(inner: sqlx::Error) -> Self {
        // Another request may have taken the key between our pre-check and the write.
        if let Some(db_err) = inner.as_database_error() {
            if db_err.is_unique_violation() {
                if let Some(field) = UniqueField::from_constraint_message(db_err.message()) {
                    return AppError::Conflict(field);
                }
            }
        }
        AppError::Sqlx(inner)
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(inner: argon2::password_hash::Error) -> Self {
        AppError::PasswordHash(inner)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(inner: jsonwebtoken::errors::Error) -> Self {
        AppError::Jwt(inner)
    }
}

impl From<std::io::Error> for AppError {
    fn from(inner: std::io::Error) -> Self {
        AppError::Io(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        AppError::BadRequest(inner.body_text())
    }
}

// Malformed requests rejected by axum's own extractors answer with the same
// JSON body as every other client error.
impl From<JsonRejection> for AppError {
    fn from(inner: JsonRejection) -> Self {
        AppError::BadRequest(inner.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(inner: MultipartRejection) -> Self {
        AppError::BadRequest(inner.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(inner: PathRejection) -> Self {
        AppError::BadRequest(inner.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(inner: QueryRejection) -> Self {
        AppError::BadRequest(inner.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(inner: validator::ValidationErrors) -> Self {
        AppError::Validation {
            errors: crate::validation::field_errors(&inner),
            payload: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Sqlx(e) => {
                tracing::error!("Database error: {}", e);
                json!({ "message": "Internal Server Error" })
            }
            AppError::PasswordHash(e) => {
                tracing::error!("Password hashing error: {}", e);
                json!({ "message": "Internal Server Error" })
            }
            AppError::Jwt(e) => {
                tracing::error!("Token error: {}", e);
                json!({ "message": "Internal Server Error" })
            }
            AppError::Io(e) => {
                tracing::error!("File store error: {}", e);
                json!({ "message": "Internal Server Error" })
            }
            AppError::Validation { errors, payload } => {
                let summary = errors
                    .iter()
                    .map(|e| format!("{} {}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                let mut body = json!({
                    "message": format!("Validation failed: {}", summary),
                    "errors": errors,
                });
                if let Some(payload) = payload {
                    body["data"] = payload;
                }
                body
            }
            AppError::BadRequest(msg) => json!({ "message": msg }),
            AppError::NotFound(msg) => json!({ "message": msg }),
            AppError::Conflict(field) => json!({
                "message": field.message(),
                "field": field.as_str(),
            }),
            AppError::LoginFail => json!({ "message": "Invalid Password" }),
            AppError::Unauthorized => json!({ "message": "Access Denied, Token Required" }),
            AppError::InvalidToken => json!({ "message": "Invalid Token" }),
            AppError::Forbidden(msg) => json!({ "message": msg }),
        };

        (status, Json(body)).into_response()
    }
}
