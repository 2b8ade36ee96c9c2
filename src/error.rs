//! Request-level faults.
//!
//! None of these are reported to API clients in a structured way: the router
//! logs them and answers with the error page for [`AppError::status_code`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A key absent from a JSON payload.
    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("invalid literal for integer field `{field}`: {value}")]
    InvalidInteger { field: String, value: String },

    #[error("field `{0}` must be a string or scalar value")]
    InvalidText(String),

    #[error("JSON body must be an object")]
    NotAnObject,

    #[error("no record with id {0}")]
    RecordNotFound(i64),

    /// Missing query parameters or form fields, and unparseable JSON bodies.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("expected an application/json body, got {0:?}")]
    UnsupportedMediaType(String),
}

impl AppError {
    /// HTTP status of the error page answering this fault.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::UnsupportedMediaType(_) => 415,
            _ => 500,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
