//! Typed errors and HTTP mapping.

use crate::migration::MigrationError;
use crate::value::ValueError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum EntityError {
    #[error("unknown field {0:?}")]
    UnknownField(String),
    #[error("unknown field {0:?} in filter")]
    UnknownFieldInFilter(String),
    #[error("invalid filter expression: {0}")]
    InvalidFilterExpression(String),
    #[error("invalid value for field {field:?}: {source}")]
    InvalidValue {
        field: String,
        #[source]
        source: ValueError,
    },
    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(String),
    #[error("not found")]
    NotFound,
    #[error("database: {0}")]
    DbUnhandled(#[source] sqlx::Error),
    #[error("database call exceeded {0:?}")]
    Timeout(Duration),
    #[error("migration: {0}")]
    Migration(#[from] MigrationError),
}

impl From<sqlx::Error> for EntityError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => EntityError::NotFound,
            other => EntityError::DbUnhandled(other),
        }
    }
}

impl EntityError {
    pub(crate) fn invalid_value(field: impl Into<String>, source: ValueError) -> Self {
        EntityError::InvalidValue {
            field: field.into(),
            source,
        }
    }

    /// Stable machine-readable tag.
    pub fn tag(&self) -> &'static str {
        match self {
            EntityError::UnknownField(_) => "UNKNOWN_FIELD",
            EntityError::UnknownFieldInFilter(_) => "UNKNOWN_FIELD_IN_FILTER",
            EntityError::InvalidFilterExpression(_) => "INVALID_FILTER_EXPRESSION",
            EntityError::InvalidValue { .. } => "INVALID_VALUE",
            EntityError::InvalidCursor(_) => "INVALID_PAGINATION_CURSOR",
            EntityError::NotFound => "NOT_FOUND",
            EntityError::DbUnhandled(_) => "UNHANDLED_DATABASE_ERROR",
            EntityError::Timeout(_) => "DATABASE_TIMEOUT",
            EntityError::Migration(_) => "MIGRATION_FAILED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EntityError::UnknownField(_)
            | EntityError::UnknownFieldInFilter(_)
            | EntityError::InvalidFilterExpression(_)
            | EntityError::InvalidValue { .. }
            | EntityError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            EntityError::NotFound => StatusCode::NOT_FOUND,
            EntityError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EntityError::DbUnhandled(_) | EntityError::Migration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for EntityError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, code = self.tag(), "internal error");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.tag().to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}
