//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the HTTP surface and
//! the repositories, along with the HTTP status mapping for the API edge.
//! Most variants are non-fatal by design: the handlers convert them into
//! form-level alerts or soft redirects rather than protocol errors.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Identity provider unreachable or rejected the authorization code.
    Exchange { message: String },
    /// ORCID iD failed the structural regex or the MOD 11-2 checksum.
    InvalidIdentifier { message: String },
    /// Campaign slug empty or containing whitespace.
    InvalidSlug { message: String },
    /// Campaign slug already taken.
    DuplicateSlug { message: String },
    /// Role/ownership gate refused the operation (soft denial, redirect).
    InsufficientPrivileges { message: String },
    /// Campaign (or other addressed record) does not exist.
    NotFound { message: String },
    /// Destructive action submitted without the literal confirmation token.
    ConfirmationMismatch { message: String },
    Io { message: String },
    Internal { message: String },
}

impl AppError {
    pub fn exchange<S: Into<String>>(msg: S) -> Self { AppError::Exchange { message: msg.into() } }
    pub fn invalid_identifier<S: Into<String>>(msg: S) -> Self { AppError::InvalidIdentifier { message: msg.into() } }
    pub fn invalid_slug<S: Into<String>>(msg: S) -> Self { AppError::InvalidSlug { message: msg.into() } }
    pub fn duplicate_slug<S: Into<String>>(msg: S) -> Self { AppError::DuplicateSlug { message: msg.into() } }
    pub fn insufficient<S: Into<String>>(msg: S) -> Self { AppError::InsufficientPrivileges { message: msg.into() } }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { AppError::NotFound { message: msg.into() } }
    pub fn confirmation<S: Into<String>>(msg: S) -> Self { AppError::ConfirmationMismatch { message: msg.into() } }
    pub fn io<S: Into<String>>(msg: S) -> Self { AppError::Io { message: msg.into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AppError::Internal { message: msg.into() } }

    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::Exchange { .. } => "exchange_error",
            AppError::InvalidIdentifier { .. } => "invalid_identifier",
            AppError::InvalidSlug { .. } => "invalid_slug",
            AppError::DuplicateSlug { .. } => "duplicate_slug",
            AppError::InsufficientPrivileges { .. } => "insufficient_privileges",
            AppError::NotFound { .. } => "not_found",
            AppError::ConfirmationMismatch { .. } => "confirmation_mismatch",
            AppError::Io { .. } => "io_error",
            AppError::Internal { .. } => "internal_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Exchange { message }
            | AppError::InvalidIdentifier { message }
            | AppError::InvalidSlug { message }
            | AppError::DuplicateSlug { message }
            | AppError::InsufficientPrivileges { message }
            | AppError::NotFound { message }
            | AppError::ConfirmationMismatch { message }
            | AppError::Io { message }
            | AppError::Internal { message } => message.as_str(),
        }
    }

    /// Map to HTTP status code for the raw API edge. Handlers that own a UX
    /// path (alerts, soft redirects) intercept before this mapping applies.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Exchange { .. } => 502,
            AppError::InvalidIdentifier { .. } => 422,
            AppError::InvalidSlug { .. } => 400,
            AppError::DuplicateSlug { .. } => 409,
            AppError::InsufficientPrivileges { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::ConfirmationMismatch { .. } => 400,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { message: err.to_string() }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Internal { message: err.to_string() }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io { message: err.to_string() }
    }
}
