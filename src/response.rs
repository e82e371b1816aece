//! Localized response envelopes.

use serde::Serialize;
use std::sync::Arc;

use crate::errors::RepositoryError;
use crate::locale::Locale;
use crate::pagination::PaginateResult;
use crate::users::ServiceError;

pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// Response types; each doubles as the locale key of its message.
pub mod kind {
    pub const DEFAULT: &str = "DEFAULT";
    pub const LOGIN: &str = "LOGIN";
    pub const SIGNUP: &str = "SIGNUP";
    pub const PROFILE: &str = "PROFILE";
    pub const ERROR: &str = "ERROR";
    pub const UNAUTHORIZED_ACCESS: &str = "UNAUTHORIZED_ACCESS";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
    pub const EMAIL_ALREADY_EXIST: &str = "EMAIL_ALREADY_EXIST";
    pub const INVALID_ID: &str = "INVALID_ID";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code < 400
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub status_code: u16,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub data: Vec<T>,
    pub total: u64,
    pub page: i64,
    pub limit: i64,
}

/// Builds envelopes whose messages come from `locale` in language `lang`.
#[derive(Debug, Clone)]
pub struct Responses {
    locale: Arc<Locale>,
    lang: String,
}

impl Responses {
    #[must_use]
    pub fn new(locale: Arc<Locale>, lang: &str) -> Self {
        Self { locale, lang: lang.to_string() }
    }

    #[must_use]
    pub fn lang(&self) -> &str {
        &self.lang
    }

    fn build<T>(&self, status_code: u16, kind: &str, data: Option<T>) -> ApiResponse<T> {
        ApiResponse {
            status_code,
            kind: kind.to_string(),
            message: self.locale.get(&self.lang, kind),
            data,
        }
    }

    #[must_use]
    pub fn default_ok(&self) -> ApiResponse<()> {
        self.build(status::OK, kind::DEFAULT, None)
    }

    pub fn details<T>(&self, data: T) -> ApiResponse<T> {
        self.build(status::OK, kind::DEFAULT, Some(data))
    }

    pub fn list<T>(&self, data: Vec<T>) -> ApiResponse<Vec<T>> {
        self.build(status::OK, kind::DEFAULT, Some(data))
    }

    pub fn list_paginated<T>(&self, page: PaginateResult<T>) -> ListResponse<T> {
        ListResponse {
            status_code: status::OK,
            kind: kind::DEFAULT.to_string(),
            message: self.locale.get(&self.lang, kind::DEFAULT),
            data: page.data,
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }

    pub fn signup<T>(&self, data: T) -> ApiResponse<T> {
        self.build(status::CREATED, kind::SIGNUP, Some(data))
    }

    pub fn login<T>(&self, data: T) -> ApiResponse<T> {
        self.build(status::OK, kind::LOGIN, Some(data))
    }

    pub fn profile<T>(&self, data: T) -> ApiResponse<T> {
        self.build(status::OK, kind::PROFILE, Some(data))
    }

    /// Error carrying `message` verbatim; status defaults to 400.
    #[must_use]
    pub fn error(&self, message: &str, status_code: Option<u16>) -> ApiResponse<()> {
        ApiResponse {
            status_code: status_code.unwrap_or(status::BAD_REQUEST),
            kind: kind::ERROR.to_string(),
            message: message.to_string(),
            data: None,
        }
    }

    #[must_use]
    pub fn unauthorized(&self) -> ApiResponse<()> {
        self.build(status::UNAUTHORIZED, kind::UNAUTHORIZED_ACCESS, None)
    }

    #[must_use]
    pub fn internal_server_error(&self) -> ApiResponse<()> {
        self.build(status::INTERNAL_SERVER_ERROR, kind::INTERNAL_SERVER_ERROR, None)
    }

    #[must_use]
    pub fn user_not_found(&self) -> ApiResponse<()> {
        self.build(status::BAD_REQUEST, kind::USER_NOT_FOUND, None)
    }

    #[must_use]
    pub fn email_already_exists(&self) -> ApiResponse<()> {
        self.build(status::BAD_REQUEST, kind::EMAIL_ALREADY_EXIST, None)
    }

    /// Maps a service failure onto its envelope. Persistence failures never
    /// leak their detail.
    #[must_use]
    pub fn from_error(&self, err: &ServiceError) -> ApiResponse<()> {
        match err {
            ServiceError::Validation(e) => self.error(&e.to_string(), None),
            ServiceError::EmailTaken(_) => self.email_already_exists(),
            ServiceError::Repository(RepositoryError::NotFound { .. }) => self.user_not_found(),
            ServiceError::Repository(RepositoryError::InvalidIdentifier(_)) => {
                self.build(status::BAD_REQUEST, kind::INVALID_ID, None)
            }
            ServiceError::Repository(RepositoryError::Persistence(_)) => self.internal_server_error(),
        }
    }
}
