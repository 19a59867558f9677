use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use strum_macros::AsRefStr;

use crate::directory::DirectoryError;
use crate::model::leave_request::LeaveStatus;
use crate::store::StoreError;
use crate::utils::response::ApiResponse;

/// Stable classification carried in every failed response's `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum ErrorKind {
    #[strum(serialize = "VALIDATION_ERROR")]
    Validation,
    #[strum(serialize = "NOT_FOUND")]
    NotFound,
    #[strum(serialize = "AUTHORIZATION_ERROR")]
    Authorization,
    #[strum(serialize = "STATE_CONFLICT")]
    StateConflict,
    #[strum(serialize = "DEPENDENCY_ERROR")]
    Dependency,
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ConflictReason {
    #[display(fmt = "leave request is already {}", _0)]
    AlreadyTerminal(LeaveStatus),
    #[display(fmt = "leave request changed while it was being processed, reload and retry")]
    ConcurrentUpdate,
    #[display(fmt = "could not allocate a unique apply number after {} attempts", _0)]
    NumberingExhausted(u32),
}

#[derive(Debug, Display)]
pub enum WorkflowError {
    #[display(fmt = "{}", _0)]
    Validation(String),
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Authorization(String),
    #[display(fmt = "{}", _0)]
    StateConflict(ConflictReason),
    #[display(fmt = "{}", _0)]
    Dependency(String),
}

impl std::error::Error for WorkflowError {}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::NotFound(_) => ErrorKind::NotFound,
            WorkflowError::Authorization(_) => ErrorKind::Authorization,
            WorkflowError::StateConflict(_) => ErrorKind::StateConflict,
            WorkflowError::Dependency(_) => ErrorKind::Dependency,
        }
    }
}

impl ResponseError for WorkflowError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::Dependency => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(ApiResponse::failure(self.kind().as_ref(), self.to_string()))
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Record store call failed");
        WorkflowError::Dependency("leave record store is unavailable".to_string())
    }
}

impl From<DirectoryError> for WorkflowError {
    fn from(err: DirectoryError) -> Self {
        tracing::error!(error = %err, "Directory lookup failed");
        WorkflowError::Dependency("directory lookup failed".to_string())
    }
}
