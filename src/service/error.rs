use thiserror::Error;
use uuid::Uuid;
use axum::http::StatusCode;

use crate::{
    db::StoreError,
    error::{ErrorMessage, HttpError},
    models::referralmodel::ReferralStatus,
};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Referral link not found")]
    SlugNotFound(String),

    #[error("Referral not found")]
    ReferralNotFound(Uuid),

    #[error("Customer not found")]
    CustomerNotFound(String),

    #[error("Cannot mark a referral with status {from} as {to}")]
    InvalidTransition {
        id: Uuid,
        from: ReferralStatus,
        to: ReferralStatus,
    },

    #[error("Referral is already marked as rewarded")]
    AlreadyRewarded(Uuid),

    #[error("Referrer {0} has no email on file for the reward")]
    MissingPayoutDestination(Uuid),

    #[error("{0} is unavailable")]
    ExternalServiceUnavailable(String),

    #[error("Conflicting write on {0}")]
    Conflict(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("{0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(constraint) => ServiceError::Conflict(constraint),
            other => ServiceError::Store(other),
        }
    }
}

impl From<String> for ServiceError {
    fn from(err: String) -> Self {
        ServiceError::Other(err)
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::SlugNotFound(_)
            | ServiceError::ReferralNotFound(_)
            | ServiceError::CustomerNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::InvalidTransition { .. }
            | ServiceError::AlreadyRewarded(_)
            | ServiceError::MissingPayoutDestination(_)
            | ServiceError::MalformedEvent(_)
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::ExternalServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            ServiceError::Conflict(_) => StatusCode::CONFLICT,

            ServiceError::Store(_) | ServiceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!("Request failed: {}", error);
            return HttpError::server_error(ErrorMessage::ServerError.to_string());
        }
        if status == StatusCode::CONFLICT {
            return HttpError::unique_constraint_violation(error.to_string());
        }
        HttpError::new(error.to_string(), status)
    }
}
