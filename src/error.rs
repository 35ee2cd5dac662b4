use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::repo::RepoError;
use crate::sink::SinkError;
use crate::validate::ValidationError;

/// Every error leaves the service in this shape.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid JSON")] InvalidJson,
    #[error("Missing required fields")] MissingFields(Vec<String>),
    #[error("Invalid email")] InvalidEmail,
    #[error("Invalid ID")] InvalidId,
    #[error("No updatable fields")] NoUpdatableFields,
    #[error("Unauthorized")] Unauthorized,
    #[error("Turnstile validation failed")] VerificationFailed,
    #[error("Not found")] NotFound,
    #[error("Method not allowed")] MethodNotAllowed,
    #[error("Too many requests")] RateLimited,
    #[error("DB error")] Storage,
    #[error("Email delivery failed")] Delivery,
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::MissingFields(f) => ApiError::MissingFields(f.into_iter().map(String::from).collect()),
            ValidationError::InvalidEmail => ApiError::InvalidEmail,
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Internal(msg) => {
                tracing::error!(error = %msg, "booking store failure");
                ApiError::Storage
            }
        }
    }
}

impl From<SinkError> for ApiError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::Storage(inner) => inner.into(),
            SinkError::Delivery(inner) => {
                tracing::error!(error = %inner, "booking notification failure");
                ApiError::Delivery
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson
            | ApiError::MissingFields(_)
            | ApiError::InvalidEmail
            | ApiError::InvalidId
            | ApiError::NoUpdatableFields => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::VerificationFailed => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Delivery => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let fields = match self {
            ApiError::MissingFields(f) => Some(f.clone()),
            _ => None,
        };
        let mut res = HttpResponse::build(self.status_code());
        if matches!(self, ApiError::Unauthorized) {
            res.insert_header((header::WWW_AUTHENTICATE, r#"Basic realm="Admin""#));
        }
        res.json(ApiErrorBody { error: self.to_string(), fields })
    }
}
