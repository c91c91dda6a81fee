use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chatrelay_core::ChatError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Chat(ChatError::validation(message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::Chat(ChatError::not_found(message))
    }

    /// Machine-readable error kind, also used by the hub `error` event.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Chat(ChatError::Validation(_)) => "validation_error",
            AppError::Chat(ChatError::NotFound(_)) => "not_found",
            AppError::Chat(ChatError::EmptyResponse) => "empty_response",
            AppError::Chat(ChatError::RateLimited) => "rate_limited",
            AppError::Chat(ChatError::TransientStore(_)) => "store_unavailable",
            AppError::Chat(ChatError::Backend(_)) => "backend_error",
            AppError::Chat(ChatError::Cancelled) => "cancelled",
            AppError::Chat(ChatError::Internal(_)) => "api_error",
        }
    }
}

impl From<chatrelay_store::StoreError> for AppError {
    fn from(error: chatrelay_store::StoreError) -> Self {
        AppError::Chat(error.into())
    }
}

#[derive(Serialize)]
struct JsonError {
    message: String,
    r#type: String,
}

#[derive(Serialize)]
struct JsonErrorWrapper {
    error: JsonError,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Chat(ChatError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Chat(ChatError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Chat(ChatError::EmptyResponse) => StatusCode::NOT_FOUND,
            AppError::Chat(ChatError::TransientStore(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Chat(ChatError::RateLimited) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Chat(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        if matches!(self, AppError::Chat(ChatError::EmptyResponse)) {
            log::error!("Unexpected empty completion surfaced to client");
        }
        let error_response = JsonErrorWrapper {
            error: JsonError {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
            },
        };
        HttpResponse::build(status_code).json(error_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_status_codes() {
        let cases = [
            (ChatError::validation("x"), StatusCode::BAD_REQUEST),
            (ChatError::not_found("x"), StatusCode::NOT_FOUND),
            (ChatError::EmptyResponse, StatusCode::NOT_FOUND),
            (
                ChatError::TransientStore("x".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ChatError::Backend("x".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ChatError::Internal("x".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(AppError::from(error).status_code(), status);
        }
    }

    #[test]
    fn internal_message_is_exposed() {
        let error = AppError::from(ChatError::Backend("upstream exploded".to_string()));
        assert!(error.to_string().contains("upstream exploded"));
        assert_eq!(error.error_type(), "backend_error");
    }

    #[test]
    fn internal_errors_are_reported_as_api_errors() {
        let error = AppError::from(ChatError::Internal("session vanished".to_string()));

        assert_eq!(error.error_type(), "api_error");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
