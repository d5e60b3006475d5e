use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use stickyroute_core::AppError;

/// Error payload returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    message: String,
}

/// HTTP error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl ApiError {
    /// Status code this error is answered with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forwarding(_) => StatusCode::BAD_GATEWAY,
            AppError::StoreUnavailable(_)
            | AppError::OwnershipUnresolved(_)
            | AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MisconfiguredAddress(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = Json(ErrorResponse {
            message: self.0.to_string(),
        });

        (status, payload).into_response()
    }
}

/// Standard middleware result type.
pub type ApiResult<T> = Result<T, ApiError>;
