use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use tierwatch_core::error::AppError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::UpstreamError(_) | AppError::NetworkError(_) | AppError::ParseError(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            AppError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        let mut response = (status, axum::Json(body)).into_response();
        if let AppError::RateLimited { retry_after_secs } = self.0 {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError(AppError::RateLimited {
            retry_after_secs: 42,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn upstream_failures_map_to_gateway_codes() {
        let status = |e: AppError| ApiError(e).into_response().status();
        assert_eq!(status(AppError::Timeout(10)), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status(AppError::UpstreamError("HTTP 503".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(AppError::NotFound("Siel/Aria".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(AppError::DatabaseError("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
