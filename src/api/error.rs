use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::errors::Error;
use crate::mcp::session::TransportError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    TooManyRequests { retry_after: u64 },
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let (error, message, retry_after) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::TooManyRequests { retry_after } => (
                "rate_limited",
                format!("Too many requests, retry after {} seconds", retry_after),
                Some(retry_after),
            ),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg, None),
            ApiError::Internal(msg) => ("internal_error", msg, None),
        };

        let mut response =
            (status, Json(ErrorBody { error, message, retry_after_seconds: retry_after }))
                .into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            TransportError::SessionClosed(_) => ApiError::NotFound(err.to_string()),
            TransportError::Backpressure(_) => ApiError::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Auth(e) => ApiError::Unauthorized(e.to_string()),
            Error::RateLimit { retry_after } => ApiError::TooManyRequests { retry_after },
            Error::Transport(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn rate_limited_response_carries_retry_after() {
        let response = ApiError::TooManyRequests { retry_after: 12 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "12");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "rate_limited");
        assert_eq!(json["retry_after_seconds"], 12);
    }

    #[test]
    fn unknown_session_maps_to_not_found() {
        let err: ApiError = TransportError::SessionNotFound("mcp-x".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
