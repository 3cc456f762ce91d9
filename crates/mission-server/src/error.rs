use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use mission_core::agent::PatchError;

use crate::engine::{EngineClosed, OverrideError};

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    /// Engine gone or a connection cap reached.
    Unavailable(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Unavailable(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<EngineClosed> for AppError {
    fn from(e: EngineClosed) -> Self {
        tracing::error!("Request failed: {e}");
        Self::Unavailable(e.to_string())
    }
}

impl From<PatchError> for AppError {
    fn from(e: PatchError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<OverrideError> for AppError {
    fn from(e: OverrideError) -> Self {
        Self::NotFound(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn conversions() {
        assert!(matches!(AppError::from(EngineClosed), AppError::Unavailable(_)));
        assert!(matches!(AppError::from(PatchError::Empty), AppError::BadRequest(_)));
        assert!(matches!(
            AppError::from(OverrideError::UnknownAgent),
            AppError::NotFound(_)
        ));
    }
}
