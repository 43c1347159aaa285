use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error taxonomy for the signal engine. `BadRequest`, `BadFilter`, and
/// `GroupConflict` are client-visible 4xx-shaped errors with a stable
/// `code`; `Timeout` and `StoreUnavailable` are 5xx-shaped and retryable by
/// the caller. `InsufficientData` is deliberately absent here — it never
/// raises as an error, it surfaces as a null `MethodResult.value` plus a
/// `data_note` line instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("bad filter: {0}")]
    BadFilter(String),

    #[error("group conflict: {0}")]
    GroupConflict(String),

    #[error("request deadline exceeded")]
    Timeout,

    #[error("event store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::BadRequest(_) => "BAD_REQUEST",
            EngineError::BadFilter(_) => "BAD_FILTER",
            EngineError::GroupConflict(_) => "GROUP_CONFLICT",
            EngineError::Timeout => "TIMEOUT",
            EngineError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EngineError::BadRequest(_) | EngineError::BadFilter(_) => StatusCode::BAD_REQUEST,
            EngineError::GroupConflict(_) => StatusCode::CONFLICT,
            EngineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            EngineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<clickhouse::error::Error> for EngineError {
    fn from(e: clickhouse::error::Error) -> Self {
        EngineError::StoreUnavailable(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::StoreUnavailable(e.to_string())
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::StoreUnavailable(e.to_string())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "code": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let e = EngineError::BadRequest("empty methods".to_string());
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.code(), "BAD_REQUEST");
    }

    #[test]
    fn group_conflict_maps_to_409() {
        let e = EngineError::GroupConflict("already active".to_string());
        assert_eq!(e.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn timeout_maps_to_504() {
        assert_eq!(EngineError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn store_unavailable_maps_to_503() {
        let e = EngineError::StoreUnavailable("connection refused".to_string());
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
