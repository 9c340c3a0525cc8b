//! Erros HTTP dos endpoints não-streaming: sempre JSON `{"detail": "..."}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::ingest::IngestError;

/// Erro convertido em resposta com status e corpo `{detail}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    /// Nenhuma chave de LLM configurada.
    pub fn not_configured() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "No LLM API key configured")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::EmptyPayload | IngestError::InvalidBase64(_) => StatusCode::BAD_REQUEST,
            IngestError::NoContent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::Fetch { .. } | IngestError::Status { .. } | IngestError::Extract(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Ingestão falhou");
        } else {
            tracing::warn!(error = %err, "Ingestão rejeitada");
        }
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_errors_map_to_statuses() {
        let cases = [
            (IngestError::EmptyPayload, 400),
            (IngestError::NoContent("u".into()), 422),
            (
                IngestError::Status {
                    url: "u".into(),
                    status: 404,
                },
                500,
            ),
            (IngestError::Extract(anyhow::anyhow!("bad xref")), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status.as_u16(), status);
        }
    }

    #[tokio::test]
    async fn body_is_detail_json() {
        let resp = ApiError::bad_request("nope").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"detail": "nope"}));
    }
}
