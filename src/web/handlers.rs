//! # Handlers HTTP — Os Endpoints da API
//!
//! Cada função pública neste módulo é um handler Axum, mapeado a uma
//! rota em [`super::create_router()`].
//!
//! | Handler      | Método | Retorno          | Erros antes do stream            |
//! |--------------|--------|------------------|----------------------------------|
//! | `health`     | GET    | JSON             | —                                |
//! | `ingest`     | POST   | JSON             | 400 / 422 / 500 `{detail}`       |
//! | `answer`     | POST   | SSE              | 400 corpo inválido, 500 sem LLM  |
//! | `report`     | POST   | SSE              | 400 corpo inválido, 500 sem LLM  |
//! | `flashcards` | POST   | SSE              | 400 sem relatório, 500 sem LLM   |
//!
//! ## Guarda de Configuração
//!
//! Os handlers SSE verificam `pipeline.is_configured()` antes de abrir o
//! stream: sem nenhuma chave de provedor, a requisição é rejeitada com
//! JSON e nenhum evento é emitido.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::ApiError;
use super::sse::sse_response;
use super::state::AppState;
use crate::ingest::{IngestRequest, IngestResponse};
use crate::pipeline::{AnswerRequest, FlashcardRequest, ReportRequest};

/// GET `/health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "service": state.service }))
}

/// POST `/ingest` — extrai e guarda uma fonte.
pub async fn ingest(
    State(state): State<AppState>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(req) = body?;
    tracing::info!(source_type = ?req.source_type, "Requisição de ingestão");
    let resp = state.ingestor.ingest(req).await?;
    Ok(Json(resp))
}

/// POST `/answer` — resposta rápida via SSE.
pub async fn answer(
    State(state): State<AppState>,
    body: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    ensure_configured(&state)?;

    let report_id = Uuid::new_v4().to_string();
    tracing::info!(
        report_id = %report_id,
        sources = req.source_ids.len(),
        web_search = req.allow_web_search,
        "Answer iniciado"
    );

    let pipeline = state.pipeline.clone();
    Ok(sse_response("answer", move |em| async move {
        pipeline.run_answer(req, report_id, em).await
    }))
}

/// POST `/report` — deep report via SSE.
pub async fn report(
    State(state): State<AppState>,
    body: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    ensure_configured(&state)?;

    let report_id = Uuid::new_v4().to_string();
    tracing::info!(
        report_id = %report_id,
        depth = ?req.depth,
        sources = req.source_ids.len(),
        "Deep report iniciado"
    );

    let pipeline = state.pipeline.clone();
    Ok(sse_response("pipeline", move |em| async move {
        pipeline.run_report(req, report_id, em).await
    }))
}

/// POST `/flashcards` — cartões a partir de um relatório, via SSE.
pub async fn flashcards(
    State(state): State<AppState>,
    body: Result<Json<FlashcardRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    ensure_configured(&state)?;
    if req.report_body().is_none() {
        return Err(ApiError::bad_request("No report content provided"));
    }

    let report_id = req
        .report_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let pipeline = state.pipeline.clone();
    Ok(sse_response("flashcards", move |em| async move {
        pipeline.run_flashcards(req, report_id, em).await
    }))
}

fn ensure_configured(state: &AppState) -> Result<(), ApiError> {
    if state.pipeline.is_configured() {
        Ok(())
    } else {
        tracing::warn!("Requisição recusada: nenhum provedor LLM configurado");
        Err(ApiError::not_configured())
    }
}
