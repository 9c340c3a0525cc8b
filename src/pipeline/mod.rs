//! # Pipeline — Orquestração das Execuções SSE
//!
//! O [`Pipeline`] é o coração do serviço: rege cada execução disparada
//! pelos endpoints de streaming, chamando o gateway LLM estágio a estágio
//! e empurrando o progresso pelo [`Emitter`].
//!
//! ## Execuções
//!
//! ```text
//! /report      plan → write → judge → stream → finalize   (report.rs)
//! /answer      answer → stream → done                      (answer.rs)
//! /flashcards  generate → flashcards → done                (flashcards.rs)
//! ```
//!
//! ## Regras comuns
//!
//! - Estágios rodam em sequência estrita; nunca há dois em paralelo.
//! - Qualquer erro antes da finalização sobe como `Err` e vira um único
//!   evento `error` no emissor; nenhum `done` vem depois.
//! - Um `push` que falha (cliente desconectou) interrompe a execução via `?`.
//! - Não existe laço de refinamento: `retry_count` é sempre 0.

pub mod answer;
pub mod flashcards;
pub mod prompts;
pub mod report;

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::ChatGateway;
use crate::sources::{truncate_chars, SourceRecord, SourceStore};
use crate::web::events::{report_chunks, SourceRef, StreamEvent};
use crate::web::sse::{Emitter, StreamClosed};

pub use answer::AnswerRequest;
pub use flashcards::FlashcardRequest;
pub use report::ReportRequest;

/// Tamanho (em caracteres) de cada evento `report`.
pub const REPORT_CHUNK_CHARS: usize = 200;

/// Abaixo deste score o relatório sai com `quality_warning`.
pub const QUALITY_THRESHOLD: f64 = 0.6;

/// Score usado quando o juiz não devolve um número utilizável.
pub const DEFAULT_JUDGE_SCORE: f64 = 0.7;

/// Score fixo das execuções sem juiz.
pub const SUCCESS_SCORE: f64 = 1.0;

/// Limites do bloco de contexto montado a partir das fontes.
const CONTEXT_MAX_CHUNKS: usize = 10;
const CONTEXT_CHUNK_CHARS: usize = 500;

/// Orquestrador das execuções. Barato de clonar.
#[derive(Clone)]
pub struct Pipeline {
    gateway: Arc<dyn ChatGateway>,
    store: Arc<dyn SourceStore>,
}

impl Pipeline {
    pub fn new(gateway: Arc<dyn ChatGateway>, store: Arc<dyn SourceStore>) -> Self {
        Self { gateway, store }
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_configured()
    }

    fn load_sources(&self, ids: &[String]) -> SourceContext {
        let records = self.store.get_many(ids);
        if records.len() < ids.len() {
            tracing::warn!(
                requested = ids.len(),
                found = records.len(),
                "Algumas fontes pedidas não existem neste processo"
            );
        }
        SourceContext { records }
    }
}

/// Fontes carregadas do store para uma execução.
pub(crate) struct SourceContext {
    records: Vec<Arc<SourceRecord>>,
}

impl SourceContext {
    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn refs(&self) -> Vec<SourceRef> {
        self.records
            .iter()
            .map(|r| SourceRef {
                source_id: r.id.clone(),
                title: r.title.clone(),
            })
            .collect()
    }

    /// Resumo de uma linha por fonte, para o planner.
    pub(crate) fn summaries(&self) -> String {
        if self.records.is_empty() {
            return "(no sources provided)".to_string();
        }
        self.records
            .iter()
            .map(|r| format!("- {} ({}, {} chunks)", r.title, short_id(&r.id), r.chunk_count()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Primeiros chunks das fontes, rotulados `[source:chunk]`.
    ///
    /// Vazio quando não há fontes.
    pub(crate) fn context_block(&self) -> String {
        self.records
            .iter()
            .flat_map(|r| {
                r.chunks.iter().enumerate().map(move |(i, chunk)| {
                    format!(
                        "[{}:{}] (from: {})\n{}",
                        short_id(&r.id),
                        i,
                        r.title,
                        truncate_chars(chunk, CONTEXT_CHUNK_CHARS)
                    )
                })
            })
            .take(CONTEXT_MAX_CHUNKS)
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

fn short_id(id: &str) -> &str {
    truncate_chars(id, 8)
}

/// Envia o texto como sequência de eventos `report`.
pub(crate) fn stream_text(em: &Emitter, text: &str) -> Result<(), StreamClosed> {
    for event in report_chunks(text, REPORT_CHUNK_CHARS) {
        em.emit(&event)?;
    }
    Ok(())
}

/// Evento terminal `done`.
pub(crate) fn done_event(report_id: &str, score: f64, quality_warning: bool) -> StreamEvent {
    StreamEvent::Done {
        report_id: report_id.to_string(),
        evaluation_score: score,
        retry_count: 0,
        quality_warning,
    }
}

/// Aceita `source_ids` ausente ou `null` como lista vazia.
pub(crate) fn null_as_empty<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(de)?.unwrap_or_default())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{InMemorySourceStore, SourceType};

    #[test]
    fn context_block_is_capped_and_labelled() {
        let store = InMemorySourceStore::new();
        let long = "word ".repeat(5_000);
        let rec = store.insert(SourceRecord::build(SourceType::Url, "Big doc", &long));
        let ctx = SourceContext {
            records: vec![rec.clone()],
        };

        let block = ctx.context_block();
        assert!(block.starts_with(&format!("[{}:0] (from: Big doc)", &rec.id[..8])));
        assert_eq!(block.matches("---").count(), rec.chunk_count().min(CONTEXT_MAX_CHUNKS) - 1);
        assert_eq!(ctx.refs()[0].title, "Big doc");
    }

    #[test]
    fn empty_context() {
        let ctx = SourceContext { records: vec![] };
        assert!(ctx.is_empty());
        assert_eq!(ctx.context_block(), "");
        assert_eq!(ctx.summaries(), "(no sources provided)");
    }
}
