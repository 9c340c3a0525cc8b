//! # Eventos SSE de uma Execução
//!
//! Define o enum [`StreamEvent`] — todos os eventos que uma execução
//! (`/answer`, `/report`, `/flashcards`) envia ao cliente via
//! Server-Sent Events.
//!
//! ## Ciclo de Vida dos Eventos
//!
//! ```text
//! thought* → report* → sources → done
//!                         ou → need_more_sources → done
//!                         ou → error               (fim)
//! ```
//!
//! ## Enquadramento
//!
//! O nome do evento vai na linha `event:`; o payload vai serializado na
//! linha `data:` pelo `Event::json_data` do axum (ver [`super::sse`]). O frontend usa o nome do evento para despachar e faz
//! `JSON.parse(e.data)` no payload.
//!
//! ```text
//! event: report
//! data: {"content":"## Título…","done":false}
//!
//! ```

use chrono::Utc;
use serde::Serialize;

/// Status de um passo do pipeline exibido na timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Error,
}

/// Payload de um evento `thought`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Thought {
    /// Estágio que emitiu ("planner", "writer", "judge"...).
    pub node: String,
    pub message: String,
    pub status: StepStatus,
    /// Instante RFC 3339 em UTC.
    pub timestamp: String,
    /// Métrica derivada do estágio (ex: número de seções do plano).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<u64>,
}

/// Referência a uma fonte usada na execução.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceRef {
    pub source_id: String,
    pub title: String,
}

/// Um flashcard gerado a partir de um relatório.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
    pub citations: Vec<String>,
}

/// Evento emitido durante uma execução, enviado via SSE ao cliente.
///
/// Serializado sem discriminador: o nome do evento vem de
/// [`StreamEvent::name()`] e só o payload vai em `data:`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    /// Progresso de um estágio.
    Thought(Thought),

    /// Pedaço do relatório; concatenados em ordem formam o texto completo.
    ReportChunk {
        content: String,
        /// `true` apenas no último pedaço.
        done: bool,
    },

    /// Fontes efetivamente carregadas para a execução.
    Sources { sources: Vec<SourceRef> },

    /// O planner julgou as fontes insuficientes.
    NeedMoreSources { message: String },

    /// Cartões gerados e exportação Anki.
    Flashcards {
        cards: Vec<Flashcard>,
        csv: String,
        count: usize,
    },

    /// Evento terminal de sucesso.
    Done {
        report_id: String,
        evaluation_score: f64,
        retry_count: u32,
        quality_warning: bool,
    },

    /// Falha convertida em evento.
    Error { message: String, node: String },
}

impl StreamEvent {
    /// Nome usado na linha `event:` do frame.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Thought(_) => "thought",
            StreamEvent::ReportChunk { .. } => "report",
            StreamEvent::Sources { .. } => "sources",
            StreamEvent::NeedMoreSources { .. } => "need_more_sources",
            StreamEvent::Flashcards { .. } => "flashcards",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn thought(node: &str, message: impl Into<String>, status: StepStatus) -> Self {
        StreamEvent::Thought(Thought {
            node: node.to_string(),
            message: message.into(),
            status,
            timestamp: Utc::now().to_rfc3339(),
            metric: None,
        })
    }

    pub fn thought_with_metric(
        node: &str,
        message: impl Into<String>,
        status: StepStatus,
        metric: u64,
    ) -> Self {
        match Self::thought(node, message, status) {
            StreamEvent::Thought(t) => StreamEvent::Thought(Thought {
                metric: Some(metric),
                ..t
            }),
            other => other,
        }
    }

    pub fn error(node: &str, message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
            node: node.to_string(),
        }
    }
}

/// Divide `text` em pedaços de `chunk_chars` caracteres, marcando o último.
///
/// Texto vazio gera um único pedaço vazio com `done = true`, para que o
/// cliente sempre veja o fim do relatório.
pub fn report_chunks(text: &str, chunk_chars: usize) -> Vec<StreamEvent> {
    let chunk_chars = chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![StreamEvent::ReportChunk {
            content: String::new(),
            done: true,
        }];
    }

    let total = chars.len().div_ceil(chunk_chars);
    chars
        .chunks(chunk_chars)
        .enumerate()
        .map(|(i, piece)| StreamEvent::ReportChunk {
            content: piece.iter().collect(),
            done: i + 1 == total,
        })
        .collect()
}
