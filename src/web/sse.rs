//! # Emissor SSE — Produtor Assíncrono → Corpo `text/event-stream`
//!
//! [`sse_response()`] envolve um produtor assíncrono arbitrário. O produtor
//! recebe um [`Emitter`] cujo `push()` codifica e enfileira um frame de
//! forma síncrona, na ordem exata das chamadas.
//!
//! ## Garantias
//!
//! ```text
//! produtor Ok(())        → stream fecha
//! produtor Err(e)        → push("error", e) → stream fecha
//! produtor panic         → push("error", …) → stream fecha
//! cliente desconecta     → produtor é descartado (aborta a chamada de rede
//!                          em andamento), nenhum evento a mais, stream fecha
//! ```
//!
//! O fechamento acontece exatamente uma vez: a única ponta de envio do
//! canal pertence à task do emissor e é descartada quando ela termina.

use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use super::events::StreamEvent;

/// Intervalo do comentário keep-alive enquanto um provedor não responde.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// O cliente desconectou; nenhum frame pode mais ser entregue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("client disconnected")]
pub struct StreamClosed;

/// Ponta de escrita de uma execução SSE.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<Event>,
}

impl Emitter {
    /// Codifica e enfileira um frame. Falha só se o cliente já foi embora.
    pub fn push<T: Serialize + ?Sized>(&self, name: &str, payload: &T) -> Result<(), StreamClosed> {
        let event = match Event::default().event(name).json_data(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(event = name, error = %e, "Falha ao serializar payload SSE");
                Event::default()
                    .event(name)
                    .json_data(serde_json::json!({ "message": format!("unserializable payload: {e}") }))
                    .unwrap_or_default()
            }
        };
        self.tx.send(event).map_err(|_| StreamClosed)
    }

    /// Atalho para eventos tipados.
    pub fn emit(&self, event: &StreamEvent) -> Result<(), StreamClosed> {
        self.push(event.name(), event)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Roda `producer` numa task própria, devolvendo o receptor de frames.
///
/// `node` identifica a origem nos eventos de erro gerados aqui.
pub fn spawn_producer<F, Fut>(node: &'static str, producer: F) -> mpsc::UnboundedReceiver<Event>
where
    F: FnOnce(Emitter) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let emitter = Emitter { tx };
        let work = AssertUnwindSafe(producer(emitter.clone())).catch_unwind();

        let outcome = tokio::select! {
            outcome = work => Some(outcome),
            _ = emitter.tx.closed() => None,
        };

        match outcome {
            None => tracing::info!(node, "Cliente desconectou; execução cancelada"),
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => {
                if e.downcast_ref::<StreamClosed>().is_some() || emitter.is_closed() {
                    tracing::info!(node, "Cliente desconectou durante a execução");
                } else {
                    tracing::error!(node, error = %format!("{e:#}"), "Execução falhou");
                    let _ = emitter.emit(&StreamEvent::error(node, format!("{e:#}")));
                }
            }
            Some(Err(_panic)) => {
                tracing::error!(node, "Produtor SSE entrou em pânico");
                let _ = emitter.emit(&StreamEvent::error(node, "internal error"));
            }
        }
        // `emitter` é descartado aqui: fim do stream.
    });

    rx
}

/// Resposta SSE sobre um receptor de frames, com keep-alive.
pub fn into_sse(
    rx: mpsc::UnboundedReceiver<Event>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// Resposta `text/event-stream` alimentada por `producer`.
pub fn sse_response<F, Fut>(node: &'static str, producer: F) -> Response
where
    F: FnOnce(Emitter) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    into_sse(spawn_producer(node, producer)).into_response()
}

/// Parser mínimo de frames, usado pelos testes dos pipelines e handlers.
///
/// Frames com JSON inválido e comentários keep-alive são ignorados, como
/// um cliente tolerante faria.
#[cfg(test)]
pub fn parse_frames(raw: &str) -> Vec<(String, serde_json::Value)> {
    raw.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    name = Some(rest.to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(rest).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}

/// Corpo bruto da resposta SSE até o fechamento do stream.
#[cfg(test)]
pub async fn render_body(rx: mpsc::UnboundedReceiver<Event>) -> String {
    let body = into_sse(rx).into_response().into_body();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("sse body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Drena o receptor até o fechamento e devolve os frames decodificados.
#[cfg(test)]
pub async fn collect_frames(rx: mpsc::UnboundedReceiver<Event>) -> Vec<(String, serde_json::Value)> {
    parse_frames(&render_body(rx).await)
}
