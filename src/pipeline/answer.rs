//! Resposta rápida: uma única chamada ao LLM, transmitida em pedaços.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::Instrument;

use super::prompts::ANSWER_SYSTEM;
use super::{done_event, null_as_empty, stream_text, Pipeline, SUCCESS_SCORE};
use crate::llm::Message;
use crate::web::events::{StepStatus, StreamEvent};
use crate::web::sse::Emitter;

/// Corpo de `POST /answer`.
#[derive(Clone, Debug, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source_ids: Vec<String>,
    #[serde(default)]
    pub allow_web_search: bool,
}

impl Pipeline {
    pub async fn run_answer(&self, req: AnswerRequest, report_id: String, em: Emitter) -> Result<()> {
        let span = tracing::info_span!("answer_run", report_id = %report_id);
        async move {
            em.emit(&StreamEvent::thought(
                "answer",
                "Analyzing your question...",
                StepStatus::Running,
            ))?;

            let sources = self.load_sources(&req.source_ids);
            let context = sources.context_block();
            let prompt = if context.is_empty() {
                req.question.clone()
            } else {
                format!("{}\n\n## Relevant source context\n{}", req.question, context)
            };
            let messages = [Message::system(ANSWER_SYSTEM), Message::user(prompt)];

            let reply = self
                .gateway
                .call("answer", &messages, 2048, 0.5)
                .await
                .context("answer failed")?;
            if reply.text.trim().is_empty() {
                bail!("model returned an empty answer");
            }

            em.emit(&StreamEvent::thought_with_metric(
                "answer",
                format!(
                    "Response ready ({} chars, via {})",
                    reply.text.chars().count(),
                    reply.provider
                ),
                StepStatus::Completed,
                reply.latency_ms,
            ))?;

            stream_text(&em, &reply.text)?;
            em.emit(&done_event(&report_id, SUCCESS_SCORE, false))?;

            tracing::info!(provider = %reply.provider, latency_ms = reply.latency_ms, "Resposta enviada");
            Ok(())
        }
        .instrument(span)
        .await
    }
}
