//! # Flashcards — Relatório → Cartões de Estudo + Exportação Anki
//!
//! Uma única chamada ao LLM pedindo um array JSON de cartões. A resposta é
//! decodificada em duas tentativas:
//!
//! | Tentativa | Entrada                                  | Resultado        |
//! |-----------|------------------------------------------|------------------|
//! | 1         | primeiro `[...]` balanceado, ou o texto  | lista de itens   |
//! | 2         | primeiro `{...}` balanceado, ou o texto  | um único item    |
//!
//! A tentativa 2 só roda se a 1 não produziu nenhum cartão.
//!
//! Cada item vira um cartão por conta própria: `back` ausente vira `""`,
//! `tags` como string vira lista de um elemento, e só itens sem `front`
//! são descartados. Um item malformado não derruba os outros.
//!
//! Nenhum cartão → evento `error` + `done` com score 0.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::Instrument;

use super::prompts::FLASHCARD_SYSTEM;
use super::{done_event, Pipeline, SUCCESS_SCORE};
use crate::llm::Message;
use crate::sources::truncate_chars;
use crate::structured::{self, Bracket};
use crate::web::events::{Flashcard, StepStatus, StreamEvent};
use crate::web::sse::Emitter;

/// Quanto do relatório entra no prompt.
const REPORT_PROMPT_CHARS: usize = 8_000;

/// Máximo de tags mantidas por cartão.
const MAX_TAGS: usize = 3;

/// Corpo de `POST /flashcards`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FlashcardRequest {
    #[serde(default)]
    pub report_id: Option<String>,
    #[serde(default)]
    pub report_md: Option<String>,
    #[serde(default)]
    pub question: String,
}

impl FlashcardRequest {
    /// Corpo do relatório, `None` se ausente ou em branco.
    pub fn report_body(&self) -> Option<&str> {
        self.report_md.as_deref().filter(|md| !md.trim().is_empty())
    }
}

/// Decodifica a resposta do modelo em cartões válidos.
pub(crate) fn parse_cards(raw: &str) -> Vec<Flashcard> {
    let cards: Vec<Flashcard> = structured::decode::<Vec<Value>>(raw, Bracket::Array)
        .unwrap_or_default()
        .iter()
        .filter_map(card_from_item)
        .collect();
    if !cards.is_empty() {
        return cards;
    }

    // O primeiro `[...]` pode ser só a lista de tags de um objeto solto.
    structured::decode::<Value>(raw, Bracket::Object)
        .as_ref()
        .and_then(card_from_item)
        .into_iter()
        .collect()
}

fn card_from_item(item: &Value) -> Option<Flashcard> {
    let front = item.get("front")?.as_str()?.trim();
    if front.is_empty() {
        return None;
    }
    let back = item.get("back").and_then(Value::as_str).unwrap_or_default();
    let mut tags = string_list(item.get("tags"));
    tags.truncate(MAX_TAGS);
    let citations = match item.get("citations") {
        Some(v) => string_list(Some(v)),
        None => string_list(item.get("source_citations")),
    };

    Some(Flashcard {
        front: front.to_string(),
        back: back.trim().to_string(),
        tags,
        citations,
    })
}

/// Lista de strings tolerante: string solta vira lista de um, não-strings são ignoradas.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Exportação Anki: uma linha por cartão, `front\tback\ttags`.
///
/// Todo campo vai entre aspas, com aspas internas duplicadas; as tags são
/// unidas por espaço, como o Anki espera.
pub fn to_csv(cards: &[Flashcard]) -> String {
    fn quote(field: &str) -> String {
        format!("\"{}\"", field.replace('"', "\"\""))
    }

    cards
        .iter()
        .map(|card| {
            format!(
                "{}\t{}\t{}\n",
                quote(&card.front),
                quote(&card.back),
                quote(&card.tags.join(" "))
            )
        })
        .collect()
}

impl Pipeline {
    /// Gera cartões a partir de `report_md`. O handler já garantiu que ele não é vazio.
    pub async fn run_flashcards(&self, req: FlashcardRequest, report_id: String, em: Emitter) -> Result<()> {
        let span = tracing::info_span!("flashcards_run", report_id = %report_id);
        async move {
            em.emit(&StreamEvent::thought(
                "flashcards",
                "Generating flashcards from report...",
                StepStatus::Running,
            ))?;

            let report = req.report_body().unwrap_or_default();
            let messages = [
                Message::system(FLASHCARD_SYSTEM),
                Message::user(format!(
                    "Original question: {}\n\nReport:\n{}\n\nGenerate flashcards for this report.",
                    req.question,
                    truncate_chars(report, REPORT_PROMPT_CHARS)
                )),
            ];
            let reply = self
                .gateway
                .call("flashcards", &messages, 2048, 0.3)
                .await
                .context("flashcard generation failed")?;

            let cards = parse_cards(&reply.text);
            if cards.is_empty() {
                tracing::warn!(
                    reply = %truncate_chars(&reply.text, 200),
                    "Modelo não devolveu cartões utilizáveis"
                );
                em.emit(&StreamEvent::error(
                    "flashcards",
                    "The model did not return any usable flashcards.",
                ))?;
                em.emit(&done_event(&report_id, 0.0, false))?;
                return Ok(());
            }

            em.emit(&StreamEvent::thought_with_metric(
                "flashcards",
                format!("Generated {} flashcards", cards.len()),
                StepStatus::Completed,
                cards.len() as u64,
            ))?;
            let csv = to_csv(&cards);
            let count = cards.len();
            em.emit(&StreamEvent::Flashcards { cards, csv, count })?;
            em.emit(&done_event(&report_id, SUCCESS_SCORE, false))?;

            tracing::info!(count, "Flashcards gerados");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{names, pipeline, ScriptedGateway};
    use crate::web::sse::{collect_frames, spawn_producer};

    fn card(front: &str, back: &str, tags: &[&str]) -> Flashcard {
        Flashcard {
            front: front.into(),
            back: back.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            citations: vec![],
        }
    }

    async fn run(reply: &str, report_md: &str) -> Vec<(String, serde_json::Value)> {
        let gw = ScriptedGateway::new(vec![Ok(reply)]);
        let (pipe, _) = pipeline(gw);
        let req = FlashcardRequest {
            report_id: Some("rep-1".into()),
            report_md: Some(report_md.into()),
            question: "q".into(),
        };
        let rx = spawn_producer("flashcards", move |em| async move {
            pipe.run_flashcards(req, "rep-1".into(), em).await
        });
        collect_frames(rx).await
    }

    #[test]
    fn parses_array_inside_prose() {
        let raw = r#"Here you go:
```json
[{"front": "Why WAL?", "back": "Durability", "tags": ["db"]},
 {"front": "What is [MVCC]?", "back": "Snapshots", "source_citations": ["a:1"]}]
```"#;
        let cards = parse_cards(raw);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].front, "What is [MVCC]?");
        assert_eq!(cards[1].citations, vec!["a:1"]);
    }

    #[test]
    fn single_object_becomes_one_card() {
        let cards = parse_cards(r#"{"front": "F", "back": "B"}"#);
        assert_eq!(cards, vec![card("F", "B", &[])]);
    }

    #[test]
    fn single_object_with_tag_list() {
        let cards = parse_cards(r#"Card: {"front": "F", "back": "B", "tags": ["x", "y"]}"#);
        assert_eq!(cards, vec![card("F", "B", &["x", "y"])]);
    }

    #[test]
    fn garbage_yields_zero_cards() {
        assert!(parse_cards("I cannot help with that.").is_empty());
        assert!(parse_cards(r#"[{"back": "no front"}]"#).is_empty());
        assert!(parse_cards(r#"[{"front": "  ", "back": "blank"}]"#).is_empty());
    }

    #[test]
    fn missing_back_keeps_the_other_cards() {
        let cards = parse_cards(r#"[{"front": "A"}, {"front": "B", "back": "b"}]"#);
        assert_eq!(cards, vec![card("A", "", &[]), card("B", "b", &[])]);
    }

    #[test]
    fn string_tags_become_a_single_tag() {
        let cards = parse_cards(r#"[{"front": "A", "back": "a", "tags": "db"}, {"front": "B", "back": "b"}]"#);
        assert_eq!(cards, vec![card("A", "a", &["db"]), card("B", "b", &[])]);
    }

    #[test]
    fn malformed_items_are_skipped_individually() {
        let raw = r#"[{"front": "  ", "back": "blank"}, "loose string", {"front": 42},
                     {"front": "Kept", "back": "yes", "tags": ["ok", 7]}]"#;
        assert_eq!(parse_cards(raw), vec![card("Kept", "yes", &["ok"])]);
    }

    #[test]
    fn prompt_asks_for_the_kept_tag_count() {
        assert!(FLASHCARD_SYSTEM.contains(&format!("At most {MAX_TAGS} short tags")));
    }

    #[test]
    fn tags_are_capped() {
        let cards = parse_cards(r#"[{"front": "F", "back": "B", "tags": ["a","b","c","d","e","f","g"]}]"#);
        assert_eq!(cards[0].tags.len(), MAX_TAGS);
    }

    #[test]
    fn csv_is_tab_delimited_and_escapes_quotes() {
        let csv = to_csv(&[
            card("What is \"CAP\"?", "Consistency, availability", &["dist", "theory"]),
            card("Q2", "A2", &[]),
        ]);
        assert_eq!(
            csv,
            "\"What is \"\"CAP\"\"?\"\t\"Consistency, availability\"\t\"dist theory\"\n\"Q2\"\t\"A2\"\t\"\"\n"
        );
    }

    #[test]
    fn blank_report_has_no_body() {
        let req = FlashcardRequest {
            report_md: Some("  \n".into()),
            ..Default::default()
        };
        assert_eq!(req.report_body(), None);
    }

    #[tokio::test]
    async fn cards_event_precedes_done() {
        let frames = run(
            r#"[{"front": "F1", "back": "B1"}, {"front": "F2", "back": "B2", "tags": ["x"]}]"#,
            "# Report",
        )
        .await;
        assert_eq!(names(&frames), vec!["thought", "thought", "flashcards", "done"]);
        let payload = &frames[2].1;
        assert_eq!(payload["count"], 2);
        assert_eq!(payload["cards"][1]["tags"][0], "x");
        assert!(payload["csv"].as_str().unwrap().starts_with("\"F1\"\t\"B1\""));
        assert_eq!(frames[3].1["evaluation_score"], 1.0);
        assert_eq!(frames[3].1["report_id"], "rep-1");
    }

    #[tokio::test]
    async fn zero_cards_is_error_then_done() {
        let frames = run("sorry, no JSON today", "# Report").await;
        assert_eq!(names(&frames), vec!["thought", "error", "done"]);
        assert_eq!(frames[1].1["node"], "flashcards");
        assert_eq!(frames[2].1["evaluation_score"], 0.0);
    }

    #[tokio::test]
    async fn long_reports_are_truncated_in_prompt() {
        let gw = ScriptedGateway::new(vec![Ok("[]")]);
        let (pipe, _) = pipeline(gw.clone());
        let req = FlashcardRequest {
            report_id: None,
            report_md: Some("x".repeat(20_000)),
            question: "q".into(),
        };
        let rx = spawn_producer("flashcards", move |em| async move {
            pipe.run_flashcards(req, "r".into(), em).await
        });
        collect_frames(rx).await;

        let prompt = &gw.calls.lock()[0].messages[1].content;
        assert_eq!(prompt.matches('x').count(), REPORT_PROMPT_CHARS);
    }
}
