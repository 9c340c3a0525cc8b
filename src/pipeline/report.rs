//! # Deep Report — plan → write → judge → stream → finalize
//!
//! ```text
//! thought planner running
//! thought planner completed (metric = seções do outline)
//!   └── [fontes insuficientes] need_more_sources → done(score 0)
//! thought writer running / completed
//! thought judge running / completed|error
//! report × N (último com done=true)
//! sources
//! done { report_id, evaluation_score, retry_count: 0, quality_warning }
//! ```
//!
//! O juiz nunca aborta a execução: resposta ilegível vira score default e o
//! passo é marcado como inconclusivo.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::Instrument;

use super::prompts::{JUDGE_SYSTEM, PLANNER_SYSTEM, WRITER_SYSTEM};
use super::{
    done_event, null_as_empty, stream_text, Pipeline, SourceContext, DEFAULT_JUDGE_SCORE,
    QUALITY_THRESHOLD,
};
use crate::llm::Message;
use crate::sources::truncate_chars;
use crate::structured::{self, Bracket};
use crate::web::events::{StepStatus, StreamEvent};
use crate::web::sse::Emitter;

/// Quanto do relatório o juiz recebe.
const JUDGE_REPORT_CHARS: usize = 6_000;

/// Profundidade pedida pelo cliente.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    #[default]
    Deep,
}

impl Depth {
    /// Orçamento de tokens do writer.
    pub fn writer_max_tokens(self) -> u32 {
        match self {
            Depth::Quick => 2048,
            Depth::Deep => 4096,
        }
    }
}

/// Corpo de `POST /report`.
#[derive(Clone, Debug, Deserialize)]
pub struct ReportRequest {
    pub question: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source_ids: Vec<String>,
    #[serde(default)]
    pub depth: Depth,
    #[serde(default)]
    pub allow_web_search: bool,
}

/// Plano JSON pedido ao planner.
#[derive(Debug, Default, Deserialize)]
struct ResearchPlan {
    #[serde(default)]
    report_title: Option<String>,
    #[serde(default)]
    sub_questions: Vec<String>,
    #[serde(default)]
    must_check: Vec<String>,
    #[serde(default)]
    sufficient_sources: Option<bool>,
}

/// Outline que alimenta o writer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Outline {
    pub text: String,
    pub sections: usize,
    pub sufficient_sources: bool,
}

impl Outline {
    /// Decodifica a resposta do planner; prosa vira outline bruto.
    pub(crate) fn from_reply(question: &str, raw: &str) -> Self {
        match structured::decode::<ResearchPlan>(raw, Bracket::Object) {
            Some(plan) => Self::from_plan(question, plan),
            None => {
                let text = if raw.trim().is_empty() {
                    format!("# {question}")
                } else {
                    raw.trim().to_string()
                };
                Self {
                    sections: count_sections(&text).max(1),
                    text,
                    sufficient_sources: true,
                }
            }
        }
    }

    fn from_plan(question: &str, plan: ResearchPlan) -> Self {
        let title = plan
            .report_title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| question.to_string());
        let sub_questions = if plan.sub_questions.is_empty() {
            vec![question.to_string()]
        } else {
            plan.sub_questions
        };

        let mut text = format!("# {title}\n\n## Sub-questions\n");
        for q in &sub_questions {
            text.push_str(&format!("- {q}\n"));
        }
        if !plan.must_check.is_empty() {
            text.push_str("\n## Must check\n");
            for item in &plan.must_check {
                text.push_str(&format!("- {item}\n"));
            }
        }

        Self {
            text,
            sections: sub_questions.len(),
            sufficient_sources: plan.sufficient_sources.unwrap_or(true),
        }
    }
}

/// Conta linhas de seção num outline em prosa (headings, bullets, itens numerados).
fn count_sections(text: &str) -> usize {
    text.lines()
        .map(str::trim_start)
        .filter(|line| {
            line.starts_with('#')
                || line.starts_with("- ")
                || line.starts_with("* ")
                || line
                    .split_once(". ")
                    .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .count()
}

/// Veredito do juiz após a decodificação best-effort.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Verdict {
    pub score: f64,
    pub issues: usize,
    /// `true` quando o score veio do default.
    pub inconclusive: bool,
}

impl Verdict {
    pub(crate) fn from_reply(raw: &str) -> Self {
        let value = structured::decode_or(raw, Bracket::Object, serde_json::Value::Null);
        let score = value
            .get("score")
            .and_then(serde_json::Value::as_f64)
            .filter(|s| s.is_finite());
        let issues = value
            .get("issues")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len);

        match score {
            Some(score) => Self {
                score: score.clamp(0.0, 1.0),
                issues,
                inconclusive: false,
            },
            None => Self {
                score: DEFAULT_JUDGE_SCORE,
                issues,
                inconclusive: true,
            },
        }
    }

    pub(crate) fn quality_warning(&self) -> bool {
        self.score < QUALITY_THRESHOLD
    }
}

impl Pipeline {
    /// Executa o deep report completo, emitindo eventos em `em`.
    pub async fn run_report(&self, req: ReportRequest, report_id: String, em: Emitter) -> Result<()> {
        let span = tracing::info_span!("report_run", report_id = %report_id, depth = ?req.depth);
        self.report_stages(req, report_id, em).instrument(span).await
    }

    async fn report_stages(&self, req: ReportRequest, report_id: String, em: Emitter) -> Result<()> {
        let sources = self.load_sources(&req.source_ids);

        // ─── Plan ────────────────────────────────────────────────
        em.emit(&StreamEvent::thought(
            "planner",
            "Generating research plan...",
            StepStatus::Running,
        ))?;
        let outline = self.plan(&req.question, &sources).await?;
        em.emit(&StreamEvent::thought_with_metric(
            "planner",
            format!("Plan ready: {} sections", outline.sections),
            StepStatus::Completed,
            outline.sections as u64,
        ))?;

        if !outline.sufficient_sources && sources.is_empty() && !req.allow_web_search {
            tracing::info!(report_id = %report_id, "Planner pediu mais fontes");
            em.emit(&StreamEvent::thought(
                "planner",
                "Need more sources: insufficient evidence",
                StepStatus::Error,
            ))?;
            em.emit(&StreamEvent::NeedMoreSources {
                message: "The available sources appear insufficient for a thorough answer. \
                          Please add more PDFs, URLs, or enable web search."
                    .into(),
            })?;
            em.emit(&done_event(&report_id, 0.0, false))?;
            return Ok(());
        }

        // ─── Write ───────────────────────────────────────────────
        em.emit(&StreamEvent::thought(
            "writer",
            "Writing engineering report...",
            StepStatus::Running,
        ))?;
        let report = self.write(&req, &outline, &sources).await?;
        em.emit(&StreamEvent::thought_with_metric(
            "writer",
            format!(
                "Report drafted ({} chars, ~{} words)",
                report.chars().count(),
                report.split_whitespace().count()
            ),
            StepStatus::Completed,
            report.chars().count() as u64,
        ))?;

        // ─── Judge ───────────────────────────────────────────────
        em.emit(&StreamEvent::thought(
            "judge",
            "Verifying report quality...",
            StepStatus::Running,
        ))?;
        let verdict = self.judge(&req.question, &report).await?;
        let quality_warning = verdict.quality_warning();
        let (status, message) = if verdict.inconclusive {
            (
                StepStatus::Completed,
                format!(
                    "Judge inconclusive, using default score {:.0}%",
                    verdict.score * 100.0
                ),
            )
        } else if quality_warning {
            (
                StepStatus::Error,
                format!(
                    "Score {:.0}% is below the quality threshold ({} issues)",
                    verdict.score * 100.0,
                    verdict.issues
                ),
            )
        } else {
            (
                StepStatus::Completed,
                format!("Score {:.0}%, {} issues found", verdict.score * 100.0, verdict.issues),
            )
        };
        em.emit(&StreamEvent::thought("judge", message, status))?;

        // ─── Stream + finalize ───────────────────────────────────
        stream_text(&em, &report)?;
        em.emit(&StreamEvent::Sources {
            sources: sources.refs(),
        })?;
        em.emit(&done_event(&report_id, verdict.score, quality_warning))?;

        tracing::info!(
            report_id = %report_id,
            score = verdict.score,
            quality_warning,
            chars = report.len(),
            "Relatório concluído"
        );
        Ok(())
    }

    async fn plan(&self, question: &str, sources: &SourceContext) -> Result<Outline> {
        let messages = [
            Message::system(PLANNER_SYSTEM),
            Message::user(format!(
                "Question: {question}\n\nAvailable sources:\n{}",
                sources.summaries()
            )),
        ];
        let reply = self
            .gateway
            .call("planner", &messages, 512, 0.2)
            .await
            .context("planner failed")?;
        Ok(Outline::from_reply(question, &reply.text))
    }

    async fn write(&self, req: &ReportRequest, outline: &Outline, sources: &SourceContext) -> Result<String> {
        let context = sources.context_block();
        let evidence = if context.is_empty() {
            "(no source context provided)".to_string()
        } else {
            context
        };
        let messages = [
            Message::system(WRITER_SYSTEM),
            Message::user(format!(
                "## Research question\n{}\n\n## Outline\n{}\n\n## Source context\n{}\n\n\
                 Write the complete report now.",
                req.question, outline.text, evidence
            )),
        ];
        let reply = self
            .gateway
            .call("writer", &messages, req.depth.writer_max_tokens(), 0.3)
            .await
            .context("writer failed")?;

        if reply.text.trim().is_empty() {
            bail!("writer returned an empty report");
        }
        Ok(reply.text)
    }

    async fn judge(&self, question: &str, report: &str) -> Result<Verdict> {
        let messages = [
            Message::system(JUDGE_SYSTEM),
            Message::user(format!(
                "Question: {question}\n\nReport:\n{}",
                truncate_chars(report, JUDGE_REPORT_CHARS)
            )),
        ];
        let reply = self
            .gateway
            .call("judge", &messages, 512, 0.1)
            .await
            .context("judge failed")?;

        let verdict = Verdict::from_reply(&reply.text);
        if verdict.inconclusive {
            tracing::warn!(reply = %truncate_chars(&reply.text, 200), "Juiz devolveu resposta sem score");
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{names, pipeline, report_text, ScriptedGateway};
    use crate::sources::{SourceRecord, SourceStore, SourceType};
    use crate::web::sse::{collect_frames, spawn_producer};

    const PLAN: &str = r#"{"report_title": "Caches", "sub_questions": ["a?", "b?", "c?"], "must_check": ["p99"]}"#;

    fn request(question: &str) -> ReportRequest {
        ReportRequest {
            question: question.into(),
            source_ids: vec![],
            depth: Depth::Deep,
            allow_web_search: false,
        }
    }

    async fn run(
        gateway: std::sync::Arc<ScriptedGateway>,
        req: ReportRequest,
    ) -> Vec<(String, serde_json::Value)> {
        let (pipe, _) = pipeline(gateway);
        let rx = spawn_producer("pipeline", move |em| async move {
            pipe.run_report(req, "run-1".into(), em).await
        });
        collect_frames(rx).await
    }

    #[test]
    fn verdict_from_prose() {
        let v = Verdict::from_reply(r#"My take: {"score": 0.85, "feedback": "ok"} thanks"#);
        assert_eq!(v.score, 0.85);
        assert!(!v.inconclusive);
        assert!(!v.quality_warning());
    }

    #[test]
    fn verdict_fallbacks() {
        for raw in ["no json", r#"{"score": "high"}"#, r#"{"feedback": "x"}"#, ""] {
            let v = Verdict::from_reply(raw);
            assert!(v.inconclusive, "{raw}");
            assert_eq!(v.score, DEFAULT_JUDGE_SCORE);
        }
    }

    #[test]
    fn verdict_is_clamped_and_thresholded() {
        assert_eq!(Verdict::from_reply(r#"{"score": 1.7}"#).score, 1.0);
        assert!(Verdict::from_reply(r#"{"score": 0.59}"#).quality_warning());
        assert!(!Verdict::from_reply(r#"{"score": 0.6}"#).quality_warning());
    }

    #[test]
    fn outline_from_json_plan() {
        let o = Outline::from_reply("q", PLAN);
        assert_eq!(o.sections, 3);
        assert!(o.text.starts_with("# Caches"));
        assert!(o.text.contains("- p99"));
        assert!(o.sufficient_sources);
    }

    #[test]
    fn outline_from_prose() {
        let o = Outline::from_reply("q", "# Title\n1. Intro\n2. Design\n- risks\nplain line");
        assert_eq!(o.sections, 4);
        assert!(o.sufficient_sources);
        assert_eq!(Outline::from_reply("q", "").text, "# q");
    }

    #[tokio::test]
    async fn full_run_emits_events_in_order() {
        let report = "## Report\n".repeat(60);
        let gw = ScriptedGateway::new(vec![
            Ok(PLAN),
            Ok(&report),
            Ok(r#"Verdict: {"score": 0.85, "feedback": "ok"}"#),
        ]);
        let frames = run(gw.clone(), request("How do caches fail?")).await;

        assert_eq!(gw.purposes(), vec!["planner", "writer", "judge"]);
        let n = names(&frames);
        assert_eq!(&n[..6], &["thought"; 6]);
        assert!(n[6..n.len() - 2].iter().all(|e| *e == "report"));
        assert_eq!(&n[n.len() - 2..], &["sources", "done"]);

        assert_eq!(frames[1].1["metric"], 3);
        assert_eq!(frames[5].1["status"], "completed");
        assert_eq!(report_text(&frames), report);

        let done = &frames.last().unwrap().1;
        assert_eq!(done["report_id"], "run-1");
        assert_eq!(done["evaluation_score"], 0.85);
        assert_eq!(done["retry_count"], 0);
        assert_eq!(done["quality_warning"], false);
    }

    #[tokio::test]
    async fn low_score_sets_warning_and_marks_judge_error() {
        let gw = ScriptedGateway::new(vec![Ok("outline"), Ok("short report"), Ok(r#"{"score": 0.3}"#)]);
        let frames = run(gw, request("q")).await;

        let judge_done = frames
            .iter()
            .find(|(n, d)| n == "thought" && d["node"] == "judge" && d["status"] != "running")
            .unwrap();
        assert_eq!(judge_done.1["status"], "error");

        let (name, done) = frames.last().unwrap();
        assert_eq!(name, "done");
        assert_eq!(done["quality_warning"], true);
        assert_eq!(done["evaluation_score"], 0.3);
    }

    #[tokio::test]
    async fn writer_budget_follows_depth() {
        let gw = ScriptedGateway::new(vec![Ok("o"), Ok("r"), Ok("{}")]);
        let mut req = request("q");
        req.depth = Depth::Quick;
        run(gw.clone(), req).await;
        let calls = gw.calls.lock();
        assert_eq!(calls[1].max_tokens, 2048);
        assert_eq!(calls[0].temperature, 0.2);
    }

    #[tokio::test]
    async fn stage_failure_is_single_error_without_done() {
        let gw = ScriptedGateway::new(vec![Ok(PLAN), Err("openrouter (attempt 1): HTTP 401")]);
        let frames = run(gw, request("q")).await;
        let n = names(&frames);
        assert_eq!(n.last(), Some(&"error"));
        assert!(!n.contains(&"done"));
        assert!(!n.contains(&"report"));
        assert_eq!(n.iter().filter(|e| **e == "error").count(), 1);
        assert!(frames.last().unwrap().1["message"]
            .as_str()
            .unwrap()
            .contains("writer failed"));
    }

    #[tokio::test]
    async fn empty_writer_output_is_an_error() {
        let gw = ScriptedGateway::new(vec![Ok(PLAN), Ok("   ")]);
        let frames = run(gw, request("q")).await;
        assert_eq!(names(&frames).last(), Some(&"error"));
    }

    #[tokio::test]
    async fn insufficient_sources_short_circuits() {
        let gw = ScriptedGateway::new(vec![Ok(r#"{"sub_questions": ["x"], "sufficient_sources": false}"#)]);
        let frames = run(gw.clone(), request("q")).await;
        assert_eq!(gw.purposes(), vec!["planner"]);
        assert_eq!(
            names(&frames),
            vec!["thought", "thought", "thought", "need_more_sources", "done"]
        );
        assert_eq!(frames.last().unwrap().1["evaluation_score"], 0.0);
    }

    #[tokio::test]
    async fn sources_are_reported_and_fed_to_writer() {
        let gw = ScriptedGateway::new(vec![
            Ok(r#"{"sub_questions": ["x"], "sufficient_sources": false}"#),
            Ok("report body"),
            Ok(r#"{"score": 0.9}"#),
        ]);
        let (pipe, store) = pipeline(gw.clone());
        let rec = store.insert(SourceRecord::build(SourceType::Url, "Paper", "evidence about caches"));

        let mut req = request("q");
        req.source_ids = vec![rec.id.clone(), "unknown".into()];
        let rx = spawn_producer("pipeline", move |em| async move {
            pipe.run_report(req, "r".into(), em).await
        });
        let frames = collect_frames(rx).await;

        let sources = &frames.iter().find(|(n, _)| n == "sources").unwrap().1;
        assert_eq!(sources["sources"][0]["source_id"], rec.id.as_str());
        assert_eq!(sources["sources"].as_array().unwrap().len(), 1);

        let writer_prompt = &gw.calls.lock()[1].messages[1].content;
        assert!(writer_prompt.contains("evidence about caches"));
    }
}
