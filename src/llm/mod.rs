//! # Gateway LLM — Failover entre Provedores
//!
//! Interface única para chamadas de chat-completion. O [`FailoverGateway`]
//! tenta o provedor primário (OpenRouter), repete uma única vez em falhas
//! transitórias e, se ainda assim falhar, cai para o secundário (Groq).
//!
//! ```text
//! call(messages, max_tokens, temperature)
//!   ├── primário configurado?
//!   │   ├── tentativa 1 ── ok → retorna
//!   │   ├── falha transitória (429/500/502/503/timeout) → espera fixa
//!   │   └── tentativa 2 ── ok → retorna
//!   ├── secundário configurado? → tentativa única ── ok → retorna
//!   └── Exhausted { uma linha por falha } | NotConfigured
//! ```
//!
//! Nenhum cache e nenhum controle de rate-limit entre chamadas.

pub mod error;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{GatewayError, ProviderError};
use provider::{ChatProvider, CompletionRequest};

/// Papel de uma mensagem na conversa.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// Uma mensagem enviada ao provedor. Imutável depois de construída.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Resultado de uma chamada bem-sucedida.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderResult {
    /// Texto da resposta; pode ser vazio.
    pub text: String,
    pub model: String,
    pub provider: String,
    pub latency_ms: u64,
}

/// Costura entre os estágios do pipeline e os provedores.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// `purpose` identifica o estágio chamador nos logs ("planner", "judge"...).
    async fn call(
        &self,
        purpose: &'static str,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<ProviderResult, GatewayError>;

    /// `false` quando nenhum provedor tem chave configurada.
    fn is_configured(&self) -> bool;
}

/// Gateway com retry único no primário e failover para o secundário.
pub struct FailoverGateway {
    primary: Option<Arc<dyn ChatProvider>>,
    secondary: Option<Arc<dyn ChatProvider>>,
    retry_backoff: Duration,
}

impl FailoverGateway {
    /// Número máximo de tentativas no provedor primário.
    pub const PRIMARY_ATTEMPTS: u32 = 2;

    pub fn new(
        primary: Option<Arc<dyn ChatProvider>>,
        secondary: Option<Arc<dyn ChatProvider>>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            retry_backoff,
        }
    }

    /// Monta o gateway a partir das settings; provedores sem chave ficam de fora.
    pub fn from_settings(settings: &crate::config::Settings) -> Result<Self, ProviderError> {
        let primary = provider::OpenAiCompatible::from_settings(&settings.primary, settings.llm_timeout)?
            .map(|p| Arc::new(p) as Arc<dyn ChatProvider>);
        let secondary =
            provider::OpenAiCompatible::from_settings(&settings.secondary, settings.llm_timeout)?
                .map(|p| Arc::new(p) as Arc<dyn ChatProvider>);
        Ok(Self::new(primary, secondary, settings.retry_backoff))
    }
}

#[async_trait]
impl ChatGateway for FailoverGateway {
    async fn call(
        &self,
        purpose: &'static str,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<ProviderResult, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let req = CompletionRequest {
            messages,
            max_tokens,
            temperature,
        };
        let mut failures = Vec::new();

        if let Some(primary) = &self.primary {
            for attempt in 1..=Self::PRIMARY_ATTEMPTS {
                match primary.complete(&req).await {
                    Ok(result) => {
                        tracing::info!(
                            purpose,
                            provider = %result.provider,
                            model = %result.model,
                            attempt,
                            latency_ms = result.latency_ms,
                            "LLM call succeeded"
                        );
                        return Ok(result);
                    }
                    Err(err) => {
                        let retryable = err.is_retryable();
                        tracing::warn!(
                            purpose,
                            provider = primary.name(),
                            attempt,
                            retryable,
                            error = %err,
                            "LLM call failed"
                        );
                        failures.push(failure_line(&format!("{} (attempt {attempt})", primary.name()), &err));
                        if !retryable || attempt == Self::PRIMARY_ATTEMPTS {
                            break;
                        }
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        if let Some(secondary) = &self.secondary {
            match secondary.complete(&req).await {
                Ok(result) => {
                    tracing::info!(
                        purpose,
                        provider = %result.provider,
                        model = %result.model,
                        fallback = self.primary.is_some(),
                        latency_ms = result.latency_ms,
                        "LLM call succeeded"
                    );
                    return Ok(result);
                }
                Err(err) => {
                    tracing::error!(purpose, provider = secondary.name(), error = %err, "LLM fallback failed");
                    failures.push(failure_line(secondary.name(), &err));
                }
            }
        }

        Err(GatewayError::Exhausted { failures })
    }

    fn is_configured(&self) -> bool {
        self.primary.is_some() || self.secondary.is_some()
    }
}

/// Uma linha do erro agregado; corpos HTML multi-linha viram uma linha só.
fn failure_line(label: &str, err: &ProviderError) -> String {
    let flat = err.to_string().split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{label}: {flat}")
}
