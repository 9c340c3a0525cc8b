//! Adaptador para APIs de chat-completion compatíveis com OpenAI.
//!
//! OpenRouter e Groq expõem o mesmo formato (`POST {base}/chat/completions`),
//! então um único adaptador atende os dois provedores; só mudam chave,
//! modelo e URL base.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::{Message, ProviderResult};
use crate::config::ProviderSettings;

/// Parâmetros de uma chamada, independentes do provedor.
#[derive(Clone, Debug)]
pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Um provedor de chat-completion.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Nome curto para logs e para a mensagem de erro agregada.
    fn name(&self) -> &str;

    async fn complete(&self, req: &CompletionRequest<'_>) -> Result<ProviderResult, ProviderError>;
}

/// Cliente HTTP para um endpoint compatível com OpenAI.
#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    name: &'static str,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatible {
    /// Cria o adaptador a partir das settings; `None` se não há chave.
    pub fn from_settings(
        settings: &ProviderSettings,
        timeout: Duration,
    ) -> Result<Option<Self>, ProviderError> {
        match &settings.api_key {
            Some(key) => Self::new(
                settings.name,
                key,
                settings.model.clone(),
                settings.base_url.clone(),
                timeout,
            )
            .map(Some),
            None => Ok(None),
        }
    }

    pub fn new(
        name: &'static str,
        api_key: &str,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::Setup("invalid API key format".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Setup(e.to_string()))?;

        Ok(Self {
            name,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// ─── Formato da API ──────────────────────────────────────────────

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatProvider for OpenAiCompatible {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, req: &CompletionRequest<'_>) -> Result<ProviderResult, ProviderError> {
        let started = Instant::now();
        let body = ChatApiRequest {
            model: &self.model,
            messages: req.messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };

        let response = self.client.post(self.chat_url()).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let parsed: ChatApiResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("invalid JSON: {e}")))?;

        // Texto ausente ou nulo é sucesso com string vazia.
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(ProviderResult {
            text: content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            provider: self.name.to_string(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
