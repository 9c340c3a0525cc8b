//! # Configuração — Variáveis de Ambiente
//!
//! Carrega as [`Settings`] da aplicação a partir do ambiente, uma única vez
//! em `main()`. Toda opção tem um default documentado; string vazia conta
//! como ausente.
//!
//! | Variável | Default |
//! |----------|---------|
//! | `OPENROUTER_API_KEY` | (ausente) — provedor primário |
//! | `OPENROUTER_MODEL` | `openrouter/auto` |
//! | `OPENROUTER_BASE_URL` | `https://openrouter.ai/api/v1` |
//! | `GROQ_API_KEY` | (ausente) — provedor secundário |
//! | `GROQ_MODEL` | `llama-3.3-70b-versatile` |
//! | `GROQ_BASE_URL` | `https://api.groq.com/openai/v1` |
//! | `BACKEND_URL` | `http://localhost:8000` |
//! | `BIND_ADDR` | `0.0.0.0:3000` |
//! | `LLM_TIMEOUT_SECS` | `120` |
//! | `LLM_RETRY_BACKOFF_MS` | `1000` |
//! | `PDF_EXTRACTOR` | `heuristic` |

use std::time::Duration;

use crate::pdf::PdfBackend;

pub const DEFAULT_PRIMARY_MODEL: &str = "openrouter/auto";
pub const DEFAULT_PRIMARY_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_SECONDARY_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_SECONDARY_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Credenciais e endpoint de um provedor de chat-completion.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    /// Nome curto usado em logs e mensagens de erro (ex: "openrouter").
    pub name: &'static str,
    /// Chave de API; `None` quando o provedor não está configurado.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl ProviderSettings {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Configuração completa da aplicação.
#[derive(Clone, Debug)]
pub struct Settings {
    pub primary: ProviderSettings,
    pub secondary: ProviderSettings,
    /// Upstream para implantações em modo proxy (apenas registrado no startup).
    pub backend_url: String,
    pub bind_addr: String,
    /// Timeout por requisição a um provedor.
    pub llm_timeout: Duration,
    /// Espera fixa entre a 1ª e a 2ª tentativa no provedor primário.
    pub retry_backoff: Duration,
    pub pdf_backend: PdfBackend,
}

impl Settings {
    /// Lê as settings do ambiente do processo.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Lê as settings a partir de uma função de lookup arbitrária.
    ///
    /// Separado de [`Settings::from_env`] para que os testes não precisem
    /// mexer no ambiente global do processo.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let pdf_backend = match get("PDF_EXTRACTOR") {
            Some(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %value, "PDF_EXTRACTOR desconhecido, usando heuristic");
                PdfBackend::Heuristic
            }),
            None => PdfBackend::Heuristic,
        };

        Self {
            primary: ProviderSettings {
                name: "openrouter",
                api_key: get("OPENROUTER_API_KEY"),
                model: get_or("OPENROUTER_MODEL", DEFAULT_PRIMARY_MODEL),
                base_url: get_or("OPENROUTER_BASE_URL", DEFAULT_PRIMARY_BASE_URL),
            },
            secondary: ProviderSettings {
                name: "groq",
                api_key: get("GROQ_API_KEY"),
                model: get_or("GROQ_MODEL", DEFAULT_SECONDARY_MODEL),
                base_url: get_or("GROQ_BASE_URL", DEFAULT_SECONDARY_BASE_URL),
            },
            backend_url: get_or("BACKEND_URL", DEFAULT_BACKEND_URL),
            bind_addr: get_or("BIND_ADDR", DEFAULT_BIND_ADDR),
            llm_timeout: get("LLM_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(120)),
            retry_backoff: get("LLM_RETRY_BACKOFF_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(1000)),
            pdf_backend,
        }
    }
}
