//! Erros da camada de provedores LLM.

use thiserror::Error;

/// Status HTTP que justificam uma segunda tentativa no provedor primário.
const RETRYABLE_STATUS: [u16; 4] = [429, 500, 502, 503];

/// Falha de uma única chamada a um provedor.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// O provedor respondeu com status não-2xx.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Erro de transporte (conexão, timeout, TLS...).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Corpo 2xx que não segue o formato de chat-completion.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Falha na montagem do cliente (chave com caracteres inválidos etc.).
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl ProviderError {
    /// Classifica a falha como transitória.
    ///
    /// Transitória = status 429/500/502/503, ou a palavra "timeout" em
    /// qualquer ponto da mensagem.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } if RETRYABLE_STATUS.contains(status) => true,
            Self::Transport(e) if e.is_timeout() => true,
            other => other.to_string().to_lowercase().contains("timeout"),
        }
    }
}

/// Falha do gateway como um todo.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Nenhuma chave de provedor configurada.
    #[error("No LLM provider configured. Set OPENROUTER_API_KEY or GROQ_API_KEY.")]
    NotConfigured,

    /// Todos os provedores configurados falharam. Uma linha por tentativa,
    /// na ordem em que foram feitas.
    #[error("All LLM providers failed:\n{}", .failures.join("\n"))]
    Exhausted { failures: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ProviderError {
        ProviderError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn retryable_status_codes() {
        for code in [429, 500, 502, 503] {
            assert!(status(code).is_retryable(), "{code} should be retryable");
        }
        for code in [400, 401, 404, 504] {
            assert!(!status(code).is_retryable(), "{code} should be terminal");
        }
    }

    #[test]
    fn timeout_in_message_is_retryable() {
        let err = ProviderError::InvalidResponse("upstream Timeout while reading".into());
        assert!(err.is_retryable());
        let err = ProviderError::InvalidResponse("missing choices".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn exhausted_lists_one_line_per_failure() {
        let err = GatewayError::Exhausted {
            failures: vec!["openrouter (attempt 1): HTTP 500".into(), "groq: HTTP 401".into()],
        };
        let text = err.to_string();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with("groq: HTTP 401"));
    }
}
