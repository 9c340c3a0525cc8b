//! # Decodificação Estruturada Best-Effort
//!
//! Modelos LLM raramente devolvem JSON "limpo": vem cercado de prosa, de
//! blocos ```json, ou simplesmente quebrado. Este módulo tenta, em ordem:
//!
//! ```text
//! 1. primeiro trecho balanceado {…} ou […] dentro do texto
//! 2. o texto inteiro como JSON
//! 3. valor de fallback tipado
//! ```
//!
//! Nenhuma falha de parse escapa daqui: o chamador sempre recebe um valor.

use serde::de::DeserializeOwned;

/// Delimitador procurado pelo scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bracket {
    /// `{ ... }`
    Object,
    /// `[ ... ]`
    Array,
}

impl Bracket {
    fn pair(self) -> (char, char) {
        match self {
            Bracket::Object => ('{', '}'),
            Bracket::Array => ('[', ']'),
        }
    }
}

/// Localiza o primeiro trecho balanceado delimitado por `bracket`.
///
/// A contagem de profundidade ignora delimitadores dentro de strings JSON
/// (com escapes). Retorna `None` se o delimitador de abertura não existir
/// ou nunca for fechado.
pub fn first_balanced(text: &str, bracket: Bracket) -> Option<&str> {
    let (open, close) = bracket.pair();
    let start = text.find(open)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Tenta decodificar `T` a partir do texto bruto de um modelo.
///
/// Primeiro o trecho balanceado, depois o texto inteiro. `None` se ambos
/// falharem.
pub fn decode<T: DeserializeOwned>(raw: &str, bracket: Bracket) -> Option<T> {
    if let Some(fragment) = first_balanced(raw, bracket) {
        match serde_json::from_str(fragment) {
            Ok(value) => return Some(value),
            Err(e) => tracing::debug!(error = %e, "Trecho balanceado não decodificou"),
        }
    }
    serde_json::from_str(raw.trim()).ok()
}

/// Como [`decode`], mas com valor de fallback.
pub fn decode_or<T: DeserializeOwned>(raw: &str, bracket: Bracket, fallback: T) -> T {
    decode(raw, bracket).unwrap_or(fallback)
}
