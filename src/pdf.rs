//! # Extração de Texto de PDF — Backends Plugáveis
//!
//! O ingestor recebe os bytes do PDF já decodificados do base64 e delega a
//! extração a um [`PdfTextExtractor`]. Dois backends existem:
//!
//! | Backend             | `PDF_EXTRACTOR` | Estratégia                                   |
//! |---------------------|-----------------|----------------------------------------------|
//! | [`ContentStreamScraper`] | `heuristic` (default) | varre blocos `BT … ET` atrás de strings literais |
//! | [`PdfExtractBackend`]    | `pdf-extract`         | parser real via crate `pdf_extract`        |
//!
//! ## Heurística de Content Stream
//!
//! ```text
//! bytes ──Latin-1──► String
//!   └── regex BT(.*?)ET           (blocos de texto do content stream)
//!         └── (literal) Tj        → fragmento
//!             [(a)-20(b)] TJ      → fragmentos colados ("ab")
//! ```
//!
//! Não é um parser de PDF: streams comprimidos (`FlateDecode`) ou fontes
//! com encoding próprio produzem lixo ou nada. Nesse caso o corpo vira
//! [`PDF_PLACEHOLDER`].
//!
//! ## Normalização
//!
//! Todo texto extraído passa por [`normalize_pdf_text()`]: NFC para que
//! "ã" decomposto (U+0061 U+0303) e precomposto (U+00E3) se comparem
//! iguais, e colapso de espaços por linha.

use std::iter::Peekable;
use std::str::{Chars, FromStr};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Corpo usado quando nenhum texto pôde ser extraído.
pub const PDF_PLACEHOLDER: &str = "[No extractable text found in this PDF. \
The document may use compressed content streams or scanned images.]";

static TEXT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\bBT\b(.*?)\bET\b").expect("invalid regex"));

/// Qual backend de extração usar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PdfBackend {
    #[default]
    Heuristic,
    PdfExtract,
}

impl FromStr for PdfBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(PdfBackend::Heuristic),
            "pdf-extract" | "pdf_extract" => Ok(PdfBackend::PdfExtract),
            other => Err(format!("unknown PDF extractor '{other}' (expected heuristic or pdf-extract)")),
        }
    }
}

/// Extrai texto bruto dos bytes de um PDF.
///
/// Chamado dentro de `spawn_blocking`: implementações podem ser lentas.
pub trait PdfTextExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// Instancia o backend configurado.
pub fn backend_for(kind: PdfBackend) -> Arc<dyn PdfTextExtractor> {
    match kind {
        PdfBackend::Heuristic => Arc::new(ContentStreamScraper),
        PdfBackend::PdfExtract => Arc::new(PdfExtractBackend),
    }
}

/// Raspa strings literais dos operadores de texto do content stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentStreamScraper;

impl PdfTextExtractor for ContentStreamScraper {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        // Latin-1: cada byte vira exatamente um char.
        let raw: String = bytes.iter().map(|&b| b as char).collect();

        let blocks: Vec<String> = TEXT_BLOCK
            .captures_iter(&raw)
            .filter_map(|caps| caps.get(1))
            .map(|m| block_text(m.as_str()))
            .filter(|text| !text.trim().is_empty())
            .collect();

        tracing::debug!(blocks = blocks.len(), bytes = bytes.len(), "Blocos BT/ET raspados");
        Ok(blocks.join("\n"))
    }
}

/// Backend baseado no crate `pdf_extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractBackend;

impl PdfTextExtractor for PdfExtractBackend {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        // pdf_extract entra em pânico com alguns arquivos malformados.
        std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| anyhow!("PDF parser crashed on this document"))?
            .context("Failed to extract text from PDF")
    }
}

/// Texto de um bloco `BT … ET`.
///
/// Fragmentos dentro de um mesmo array `TJ` são colados; fragmentos de
/// operadores distintos são separados por espaço.
fn block_text(block: &str) -> String {
    let mut out = String::new();
    let mut chars = block.chars().peekable();
    let mut in_array = false;
    let mut glue = false;

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                in_array = true;
                glue = false;
            }
            ']' => {
                in_array = false;
                glue = false;
            }
            '(' => {
                let fragment = read_literal(&mut chars);
                if !out.is_empty() && !glue {
                    out.push(' ');
                }
                out.push_str(&fragment);
                glue = in_array;
            }
            _ => {}
        }
    }
    out
}

/// Lê uma string literal a partir do caractere após `(`, até o `)` que a fecha.
fn read_literal(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut out = String::new();
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '(' => {
                depth += 1;
                out.push(c);
            }
            ')' if depth == 0 => break,
            ')' => {
                depth -= 1;
                out.push(c);
            }
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('b') => out.push('\u{8}'),
                Some('f') => out.push('\u{c}'),
                // Continuação de linha.
                Some('\n') => {}
                Some('\r') => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                }
                Some(d @ '0'..='7') => {
                    let mut code = d.to_digit(8).unwrap_or(0);
                    for _ in 0..2 {
                        match chars.peek().and_then(|c| c.to_digit(8)) {
                            Some(next) => {
                                code = code * 8 + next;
                                chars.next();
                            }
                            None => break,
                        }
                    }
                    out.push(char::from((code & 0xff) as u8));
                }
                Some(other) => out.push(other),
                None => break,
            },
            _ => out.push(c),
        }
    }
    out
}

/// NFC + colapso de espaços em cada linha; linhas vazias são descartadas.
pub fn normalize_pdf_text(text: &str) -> String {
    let normalized: String = text.nfc().collect();
    normalized
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extrai e normaliza; texto vazio vira [`PDF_PLACEHOLDER`].
pub fn extract_pdf_text(extractor: &dyn PdfTextExtractor, bytes: &[u8]) -> Result<String> {
    let text = normalize_pdf_text(&extractor.extract(bytes)?);
    if text.is_empty() {
        tracing::warn!(backend = extractor.name(), "PDF sem texto extraível");
        return Ok(PDF_PLACEHOLDER.to_string());
    }
    tracing::info!(backend = extractor.name(), chars = text.chars().count(), "Texto extraído do PDF");
    Ok(text)
}
