//! # Source Store — Fontes Ingeridas em Memória
//!
//! Guarda o texto extraído de cada fonte (PDF, URL, GitHub) e seus chunks.
//! O store é injetado no [`AppState`](crate::web::state::AppState) como
//! `Arc<dyn SourceStore>`; a implementação padrão vive só na memória do
//! processo:
//!
//! - nada sobrevive a um restart;
//! - cada instância tem seu próprio conteúdo;
//! - registros nunca são alterados depois de inseridos.
//!
//! Quem precisar de durabilidade troca a implementação atrás do trait.
//!
//! ## Chunking
//!
//! ```text
//! "aaa bbb ccc ddd" com max_chars = 8
//!   → ["aaa bbb", "ccc ddd"]
//! ```
//!
//! Palavras são empacotadas gulosamente até que a próxima estoure o limite.
//! Uma palavra sozinha maior que o limite vira um chunk próprio.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Teto de caracteres mantidos por fonte.
pub const MAX_SOURCE_CHARS: usize = 50_000;

/// Tamanho alvo (em caracteres) de cada chunk.
pub const CHUNK_CHARS: usize = 2_000;

/// Tipo de fonte aceito pelo endpoint de ingestão.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Url,
    Github,
    Pdf,
}

/// Fonte ingerida. Somente leitura depois de criada.
#[derive(Clone, Debug, Serialize)]
pub struct SourceRecord {
    /// UUID v4 gerado na ingestão.
    pub id: String,
    pub title: String,
    pub source_type: SourceType,
    /// Texto completo (já truncado em [`MAX_SOURCE_CHARS`]).
    pub content: String,
    pub char_count: usize,
    pub chunks: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Monta o registro: trunca, chunka e gera um id novo.
    pub fn build(source_type: SourceType, title: impl Into<String>, text: &str) -> Self {
        let content = truncate_chars(text, MAX_SOURCE_CHARS).to_string();
        let chunks = pack_words(&content, CHUNK_CHARS);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            source_type,
            char_count: content.chars().count(),
            content,
            chunks,
            created_at: Utc::now(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Armazenamento chave-valor de fontes.
pub trait SourceStore: Send + Sync {
    fn insert(&self, record: SourceRecord) -> Arc<SourceRecord>;

    fn get(&self, id: &str) -> Option<Arc<SourceRecord>>;

    /// Busca vários ids, na ordem pedida, ignorando os desconhecidos.
    fn get_many(&self, ids: &[String]) -> Vec<Arc<SourceRecord>> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    fn len(&self) -> usize;
}

/// Implementação em memória, com escopo de instância.
#[derive(Default)]
pub struct InMemorySourceStore {
    records: RwLock<HashMap<String, Arc<SourceRecord>>>,
}

impl InMemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceStore for InMemorySourceStore {
    fn insert(&self, record: SourceRecord) -> Arc<SourceRecord> {
        let record = Arc::new(record);
        self.records.write().insert(record.id.clone(), record.clone());
        record
    }

    fn get(&self, id: &str) -> Option<Arc<SourceRecord>> {
        self.records.read().get(id).cloned()
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}

/// Corta `text` em no máximo `max_chars` caracteres (não bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Empacota palavras (separadas por whitespace) em chunks de até `max_chars`.
pub fn pack_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
