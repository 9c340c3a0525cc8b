//! # Ingestão — Payload → Texto → [`SourceRecord`]
//!
//! Cada tipo de fonte tem seu extrator; todos convergem para o mesmo
//! final: truncar em 50 000 caracteres, empacotar em chunks de ~2000 e
//! guardar sob um UUID novo.
//!
//! ```text
//! url     ──GET (20s)──► HTML? ──sim──► html::extract_html()
//!                                 └não─► corpo como está, título = fim do path
//! github  ──blob link?──► GET raw.githubusercontent.com/...
//!                           └falhou──► extrator de URL no link original
//! pdf     ──base64──► bytes ──spawn_blocking──► PdfTextExtractor
//! ```
//!
//! ## Erros
//!
//! | Variante        | HTTP | Quando                                  |
//! |-----------------|------|-----------------------------------------|
//! | `EmptyPayload`  | 400  | payload vazio ou PDF de zero bytes      |
//! | `InvalidBase64` | 400  | payload de PDF não é base64             |
//! | `NoContent`     | 422  | extração não produziu texto             |
//! | `Fetch`/`Status`| 500  | falha de rede ou status não-2xx          |
//! | `Extract`       | 500  | backend de PDF falhou                    |
//!
//! Uma falha nunca gera registro parcial: o store só é tocado no fim.

pub mod github;
pub mod html;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pdf::{extract_pdf_text, PdfTextExtractor};
use crate::sources::{SourceRecord, SourceStore, SourceType};
use github::{BlobLink, RAW_GITHUB_BASE};

/// Timeout de cada fetch de URL.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Teto de bytes lidos por fetch; o texto final é truncado bem antes disso.
pub const MAX_FETCH_BYTES: usize = 2 * 1024 * 1024;

const USER_AGENT: &str = concat!("engineering-oracle/", env!("CARGO_PKG_VERSION"));

/// Corpo de `POST /ingest`.
#[derive(Clone, Debug, Deserialize)]
pub struct IngestRequest {
    pub source_type: SourceType,
    pub payload: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Resposta de `POST /ingest`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub source_id: String,
    pub title: String,
    pub char_count: usize,
    pub chunk_count: usize,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("payload must not be empty")]
    EmptyPayload,

    #[error("Invalid base64 PDF: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Could not extract content from {0}")]
    NoContent(String),

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("PDF extraction failed: {0:#}")]
    Extract(anyhow::Error),
}

/// Extrai texto de fontes e grava no store.
pub struct Ingestor {
    client: reqwest::Client,
    pdf: Arc<dyn PdfTextExtractor>,
    store: Arc<dyn SourceStore>,
    raw_github_base: String,
}

impl Ingestor {
    pub fn new(pdf: Arc<dyn PdfTextExtractor>, store: Arc<dyn SourceStore>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            pdf,
            store,
            raw_github_base: RAW_GITHUB_BASE.to_string(),
        })
    }

    /// Troca o host dos arquivos brutos do GitHub.
    #[cfg(test)]
    pub fn with_raw_github_base(mut self, base: impl Into<String>) -> Self {
        self.raw_github_base = base.into();
        self
    }

    /// Extrai, chunka e guarda uma fonte.
    pub async fn ingest(&self, req: IngestRequest) -> Result<IngestResponse, IngestError> {
        let payload = req.payload.trim();
        if payload.is_empty() {
            return Err(IngestError::EmptyPayload);
        }

        let (title, text) = match req.source_type {
            SourceType::Url => self.from_url(payload).await?,
            SourceType::Github => self.from_github(payload).await?,
            SourceType::Pdf => self.from_pdf(payload, req.file_name.as_deref()).await?,
        };

        if text.trim().is_empty() {
            return Err(IngestError::NoContent(match req.source_type {
                SourceType::Pdf => title,
                _ => payload.to_string(),
            }));
        }

        let record = self.store.insert(SourceRecord::build(req.source_type, title, &text));
        tracing::info!(
            source_id = %record.id,
            source_type = ?record.source_type,
            title = %record.title,
            chars = record.char_count,
            chunks = record.chunk_count(),
            stored = self.store.len(),
            "Fonte ingerida"
        );

        Ok(IngestResponse {
            source_id: record.id.clone(),
            title: record.title.clone(),
            char_count: record.char_count,
            chunk_count: record.chunk_count(),
        })
    }

    async fn from_url(&self, url: &str) -> Result<(String, String), IngestError> {
        let (content_type, body) = self.fetch(url).await?;
        if html::looks_like_html(content_type.as_deref(), &body) {
            Ok(html::extract_html(&body, url))
        } else {
            Ok((html::path_title(url), body))
        }
    }

    async fn from_github(&self, link: &str) -> Result<(String, String), IngestError> {
        if let Some(blob) = BlobLink::parse(link) {
            let raw = blob.raw_url(&self.raw_github_base);
            match self.fetch(&raw).await {
                Ok((_, body)) if !body.trim().is_empty() => return Ok((blob.title(), body)),
                Ok(_) => tracing::warn!(url = %raw, "Arquivo bruto vazio; usando extrator de URL"),
                Err(e) => tracing::warn!(url = %raw, error = %e, "Falha no arquivo bruto; usando extrator de URL"),
            }
        }
        self.from_url(link).await
    }

    async fn from_pdf(&self, payload: &str, file_name: Option<&str>) -> Result<(String, String), IngestError> {
        // Aceita tanto base64 puro quanto data URL.
        let encoded = payload
            .split_once(";base64,")
            .map_or(payload, |(_, data)| data);
        let bytes = STANDARD.decode(encoded.trim())?;
        if bytes.is_empty() {
            return Err(IngestError::EmptyPayload);
        }

        let pdf = self.pdf.clone();
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(pdf.as_ref(), &bytes))
            .await
            .map_err(|e| IngestError::Extract(anyhow::anyhow!("extractor task failed: {e}")))?
            .map_err(IngestError::Extract)?;

        let title = file_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Uploaded PDF")
            .to_string();
        Ok((title, text))
    }

    /// GET com status verificado; devolve `(content-type, corpo)`.
    async fn fetch(&self, url: &str) -> Result<(Option<String>, String), IngestError> {
        let fetch_err = |source| IngestError::Fetch {
            url: url.to_string(),
            source,
        };

        let mut resp = self.client.get(url).send().await.map_err(fetch_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(len) = resp.content_length().filter(|len| *len as usize > MAX_FETCH_BYTES) {
            tracing::warn!(url, content_length = len, cap = MAX_FETCH_BYTES, "Resposta grande; lendo só o início");
        }

        // Lê em chunks até o teto, sem carregar o corpo inteiro.
        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(fetch_err)? {
            let room = MAX_FETCH_BYTES - bytes.len();
            bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if bytes.len() >= MAX_FETCH_BYTES {
                break;
            }
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();
        tracing::debug!(url, status = status.as_u16(), bytes = bytes.len(), "Fetch concluído");
        Ok((content_type, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{ContentStreamScraper, PDF_PLACEHOLDER};
    use crate::sources::InMemorySourceStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ingestor() -> (Ingestor, Arc<InMemorySourceStore>) {
        let store = Arc::new(InMemorySourceStore::new());
        let ingestor = Ingestor::new(Arc::new(ContentStreamScraper), store.clone()).unwrap();
        (ingestor, store)
    }

    fn request(source_type: SourceType, payload: &str) -> IngestRequest {
        IngestRequest {
            source_type,
            payload: payload.into(),
            file_name: None,
        }
    }

    #[tokio::test]
    async fn html_page_is_stripped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_raw("<title>Doc</title><p>Hello   world</p>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let (ingestor, store) = ingestor();
        let resp = ingestor
            .ingest(request(SourceType::Url, &format!("{}/post", server.uri())))
            .await
            .unwrap();

        assert_eq!(resp.title, "Doc");
        assert_eq!(resp.char_count, 11);
        assert_eq!(resp.chunk_count, 1);
        assert_eq!(store.get(&resp.source_id).unwrap().content, "Hello world");
    }

    #[tokio::test]
    async fn oversized_bodies_are_read_only_up_to_the_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/huge.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("word ".repeat(MAX_FETCH_BYTES / 2)),
            )
            .mount(&server)
            .await;

        let (ingestor, _) = ingestor();
        let url = format!("{}/huge.txt", server.uri());
        let (_, body) = ingestor.fetch(&url).await.unwrap();
        assert_eq!(body.len(), MAX_FETCH_BYTES);
        assert!(body.starts_with("word word"));

        let resp = ingestor.ingest(request(SourceType::Url, &url)).await.unwrap();
        assert_eq!(resp.char_count, 50_000);
    }

    #[tokio::test]
    async fn long_plain_text_is_truncated_and_packed() {
        let server = MockServer::start().await;
        let body = "abcd ".repeat(20_000);
        Mock::given(method("GET"))
            .and(path("/notes.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let (ingestor, _) = ingestor();
        let resp = ingestor
            .ingest(request(SourceType::Url, &format!("{}/notes.txt", server.uri())))
            .await
            .unwrap();

        assert_eq!(resp.title, "notes.txt");
        assert_eq!(resp.char_count, 50_000);
        assert_eq!(resp.chunk_count, 25);
    }

    #[tokio::test]
    async fn upstream_error_is_status_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (ingestor, store) = ingestor();
        let err = ingestor
            .ingest(request(SourceType::Url, &server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Status { status: 404, .. }));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn empty_page_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_raw("<html><script>x()</script></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let (ingestor, _) = ingestor();
        let err = ingestor
            .ingest(request(SourceType::Url, &server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NoContent(_)));
    }

    #[tokio::test]
    async fn github_blob_fetches_raw_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokio-rs/axum/main/README.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# axum\n\nErgonomic web framework"))
            .mount(&server)
            .await;

        let (ingestor, _) = ingestor();
        let ingestor = ingestor.with_raw_github_base(server.uri());
        let resp = ingestor
            .ingest(request(
                SourceType::Github,
                "https://github.com/tokio-rs/axum/blob/main/README.md",
            ))
            .await
            .unwrap();
        assert_eq!(resp.title, "tokio-rs/axum: README.md");
        assert_eq!(resp.char_count, "# axum\n\nErgonomic web framework".len());
    }

    #[tokio::test]
    async fn github_non_blob_link_uses_url_extractor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_raw("<title>repo</title><main>Readme body</main>", "text/html"),
            )
            .mount(&server)
            .await;

        let (ingestor, _) = ingestor();
        let resp = ingestor
            .ingest(request(SourceType::Github, &format!("{}/repo", server.uri())))
            .await
            .unwrap();
        assert_eq!(resp.title, "repo");
    }

    #[tokio::test]
    async fn pdf_payloads() {
        let (ingestor, _) = ingestor();

        let pdf = STANDARD.encode(b"%PDF-1.4\nBT (Paxos made simple) Tj ET\n%%EOF");
        let mut req = request(SourceType::Pdf, &pdf);
        req.file_name = Some("paxos.pdf".into());
        let resp = ingestor.ingest(req).await.unwrap();
        assert_eq!(resp.title, "paxos.pdf");
        assert_eq!(resp.char_count, "Paxos made simple".len());

        let data_url = format!("data:application/pdf;base64,{}", STANDARD.encode(b"\x00\x01"));
        let resp = ingestor.ingest(request(SourceType::Pdf, &data_url)).await.unwrap();
        assert_eq!(resp.title, "Uploaded PDF");
        assert_eq!(resp.char_count, PDF_PLACEHOLDER.chars().count());

        let err = ingestor
            .ingest(request(SourceType::Pdf, "!!not base64!!"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidBase64(_)));

        let err = ingestor.ingest(request(SourceType::Pdf, "   ")).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyPayload));
    }

    #[test]
    fn request_shape() {
        let req: IngestRequest =
            serde_json::from_str(r#"{"source_type": "github", "payload": "https://github.com/a/b"}"#).unwrap();
        assert_eq!(req.source_type, SourceType::Github);
        assert!(req.file_name.is_none());
        assert!(serde_json::from_str::<IngestRequest>(r#"{"source_type": "ftp", "payload": "x"}"#).is_err());
    }
}
