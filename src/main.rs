//! # Engineering Oracle — Backend de Relatórios de Engenharia
//!
//! **Ponto de entrada principal** do serviço.
//!
//! O usuário ingere fontes (PDF, URL, GitHub) e faz perguntas de
//! engenharia, recebendo uma resposta rápida ou um "deep report" em
//! vários estágios, transmitido ao vivo via Server-Sent Events.
//!
//! ## Fluxo de Inicialização
//!
//! ```text
//! main()
//!   ├── Configura tracing/logging (RUST_LOG, default "info")
//!   ├── Settings::from_env()
//!   ├── FailoverGateway (OpenRouter → Groq)
//!   ├── InMemorySourceStore (compartilhado por pipeline e ingestor)
//!   ├── Ingestor (reqwest + backend de PDF configurado)
//!   ├── Monta AppState e Router
//!   └── Inicia servidor TCP (BIND_ADDR, default 0.0.0.0:3000)
//! ```
//!
//! ## Exemplo de Uso
//!
//! ```bash
//! OPENROUTER_API_KEY=sk-... cargo run
//!
//! # Logs detalhados do gateway
//! RUST_LOG=engineering_oracle=debug cargo run
//! ```
//!
//! Sem nenhuma chave o servidor sobe mesmo assim: `/health` e `/ingest`
//! funcionam, e os endpoints SSE respondem 500 com `{detail}`.

/// Módulo `config` — settings lidas do ambiente.
mod config;

/// Módulo `ingest` — extratores de URL, GitHub e PDF.
mod ingest;

/// Módulo `llm` — provedores de chat-completion e gateway com failover.
mod llm;

/// Módulo `pdf` — backends de extração de texto de PDF.
mod pdf;

/// Módulo `pipeline` — execuções answer, report e flashcards.
mod pipeline;

/// Módulo `sources` — fontes ingeridas e o store em memória.
mod sources;

/// Módulo `structured` — JSON best-effort em respostas de LLM.
mod structured;

/// Módulo `web` — servidor axum, handlers HTTP e emissor SSE.
mod web;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::ingest::Ingestor;
use crate::llm::FailoverGateway;
use crate::pipeline::Pipeline;
use crate::sources::{InMemorySourceStore, SourceStore};
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Engineering Oracle — Starting...");

    let settings = Settings::from_env();
    tracing::info!(
        openrouter = settings.primary.is_configured(),
        groq = settings.secondary.is_configured(),
        backend_url = %settings.backend_url,
        pdf_backend = ?settings.pdf_backend,
        "Configuração carregada"
    );

    let gateway = FailoverGateway::from_settings(&settings).context("failed to build LLM providers")?;
    if !llm::ChatGateway::is_configured(&gateway) {
        tracing::warn!("Nenhuma chave de LLM configurada; /answer, /report e /flashcards vão responder 500");
    }

    let store: Arc<dyn SourceStore> = Arc::new(InMemorySourceStore::new());
    let pipeline = Pipeline::new(Arc::new(gateway), store.clone());
    let ingestor = Ingestor::new(pdf::backend_for(settings.pdf_backend), store)
        .context("failed to build HTTP client for ingestion")?;

    let app = web::create_router(AppState::new(pipeline, ingestor));

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    tracing::info!(addr = %settings.bind_addr, "Server running");

    axum::serve(listener, app).await?;

    Ok(())
}
