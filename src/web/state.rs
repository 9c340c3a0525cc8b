//! # Estado da Aplicação Web
//!
//! Tudo que os handlers compartilham, montado uma única vez no `main`:
//!
//! ```text
//! AppState
//!  ├── pipeline  → Pipeline { gateway, store }   (/answer, /report, /flashcards)
//!  ├── ingestor  → Ingestor { client, pdf, store } (/ingest)
//!  └── service   → nome devolvido pelo /health
//! ```
//!
//! O mesmo `Arc<dyn SourceStore>` é injetado no pipeline e no ingestor,
//! então uma fonte ingerida fica visível para as execuções seguintes.

use std::sync::Arc;

use crate::ingest::Ingestor;
use crate::pipeline::Pipeline;

/// Estado compartilhado da aplicação Axum.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub ingestor: Arc<Ingestor>,
    pub service: &'static str,
}

impl AppState {
    pub fn new(pipeline: Pipeline, ingestor: Ingestor) -> Self {
        Self {
            pipeline,
            ingestor: Arc::new(ingestor),
            service: env!("CARGO_PKG_NAME"),
        }
    }
}
