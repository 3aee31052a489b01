//! Explicitly constructed runtime dependencies.
//!
//! Everything the commands and the HTTP server need is built once from
//! [`Config`] and passed around by reference. Nothing is global, so tests
//! can assemble a [`Services`] from in-memory stores and fake providers.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use pdfchat_core::completion::CompletionProvider;
use pdfchat_core::store::VectorStore;

use crate::completion::create_completion;
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::loader::DocumentLoader;
use crate::messages::SqliteMessageStore;
use crate::migrate;
use crate::sqlite_store::SqliteVectorStore;

pub struct Services {
    pub config: Config,
    pub store: Arc<dyn VectorStore>,
    pub messages: SqliteMessageStore,
    pub completion: Arc<dyn CompletionProvider>,
    pub loader: Arc<DocumentLoader>,
}

impl Services {
    /// Open the database (migrating it if needed) and build the providers
    /// named in `config`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply(&pool).await?;

        let embedder = create_provider(&config.embedding)?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(pool.clone(), embedder));
        let completion = create_completion(&config.completion)?;
        let loader = Arc::new(DocumentLoader::from_config(&config.ocr));

        Ok(Self::from_parts(config, pool, store, completion, loader))
    }

    /// Assemble from already-built parts.
    pub fn from_parts(
        config: Config,
        pool: SqlitePool,
        store: Arc<dyn VectorStore>,
        completion: Arc<dyn CompletionProvider>,
        loader: Arc<DocumentLoader>,
    ) -> Self {
        Self {
            config,
            store,
            messages: SqliteMessageStore::new(pool),
            completion,
            loader,
        }
    }
}
