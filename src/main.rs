use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use codebase_gpt_core::config::{Config, VectorBackend};
use codebase_gpt_core::vault::{EnvVaultProvider, Secret};
use codebase_gpt_core::{Controller, QueryEngine};
use codebase_gpt_gateway::GatewayServer;
use codebase_gpt_index::NAMESPACE_FIELD;
use codebase_gpt_index::extractor::Extractor;
use codebase_gpt_index::fetcher::GitFetcher;
use codebase_gpt_index::indexer::{Indexer, IndexerConfig};
use codebase_gpt_index::retriever::Retriever;
use codebase_gpt_llm::AnyProvider;
use codebase_gpt_llm::openai::OpenAiProvider;
use codebase_gpt_store::{InMemoryVectorStore, QdrantOps, VectorStore};
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "codebase-gpt", version, about = "Chat with a Git repository")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CODEBASE_GPT_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let mut config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;
    config.resolve_secrets(&EnvVaultProvider).await?;
    tracing::info!(
        config = %cli.config.display(),
        llm = %config.llm.model,
        embedding = %config.embedding.model,
        backend = ?config.vector_store.backend,
        "configuration loaded"
    );

    let controller = Arc::new(build_controller(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    GatewayServer::new(
        &config.gateway.bind,
        config.gateway.port,
        controller,
        shutdown_rx,
    )
    .with_rate_limit(config.gateway.rate_limit)
    .with_max_body_size(config.gateway.max_body_size)
    .with_session_limits(config.gateway.max_sessions, config.gateway.session_ttl_secs)
    .serve()
    .await?;

    Ok(())
}

fn build_controller(config: &Config) -> anyhow::Result<Controller> {
    let chat = OpenAiProvider::new(
        expose(config.secrets.llm_api_key.as_ref()),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
        None,
    )
    .context("failed to build chat client")?
    .with_name("chat");

    let embedder = OpenAiProvider::new(
        expose(config.secrets.embedding_api_key.as_ref()),
        config.embedding.base_url.clone(),
        config.embedding.model.clone(),
        config.llm.max_tokens,
        Some(config.embedding.model.clone()),
    )
    .context("failed to build embedding client")?
    .with_name("embeddings")
    .with_embedding_batch_size(config.embedding.batch_size);

    let store = build_store(config)?;
    let embedder = Arc::new(AnyProvider::OpenAi(embedder));
    let collection = config.vector_store.collection.clone();

    let indexer = Indexer::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        IndexerConfig {
            collection: collection.clone(),
            reindex: config.index.reindex,
        },
    );
    let retriever = Retriever::new(store, embedder, collection, config.retrieval.clone());
    let query = QueryEngine::new(
        retriever,
        Arc::new(AnyProvider::OpenAi(chat)),
        config.llm.system_prompt.clone(),
    );

    Ok(Controller::new(
        Arc::new(GitFetcher::new(config.fetch.clone())),
        Extractor::new(&config.extraction),
        config.chunking,
        indexer,
        query,
    ))
}

fn build_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend {
        VectorBackend::Qdrant => {
            let api_key = config.secrets.qdrant_api_key.as_ref().map(Secret::expose);
            let ops = QdrantOps::new(&config.vector_store.url, api_key)
                .with_context(|| format!("failed to connect to Qdrant at {}", config.vector_store.url))?
                .with_keyword_index(NAMESPACE_FIELD);
            Ok(Arc::new(ops))
        }
        VectorBackend::Memory => {
            tracing::warn!("using in-memory vector store, indexed repositories are lost on restart");
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
    }
}

fn expose(secret: Option<&Secret>) -> String {
    secret.map(|s| s.expose().to_owned()).unwrap_or_default()
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_config_path() {
        let cli = Cli::try_parse_from(["codebase-gpt"]).unwrap();
        if std::env::var_os("CODEBASE_GPT_CONFIG").is_none() {
            assert_eq!(cli.config, PathBuf::from("config/default.toml"));
        }
    }

    #[test]
    fn cli_accepts_config_flag() {
        let cli = Cli::try_parse_from(["codebase-gpt", "--config", "/etc/cgpt.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/cgpt.toml"));
    }

    #[test]
    fn expose_missing_secret_is_empty() {
        assert_eq!(expose(None), "");
        assert_eq!(expose(Some(&Secret::new("k"))), "k");
    }

    #[tokio::test]
    async fn memory_backend_builds_controller() {
        let mut config = Config::default();
        config.vector_store.backend = VectorBackend::Memory;
        assert!(build_controller(&config).is_ok());
    }
}
