mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

use crate::vault::{Secret, VaultProvider};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.chunking.validate().context("invalid [chunking] section")?;
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be at least 1");
        }
        if let Some(t) = self.retrieval.score_threshold
            && !(-1.0..=1.0).contains(&t)
        {
            bail!("retrieval.score_threshold must be within [-1, 1], got {t}");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be at least 1");
        }
        if self.llm.max_tokens == 0 {
            bail!("llm.max_tokens must be at least 1");
        }
        if self.fetch.depth == 0 {
            bail!("fetch.depth must be at least 1");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be at least 1");
        }
        if self.gateway.max_sessions == 0 {
            bail!("gateway.max_sessions must be at least 1");
        }
        if self.extraction.max_file_bytes > self.extraction.max_repo_bytes {
            bail!("extraction.max_file_bytes cannot exceed extraction.max_repo_bytes");
        }
        for (name, value) in [
            ("llm.base_url", &self.llm.base_url),
            ("llm.model", &self.llm.model),
            ("embedding.base_url", &self.embedding.base_url),
            ("embedding.model", &self.embedding.model),
            ("vector_store.collection", &self.vector_store.collection),
        ] {
            if value.trim().is_empty() {
                bail!("{name} must not be empty");
            }
        }
        Ok(())
    }

    /// Resolve API keys through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        if let Some(val) = vault.get_secret("CODEBASE_GPT_LLM_API_KEY").await? {
            self.secrets.llm_api_key = Some(Secret::new(val));
        }
        if let Some(val) = vault.get_secret("CODEBASE_GPT_EMBEDDING_API_KEY").await? {
            self.secrets.embedding_api_key = Some(Secret::new(val));
        }
        if let Some(val) = vault.get_secret("CODEBASE_GPT_QDRANT_API_KEY").await? {
            self.secrets.qdrant_api_key = Some(Secret::new(val));
        }
        if self.secrets.llm_api_key.is_none() {
            tracing::warn!("CODEBASE_GPT_LLM_API_KEY is not set, chat requests are unauthenticated");
        }
        Ok(())
    }
}
