use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_services();
        self.apply_env_overrides_pipeline();
    }

    fn apply_env_overrides_services(&mut self) {
        if let Ok(v) = std::env::var("CODEBASE_GPT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_VECTOR_BACKEND") {
            match v.parse() {
                Ok(backend) => self.vector_store.backend = backend,
                Err(e) => tracing::warn!("ignoring invalid CODEBASE_GPT_VECTOR_BACKEND: {e}"),
            }
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_COLLECTION") {
            self.vector_store.collection = v;
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_GATEWAY_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.gateway.port = port;
            } else {
                tracing::warn!("ignoring invalid CODEBASE_GPT_GATEWAY_PORT value: {v}");
            }
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("CODEBASE_GPT_CHUNK_SIZE") {
            if let Ok(size) = v.parse::<usize>() {
                self.chunking.chunk_size = size;
            } else {
                tracing::warn!("ignoring invalid CODEBASE_GPT_CHUNK_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_CHUNK_OVERLAP") {
            if let Ok(overlap) = v.parse::<usize>() {
                self.chunking.chunk_overlap = overlap;
            } else {
                tracing::warn!("ignoring invalid CODEBASE_GPT_CHUNK_OVERLAP value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_TOP_K")
            && let Ok(k) = v.parse::<u64>()
        {
            self.retrieval.top_k = k;
        }
        if let Ok(v) = std::env::var("CODEBASE_GPT_REINDEX") {
            match v.parse() {
                Ok(mode) => self.index.reindex = mode,
                Err(e) => tracing::warn!("ignoring invalid CODEBASE_GPT_REINDEX: {e}"),
            }
        }
    }
}
