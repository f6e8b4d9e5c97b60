//! Retrieval-augmented answers over one indexed repository.

use std::sync::Arc;

use codebase_gpt_index::retriever::{Retriever, format_as_context};
use codebase_gpt_llm::{AnyProvider, LlmProvider, Message};
use serde::Serialize;

use crate::error::SessionError;

pub const NO_CONTEXT_ANSWER: &str = "I could not find any code relevant to that question in \
this repository. Try rephrasing it, or analyze the repository again if it was just updated.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Distinct source files behind the answer, best match first.
    pub sources: Vec<String>,
    pub context_found: bool,
}

impl Answer {
    fn no_context() -> Self {
        Self {
            text: NO_CONTEXT_ANSWER.into(),
            sources: Vec::new(),
            context_found: false,
        }
    }
}

pub struct QueryEngine {
    retriever: Retriever,
    chat: Arc<AnyProvider>,
    system_prompt: String,
}

impl QueryEngine {
    #[must_use]
    pub fn new(retriever: Retriever, chat: Arc<AnyProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            retriever,
            chat,
            system_prompt: system_prompt.into(),
        }
    }

    /// Answer `question` from the documents stored under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Index`] when embedding or search fails and
    /// [`SessionError::Completion`] when the chat service fails.
    pub async fn answer(&self, namespace: &str, question: &str) -> Result<Answer, SessionError> {
        let chunks = self.retriever.retrieve(namespace, question).await?;
        if chunks.is_empty() {
            tracing::info!(namespace, "no relevant context, skipping completion");
            return Ok(Answer::no_context());
        }

        let mut sources: Vec<String> = Vec::new();
        for chunk in &chunks {
            if !sources.contains(&chunk.source) {
                sources.push(chunk.source.clone());
            }
        }

        let messages = [
            Message::system(self.system_prompt.as_str()),
            Message::user(build_prompt(&format_as_context(&chunks), question)),
        ];
        let text = self
            .chat
            .chat(&messages)
            .await
            .map_err(SessionError::Completion)?;

        tracing::debug!(namespace, chunks = chunks.len(), "answered question");
        Ok(Answer {
            text,
            sources,
            context_found: true,
        })
    }
}

fn build_prompt(context: &str, question: &str) -> String {
    format!("{context}\n\nMY QUESTION:\n{question}")
}
