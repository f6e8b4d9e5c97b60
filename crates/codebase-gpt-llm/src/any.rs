#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::error::LlmError;
use crate::openai::OpenAiProvider;
use crate::provider::{LlmProvider, Message};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::OpenAi($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        delegate_provider!(self, |p| p.chat(messages).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        delegate_provider!(self, |p| p.embed_batch(texts).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_variant_delegates_name() {
        let p = OpenAiProvider::new("k".into(), "http://x".into(), "m".into(), 1, None)
            .unwrap()
            .with_name("groq");
        let any = AnyProvider::OpenAi(p);
        assert_eq!(any.name(), "groq");
        assert!(!any.supports_embeddings());
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn mock_variant_delegates_chat() {
        let any = AnyProvider::Mock(MockProvider::with_responses(vec!["hello".into()]));
        assert_eq!(any.chat(&[Message::user("hi")]).await.unwrap(), "hello");
        assert_eq!(any.name(), "mock");
    }
}
