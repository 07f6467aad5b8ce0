//! Answer generation over retrieved context.

use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;

use reqwest::Client as ReqwestClient;
use rig::client::{CompletionClient, Nothing};
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;

use crate::rag::conversation::history::ConversationTurn;
use crate::rag::core::config::LlmConfig;
use crate::rag::core::errors::{RagError, RagResult};
use crate::rag::retrieval::fusion::FusedHit;

/// Boxed future type for generator operations.
pub type GenerateFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a generator may use to answer one question.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// Question as asked by the user.
    pub question: String,
    /// Query used for retrieval (rewritten for follow-ups).
    pub retrieval_query: String,
    /// Fused chunks, best first.
    pub context: Vec<FusedHit>,
    /// Recent turns of the same user, oldest first.
    pub history: Vec<ConversationTurn>,
}

/// Trait abstraction over answer generators.
pub trait AnswerGenerator: Send + Sync {
    /// Produce an answer.
    ///
    /// # Errors
    /// Returns an error if the model call fails.
    fn generate(&self, request: GenerationRequest) -> GenerateFuture<'_, RagResult<String>>;
    /// Name of the underlying model.
    fn model_name(&self) -> &str;
}

/// Ollama completion model driven through Rig.
pub struct OllamaGenerator {
    model: ollama::CompletionModel<ReqwestClient>,
    model_name: String,
    temperature: f64,
    max_tokens: Option<u64>,
}

impl OllamaGenerator {
    /// Create a generator from config.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    pub fn new(config: &LlmConfig) -> RagResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(RagError::from)?;

        Ok(Self {
            model: client.completion_model(config.model.clone()),
            model_name: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

impl AnswerGenerator for OllamaGenerator {
    fn generate(&self, request: GenerationRequest) -> GenerateFuture<'_, RagResult<String>> {
        Box::pin(async move {
            let prompt = build_prompt(&request);
            let completion = self
                .model
                .completion_request(prompt)
                .temperature(self.temperature)
                .max_tokens_opt(self.max_tokens)
                .build();

            let response = self.model.completion(completion).await?;
            Ok(extract_text(&response.choice).trim().to_string())
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Plain-text prompt: context chunks, recent turns, then the question.
pub(crate) fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::from(
        "Answer the question using only the context below. \
         If the context does not contain the answer, say so.\n\n",
    );

    prompt.push_str("Context:\n");
    if request.context.is_empty() {
        prompt.push_str("(no relevant documents)\n");
    }
    for (i, hit) in request.context.iter().enumerate() {
        let _ = writeln!(prompt, "[{}] ({}) {}", i + 1, hit.chunk.source, hit.chunk.content);
    }

    if !request.history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for turn in &request.history {
            let _ = writeln!(prompt, "User: {}\nAssistant: {}", turn.question, turn.answer);
        }
    }

    let _ = write!(prompt, "\nQuestion: {}\nAnswer:", request.question);
    prompt
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    //! Generator fake that echoes its inputs.

    use super::{AnswerGenerator, GenerateFuture, GenerationRequest};
    use crate::rag::core::errors::RagResult;

    pub(crate) struct EchoGenerator;

    impl AnswerGenerator for EchoGenerator {
        fn generate(&self, request: GenerationRequest) -> GenerateFuture<'_, RagResult<String>> {
            Box::pin(async move {
                let sources: Vec<&str> = request
                    .context
                    .iter()
                    .map(|hit| hit.chunk.content.as_str())
                    .collect();
                Ok(format!(
                    "{} => {}",
                    request.retrieval_query,
                    sources.join(" | ")
                ))
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }
}
