use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, GeneratorKind};
use crate::prompts;

/// Lazy, finite, non-restartable sequence of answer tokens.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// The generation collaborator. Implementations only turn a prompt into
/// tokens; prompt assembly belongs to the pipeline.
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, prompt: String) -> TokenStream;

    /// Answer a question from packed document context and prior turns.
    fn stream_answer(&self, question: &str, context: &str, history: &str) -> TokenStream {
        self.generate(prompts::answer_prompt(question, context, history))
    }
}

/// Pick the generator named by configuration. No probing or fallback: a
/// misconfigured backend is a startup error.
pub fn build_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.generator {
        GeneratorKind::OpenAi => Arc::new(LlmClient::from_env()?),
        GeneratorKind::Echo => Arc::new(EchoGenerator),
    };
    info!(generator = generator.name(), "generator selected");
    Ok(generator)
}

/// Re-stream a finished completion word by word, keeping paragraph breaks.
pub fn word_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for paragraph in text.trim().split("\n\n") {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        tokens.extend(words.into_iter().map(|w| format!("{} ", w)));
        tokens.push("\n\n".to_string());
    }
    tokens
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let model =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "qwen/qwen3-8b".to_string());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            api_key,
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Non-streaming chat completion.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.3,
            "max_tokens": 2048,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM returned an error status")?;
        let text = resp.text().await.context("Failed to read LLM response")?;
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse LLM JSON")?;

        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| anyhow::anyhow!("LLM response had no message content"))?
            .to_string();

        debug!(model = %self.model, content_len = content.len(), "LLM completion received");
        Ok(content)
    }
}

impl Generator for LlmClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, prompt: String) -> TokenStream {
        let client = self.clone();
        let tokens = async_stream::stream! {
            let messages = vec![Message {
                role: "user".to_string(),
                content: prompt,
            }];
            match client.chat(&messages).await {
                Ok(answer) => {
                    for token in word_tokens(&answer) {
                        yield Ok::<String, anyhow::Error>(token);
                    }
                }
                Err(e) => yield Err(e),
            }
        };
        Box::pin(tokens)
    }
}

/// Offline stand-in: echoes the start of the prompt so the whole pipeline can
/// run without a model.
#[derive(Debug, Default, Clone)]
pub struct EchoGenerator;

impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate(&self, prompt: String) -> TokenStream {
        let excerpt: String = prompt.chars().take(200).collect();
        let tokens = word_tokens(&format!("[STUB] {}", excerpt));
        stream::iter(tokens.into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> LlmClient {
        LlmClient {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            model: "m".to_string(),
            api_key: None,
        }
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            client("http://localhost:1234/v1").endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            client("https://api.example.com/").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            client("https://x.dev/v1/chat/completions").endpoint(),
            "https://x.dev/v1/chat/completions"
        );
    }

    #[test]
    fn test_word_tokens_keep_paragraphs() {
        let tokens = word_tokens("Hello  world.\n\nSecond para\n\n\n");
        assert_eq!(tokens, vec!["Hello ", "world. ", "\n\n", "Second ", "para ", "\n\n"]);
        assert!(word_tokens("   ").is_empty());
    }

    #[tokio::test]
    async fn test_echo_generator_streams_prompt_excerpt() {
        let tokens: Vec<String> = EchoGenerator
            .generate("what is the fox".to_string())
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens.concat().trim(), "[STUB] what is the fox");
    }

    #[tokio::test]
    async fn test_stream_answer_builds_prompt() {
        let out: Vec<String> = EchoGenerator
            .stream_answer("Why?", "[Source 1]\nbecause\n", "")
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert!(out.concat().starts_with("[STUB] "));
    }
}
