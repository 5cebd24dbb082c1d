//! Language-model access for summarizing audit reports.

use anyhow::Error;
use async_std::task::sleep;
use async_trait::async_trait;
use clap::Args;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use surf::{http::StatusCode, Url};

/// A chat-style language model.
#[async_trait]
pub trait Llm {
    /// Ask the model to respond to `prompt`, following the system `instruction`.
    async fn complete(&self, instruction: &str, prompt: &str) -> Result<Completion, Error>;
}

/// The outcome of a single completion request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    /// The service is throttling us; the request may be retried later.
    RateLimited,
}

/// Options for connecting to the OpenAI API.
#[derive(Clone, Debug, Args)]
pub struct LlmOptions {
    /// The OpenAI API key to connect with.
    #[clap(short = 'k', long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// The chat model to use.
    #[clap(long, env = "ZKBUGS_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    #[clap(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/")]
    pub base_url: Url,

    /// Give up on a prompt after this many rate-limited attempts.
    #[clap(long, env = "ZKBUGS_LLM_MAX_RETRIES", default_value = "5")]
    pub max_retries: usize,
}

impl LlmOptions {
    pub fn connect(&self) -> Result<OpenAi, Error> {
        OpenAi::new(self.base_url.clone(), self.api_key.clone(), self.model.clone())
    }

    pub fn retry(&self) -> Retry {
        Retry {
            max_retries: self.max_retries,
            ..Default::default()
        }
    }
}

/// A client for the OpenAI chat completions API.
pub struct OpenAi {
    client: surf::Client,
    api_key: String,
    model: String,
}

impl OpenAi {
    pub fn new(base_url: Url, api_key: String, model: String) -> Result<Self, Error> {
        Ok(Self {
            client: surf::Config::default()
                .set_base_url(base_url)
                .try_into()
                .map_err(Error::msg)?,
            api_key,
            model,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
}

#[derive(Clone, Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Clone, Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Clone, Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// The body of an unsuccessful API response.
#[derive(Clone, Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Clone, Debug, Deserialize, Display)]
#[display(fmt = "OpenAI API error: {}", message)]
struct ApiError {
    message: String,
}

#[async_trait]
impl Llm for OpenAi {
    async fn complete(&self, instruction: &str, prompt: &str) -> Result<Completion, Error> {
        let req = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: instruction,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        tracing::debug!(model = %self.model, "OpenAI request");
        let mut res = self
            .client
            .post("v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .body_json(&req)
            .map_err(Error::msg)?
            .send()
            .await
            .map_err(Error::msg)?;

        let status = res.status();
        if status == StatusCode::TooManyRequests {
            return Ok(Completion::RateLimited);
        }
        if !status.is_success() {
            let msg = match res.body_json::<ErrorResponse>().await {
                Ok(body) => body.error.to_string(),
                Err(_) => format!("OpenAI request failed with status {status}"),
            };
            return Err(Error::msg(msg));
        }

        let body: ChatResponse = res.body_json().await.map_err(Error::msg)?;
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::msg("OpenAI response has no choices"))?;
        Ok(Completion::Text(text))
    }
}

/// Backoff policy for rate-limited requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Retry {
    pub max_retries: usize,
    /// Delay after the first rate-limited attempt; doubles after each subsequent one.
    pub initial_backoff: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

/// Query `llm`, retrying while rate limited.
///
/// Failures are logged and yield [`None`]. The response is trimmed and stripped of Markdown code
/// fences, which models tend to add even when asked for plain text.
pub async fn query<L: Llm + ?Sized>(
    llm: &L,
    instruction: &str,
    prompt: &str,
    retry: Retry,
) -> Option<String> {
    let mut wait = retry.initial_backoff;
    for _ in 0..retry.max_retries {
        match llm.complete(instruction, prompt).await {
            Ok(Completion::Text(text)) => return Some(strip_fences(&text)),
            Ok(Completion::RateLimited) => {
                tracing::warn!("rate limit exceeded, retrying in {wait:?}");
                sleep(wait).await;
                wait *= 2;
            }
            Err(err) => {
                tracing::error!("{err}");
                return None;
            }
        }
    }
    tracing::error!("max retries exceeded, skipping request");
    None
}

fn strip_fences(text: &str) -> String {
    text.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}
