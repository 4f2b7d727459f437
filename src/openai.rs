use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::recording::{RecordingLogger, RecordingMiddleware, ServiceType, CORRELATION_ID_HEADER};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const REVIEW_MODEL: &str = "gpt-4o-mini";

/// Upper bound on chat round trips for one file's review. If the model's
/// output is cut off by the token budget this many times, we take what we
/// have.
pub const MAX_REVIEW_TURNS: usize = 3;

/// Completion token budget per turn.
const REVIEW_TOKEN_BUDGET: u32 = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct OpenAIClient {
    client: ClientWithMiddleware,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

impl OpenAIClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_recording(api_key, None)
    }

    pub fn new_with_recording(api_key: String, recording_logger: Option<RecordingLogger>) -> Self {
        let client = create_openai_client(recording_logger);

        Self { client, api_key }
    }

    /// Ask the model to review one file's content. Returns the generated
    /// review text, which may be empty if the model produced nothing.
    pub async fn review_file(
        &self,
        correlation_id: Option<&str>,
        file_path: &str,
        content: &str,
    ) -> Result<String> {
        info!("Requesting AI review for {}", file_path);

        let mut messages = vec![ChatMessage {
            role: "user",
            content: build_review_prompt(content),
        }];
        let mut review = String::new();

        for _turn in 0..MAX_REVIEW_TURNS {
            let choice = self.send_chat_completion(correlation_id, &messages).await?;
            let text = choice.message.content.unwrap_or_default();
            review.push_str(&text);

            if choice.finish_reason.as_deref() != Some("length") {
                break;
            }

            // Output hit the token budget; feed the partial answer back and
            // let the model finish within the remaining turns.
            messages.push(ChatMessage {
                role: "assistant",
                content: text,
            });
            messages.push(ChatMessage {
                role: "user",
                content: "Continue.".to_string(),
            });
        }

        let review = review.trim().to_string();
        info!(
            "AI review for {} returned {} bytes",
            file_path,
            review.len()
        );
        Ok(review)
    }

    async fn send_chat_completion(
        &self,
        correlation_id: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<ChatChoice> {
        let request_body = ChatCompletionRequest {
            model: REVIEW_MODEL,
            messages,
            max_tokens: REVIEW_TOKEN_BUDGET,
        };

        let mut request_builder = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(&request_body)?);

        if let Some(cid) = correlation_id {
            request_builder = request_builder.header(CORRELATION_ID_HEADER, cid);
        }

        let response = request_builder
            .send()
            .await
            .context("Failed to send chat completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!("OpenAI API error: {} - {}", status, error_text);
            return Err(anyhow!("OpenAI API error: {} - {}", status, error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Chat completion response contained no choices"))
    }
}

fn build_review_prompt(content: &str) -> String {
    format!(
        "Please review this code and provide feedback on:\n1. Code quality and best practices\n2. Potential bugs or issues\n3. Security concerns\n4. Performance considerations\n\nHere's the code to review:\n```\n{}\n```\n\nBe concise and to the point.",
        content
    )
}

pub fn create_openai_client(recording_logger: Option<RecordingLogger>) -> ClientWithMiddleware {
    use reqwest_middleware::ClientBuilder;

    let client = Client::builder()
        .user_agent("reviewbot/0.1.0")
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("Failed to create HTTP client");

    let mut builder = ClientBuilder::new(client);

    if let Some(logger) = recording_logger {
        let recording_middleware = RecordingMiddleware::new(logger, ServiceType::OpenAi);
        builder = builder.with(recording_middleware);
    }

    builder.build()
}
