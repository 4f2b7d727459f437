use anyhow::{Context, Result};
use std::env;

#[derive(Clone)]
pub struct Config {
    pub github_app_id: u64,
    pub github_private_key: String,
    pub github_webhook_secret: String,
    /// Present iff the AI review stage is enabled.
    pub openai_api_key: Option<String>,
    pub ai_review_enabled: bool,
    pub port: u16,
    pub recording_enabled: bool,
    pub recording_log_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_app_id = env::var("GITHUB_APP_ID")
            .context("GITHUB_APP_ID environment variable is required")?
            .parse::<u64>()
            .context("GITHUB_APP_ID must be a valid number")?;

        let github_private_key = env::var("GITHUB_PRIVATE_KEY")
            .context("GITHUB_PRIVATE_KEY environment variable is required")?
            .replace("\\n", "\n");

        let github_webhook_secret = env::var("GITHUB_WEBHOOK_SECRET")
            .context("GITHUB_WEBHOOK_SECRET environment variable is required")?;

        let ai_review_enabled = parse_ai_review_enabled(env::var("AI_REVIEW_ENABLED").ok());

        let openai_api_key = if ai_review_enabled {
            Some(env::var("OPENAI_API_KEY").context(
                "OPENAI_API_KEY environment variable is required unless AI_REVIEW_ENABLED=false",
            )?)
        } else {
            None
        };

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let recording_enabled = env::var("RECORDING_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let recording_log_path =
            env::var("RECORDING_LOG_PATH").unwrap_or_else(|_| "recordings.jsonl".to_string());

        Ok(Config {
            github_app_id,
            github_private_key,
            github_webhook_secret,
            openai_api_key,
            ai_review_enabled,
            port,
            recording_enabled,
            recording_log_path,
        })
    }
}

/// Parse AI_REVIEW_ENABLED from an optional string value.
///
/// The AI review stage defaults to enabled; only an explicit "false" disables
/// it. Unparseable values fall back to the default.
pub fn parse_ai_review_enabled(value: Option<String>) -> bool {
    value
        .and_then(|s| s.trim().parse::<bool>().ok())
        .unwrap_or(true)
}
