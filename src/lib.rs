pub mod config;
pub mod github;
pub mod openai;
pub mod pipeline;
pub mod recording;
pub mod review;
pub mod trigger;
pub mod webhook;

pub use github::*;
pub use openai::*;
pub use recording::RecordingLogger;

pub struct AppState {
    pub github_client: GitHubClient,
    pub openai_client: Option<OpenAIClient>,
    pub webhook_secret: String,
    pub recording_logger: Option<RecordingLogger>,
}
