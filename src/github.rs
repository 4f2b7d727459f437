use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::recording::{RecordingLogger, RecordingMiddleware, ServiceType, CORRELATION_ID_HEADER};
use crate::review::{ChangedFile, Finding, ReviewVerdict};

/// GitHub App client: exchanges the app's private key for short-lived
/// installation tokens and talks to the REST API with them.
#[derive(Clone)]
pub struct GitHubClient {
    client: ClientWithMiddleware,
    app_id: u64,
    private_key: String,
    token_cache: Arc<RwLock<HashMap<u64, (String, SystemTime)>>>,
}

#[derive(Debug, Serialize)]
struct GitHubAppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
struct FileContentsResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestResponse {
    pub number: u64,
    pub head: PullRequestRefResponse,
    pub base: PullRequestRefResponse,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestRefResponse {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Serialize)]
struct CreateReviewRequest {
    body: String,
    event: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    comments: Vec<ReviewCommentRequest>,
}

#[derive(Debug, Serialize)]
struct ReviewCommentRequest {
    path: String,
    position: u64,
    body: String,
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    id: u64,
    state: String,
}

impl GitHubClient {
    pub fn new(app_id: u64, private_key: String) -> Self {
        Self::new_with_recording(app_id, private_key, None)
    }

    pub fn new_with_recording(
        app_id: u64,
        private_key: String,
        recording_logger: Option<RecordingLogger>,
    ) -> Self {
        let client = create_github_client(recording_logger);

        Self {
            client,
            app_id,
            private_key,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn generate_jwt(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("Failed to get current time")?
            .as_secs();

        let claims = GitHubAppClaims {
            iss: self.app_id,
            iat: now - 60,  // Backdated to absorb clock skew
            exp: now + 600, // GitHub caps app JWTs at 10 minutes
        };

        let header = Header::new(Algorithm::RS256);
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .context("Failed to parse private key")?;

        encode(&header, &claims, &encoding_key).context("Failed to encode JWT")
    }

    /// The cached token for this installation, unless it is within 5 minutes
    /// of expiry.
    async fn cached_token(&self, installation_id: u64) -> Option<String> {
        let cache = self.token_cache.read().await;
        let (token, expires_at) = cache.get(&installation_id)?;
        let remaining = expires_at
            .duration_since(SystemTime::now())
            .unwrap_or_default();
        if remaining.as_secs() > 300 {
            Some(token.clone())
        } else {
            None
        }
    }

    async fn get_installation_token(&self, installation_id: u64) -> Result<String> {
        if let Some(token) = self.cached_token(installation_id).await {
            return Ok(token);
        }

        let jwt = self.generate_jwt()?;
        let url = format!(
            "https://api.github.com/app/installations/{}/access_tokens",
            installation_id
        );

        info!("Requesting new installation access token");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .context("Failed to send installation token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!(
                "GitHub App token request failed: {} - {}",
                status, error_text
            );
            return Err(anyhow!(
                "GitHub App token request failed: {} - {}",
                status,
                error_text
            ));
        }

        let token_response: InstallationTokenResponse = response
            .json()
            .await
            .context("Failed to parse installation token response")?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&token_response.expires_at)
            .context("Failed to parse token expiration")?
            .with_timezone(&Utc);

        let expires_at_system =
            UNIX_EPOCH + std::time::Duration::from_secs(expires_at.timestamp() as u64);

        {
            let mut cache = self.token_cache.write().await;
            cache.insert(
                installation_id,
                (token_response.token.clone(), expires_at_system),
            );
        }

        info!("Successfully obtained installation access token");
        Ok(token_response.token)
    }

    pub async fn get_pull_request(
        &self,
        correlation_id: Option<&str>,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        pr_number: u64,
    ) -> Result<PullRequestResponse> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}",
            repo_owner, repo_name, pr_number
        );

        info!(
            "Fetching PR #{} from {}/{}",
            pr_number, repo_owner, repo_name
        );

        let token = self.get_installation_token(installation_id).await?;
        let mut request_builder = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json");

        if let Some(cid) = correlation_id {
            request_builder = request_builder.header(CORRELATION_ID_HEADER, cid);
        }

        let response = request_builder
            .send()
            .await
            .context("Failed to send get pull request request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!("GitHub API error fetching PR: {} - {}", status, error_text);
            return Err(anyhow!(
                "GitHub API error fetching PR: {} - {}",
                status,
                error_text
            ));
        }

        let pr_response: PullRequestResponse = response
            .json()
            .await
            .context("Failed to parse pull request response")?;

        info!(
            "Successfully fetched PR #{} (head: {})",
            pr_response.number, pr_response.head.sha
        );

        Ok(pr_response)
    }

    /// List the files changed in a pull request, with their diff text and
    /// change counts. Pages through the endpoint until exhausted.
    pub async fn list_changed_files(
        &self,
        correlation_id: Option<&str>,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        pr_number: u64,
    ) -> Result<Vec<ChangedFile>> {
        let mut all_files = Vec::new();
        let mut page = 1;
        let per_page = 100;

        info!(
            "Listing changed files for PR #{} in {}/{}",
            pr_number, repo_owner, repo_name
        );

        loop {
            let url = format!(
                "https://api.github.com/repos/{}/{}/pulls/{}/files?page={}&per_page={}",
                repo_owner, repo_name, pr_number, page, per_page
            );

            let token = self.get_installation_token(installation_id).await?;
            let mut request_builder = self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {}", token))
                .header("Accept", "application/vnd.github.v3+json");

            if let Some(cid) = correlation_id {
                request_builder = request_builder.header(CORRELATION_ID_HEADER, cid);
            }

            let response = request_builder
                .send()
                .await
                .context("Failed to send list files request")?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .context("Failed to read error response body")?;
                error!(
                    "GitHub API error listing files: {} - {}",
                    status, error_text
                );
                return Err(anyhow!(
                    "GitHub API error listing files: {} - {}",
                    status,
                    error_text
                ));
            }

            let files: Vec<ChangedFile> = response
                .json()
                .await
                .context("Failed to parse changed files response")?;

            let page_count = files.len();
            all_files.extend(files);

            if page_count < per_page {
                break;
            }
            page += 1;
        }

        info!("Found {} changed files", all_files.len());
        Ok(all_files)
    }

    pub async fn get_file_contents(
        &self,
        correlation_id: Option<&str>,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        file_path: &str,
        sha: &str,
    ) -> Result<String> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/contents/{}?ref={}",
            repo_owner, repo_name, file_path, sha
        );

        info!("Fetching file contents: {} at {}", file_path, sha);

        let token = self.get_installation_token(installation_id).await?;
        let mut request_builder = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json");

        if let Some(cid) = correlation_id {
            request_builder = request_builder.header(CORRELATION_ID_HEADER, cid);
        }

        let response = request_builder
            .send()
            .await
            .context("Failed to send file contents request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            return Err(anyhow!(
                "GitHub API error fetching file: {} - {}",
                status,
                error_text
            ));
        }

        let file_response: FileContentsResponse = response
            .json()
            .await
            .context("Failed to parse file contents response")?;

        let decoded = general_purpose::STANDARD
            .decode(file_response.content.replace('\n', ""))
            .context("Failed to decode base64 file content")?;
        let content_str = String::from_utf8(decoded).context("File content is not valid UTF-8")?;
        info!(
            "Successfully fetched file contents ({} bytes)",
            content_str.len()
        );
        Ok(content_str)
    }

    /// Submit a pull request review: the verdict's summary body, its event
    /// (approve or request changes), and one comment per finding.
    pub async fn create_review(
        &self,
        correlation_id: Option<&str>,
        installation_id: u64,
        repo_owner: &str,
        repo_name: &str,
        pr_number: u64,
        verdict: ReviewVerdict,
        findings: &[Finding],
    ) -> Result<u64> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}/reviews",
            repo_owner, repo_name, pr_number
        );

        info!(
            "Submitting {} review with {} comments for PR #{} in {}/{}",
            verdict.event(),
            findings.len(),
            pr_number,
            repo_owner,
            repo_name
        );

        let token = self.get_installation_token(installation_id).await?;
        let request_body = CreateReviewRequest {
            body: verdict.summary().to_string(),
            event: verdict.event().to_string(),
            comments: findings
                .iter()
                .map(|finding| ReviewCommentRequest {
                    path: finding.path.clone(),
                    position: finding.position,
                    body: finding.body.clone(),
                })
                .collect(),
        };

        let mut request_builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(&request_body)?);

        if let Some(cid) = correlation_id {
            request_builder = request_builder.header(CORRELATION_ID_HEADER, cid);
        }

        let response = request_builder
            .send()
            .await
            .context("Failed to send create review request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!(
                "GitHub API error creating review: {} - {}",
                status, error_text
            );
            return Err(anyhow!(
                "GitHub API error creating review: {} - {}",
                status,
                error_text
            ));
        }

        let review: ReviewResponse = response
            .json()
            .await
            .context("Failed to parse review response")?;
        info!(
            "Successfully submitted review {} ({})",
            review.id, review.state
        );

        Ok(review.id)
    }
}

pub fn create_github_client(recording_logger: Option<RecordingLogger>) -> ClientWithMiddleware {
    use reqwest_middleware::ClientBuilder;

    let client = Client::builder()
        .user_agent("reviewbot/0.1.0")
        .build()
        .expect("Failed to create HTTP client");

    let mut builder = ClientBuilder::new(client);

    if let Some(logger) = recording_logger {
        let recording_middleware = RecordingMiddleware::new(logger, ServiceType::GitHub);
        builder = builder.with(recording_middleware);
    }

    builder.build()
}
