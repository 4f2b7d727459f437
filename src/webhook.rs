use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::pipeline;
use crate::recording::{CorrelationId, Direction, EventType, RecordedEvent, Sanitizer};
use crate::trigger;
use crate::AppState;

/// The slice of an issue_comment delivery the trigger matcher reads.
///
/// Every field is optional down to the leaves: a delivery whose shape does
/// not line up is an ignored event, never a parse error.
#[derive(Debug, Deserialize)]
pub struct GitHubWebhookPayload {
    pub action: Option<String>,
    pub comment: Option<Comment>,
    pub issue: Option<Issue>,
    pub repository: Option<Repository>,
    pub installation: Option<Installation>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Comment {
    pub body: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Issue {
    pub number: Option<u64>,
    pub pull_request: Option<PullRequestLink>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestLink {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Installation {
    pub id: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub name: Option<String>,
    pub owner: Option<RepositoryOwner>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryOwner {
    pub login: Option<String>,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type HmacSha256 = Hmac<Sha256>;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if !signature.starts_with("sha256=") {
        return false;
    }

    let signature_hex = &signature[7..]; // Remove "sha256=" prefix

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Use constant-time verification
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Signature checks apply to POST deliveries; anything else falls through
    // to method routing, which answers 405.
    if request.method() != Method::POST {
        return Ok(next.run(request).await);
    }

    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Record the delivery if recording is enabled
    if let Some(ref logger) = state.recording_logger {
        let headers_map = headers_to_hashmap(&parts.headers);
        let body_json = serde_json::from_slice::<serde_json::Value>(&bytes)
            .map(|value| Sanitizer::sanitize_json(&value))
            .unwrap_or(serde_json::Value::Null);
        let webhook_event = RecordedEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.0.clone(),
            event_type: EventType::WebhookReceived,
            direction: Direction::Request,
            operation: "webhook".to_string(),
            data: serde_json::json!({
                "headers": Sanitizer::sanitize_headers(&headers_map),
                "body": body_json,
            }),
            metadata: HashMap::new(),
        };
        logger.record(webhook_event);
    }

    // Add correlation_id to request extensions for use in handlers and HTTP clients
    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

fn headers_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value_str) = value.to_str() {
            map.insert(name.to_string(), value_str.to_string());
        }
    }
    map
}

fn bad_request() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "Invalid JSON payload".to_string(),
        }),
    )
}

fn internal_server_error() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<ErrorResponse>)> {
    // Extract correlation ID from request extensions for propagation
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone());

    let event = request
        .headers()
        .get("x-github-event")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();

    info!("Received webhook delivery for event: {}", event);

    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| bad_request())?;

    let payload: GitHubWebhookPayload =
        serde_json::from_slice(&bytes).map_err(|_| bad_request())?;

    match trigger::match_trigger(&event, &payload) {
        Some(review_request) => {
            info!(
                "Review trigger matched for PR #{} in {}/{}",
                review_request.pr_number, review_request.repo_owner, review_request.repo_name
            );

            match pipeline::run_review(correlation_id.as_deref(), &state, &review_request).await {
                Ok(()) => Ok(Json(WebhookResponse {
                    message: "Code review completed".to_string(),
                })),
                Err(e) => {
                    error!("Failed to complete code review: {}", e);
                    Err(internal_server_error())
                }
            }
        }
        None => {
            info!("Delivery does not match the review trigger, ignoring");
            Ok(Json(WebhookResponse {
                message: "Event processed".to_string(),
            }))
        }
    }
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let secret = "webhook-secret";
        let payload = br#"{"action":"created"}"#;
        let signature = sign(secret, payload);
        assert!(verify_github_signature(secret, payload, &signature));
    }

    #[test]
    fn test_signature_from_wrong_secret_rejected() {
        let payload = br#"{"action":"created"}"#;
        let signature = sign("other-secret", payload);
        assert!(!verify_github_signature("webhook-secret", payload, &signature));
    }

    #[test]
    fn test_signature_for_tampered_payload_rejected() {
        let secret = "webhook-secret";
        let signature = sign(secret, br#"{"action":"created"}"#);
        assert!(!verify_github_signature(
            secret,
            br#"{"action":"deleted"}"#,
            &signature
        ));
    }

    #[test]
    fn test_signature_without_prefix_rejected() {
        let secret = "webhook-secret";
        let payload = b"body";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        let bare_hex = hex::encode(mac.finalize().into_bytes());
        assert!(!verify_github_signature(secret, payload, &bare_hex));
    }

    #[test]
    fn test_signature_with_invalid_hex_rejected() {
        assert!(!verify_github_signature(
            "webhook-secret",
            b"body",
            "sha256=not-hex"
        ));
        assert!(!verify_github_signature("webhook-secret", b"body", "sha256="));
    }

    #[test]
    fn test_webhook_payload_deserialization() {
        let json_payload = json!({
            "action": "created",
            "comment": {
                "id": 123,
                "body": "code review bot",
                "user": {
                    "id": 456,
                    "login": "test-user"
                }
            },
            "issue": {
                "number": 789,
                "pull_request": {
                    "url": "https://api.github.com/repos/owner/repo/pulls/789"
                }
            },
            "repository": {
                "name": "repo",
                "full_name": "owner/repo",
                "owner": {
                    "id": 111,
                    "login": "owner"
                }
            },
            "installation": {
                "id": 999
            }
        });

        let payload: GitHubWebhookPayload =
            serde_json::from_value(json_payload).expect("payload should deserialize");

        assert_eq!(payload.action, Some("created".to_string()));
        let comment = payload.comment.expect("comment should be present");
        assert_eq!(comment.body.as_deref(), Some("code review bot"));
        let issue = payload.issue.expect("issue should be present");
        assert_eq!(issue.number, Some(789));
        assert!(issue.pull_request.is_some());
    }

    #[test]
    fn test_payload_with_missing_fields_still_deserializes() {
        // A plain issue comment payload has no installation when delivered
        // outside an app context; parsing must not fail.
        let payload: GitHubWebhookPayload =
            serde_json::from_value(json!({ "action": "created" }))
                .expect("sparse payload should deserialize");
        assert!(payload.comment.is_none());
        assert!(payload.installation.is_none());
    }

    #[test]
    fn test_payload_with_sparse_objects_still_deserializes() {
        // Senders may omit fields inside nested objects too; absence at any
        // depth parses, it just cannot match the trigger.
        let payload: GitHubWebhookPayload = serde_json::from_value(json!({
            "action": "created",
            "comment": { "body": "code review bot" },
            "issue": { "number": 7 },
            "repository": { "name": "widgets" },
            "installation": {}
        }))
        .expect("sparse payload should deserialize");

        let comment = payload.comment.expect("comment should be present");
        assert_eq!(comment.body.as_deref(), Some("code review bot"));
        let installation = payload.installation.expect("installation should be present");
        assert_eq!(installation.id, None);
    }
}
