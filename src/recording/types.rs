use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One line of the JSONL recording log.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordedEvent {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Groups a webhook delivery with the API calls it caused.
    pub correlation_id: String,
    pub event_type: EventType,
    pub direction: Direction,
    /// e.g. "webhook", "GET /repos/acme/widgets/pulls/7/files", "response_200"
    pub operation: String,
    /// Sanitized request/response data.
    pub data: serde_json::Value,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum EventType {
    WebhookReceived,
    GitHubApiCall,
    OpenAiApiCall,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum ServiceType {
    GitHub,
    OpenAi,
}

/// Correlation ID assigned to each webhook delivery and propagated to
/// outbound API calls so related events can be grouped in the log.
#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
