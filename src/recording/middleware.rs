use super::sanitizer::Sanitizer;
use super::types::{CorrelationId, CORRELATION_ID_HEADER};
use super::{Direction, EventType, RecordedEvent, RecordingLogger, ServiceType};
use axum::http;
use reqwest::header::HeaderMap;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use std::collections::HashMap;
use uuid::Uuid;

/// reqwest middleware that records outbound API traffic (sanitized) and
/// stamps every request with a correlation ID header.
pub struct RecordingMiddleware {
    logger: RecordingLogger,
    service_type: ServiceType,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger, service_type: ServiceType) -> Self {
        Self {
            logger,
            service_type,
        }
    }

    fn event_type(&self) -> EventType {
        match self.service_type {
            ServiceType::GitHub => EventType::GitHubApiCall,
            ServiceType::OpenAi => EventType::OpenAiApiCall,
        }
    }

    fn record(
        &self,
        correlation_id: &str,
        direction: Direction,
        operation: String,
        data: serde_json::Value,
    ) {
        self.logger.record(RecordedEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.to_string(),
            event_type: self.event_type(),
            direction,
            operation,
            data,
            metadata: HashMap::new(),
        });
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        // Prefer the correlation ID already set by the caller, then the one
        // in extensions, then mint a fresh one.
        let correlation_id = if let Some(existing_header) = req.headers().get(CORRELATION_ID_HEADER)
        {
            match existing_header.to_str() {
                Ok(header_value) => header_value.to_string(),
                Err(_) => Uuid::new_v4().to_string(),
            }
        } else {
            extensions
                .get::<CorrelationId>()
                .map(|id| id.0.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string())
        };

        if !req.headers().contains_key(CORRELATION_ID_HEADER) {
            if let Ok(header_value) = correlation_id.parse() {
                req.headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }
        }

        let request_data = extract_request_data(&req);
        self.record(
            &correlation_id,
            Direction::Request,
            format!(
                "{} {}",
                request_data.method,
                extract_path(&request_data.url)
            ),
            serde_json::to_value(&request_data).unwrap_or(serde_json::Value::Null),
        );

        let response = next.run(req, extensions).await;

        match &response {
            Ok(resp) => {
                let response_data = extract_response_data(resp);
                self.record(
                    &correlation_id,
                    Direction::Response,
                    format!("response_{}", response_data.status_code),
                    serde_json::to_value(&response_data).unwrap_or(serde_json::Value::Null),
                );
            }
            Err(err) => {
                self.record(
                    &correlation_id,
                    Direction::Response,
                    "error".to_string(),
                    serde_json::json!({ "error": err.to_string() }),
                );
            }
        }

        response
    }
}

#[derive(Debug, serde::Serialize)]
struct RequestData {
    method: String,
    url: String,
    headers: HashMap<String, String>,
    body: String,
}

#[derive(Debug, serde::Serialize)]
struct ResponseData {
    status_code: u16,
    headers: HashMap<String, String>,
    body_size: u64,
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value_str) = value.to_str() {
            map.insert(name.to_string(), value_str.to_string());
        }
    }
    map
}

fn extract_request_data(request: &Request) -> RequestData {
    // Buffered bodies are recorded in full when small; everything else is
    // reduced to a size marker.
    let body_info = if let Some(body) = request.body() {
        match body.as_bytes() {
            Some(bytes) => {
                let size = bytes.len();
                if size > 10_000 {
                    format!("[LARGE_BODY_{}b]", size)
                } else if let Ok(text) = std::str::from_utf8(bytes) {
                    text.to_string()
                } else {
                    format!("[BINARY_BODY_{}b]", size)
                }
            }
            None => "[STREAM_BODY]".to_string(),
        }
    } else {
        "[NO_BODY]".to_string()
    };

    RequestData {
        method: request.method().to_string(),
        url: request.url().to_string(),
        headers: Sanitizer::sanitize_headers(&collect_headers(request.headers())),
        body: body_info,
    }
}

fn extract_response_data(response: &Response) -> ResponseData {
    ResponseData {
        status_code: response.status().as_u16(),
        headers: Sanitizer::sanitize_headers(&collect_headers(response.headers())),
        body_size: response.content_length().unwrap_or(0),
    }
}

fn extract_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}
