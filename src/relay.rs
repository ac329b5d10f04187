//! Core request-validation and forwarding logic for the Claude relay.
//!
//! Framework-agnostic: [`RelayService::handle`] takes raw body bytes and
//! returns either the provider's completion body or a [`ProxyError`]. The
//! HTTP adapter in `api` is responsible only for the method check and for
//! turning the outcome into a response.
//!
//! Pipeline order is part of the contract:
//! 1. credential lookup (before body parsing, so misconfiguration is
//!    reported the same way regardless of payload)
//! 2. JSON parse (syntax errors fall through to the internal-error path)
//! 3. shape validation (local reject, no upstream call, no quota spent)
//! 4. forward to the Claude Messages API and relay the result

use crate::config::{CredentialSource, ProviderConfig};
use crate::error::{ProxyError, ValidationError};
use crate::http;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Applied when the caller omits `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Applied when the caller omits `temperature`.
pub const DEFAULT_TEMPERATURE: u64 = 1;

/// A chat/completion request from the frontend, after shape validation.
///
/// Only `model` and `messages` are contractual; the remaining fields are
/// passed through to the provider as-is (no bounds checks, no role
/// validation) so no previously-accepted traffic gets rejected.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub system: Option<Value>,
    pub max_tokens: Option<Value>,
    pub temperature: Option<Value>,
}

impl ChatRequest {
    /// Validate the parsed body shape. `model` must be a non-empty string and
    /// `messages` must be an array; everything else is optional.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let body = value.as_object().ok_or(ValidationError::WrongType {
            field: "request",
            expected: "a JSON object",
        })?;

        let model = match body.get("model") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("model")),
            Some(Value::String(s)) if s.is_empty() => {
                return Err(ValidationError::EmptyField("model"))
            }
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "model",
                    expected: "a string",
                })
            }
        };

        let messages = match body.get("messages") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("messages")),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "messages",
                    expected: "an array",
                })
            }
        };

        let optional = |field: &str| body.get(field).filter(|v| !v.is_null()).cloned();

        Ok(Self {
            model,
            messages,
            system: optional("system"),
            max_tokens: optional("max_tokens"),
            temperature: optional("temperature"),
        })
    }

    /// Build the outbound Messages API payload, applying defaults for
    /// `max_tokens` and `temperature`. `system` is omitted entirely when the
    /// caller did not send one.
    pub fn to_provider_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("model".to_string(), Value::String(self.model.clone()));
        payload.insert(
            "max_tokens".to_string(),
            self.max_tokens
                .clone()
                .unwrap_or_else(|| json!(DEFAULT_MAX_TOKENS)),
        );
        payload.insert("messages".to_string(), Value::Array(self.messages.clone()));
        if let Some(system) = &self.system {
            payload.insert("system".to_string(), system.clone());
        }
        payload.insert(
            "temperature".to_string(),
            self.temperature
                .clone()
                .unwrap_or_else(|| json!(DEFAULT_TEMPERATURE)),
        );
        Value::Object(payload)
    }
}

/// Strip the credential from a message before it reaches a log line or an
/// error `details` field.
fn redact(message: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        message.to_string()
    } else {
        message.replace(api_key, "[redacted]")
    }
}

/// Stateless forwarder to the Claude Messages API. One outbound call per
/// accepted request; no retries, no caching, no shared mutable state.
#[derive(Clone)]
pub struct RelayService {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
    messages_url: String,
    api_version: String,
}

impl RelayService {
    pub fn new(provider: &ProviderConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            client: http::create_client(),
            credentials,
            messages_url: format!(
                "{}/v1/messages",
                provider.base_url.trim_end_matches('/')
            ),
            api_version: provider.version.clone(),
        }
    }

    /// Run the relay pipeline on raw body bytes and return the provider's
    /// completion body on success.
    pub async fn handle(&self, body: &[u8]) -> Result<Value, ProxyError> {
        let api_key = self.credentials.api_key().ok_or_else(|| {
            tracing::error!("{} not configured", crate::config::CLAUDE_API_KEY_ENV);
            ProxyError::ApiKeyMissing
        })?;

        let parsed: Value = serde_json::from_slice(body)
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        let request = ChatRequest::from_value(&parsed).map_err(|e| {
            tracing::warn!(error = %e, "rejected malformed chat request");
            ProxyError::from(e)
        })?;

        self.forward(&request, &api_key).await
    }

    async fn forward(&self, request: &ChatRequest, api_key: &str) -> Result<Value, ProxyError> {
        let payload = request.to_provider_payload();

        let response = self
            .client
            .post(&self.messages_url)
            .header("Content-Type", "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.api_version)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                let msg = redact(&e.to_string(), api_key);
                tracing::error!(error = %msg, "Claude API request failed");
                ProxyError::Internal(msg)
            })?;

        let status = response.status();
        if !status.is_success() {
            // Best-effort parse of the provider's error body; an unparseable
            // body still relays the status with empty details.
            let details = response
                .json::<Value>()
                .await
                .unwrap_or_else(|_| json!({}));
            tracing::error!(status = status.as_u16(), "Claude API returned an error");
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                details,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            let msg = redact(&e.to_string(), api_key);
            tracing::error!(error = %msg, "failed to parse Claude API response");
            ProxyError::Internal(msg)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;
    use pretty_assertions::assert_eq;

    fn service_for(server_url: &str, key: Option<&str>) -> RelayService {
        let provider = ProviderConfig {
            base_url: server_url.to_string(),
            version: "2023-06-01".to_string(),
        };
        RelayService::new(
            &provider,
            Arc::new(StaticCredentials::new(key.map(String::from))),
        )
    }

    // =========================================================================
    // Shape validation
    // =========================================================================

    #[test]
    fn accepts_minimal_valid_request() {
        let value = json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "hi"}]
        });

        let request = ChatRequest::from_value(&value).unwrap();
        assert_eq!(request.model, "claude-3-5-haiku-20241022");
        assert_eq!(request.messages.len(), 1);
        assert!(request.system.is_none());
    }

    #[test]
    fn rejects_missing_model() {
        let value = json!({"messages": []});
        assert_eq!(
            ChatRequest::from_value(&value).unwrap_err(),
            ValidationError::MissingField("model")
        );
    }

    #[test]
    fn rejects_null_model() {
        let value = json!({"model": null, "messages": []});
        assert_eq!(
            ChatRequest::from_value(&value).unwrap_err(),
            ValidationError::MissingField("model")
        );
    }

    #[test]
    fn rejects_empty_model() {
        let value = json!({"model": "", "messages": []});
        assert_eq!(
            ChatRequest::from_value(&value).unwrap_err(),
            ValidationError::EmptyField("model")
        );
    }

    #[test]
    fn rejects_non_string_model() {
        let value = json!({"model": 42, "messages": []});
        assert!(matches!(
            ChatRequest::from_value(&value).unwrap_err(),
            ValidationError::WrongType { field: "model", .. }
        ));
    }

    #[test]
    fn rejects_missing_messages_regardless_of_model() {
        let value = json!({"model": "claude-3-5-haiku-20241022"});
        assert_eq!(
            ChatRequest::from_value(&value).unwrap_err(),
            ValidationError::MissingField("messages")
        );
    }

    #[test]
    fn rejects_non_array_messages() {
        let value = json!({"model": "m", "messages": "not an array"});
        assert!(matches!(
            ChatRequest::from_value(&value).unwrap_err(),
            ValidationError::WrongType {
                field: "messages",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_object_body() {
        let value = json!([1, 2, 3]);
        assert!(matches!(
            ChatRequest::from_value(&value).unwrap_err(),
            ValidationError::WrongType {
                field: "request",
                ..
            }
        ));
    }

    #[test]
    fn message_roles_are_not_validated() {
        // Permissive by design: the provider owns role validation.
        let value = json!({
            "model": "m",
            "messages": [{"role": "narrator", "content": "once upon a time"}]
        });
        assert!(ChatRequest::from_value(&value).is_ok());
    }

    // =========================================================================
    // Outbound payload construction
    // =========================================================================

    #[test]
    fn payload_applies_defaults_when_omitted() {
        let value = json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]});
        let payload = ChatRequest::from_value(&value).unwrap().to_provider_payload();

        assert_eq!(payload["max_tokens"], 4096);
        assert_eq!(payload["temperature"], 1);
        assert!(payload.get("system").is_none());
    }

    #[test]
    fn payload_passes_explicit_values_through() {
        let value = json!({
            "model": "m",
            "messages": [],
            "system": "Sen Sofia, bir eğitim asistanısın.",
            "max_tokens": 1024,
            "temperature": 0.7
        });
        let payload = ChatRequest::from_value(&value).unwrap().to_provider_payload();

        assert_eq!(payload["max_tokens"], 1024);
        assert_eq!(payload["temperature"], 0.7);
        assert_eq!(payload["system"], "Sen Sofia, bir eğitim asistanısın.");
    }

    #[test]
    fn payload_preserves_message_order() {
        let value = json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "second"},
                {"role": "user", "content": "third"}
            ]
        });
        let payload = ChatRequest::from_value(&value).unwrap().to_provider_payload();

        let contents: Vec<&str> = payload["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn redact_strips_key_from_messages() {
        assert_eq!(
            redact("error calling api with sk-ant-secret", "sk-ant-secret"),
            "error calling api with [redacted]"
        );
        assert_eq!(redact("plain error", ""), "plain error");
    }

    // =========================================================================
    // Forwarding against a mock provider
    // =========================================================================

    #[tokio::test]
    async fn relays_successful_completion_verbatim() {
        let mut server = mockito::Server::new_async().await;

        let completion = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "hello"}],
            "model": "claude-3-5-haiku-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        });

        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-test")
            .match_header("anthropic-version", "2023-06-01")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion.to_string())
            .create_async()
            .await;

        let service = service_for(&server.url(), Some("sk-test"));
        let body = json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "hi"}]
        });

        let result = service.handle(body.to_string().as_bytes()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result, completion);
    }

    #[tokio::test]
    async fn forwards_defaults_to_provider() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/messages")
            .match_body(mockito::Matcher::PartialJson(json!({
                "max_tokens": 4096,
                "temperature": 1
            })))
            .with_status(200)
            .with_body(json!({"id": "msg_1"}).to_string())
            .create_async()
            .await;

        let service = service_for(&server.url(), Some("sk-test"));
        let body = json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]});

        service.handle(body.to_string().as_bytes()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn relays_provider_error_status_and_body() {
        let mut server = mockito::Server::new_async().await;

        let provider_error = json!({"type": "error", "error": {"type": "rate_limit_error"}});
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(429)
            .with_body(provider_error.to_string())
            .create_async()
            .await;

        let service = service_for(&server.url(), Some("sk-test"));
        let body = json!({"model": "m", "messages": []});

        let err = service.handle(body.to_string().as_bytes()).await.unwrap_err();

        mock.assert_async().await;
        match err {
            ProxyError::Upstream { status, details } => {
                assert_eq!(status, 429);
                assert_eq!(details, provider_error);
            }
            other => panic!("expected Upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn tolerates_unparseable_provider_error_body() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(503)
            .with_body("upstream melted")
            .create_async()
            .await;

        let service = service_for(&server.url(), Some("sk-test"));
        let body = json!({"model": "m", "messages": []});

        let err = service.handle(body.to_string().as_bytes()).await.unwrap_err();

        mock.assert_async().await;
        match err {
            ProxyError::Upstream { status, details } => {
                assert_eq!(status, 503);
                assert_eq!(details, json!({}));
            }
            other => panic!("expected Upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_credential_short_circuits_before_upstream() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/messages")
            .expect(0)
            .create_async()
            .await;

        let service = service_for(&server.url(), None);
        let body = json!({"model": "m", "messages": []});

        let err = service.handle(body.to_string().as_bytes()).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ProxyError::ApiKeyMissing));
    }

    #[tokio::test]
    async fn invalid_request_makes_no_upstream_call() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/messages")
            .expect(0)
            .create_async()
            .await;

        let service = service_for(&server.url(), Some("sk-test"));
        let body = json!({"messages": []});

        let err = service.handle(body.to_string().as_bytes()).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn malformed_json_body_is_an_internal_error() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/messages")
            .expect(0)
            .create_async()
            .await;

        let service = service_for(&server.url(), Some("sk-test"));

        let err = service.handle(b"{not json").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ProxyError::Internal(_)));
    }

    #[tokio::test]
    async fn repeated_requests_are_independent() {
        let mut server = mockito::Server::new_async().await;

        let completion = json!({"id": "msg_1", "stop_reason": "end_turn"});
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(completion.to_string())
            .expect(2)
            .create_async()
            .await;

        let service = service_for(&server.url(), Some("sk-test"));
        let body = json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]});
        let bytes = body.to_string();

        let first = service.handle(bytes.as_bytes()).await.unwrap();
        let second = service.handle(bytes.as_bytes()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(first, second);
    }
}
