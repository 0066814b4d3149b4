use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::Relay;
use super::types::{ChatCompletionResponse, ChatRequest, ErrorEnvelope, RelayReply, WireMessage};
use crate::app::{Config, UpstreamConfig};
use crate::constants::HTTP_CONNECT_TIMEOUT_SECS;
use crate::session::ContextMessage;
use crate::utils::{ErrorKind, PaychatError};

/// Response header a payment-aware gateway may use to report the transaction
const PAYMENT_REF_HEADER: &str = "x-payment-ref";

/// Relay to an OpenAI-compatible chat completions endpoint
pub struct HttpRelayClient {
    client: Client,
    api_url: String,
    model: String,
    max_tokens: usize,
    api_key: String,
    timeout: Duration,
}

impl HttpRelayClient {
    /// Create a client for the configured backend
    pub fn new(config: &UpstreamConfig, api_key: String) -> Result<Self, PaychatError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS).min(timeout))
                .build()?,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
            timeout,
        })
    }

    /// Create a client using the API key from the environment
    pub fn from_config(config: &Config) -> Result<Self, PaychatError> {
        let api_key = config.api_key()?;
        Self::new(&config.upstream, api_key)
    }

    fn build_request<'a>(&'a self, messages: &'a [ContextMessage]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: self.max_tokens,
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> ErrorKind {
        if error.is_timeout() {
            ErrorKind::Transport(format!("timed out after {}s", self.timeout.as_secs()))
        } else {
            ErrorKind::Transport(error.without_url().to_string())
        }
    }

    /// Backends sometimes echo the credential in error text
    fn redact(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.api_key, "[REDACTED]")
        }
    }

    fn parse_reply(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> Result<RelayReply, ErrorKind> {
        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(body) {
                Ok(envelope) => ErrorKind::Upstream(self.redact(&envelope.error.describe())),
                Err(_) => ErrorKind::Transport(format!("HTTP {}", status)),
            });
        }

        let response: ChatCompletionResponse = serde_json::from_str(body)
            .map_err(|e| ErrorKind::Upstream(format!("malformed completion response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(ErrorKind::Upstream(self.redact(&error.describe())));
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ErrorKind::Upstream("completion has no content".to_string()))?;

        let tokens = response
            .usage
            .and_then(|usage| usage.total_tokens)
            .unwrap_or(0);

        let header_ref = headers
            .get(PAYMENT_REF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let payment_ref = response
            .payment_ref
            .or(header_ref)
            .filter(|r| !r.trim().is_empty());

        Ok(RelayReply {
            content,
            tokens,
            payment_ref,
        })
    }
}

#[async_trait]
impl Relay for HttpRelayClient {
    async fn send(&self, messages: &[ContextMessage]) -> Result<RelayReply, ErrorKind> {
        let request_body = self.build_request(messages);
        debug!(
            model = %self.model,
            messages = messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        let result = self.parse_reply(status, &headers, &body);
        if let Err(kind) = &result {
            warn!(kind = kind.label(), status = status.as_u16(), "Completion failed: {}", kind);
        }
        result
    }

    fn name(&self) -> &str {
        &self.model
    }
}
