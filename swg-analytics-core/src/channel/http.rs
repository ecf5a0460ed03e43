//! HTTP channel to the logging frontend
//!
//! Opening a port fixes the frame endpoint and its arguments. Readiness is a
//! probe of `GET {endpoint}/ready`; each request is a `POST {endpoint}/log`.
//! A JSON object returned from a log call is delivered to the port's message
//! callbacks as an inbound message.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::request::AnalyticsRequest;

use super::{ActivityPort, ActivityPorts, MessageCallback, ServiceFrame};

/// Opens [`HttpPort`]s
pub struct HttpChannel {
    config: ChannelConfig,
    http_client: reqwest::Client,
}

impl HttpChannel {
    /// Create a new channel from configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ChannelConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl ActivityPorts for HttpChannel {
    async fn open(
        &self,
        frame: &ServiceFrame,
        url: &str,
        args: &serde_json::Value,
    ) -> Result<Arc<dyn ActivityPort>> {
        let endpoint = reqwest::Url::parse(url)
            .map_err(|e| Error::Setup(format!("invalid frame url {:?}: {}", url, e)))?;

        tracing::debug!(frame = frame.name(), url = %endpoint, "Opening HTTP port");

        Ok(Arc::new(HttpPort {
            config: self.config.clone(),
            http_client: self.http_client.clone(),
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            args: args.clone(),
            callbacks: Mutex::new(Vec::new()),
        }))
    }
}

/// A port bound to one frame endpoint
pub struct HttpPort {
    config: ChannelConfig,
    http_client: reqwest::Client,
    endpoint: String,
    args: serde_json::Value,
    callbacks: Mutex<Vec<MessageCallback>>,
}

/// Request body for POST {endpoint}/log
#[derive(Serialize)]
struct LogRequestBody<'a> {
    args: &'a serde_json::Value,
    request: serde_json::Value,
}

impl HttpPort {
    /// Single readiness probe
    async fn probe_ready(&self) -> Result<bool> {
        let url = format!("{}/ready", self.endpoint);

        match self.http_client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) if e.is_timeout() || e.is_connect() => Ok(false),
            Err(e) => Err(Error::Setup(format!("HTTP request failed: {}", e))),
        }
    }

    /// Send one request and return the inbound message, if any
    async fn send_log(
        &self,
        request: &AnalyticsRequest,
    ) -> std::result::Result<Option<serde_json::Value>, SendFailure> {
        let url = format!("{}/log", self.endpoint);
        // Each attempt reads the shared context again
        let request = request.to_json().map_err(|error| SendFailure {
            error,
            retryable: false,
        })?;
        let body = LogRequestBody {
            args: &self.args,
            request,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SendFailure::transport(&e))?;

        let status = response.status();

        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| SendFailure::transport(&e))?;
            if text.trim().is_empty() {
                return Ok(None);
            }
            let message: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| SendFailure::fatal(format!("failed to parse response: {}", e)))?;
            Ok(message.is_object().then_some(message))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            let failure = format!("API error ({}): {}", status, error_text);
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                Err(SendFailure::retryable(failure))
            } else {
                Err(SendFailure::fatal(failure))
            }
        }
    }

    fn deliver(&self, message: &serde_json::Value) {
        let callbacks: Vec<MessageCallback> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for callback in callbacks {
            callback(message);
        }
    }
}

#[async_trait]
impl ActivityPort for HttpPort {
    /// Probe the frontend with exponential backoff until it answers
    async fn when_ready(&self) -> Result<()> {
        let mut delay = Duration::from_millis(self.config.retry_base_ms);

        for attempt in 0..self.config.ready_attempts {
            if attempt > 0 {
                tracing::debug!(
                    "Frontend not ready (attempt {}/{}), waiting {:?}",
                    attempt,
                    self.config.ready_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            if self.probe_ready().await? {
                return Ok(());
            }
        }

        Err(Error::Setup(format!(
            "frontend at {} not ready after {} attempts",
            self.endpoint, self.config.ready_attempts
        )))
    }

    /// Send with retry logic
    ///
    /// Retries transient failures (5xx, 429, timeouts) with exponential backoff.
    async fn execute(&self, request: &AnalyticsRequest) -> Result<()> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(self.config.retry_base_ms);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying log request (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match self.send_log(request).await {
                Ok(message) => {
                    if let Some(message) = message {
                        self.deliver(&message);
                    }
                    return Ok(());
                }
                Err(SendFailure { error, retryable }) => {
                    if retryable {
                        tracing::warn!("Transient error sending log request: {}", error);
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Channel("max retries exceeded".to_string())))
    }

    fn on_message(&self, callback: MessageCallback) {
        match self.callbacks.lock() {
            Ok(mut callbacks) => callbacks.push(callback),
            Err(poisoned) => poisoned.into_inner().push(callback),
        }
    }
}

/// A failed send attempt, classified for the retry loop
struct SendFailure {
    error: Error,
    retryable: bool,
}

impl SendFailure {
    fn transport(e: &reqwest::Error) -> Self {
        Self {
            error: Error::Channel(format!("HTTP request failed: {}", e)),
            retryable: e.is_timeout() || e.is_connect() || e.is_request(),
        }
    }

    fn retryable(message: String) -> Self {
        Self {
            error: Error::Channel(message),
            retryable: true,
        }
    }

    fn fatal(message: String) -> Self {
        Self {
            error: Error::Channel(message),
            retryable: false,
        }
    }
}
