/// Remote Execution Client - Ordered Endpoint Failover
///
/// **Core Responsibility:**
/// Post one execution payload to each configured endpoint in priority order
/// and hand back the first structurally valid response.
///
/// **Attempt Rules:**
/// - Endpoints are tried strictly in configured order, never reordered
/// - Each attempt has its own wall-clock deadline; an expired attempt is dropped
/// - Network failure, non-2xx status or a non-object body moves on to the next endpoint
/// - No same-endpoint retry
/// - Exhaustion is an outcome, not an error
use crate::error::TransportError;
use async_trait::async_trait;
use coderun_common::{Config, LanguageSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Outbound network seam
///
/// Implementations perform exactly one POST per call. Deadlines are enforced
/// by the client, not the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("coderun/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::InvalidBody(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendFile {
    pub content: String,
}

/// Wire payload accepted by every candidate endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BackendRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<BackendFile>,
    pub stdin: String,
    pub run_timeout: u64,
    pub compile_timeout: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RunStage {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub signal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompileStage {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
}

/// Raw backend response; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BackendResponse {
    #[serde(default)]
    pub run: Option<RunStage>,
    #[serde(default)]
    pub compile: Option<CompileStage>,
    #[serde(default)]
    pub message: Option<String>,
}

impl BackendResponse {
    /// Accept only JSON objects; anything else counts as a malformed body
    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        if !value.is_object() {
            return Err(TransportError::InvalidBody(
                "expected a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| TransportError::InvalidBody(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Completed {
        endpoint: String,
        response: BackendResponse,
        attempts: usize,
    },
    /// Every endpoint failed; the caller should fall back
    Exhausted { attempts: usize },
}

impl RemoteOutcome {
    pub fn attempts(&self) -> usize {
        match self {
            RemoteOutcome::Completed { attempts, .. } => *attempts,
            RemoteOutcome::Exhausted { attempts } => *attempts,
        }
    }
}

pub struct RemoteClient<T: Transport = HttpTransport> {
    transport: T,
    run_timeout_ms: u64,
    compile_timeout_ms: u64,
    attempt_deadline: Duration,
}

impl RemoteClient<HttpTransport> {
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Ok(Self::with_transport(HttpTransport::new()?, config))
    }
}

impl<T: Transport> RemoteClient<T> {
    pub fn with_transport(transport: T, config: &Config) -> Self {
        Self {
            transport,
            run_timeout_ms: config.run_timeout_ms,
            compile_timeout_ms: config.compile_timeout_ms,
            attempt_deadline: config.attempt_deadline(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_request(&self, spec: &LanguageSpec, code: &str, stdin: &str) -> BackendRequest {
        BackendRequest {
            language: spec.runtime.clone(),
            version: spec.version.clone(),
            files: vec![BackendFile {
                content: code.to_string(),
            }],
            stdin: stdin.to_string(),
            run_timeout: self.run_timeout_ms,
            compile_timeout: self.compile_timeout_ms,
        }
    }

    /// Try every endpoint in order, stopping at the first usable response
    pub async fn execute(
        &self,
        endpoints: &[String],
        spec: &LanguageSpec,
        code: &str,
        stdin: &str,
    ) -> RemoteOutcome {
        let request = self.build_request(spec, code, stdin);
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode backend request");
                return RemoteOutcome::Exhausted { attempts: 0 };
            }
        };

        let mut attempts = 0;
        for endpoint in endpoints {
            attempts += 1;
            let url = execute_url(endpoint);

            match self.attempt(&url, &body).await {
                Ok(response) => {
                    tracing::debug!(endpoint = %endpoint, attempt = attempts, "Endpoint responded");
                    return RemoteOutcome::Completed {
                        endpoint: endpoint.clone(),
                        response,
                        attempts,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        attempt = attempts,
                        error = %e,
                        "Endpoint attempt failed, trying next"
                    );
                }
            }
        }

        RemoteOutcome::Exhausted { attempts }
    }

    async fn attempt(&self, url: &str, body: &Value) -> Result<BackendResponse, TransportError> {
        // Dropping the timed-out future cancels the in-flight request
        let value = tokio::time::timeout(self.attempt_deadline, self.transport.post_json(url, body))
            .await
            .map_err(|_| TransportError::DeadlineExceeded(self.attempt_deadline))??;

        BackendResponse::from_value(value)
    }
}

pub fn execute_url(endpoint: &str) -> String {
    format!("{}/execute", endpoint.trim_end_matches('/'))
}
