use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use crate::config::ReasonerConfig;
use crate::error::ReasonerError;
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::retry::{is_retryable_http_error, is_retryable_network_error, retry_async, RetryConfig, Retryable};
use crate::reasoner::{Prompt, Reasoner};

/// JSON-over-HTTP reasoning backend.
///
/// Request: `POST <endpoint>` with [`GenerateRequest`]; response: `{"text": "..."}`.
pub struct HttpReasoner {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_output_tokens: u32,
    timeout_ms: u64,
    retry: RetryConfig,
}

#[derive(Serialize, Debug)]
struct GenerateRequest<'a> {
    model: &'a str,
    role: &'a str,
    phase: &'a str,
    system: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    text: String,
}

#[derive(Debug)]
struct CallError {
    error: ReasonerError,
    retryable: bool,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl Retryable for CallError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl HttpReasoner {
    pub fn new(cfg: ReasonerConfig) -> anyhow::Result<Self> {
        let endpoint = cfg
            .endpoint
            .ok_or_else(|| anyhow::anyhow!("REASONER_ENDPOINT is required for the HTTP reasoner"))?;
        Ok(Self {
            client: Client::builder().build()?,
            endpoint,
            api_key: cfg.api_key,
            model: cfg.model,
            max_output_tokens: cfg.max_output_tokens,
            timeout_ms: cfg.timeout_ms,
            retry: RetryConfig {
                max_retries: cfg.max_retries,
                ..Default::default()
            },
        })
    }

    async fn call_once(&self, prompt: &Prompt) -> Result<String, CallError> {
        let body = GenerateRequest {
            model: &self.model,
            role: prompt.role.as_str(),
            phase: prompt.phase.as_str(),
            system: &prompt.instructions,
            prompt: &prompt.context,
            temperature: prompt.params.temperature,
            max_output_tokens: prompt.params.max_output_tokens.min(self.max_output_tokens),
            seed: prompt.params.seed,
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let exchange = async {
            let resp = req.send().await.map_err(|e| CallError {
                retryable: is_retryable_network_error(&e),
                error: ReasonerError::Unavailable(e.to_string()),
            })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(CallError {
                    retryable: is_retryable_http_error(status.as_u16()),
                    error: ReasonerError::Unavailable(format!("http status {}", status.as_u16())),
                });
            }
            resp.json::<GenerateResponse>().await.map_err(|e| CallError {
                retryable: false,
                error: ReasonerError::Unavailable(format!("malformed response: {}", e)),
            })
        };

        match timeout(Duration::from_millis(self.timeout_ms), exchange).await {
            Ok(result) => result.map(|r| r.text),
            Err(_) => Err(CallError {
                error: ReasonerError::Timeout(self.timeout_ms),
                retryable: true,
            }),
        }
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ReasonerError> {
        let _scope = ProfileScope::with_context(
            "reasoner.generate",
            &[("role", v_str(prompt.role.as_str())), ("phase", v_str(prompt.phase.as_str()))],
        );
        let op = format!("generate:{}:{}", prompt.role, prompt.phase);
        retry_async(&self.retry, Domain::Reasoner, &op, || self.call_once(prompt))
            .await
            .map_err(|e| {
                log(
                    Level::Warn,
                    Domain::Reasoner,
                    "generate_failed",
                    obj(&[
                        ("role", v_str(prompt.role.as_str())),
                        ("phase", v_str(prompt.phase.as_str())),
                        ("error", v_str(&e.error.to_string())),
                    ]),
                );
                e.error
            })
    }
}
