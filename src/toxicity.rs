//! Toxicity scoring against a hosted text-classification model.
//!
//! The classifier is fail-open: `score` never errors, every failure resolves
//! to `0.0` so an unreachable model can't block comment submission.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_INFERENCE_HOST: &str = "https://api-inference.huggingface.co";
pub const CLIENT_USER_AGENT: &str = "BlogStore-ToxicDetection/1.0";

#[derive(Clone, Debug)]
pub struct ToxicityConfig {
    pub inference_host: String,
    /// `None` disables scoring entirely.
    pub model_name: Option<String>,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ToxicityConfig {
    fn default() -> Self {
        Self {
            inference_host: DEFAULT_INFERENCE_HOST.to_string(),
            model_name: None,
            api_token: None,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("no classification model configured")]
    NotConfigured,
    #[error("inference transport error: {0}")]
    Transport(String),
    #[error("inference endpoint answered status {0}")]
    Status(u16),
    #[error("inference call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected inference response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Submits `text` to `model` and returns the raw success body.
    async fn infer(&self, model: &str, text: &str) -> Result<String, ClassifierError>;
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize)]
struct LabelScore {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

pub struct HttpInferenceBackend {
    client: Client,
    host: String,
    timeout: Duration,
}

impl HttpInferenceBackend {
    pub fn new(config: &ToxicityConfig) -> Result<Self, ClassifierError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClassifierError::Transport(format!("invalid api token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            host: config.inference_host.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn infer(&self, model: &str, text: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/models/{}", self.host, model);
        let resp = self
            .client
            .post(url)
            .json(&InferenceRequest { inputs: text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout(self.timeout)
                } else {
                    ClassifierError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }
        resp.text()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))
    }
}

#[derive(Clone)]
pub struct ToxicityClassifier {
    backend: Arc<dyn InferenceBackend>,
    model_name: Option<String>,
    timeout: Duration,
}

impl ToxicityClassifier {
    pub fn new(config: &ToxicityConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            model_name: config.model_name.clone(),
            timeout: config.timeout,
        }
    }

    /// Classifier talking to the configured inference host over HTTP.
    pub fn from_config(config: &ToxicityConfig) -> Result<Self, ClassifierError> {
        let backend = HttpInferenceBackend::new(config)?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    /// Score in `[0.0, 1.0]`; any failure yields `0.0`.
    pub async fn score(&self, text: &str) -> f64 {
        match self.try_score(text).await {
            Ok(score) => score,
            Err(ClassifierError::NotConfigured) => 0.0,
            Err(e) => {
                warn!("toxicity scoring failed, treating comment as safe: {}", e);
                0.0
            }
        }
    }

    /// Single attempt, bounded by the configured timeout. No retries.
    pub async fn try_score(&self, text: &str) -> Result<f64, ClassifierError> {
        if text.trim().is_empty() {
            return Ok(0.0);
        }
        let model = self
            .model_name
            .as_deref()
            .ok_or(ClassifierError::NotConfigured)?;

        let body = tokio::time::timeout(self.timeout, self.backend.infer(model, text))
            .await
            .map_err(|_| ClassifierError::Timeout(self.timeout))??;
        parse_max_score(&body)
    }
}

/// Highest `score` in the first label group, whatever its label.
///
/// Entries without a score are skipped; an empty group scores `0.0`.
pub fn parse_max_score(body: &str) -> Result<f64, ClassifierError> {
    let groups: Vec<Vec<LabelScore>> =
        serde_json::from_str(body).map_err(|e| ClassifierError::Malformed(e.to_string()))?;
    let group = groups
        .into_iter()
        .next()
        .ok_or_else(|| ClassifierError::Malformed("empty label list".to_string()))?;

    let mut top: Option<(f64, Option<String>)> = None;
    for entry in group {
        let Some(score) = entry.score else { continue };
        if top.as_ref().map_or(true, |(best, _)| score > *best) {
            top = Some((score, entry.label));
        }
    }

    match top {
        Some((score, label)) => {
            debug!("top label {:?} scored {}", label.as_deref().unwrap_or("?"), score);
            Ok(score.clamp(0.0, 1.0))
        }
        None => Ok(0.0),
    }
}
