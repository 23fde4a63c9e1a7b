use std::env;
use std::time::Duration;

use crate::moderation::DEFAULT_TOXICITY_THRESHOLD;
use crate::toxicity::{ToxicityConfig, DEFAULT_INFERENCE_HOST};

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_header: String,
    pub cors_allow_origin: String,
    pub inference_host: String,
    pub model_name: Option<String>,
    pub api_token: Option<String>,
    pub toxicity_threshold: f64,
    pub toxicity_timeout_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(38321);

        let sqlite_path = env::var("SQLITE_PATH").unwrap_or_else(|_| "/opt/blogstore/data.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok();

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "4qK8vZrT2mWc9bXe".to_string());
        let token_header = env::var("TOKEN_HEADER").unwrap_or_else(|_| "token".to_string());
        let cors_allow_origin = env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".to_string());

        let inference_host = env::var("HF_INFERENCE_HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INFERENCE_HOST.to_string());
        let model_name = non_empty_var("HF_MODEL_NAME");
        let api_token = non_empty_var("HF_API_TOKEN");

        // 0.005 is suspiciously low for a softmax classifier; keep it overridable until reviewed.
        let toxicity_threshold = env::var("TOXICITY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_TOXICITY_THRESHOLD);
        let toxicity_timeout_ms = env::var("TOXICITY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5000);

        Self {
            server_port,
            sqlite_path,
            database_url,
            jwt_secret,
            token_header,
            cors_allow_origin,
            inference_host,
            model_name,
            api_token,
            toxicity_threshold,
            toxicity_timeout_ms,
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}", path)
    }

    pub fn toxicity_config(&self) -> ToxicityConfig {
        ToxicityConfig {
            inference_host: self.inference_host.clone(),
            model_name: self.model_name.clone(),
            api_token: self.api_token.clone(),
            timeout: Duration::from_millis(self.toxicity_timeout_ms),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
