use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{Judge, JudgeConfig, JudgeError, JudgeOutput, JudgeRequest, JudgeType};

pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_API_MODEL: &str = "claude-sonnet-4-5";

const API_VERSION: &str = "2023-06-01";

/// Judge backed by an Anthropic-compatible messages endpoint
pub struct ApiJudge {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ApiJudge {
    pub fn new(base_url: String, api_key: String) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| JudgeError::ConfigError(format!("http client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn transport_error(error: reqwest::Error, config: &JudgeConfig) -> JudgeError {
    if error.is_timeout() {
        JudgeError::Timeout(config.timeout.unwrap_or_default())
    } else if error.is_connect() || error.is_request() {
        JudgeError::Connection(error.to_string())
    } else {
        JudgeError::InvalidResponse(error.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, JudgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(JudgeError::RateLimited {
            retry_after: retry_after(&response),
        }),
        StatusCode::SERVICE_UNAVAILABLE => Err(JudgeError::Overloaded { status: code }),
        // 529 is the "overloaded" status of the messages API
        _ if code == 529 => Err(JudgeError::Overloaded { status: code }),
        _ => {
            let message = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                Err(JudgeError::Server {
                    status: code,
                    message,
                })
            } else {
                Err(JudgeError::Rejected {
                    status: code,
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl Judge for ApiJudge {
    fn name(&self) -> &str {
        "Messages API"
    }

    fn judge_type(&self) -> JudgeType {
        JudgeType::Api
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn judge(
        &self,
        request: &JudgeRequest,
        config: &JudgeConfig,
    ) -> Result<JudgeOutput, JudgeError> {
        let start = Instant::now();
        let model = config.model.as_deref().unwrap_or(DEFAULT_API_MODEL);

        debug!(
            judge = self.name(),
            model,
            message_len = request.message.len(),
            "Executing judge"
        );

        let mut body = json!({
            "model": model,
            "max_tokens": config.max_tokens,
            "messages": [{"role": "user", "content": request.message}],
        });
        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        let mut builder = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);
        if let Some(limit) = config.timeout {
            builder = builder.timeout(limit);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, config))?;
        let response = check_status(response).await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| transport_error(e, config))?;

        // Concatenate the text blocks of the reply
        let blocks = json
            .get("content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| JudgeError::InvalidResponse("response has no content".to_string()))?;
        let text: Vec<&str> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();
        if text.is_empty() {
            return Err(JudgeError::InvalidResponse(
                "response has no text blocks".to_string(),
            ));
        }

        Ok(JudgeOutput::new(text.join("\n"), self.name(), start.elapsed()))
    }
}
