// src/api.rs
use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

const CHAT_FAILED: &str = "Failed to send message";
const UPLOAD_FAILED: &str = "Failed to upload image";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status. `message` is the backend's `detail` text when it sent one.
    #[error("{message}")]
    Backend { status: u16, message: String },

    #[error("Unexpected response body: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub preferred_links: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub suggested_tool: Option<String>,
    /// Sent by the backend but not acted on by the client.
    #[serde(default)]
    pub trigger_agent: bool,
    pub conversation_id: String,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

#[derive(Serialize, Debug)]
struct ImageUploadRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize, Debug)]
struct ImageUploadResponse {
    url: String,
}

#[derive(Deserialize, Debug, Default)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// The two backend operations the chat client depends on.
pub trait ChatBackend: Send + Sync + 'static {
    fn send_chat(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, ApiError>> + Send;

    /// Uploads a base64 image and returns the URL the backend hosts it at.
    fn upload_image(&self, base64_image: String) -> impl Future<Output = Result<String, ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client: Client::new(), base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl ChatBackend for BackendClient {
    async fn send_chat(&self, request: ChatRequest) -> Result<ChatResponse, ApiError> {
        log::debug!(
            "POST /chat message={:?} image={} conversation_id={:?} preferred_links={:?}",
            request.message,
            request.image.is_some(),
            request.conversation_id,
            request.preferred_links
        );
        let response = self.client.post(self.endpoint("chat")).json(&request).send().await?;
        let response = check_response(response, CHAT_FAILED).await?;
        let chat_response: ChatResponse = decode(response).await?;
        log::debug!("Received chat response: {:?}", chat_response);
        Ok(chat_response)
    }

    async fn upload_image(&self, base64_image: String) -> Result<String, ApiError> {
        log::info!("Uploading image ({} base64 chars)", base64_image.len());
        let response = self
            .client
            .post(self.endpoint("upload"))
            .json(&ImageUploadRequest { image: &base64_image })
            .send()
            .await?;
        let response = check_response(response, UPLOAD_FAILED).await?;
        let uploaded: ImageUploadResponse = decode(response).await?;
        log::info!("Image upload successful: {}", uploaded.url);
        Ok(uploaded.url)
    }
}

/// Passes successful responses through and turns the rest into
/// [`ApiError::Backend`], preferring the backend's `detail` text over `fallback`.
async fn check_response(response: reqwest::Response, fallback: &str) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = detail_message(&body).unwrap_or_else(|| fallback.to_string());
    log::error!("Backend error: {} - {}", status, body);
    Err(ApiError::Backend { status: status.as_u16(), message })
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    response.json::<T>().await.map_err(|e| {
        log::error!("Failed to decode backend response: {}", e);
        ApiError::Decode(e)
    })
}

fn detail_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}
