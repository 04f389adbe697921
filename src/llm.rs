use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

use crate::config::Config;
use crate::error::PipelineError;

/// OpenAI-compatible client for the two model calls the pipeline makes.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    pub base: String,
    pub token: String,
    pub vision_model: String,
    pub image_model: String,
    pub image_size: String,
}

pub struct ExtractRequest<'a> {
    pub http: &'a reqwest::Client,
    pub prompt: &'a str,
    pub mime: &'a str,
    pub image: &'a [u8],
    pub max_tokens: u32,
    pub timeout: Duration,
}

pub struct GenerateRequest<'a> {
    pub http: &'a reqwest::Client,
    pub prompt: &'a str,
    pub timeout: Duration,
    pub download_timeout: Duration,
}

impl OpenAiClient {
    /// Builds a client from config, refusing when no API key is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMissing` if the API key is absent or blank.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let token = config.api_key()?.to_string();
        Ok(Self {
            base: config.api_url.trim_end_matches('/').to_string(),
            token,
            vision_model: config.vision_model.clone(),
            image_model: config.image_model.clone(),
            image_size: config.image_size.clone(),
        })
    }

    /// Sends the menu photo with the instruction prompt; returns the raw completion text.
    ///
    /// # Errors
    ///
    /// `UpstreamTimeout` on timeout, `Upstream` on transport errors, non-2xx
    /// statuses or an envelope without content.
    pub async fn extract_dishes(&self, req: ExtractRequest<'_>) -> Result<String, PipelineError> {
        let url = format!("{}/chat/completions", self.base);
        let b64 = B64.encode(req.image);

        let body = json!({
            "model": self.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": req.prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:{};base64,{b64}", req.mime) }
                    }
                ]
            }],
            "max_tokens": req.max_tokens
        });

        tracing::info!(model = %self.vision_model, bytes = req.image.len(), "requesting dish extraction");
        let envelope = self.post_json(req.http, &url, &body, req.timeout).await?;

        let content = envelope
            .pointer("/choices/0/message/content")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| PipelineError::Upstream("extraction response missing content".into()))?;

        tracing::debug!(preview = %content.chars().take(200).collect::<String>(), "extraction completion");
        Ok(content.to_string())
    }

    /// Asks the image model for one picture and returns its bytes.
    ///
    /// # Errors
    ///
    /// `UpstreamTimeout` on timeout, `Upstream` on any failed request or
    /// a response carrying neither `url` nor `b64_json`.
    pub async fn generate_image(&self, req: GenerateRequest<'_>) -> Result<Vec<u8>, PipelineError> {
        let url = format!("{}/images/generations", self.base);
        let body = json!({
            "model": self.image_model,
            "prompt": req.prompt,
            "n": 1,
            "size": self.image_size,
        });

        let envelope = self.post_json(req.http, &url, &body, req.timeout).await?;
        let item = envelope
            .pointer("/data/0")
            .ok_or_else(|| PipelineError::Upstream("image response has no data".into()))?;

        if let Some(b64) = item.get("b64_json").and_then(JsonValue::as_str) {
            return B64
                .decode(b64)
                .map_err(|e| PipelineError::Upstream(format!("bad b64_json: {e}")));
        }

        let image_url = item
            .get("url")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| PipelineError::Upstream("image response has no url".into()))?;

        tracing::debug!(%image_url, "downloading generated image");
        download(req.http, image_url, req.download_timeout).await
    }

    async fn post_json(
        &self,
        http: &reqwest::Client,
        url: &str,
        body: &JsonValue,
        timeout: Duration,
    ) -> Result<JsonValue, PipelineError> {
        let secs = timeout.as_secs();
        let resp = http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.token)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(&e, secs))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| PipelineError::from_reqwest(&e, secs))?;

        if !status.is_success() {
            return Err(PipelineError::Upstream(format!(
                "HTTP {status}: {}",
                text.chars().take(500).collect::<String>()
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| PipelineError::Upstream(format!("malformed response body: {e}")))
    }
}

async fn download(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, PipelineError> {
    let secs = timeout.as_secs();
    let resp = http
        .get(url)
        .header(reqwest::header::USER_AGENT, "menu2img/image-fetch")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| PipelineError::from_reqwest(&e, secs))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(PipelineError::Upstream(format!("image download HTTP {status}")));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| PipelineError::from_reqwest(&e, secs))?;
    Ok(bytes.to_vec())
}
