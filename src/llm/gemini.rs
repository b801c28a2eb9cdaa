use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::MediaFile;
use crate::llm::VisionModel;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
}

/// Gemini `generateContent` client used to propose artwork placements.
#[derive(Clone)]
pub struct GeminiVisionModel {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: i32,
}

impl GeminiVisionModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: get_http_client().clone(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.4,
            max_output_tokens: 1024,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.gemini_api_key.clone(), config.gemini_model.clone())
            .with_base_url(config.gemini_base_url.clone())
            .with_generation(config.gemini_temperature, config.gemini_max_output_tokens)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_output_tokens: i32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn redact_api_key(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn build_payload(&self, prompt: &str, images: &[MediaFile]) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": build_gemini_parts(prompt, images) }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            },
        })
    }

    async fn call_gemini_api(&self, payload: Value) -> Result<GeminiResponse> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is not configured"));
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload);
            debug!(target: "llm.gemini", model = %self.model, payload = %payload_summary);
        }

        let response = match self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = self.redact_api_key(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status()
                );
                return Err(anyhow!("Gemini request failed: {}", err_text));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response.json::<GeminiResponse>().await?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = %self.model, response = %response_summary);
        }
        Ok(value)
    }
}

#[async_trait]
impl VisionModel for GeminiVisionModel {
    async fn generate_text(&self, prompt: &str, images: &[MediaFile]) -> Result<String> {
        let payload = self.build_payload(prompt, images);
        let labels: Vec<&str> = images.iter().map(MediaFile::label).collect();
        let metadata = json!({ "images": labels });

        log_llm_timing("gemini", &self.model, "placement", Some(metadata), || async {
            let response = self.call_gemini_api(payload).await?;
            if let Some(reason) = response
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason.as_deref())
            {
                return Err(anyhow!("Gemini blocked the prompt: {}", reason));
            }
            let text = extract_text_from_response(response);
            if text.trim().is_empty() {
                return Err(anyhow!("Gemini returned no text (model: {})", self.model));
            }
            Ok(text)
        })
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn normalize_gemini_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

fn build_gemini_parts(prompt: &str, images: &[MediaFile]) -> Vec<Value> {
    let mut parts = vec![json!({ "text": prompt })];
    for image in images {
        parts.push(json!({
            "inlineData": {
                "mimeType": normalize_gemini_mime_type(&image.mime_type),
                "data": general_purpose::STANDARD.encode(&image.bytes)
            }
        }));
    }
    parts
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized_contents = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_gemini_parts(parts))
                .unwrap_or_default();
            summarized_contents.push(json!({ "role": role, "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for candidate in candidates {
        let parts = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_deref())
            .unwrap_or(&[]);
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { inline_data } => {
                    if inline_data.mime_type.starts_with("image/") {
                        image_parts += 1;
                    }
                }
                GeminiPart::Other(_) => {}
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn extract_text_from_response(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        let parts = candidate
            .content
            .and_then(|content| content.parts)
            .unwrap_or_default();
        for part in parts {
            if let GeminiPart::Text { text } = part {
                if !text.trim().is_empty() {
                    text_parts.push(text);
                }
            }
        }
    }
    text_parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_response(raw: &str) -> GeminiResponse {
        serde_json::from_str(raw).expect("valid gemini response")
    }

    #[test]
    fn extracts_and_joins_text_parts() {
        let response = parse_response(
            r#"{"candidates":[{"content":{"parts":[
                {"text":"Here is the placement:"},
                {"text":"   "},
                {"functionCall":{"name":"noop"}},
                {"text":"{\"x\": 100}"}
            ]}}]}"#,
        );
        assert_eq!(
            extract_text_from_response(response),
            "Here is the placement:\n{\"x\": 100}"
        );
    }

    #[test]
    fn missing_candidates_yield_empty_text() {
        let response = parse_response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert_eq!(
            response
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason.as_deref()),
            Some("SAFETY")
        );
        assert_eq!(extract_text_from_response(response), "");
    }

    #[test]
    fn parts_put_prompt_before_images() {
        let images = vec![
            MediaFile::new(vec![1, 2, 3], "image/jpg".to_string(), None),
            MediaFile::new(vec![4], "image/png".to_string(), None),
        ];
        let parts = build_gemini_parts("prompt", &images);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], "prompt");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/png");
    }

    #[test]
    fn payload_summary_hides_image_data() {
        let model = GeminiVisionModel::new("secret", "gemini-test");
        let images = vec![MediaFile::new(vec![0; 30], "image/png".to_string(), None)];
        let summary = summarize_gemini_payload(&model.build_payload("hello", &images));
        let part = &summary["contents"][0]["parts"][1]["inlineData"];
        assert_eq!(part["dataLen"], 40);
        assert!(part.get("data").is_none());
    }

    #[test]
    fn error_body_prefers_api_message() {
        let (message, _) =
            summarize_error_body(r#"{"error":{"code":403,"message":"API key not valid"}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid"));

        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn api_key_is_redacted() {
        let model = GeminiVisionModel::new("secret-key", "gemini-test");
        assert_eq!(
            model.redact_api_key("error for https://host?key=secret-key"),
            "error for https://host?key=[redacted]"
        );
    }

    #[test]
    fn endpoint_uses_configured_base_url() {
        let model = GeminiVisionModel::new("k", "gemini-1.5-pro").with_base_url("http://localhost:9/v1/");
        assert_eq!(
            model.endpoint(),
            "http://localhost:9/v1/models/gemini-1.5-pro:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let model = GeminiVisionModel::new("  ", "gemini-test");
        let err = model.generate_text("prompt", &[]).await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
