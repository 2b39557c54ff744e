use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::batch::types::{AspectRatio, ReferenceImage, ReferenceSet};
use crate::config::CONFIG;
use crate::llm::media::detect_mime_type;
use crate::llm::{GenerationError, ImageBackend};
use crate::utils::http::get_http_client;
use crate::utils::imaging::normalize_to_ratio;
use crate::utils::timing::log_llm_timing;

const MAX_RETRY_ATTEMPTS: usize = 2;
const RETRY_BASE_DELAY_MS: u64 = 900;
/// Inline supplementary reference parts are capped regardless of how many
/// optional roles are populated.
const MAX_SUPPLEMENTARY_REFERENCES: usize = 2;

const GENERATE_SYSTEM_PROMPT: &str =
    "Create a photorealistic portrait photograph following the instructions. CRITICAL: the response must be an image, NOT TEXT.";
const REFINE_SYSTEM_PROMPT: &str =
    "Edit the provided image following the instructions and change nothing else. CRITICAL: the response must be an image, NOT TEXT.";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
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
        #[allow(dead_code)]
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

fn redact_api_key(text: &str) -> String {
    let key = CONFIG.gemini_api_key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn build_safety_settings() -> Vec<Value> {
    let profile = CONFIG.gemini_safety_settings.as_str();
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using permissive defaults.",
                profile
            );
            "OFF"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_CIVIC_INTEGRITY", "threshold": threshold }),
    ]
}

/// Look variation levels map onto sampling temperature: 0 is near
/// deterministic, 3 is the loosest the studio allows.
fn temperature_for_variation(level: u8) -> f32 {
    match level {
        0 => 0.2,
        1 => 0.45,
        2 => 0.7,
        _ => 0.95,
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_parts(parts: &[Value]) -> Vec<Value> {
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

fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_parts(parts))
                .unwrap_or_default();
            summarized.push(json!({ "role": role, "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
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

fn inline_part(reference: &ReferenceImage) -> Value {
    let mime_type = if reference.mime_type.trim().is_empty() {
        detect_mime_type(&reference.bytes).unwrap_or_else(|| "image/png".to_string())
    } else {
        reference.mime_type.clone()
    };
    let encoded = general_purpose::STANDARD.encode(&reference.bytes);
    json!({
        "inlineData": {
            "mimeType": mime_type,
            "data": encoded
        }
    })
}

/// Assembles the ordered content parts for one shot: the instruction text,
/// the main identity reference, then at most two supplementary references in
/// fixed priority order (left side, right side, full body, background).
fn build_shot_parts(prompt: &str, refs: &ReferenceSet, main: &ReferenceImage) -> Vec<Value> {
    let mut parts = vec![json!({ "text": prompt })];
    parts.push(inline_part(main));

    let supplementary = [
        refs.side_left.as_ref(),
        refs.side_right.as_ref(),
        refs.full_body.as_ref(),
        refs.background.as_ref(),
    ];
    for reference in supplementary
        .into_iter()
        .flatten()
        .take(MAX_SUPPLEMENTARY_REFERENCES)
    {
        parts.push(inline_part(reference));
    }

    parts
}

fn extract_images_from_response(response: GeminiResponse) -> Vec<Vec<u8>> {
    let mut images = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content {
            if let Some(parts) = content.parts {
                for part in parts {
                    if let GeminiPart::InlineData { inline_data } = part {
                        if inline_data.mime_type.starts_with("image/") {
                            if let Ok(bytes) = general_purpose::STANDARD.decode(inline_data.data) {
                                images.push(bytes);
                            }
                        }
                    }
                }
            }
        }
    }
    images
}

async fn call_gemini_api(model: &str, payload: Value) -> Result<GeminiResponse> {
    let client = get_http_client();
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        model, CONFIG.gemini_api_key
    );

    if tracing::enabled!(tracing::Level::DEBUG) {
        let payload_summary = summarize_payload(&payload);
        debug!(target: "llm.gemini", model = model, payload = %payload_summary);
    }

    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let response = match client
            .post(&url)
            .timeout(Duration::from_secs(120))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = redact_api_key(&err.to_string());
                let should_retry = should_retry_error(&err) && attempt < MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, retrying={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    should_retry
                );
                if should_retry {
                    tokio::time::sleep(retry_delay(attempt)).await;
                    continue;
                }
                return Err(anyhow!("Gemini request failed: {}", err_text));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            let should_retry = should_retry_status(status) && attempt < MAX_RETRY_ATTEMPTS;
            warn!(
                "Gemini API error: status={}, body={}, retrying={}",
                status, body_summary, should_retry
            );
            if should_retry {
                tokio::time::sleep(retry_delay(attempt)).await;
                continue;
            }
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                detail
            ));
        }

        return Ok(response.json::<GeminiResponse>().await?);
    }
}

/// Production backend speaking the Gemini `generateContent` protocol.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    image_model: String,
    refine_model: String,
}

impl GeminiBackend {
    pub fn from_config() -> Self {
        GeminiBackend {
            image_model: CONFIG.gemini_image_model.clone(),
            refine_model: CONFIG.gemini_refine_model.clone(),
        }
    }
}

impl ImageBackend for GeminiBackend {
    async fn generate(
        &self,
        refs: &ReferenceSet,
        prompt: &str,
        aspect_ratio: AspectRatio,
        variation_level: u8,
    ) -> Result<Vec<u8>, GenerationError> {
        let main = refs.validate()?;
        let parts = build_shot_parts(prompt, refs, main);

        let payload = json!({
            "systemInstruction": { "parts": [{ "text": GENERATE_SYSTEM_PROMPT }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": temperature_for_variation(variation_level),
                "imageConfig": { "aspectRatio": aspect_ratio.as_wire_str() }
            },
            "safetySettings": build_safety_settings(),
        });

        let model = self.image_model.clone();
        let metadata = json!({ "aspectRatio": aspect_ratio.as_wire_str() });
        let response = log_llm_timing("gemini", &model, "generate_shot", Some(metadata), || {
            call_gemini_api(&model, payload)
        })
        .await
        .map_err(|err| GenerationError::Upstream(redact_api_key(&err.to_string())))?;

        let mut images = extract_images_from_response(response);
        if images.is_empty() {
            return Err(GenerationError::NoImage {
                model: self.image_model.clone(),
            });
        }
        normalize_to_ratio(&images.remove(0), aspect_ratio)
    }

    async fn refine(
        &self,
        image: &[u8],
        instruction: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<Vec<u8>>, GenerationError> {
        let mime_type = detect_mime_type(image).unwrap_or_else(|| "image/png".to_string());
        let encoded = general_purpose::STANDARD.encode(image);
        let parts = vec![
            json!({ "text": instruction }),
            json!({ "inlineData": { "mimeType": mime_type, "data": encoded } }),
        ];

        let payload = json!({
            "systemInstruction": { "parts": [{ "text": REFINE_SYSTEM_PROMPT }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": { "aspectRatio": aspect_ratio.as_wire_str() }
            },
            "safetySettings": build_safety_settings(),
        });

        let model = self.refine_model.clone();
        let response = log_llm_timing("gemini", &model, "refine_image", None, || {
            call_gemini_api(&model, payload)
        })
        .await
        .map_err(|err| GenerationError::Upstream(redact_api_key(&err.to_string())))?;

        let mut images = extract_images_from_response(response);
        if images.is_empty() {
            return Ok(None);
        }
        normalize_to_ratio(&images.remove(0), aspect_ratio).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(tag: u8) -> ReferenceImage {
        ReferenceImage::new(vec![tag; 2048], "image/jpeg".to_string())
    }

    fn full_reference_set() -> ReferenceSet {
        ReferenceSet {
            main: Some(reference(1)),
            side_left: Some(reference(2)),
            side_right: Some(reference(3)),
            full_body: Some(reference(4)),
            background: Some(reference(5)),
        }
    }

    fn inline_data_of(part: &Value) -> &str {
        part.pointer("/inlineData/data").unwrap().as_str().unwrap()
    }

    #[test]
    fn shot_parts_start_with_text_then_main_reference() {
        let refs = full_reference_set();
        let main = refs.main.clone().unwrap();
        let parts = build_shot_parts("prompt text", &refs, &main);
        assert_eq!(parts[0].get("text").unwrap().as_str(), Some("prompt text"));
        let main_encoded = general_purpose::STANDARD.encode(&main.bytes);
        assert_eq!(inline_data_of(&parts[1]), main_encoded);
    }

    #[test]
    fn supplementary_references_are_capped_at_two_in_priority_order() {
        let refs = full_reference_set();
        let main = refs.main.clone().unwrap();
        let parts = build_shot_parts("prompt", &refs, &main);
        // text + main + two supplementary, never more.
        assert_eq!(parts.len(), 4);
        let side_left = general_purpose::STANDARD.encode(&refs.side_left.unwrap().bytes);
        let side_right = general_purpose::STANDARD.encode(&refs.side_right.unwrap().bytes);
        assert_eq!(inline_data_of(&parts[2]), side_left);
        assert_eq!(inline_data_of(&parts[3]), side_right);
    }

    #[test]
    fn background_fills_a_free_supplementary_slot() {
        let refs = ReferenceSet {
            main: Some(reference(1)),
            full_body: Some(reference(4)),
            background: Some(reference(5)),
            ..ReferenceSet::default()
        };
        let main = refs.main.clone().unwrap();
        let parts = build_shot_parts("prompt", &refs, &main);
        assert_eq!(parts.len(), 4);
        let full_body = general_purpose::STANDARD.encode(&refs.full_body.unwrap().bytes);
        let background = general_purpose::STANDARD.encode(&refs.background.unwrap().bytes);
        assert_eq!(inline_data_of(&parts[2]), full_body);
        assert_eq!(inline_data_of(&parts[3]), background);
    }

    #[test]
    fn variation_temperature_is_monotonic() {
        assert!(temperature_for_variation(0) < temperature_for_variation(1));
        assert!(temperature_for_variation(1) < temperature_for_variation(2));
        assert!(temperature_for_variation(2) < temperature_for_variation(3));
        assert_eq!(
            temperature_for_variation(3),
            temperature_for_variation(200)
        );
    }

    #[test]
    fn response_parsing_extracts_only_inline_images() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here is your image" },
                        { "inlineData": { "mimeType": "image/png", "data": general_purpose::STANDARD.encode(b"fakepng") } },
                        { "inlineData": { "mimeType": "application/json", "data": general_purpose::STANDARD.encode(b"{}") } }
                    ]
                }
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let images = extract_images_from_response(response);
        assert_eq!(images, vec![b"fakepng".to_vec()]);
    }

    #[test]
    fn text_only_response_yields_no_images() {
        let raw = json!({
            "candidates": [{ "content": { "parts": [{ "text": "sorry" }] } }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert!(extract_images_from_response(response).is_empty());
    }
}
