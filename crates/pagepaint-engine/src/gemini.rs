use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pagepaint_contracts::media::DEFAULT_MIME_TYPE;
use pagepaint_contracts::{GeneratedImage, ImageOptions, MediaType};
use serde_json::{json, Map, Value};

use crate::config::GeminiSettings;
use crate::error::PipelineError;
use crate::transport::{
    error_chain_text, send_with_retries, truncate_text, HttpReply, HttpRequest, HttpTransport,
    RequestBody, RetryPolicy,
};

pub const EXPANSION_SYSTEM_INSTRUCTION: &str = "\
You are an expert prompt engineer for text-to-image models such as Nano Banana Pro and Imagen.
Expand the user's short image idea into a single detailed, professional image prompt that covers:
1. Scene: the overall scene and its atmosphere.
2. Subject: the subject's appearance, clothing, pose, and expression.
3. Environment: the background, setting, and props.
4. Lighting: the light source, its quality, and the mood it creates (e.g. golden hour, cinematic, soft studio light).
5. Camera/Style: lens and aperture (e.g. 50mm, f/1.8), perspective, and artistic style (photorealistic, ukiyo-e, anime, ...).
Return ONLY the expanded prompt text. No greetings, explanations, headings, or other conversational filler.";

#[derive(Debug, Clone, Copy)]
pub struct TextGenerationRequest<'a> {
    pub model: &'a str,
    pub system_instruction: &'a str,
    pub contents: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageGenerationRequest<'a> {
    pub model: &'a str,
    pub contents: &'a str,
    pub options: ImageOptions,
}

/// Text and image generation capability used by the first two phases.
pub trait GenerativeService: Send + Sync {
    /// Generated text, or `None` when the response carried no text.
    fn generate_text(&self, request: &TextGenerationRequest<'_>) -> Result<Option<String>>;

    /// Raw response payload; shape normalization happens in [`extract_generated_image`].
    fn generate_image(&self, request: &ImageGenerationRequest<'_>) -> Result<Value>;

    /// Whether the service holds the credential it needs.
    fn is_configured(&self) -> bool {
        true
    }
}

pub struct GeminiClient {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &GeminiSettings) -> Self {
        Self {
            transport,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            retry: settings.retry,
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(&self, model: &str, payload: Value) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(model);
        tracing::debug!(%endpoint, "gemini generateContent");
        let request = HttpRequest::post(&endpoint, RequestBody::Json(payload))
            .header("x-goog-api-key", api_key);
        let reply = send_with_retries(self.transport.as_ref(), request, self.retry)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", reply)
    }

    fn text_payload(request: &TextGenerationRequest<'_>) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": request.system_instruction }],
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.contents }],
            }],
        })
    }

    fn image_payload(request: &ImageGenerationRequest<'_>) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.contents }],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.options.aspect_ratio.as_str(),
                    "imageSize": request.options.image_size.as_str(),
                },
            },
        })
    }
}

impl GenerativeService for GeminiClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate_text(&self, request: &TextGenerationRequest<'_>) -> Result<Option<String>> {
        let payload = self.post(request.model, Self::text_payload(request))?;
        Ok(extract_text(&payload))
    }

    fn generate_image(&self, request: &ImageGenerationRequest<'_>) -> Result<Value> {
        self.post(request.model, Self::image_payload(request))
    }
}

fn response_json_or_error(provider: &str, reply: HttpReply) -> Result<Value> {
    if !reply.is_success() {
        bail!(
            "{provider} request failed ({}): {}",
            reply.status,
            truncate_text(&reply.body, 512)
        );
    }
    reply
        .json()
        .with_context(|| format!("{provider} returned invalid JSON payload"))
}

/// Concatenated text parts of the first candidate; a top-level `text` wins when present.
pub fn extract_text(payload: &Value) -> Option<String> {
    if let Some(text) = payload.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let parts = first_candidate_parts(payload)?;
    let text: String = parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return None;
    }
    Some(text)
}

fn first_candidate_parts(payload: &Value) -> Option<&Vec<Value>> {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
}

fn declared_mime(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("mimeType")
        .or_else(|| object.get("mime_type"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn decode_image(data: &str, mime: Option<&str>, source: &str) -> Result<GeneratedImage, PipelineError> {
    let bytes = BASE64
        .decode(data.trim().as_bytes())
        .map_err(|err| PipelineError::Synthesis(format!("{source} base64 decode failed: {err}")))?;
    let media_type = mime.map(MediaType::parse).unwrap_or_default();
    GeneratedImage::new(bytes, media_type)
        .ok_or_else(|| PipelineError::Synthesis(format!("{source} decoded to an empty payload")))
}

/// Normalizes an image response. Tried in order:
/// 1. first part of the first candidate carrying `inlineData.data` (later parts ignored);
/// 2. top-level `data`, with `mimeType` defaulting to `image/png`.
pub fn extract_generated_image(payload: &Value) -> Result<GeneratedImage, PipelineError> {
    let inline_part = first_candidate_parts(payload)
        .into_iter()
        .flatten()
        .filter_map(|part| {
            part.get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
        })
        .find(|inline| {
            inline
                .get("data")
                .and_then(Value::as_str)
                .map(|data| !data.is_empty())
                .unwrap_or(false)
        });
    if let Some(inline) = inline_part {
        let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
        return decode_image(data, declared_mime(inline), "inline image part");
    }

    if let Some(data) = payload
        .get("data")
        .and_then(Value::as_str)
        .filter(|data| !data.is_empty())
    {
        let mime = payload.as_object().and_then(declared_mime);
        return decode_image(data, mime, "top-level image data");
    }

    let finish_reason = first_candidate_finish_reason(payload)
        .map(|reason| format!(" (finishReason={reason})"))
        .unwrap_or_default();
    Err(PipelineError::Synthesis(format!(
        "response carried no image data{finish_reason}"
    )))
}

fn first_candidate_finish_reason(payload: &Value) -> Option<&str> {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("finishReason"))
        .and_then(Value::as_str)
}

/// Turns a short description into a detailed image prompt.
pub struct PromptExpander {
    service: Arc<dyn GenerativeService>,
    model: String,
}

impl PromptExpander {
    pub fn new(service: Arc<dyn GenerativeService>, model: impl Into<String>) -> Self {
        Self {
            service,
            model: model.into(),
        }
    }

    pub fn expand(&self, short_description: &str) -> Result<String, PipelineError> {
        let request = TextGenerationRequest {
            model: &self.model,
            system_instruction: EXPANSION_SYSTEM_INSTRUCTION,
            contents: short_description,
        };
        let text = self
            .service
            .generate_text(&request)
            .map_err(|err| PipelineError::Expansion(error_chain_text(&err, 512)))?;
        text.as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Expansion("service returned no text".to_string()))
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_configured()
    }
}

/// Renders an expanded prompt into image bytes.
pub struct ImageSynthesizer {
    service: Arc<dyn GenerativeService>,
    model: String,
    defaults: ImageOptions,
}

impl ImageSynthesizer {
    pub fn new(
        service: Arc<dyn GenerativeService>,
        model: impl Into<String>,
        defaults: ImageOptions,
    ) -> Self {
        Self {
            service,
            model: model.into(),
            defaults,
        }
    }

    pub fn defaults(&self) -> ImageOptions {
        self.defaults
    }

    pub fn synthesize(
        &self,
        prompt: &str,
        options: Option<ImageOptions>,
    ) -> Result<GeneratedImage, PipelineError> {
        let request = ImageGenerationRequest {
            model: &self.model,
            contents: prompt,
            options: options.unwrap_or(self.defaults),
        };
        let payload = self
            .service
            .generate_image(&request)
            .map_err(|err| PipelineError::Synthesis(error_chain_text(&err, 512)))?;
        extract_generated_image(&payload)
    }
}
