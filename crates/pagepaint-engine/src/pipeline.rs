use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use pagepaint_contracts::events::EventWriter;
use pagepaint_contracts::{
    AspectRatio, GenerateImageInput, ImageOptions, ImageSize, TargetAnchor,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::compose::BlockComposer;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::gemini::{GeminiClient, GenerativeService, ImageSynthesizer, PromptExpander};
use crate::notion::NotionClient;
use crate::publish::{publisher_for, AssetPublisher};
use crate::transport::{HttpTransport, ReqwestTransport};

const SUCCESS_PREFIX: &str = "Successfully generated and uploaded image to Notion.";
const FAILURE_PREFIX: &str = "Failed to generate or upload image:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Expand,
    Synthesize,
    Publish,
    Compose,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Synthesize => "synthesize",
            Self::Publish => "publish",
            Self::Compose => "compose",
        }
    }
}

/// Outcome of one invocation. `message` is the only part meant for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub invocation_id: String,
    pub success: bool,
    pub message: String,
    pub error_kind: Option<&'static str>,
}

impl PipelineResult {
    fn succeeded(invocation_id: String, anchor: &TargetAnchor) -> Self {
        Self {
            invocation_id,
            success: true,
            message: format!(
                "{SUCCESS_PREFIX} page_id={}, inserted_under={}.",
                anchor.page_id(),
                anchor.append_target()
            ),
            error_kind: None,
        }
    }

    fn failed(invocation_id: String, error_kind: &'static str, detail: &str) -> Self {
        Self {
            invocation_id,
            success: false,
            message: format!("{FAILURE_PREFIX} {detail}"),
            error_kind: Some(error_kind),
        }
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Input after validation; built before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput {
    pub short_description: String,
    pub anchor: TargetAnchor,
    pub options: ImageOptions,
}

pub fn validate_input(
    input: &GenerateImageInput,
    defaults: ImageOptions,
) -> Result<ValidatedInput, PipelineError> {
    let short_description = input.short_description.trim();
    if short_description.is_empty() {
        return Err(PipelineError::InvalidInput(
            "short_description is required".to_string(),
        ));
    }
    if input.page_id.trim().is_empty() {
        return Err(PipelineError::InvalidInput("page_id is required".to_string()));
    }
    let aspect_ratio = match non_blank(input.aspect_ratio.as_deref()) {
        Some(raw) => raw
            .parse::<AspectRatio>()
            .map_err(PipelineError::InvalidInput)?,
        None => defaults.aspect_ratio,
    };
    let image_size = match non_blank(input.image_size.as_deref()) {
        Some(raw) => raw.parse::<ImageSize>().map_err(PipelineError::InvalidInput)?,
        None => defaults.image_size,
    };
    Ok(ValidatedInput {
        short_description: short_description.to_string(),
        anchor: TargetAnchor::new(input.page_id.as_str(), input.target_block_id.clone()),
        options: ImageOptions {
            aspect_ratio,
            image_size,
        },
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Expand → Synthesize → Publish → Compose, strictly in order, no retries
/// between phases. A failure in any phase ends the invocation; an asset that
/// was published before a compose failure is left in place.
pub struct Pipeline {
    expander: PromptExpander,
    synthesizer: ImageSynthesizer,
    publisher: Arc<dyn AssetPublisher>,
    composer: BlockComposer,
    events: EventWriter,
}

impl Pipeline {
    pub fn new(
        expander: PromptExpander,
        synthesizer: ImageSynthesizer,
        publisher: Arc<dyn AssetPublisher>,
        composer: BlockComposer,
    ) -> Self {
        Self {
            expander,
            synthesizer,
            publisher,
            composer,
            events: EventWriter::disabled("pipeline"),
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.request_timeout)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Wires the production clients over `transport`.
    pub fn with_transport(config: &PipelineConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let gemini: Arc<dyn GenerativeService> =
            Arc::new(GeminiClient::new(Arc::clone(&transport), &config.gemini));
        let events = match config.events_path.as_ref() {
            Some(path) => EventWriter::new(path, "pipeline"),
            None => EventWriter::disabled("pipeline"),
        };
        Self::new(
            PromptExpander::new(Arc::clone(&gemini), config.gemini.prompt_model.as_str()),
            ImageSynthesizer::new(
                gemini,
                config.gemini.image_model.as_str(),
                config.image_defaults,
            ),
            publisher_for(config, Arc::clone(&transport)),
            BlockComposer::new(NotionClient::new(transport, &config.notion)),
        )
        .with_events(events)
    }

    pub fn expander(&self) -> &PromptExpander {
        &self.expander
    }

    pub fn synthesizer(&self) -> &ImageSynthesizer {
        &self.synthesizer
    }

    /// Runs one invocation. Never panics or errors outward.
    pub fn run(&self, input: &GenerateImageInput) -> PipelineResult {
        let invocation_id = Uuid::new_v4().to_string();
        let events = self.events.for_invocation(invocation_id.as_str());
        let started = Instant::now();
        emit(
            &events,
            "pipeline_started",
            json!({
                "page_id": input.page_id,
                "target_block_id": input.target_block_id,
                "publisher": self.publisher.name(),
            }),
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(input, &events)));
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(anchor)) => {
                tracing::info!(
                    %invocation_id,
                    page_id = anchor.page_id(),
                    inserted_under = anchor.append_target(),
                    elapsed_ms,
                    "image generated and inserted"
                );
                emit(
                    &events,
                    "pipeline_finished",
                    json!({
                        "page_id": anchor.page_id(),
                        "target_block_id": anchor.block_id(),
                        "inserted_under": anchor.append_target(),
                        "elapsed_ms": elapsed_ms,
                    }),
                );
                PipelineResult::succeeded(invocation_id, &anchor)
            }
            Ok(Err(err)) => {
                tracing::error!(
                    %invocation_id,
                    error_kind = err.kind(),
                    "error generating or uploading image: {err:?}"
                );
                emit(
                    &events,
                    "pipeline_failed",
                    json!({
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                        "status": err.status(),
                        "elapsed_ms": elapsed_ms,
                    }),
                );
                PipelineResult::failed(invocation_id, err.kind(), &err.to_string())
            }
            Err(payload) => {
                let detail = format!("internal error: {}", panic_message(payload.as_ref()));
                tracing::error!(%invocation_id, "pipeline panicked: {detail}");
                emit(
                    &events,
                    "pipeline_failed",
                    json!({
                        "error_kind": "internal",
                        "error": detail,
                        "elapsed_ms": elapsed_ms,
                    }),
                );
                PipelineResult::failed(invocation_id, "internal", &detail)
            }
        }
    }

    fn execute(
        &self,
        input: &GenerateImageInput,
        events: &EventWriter,
    ) -> Result<TargetAnchor, PipelineError> {
        if !self.composer.is_configured() {
            return Err(PipelineError::MissingCredential("NOTION_API_KEY"));
        }
        if !self.expander.is_configured() {
            return Err(PipelineError::MissingCredential("GEMINI_API_KEY"));
        }
        let request = validate_input(input, self.synthesizer.defaults())?;

        let prompt = run_phase(
            events,
            Phase::Expand,
            || self.expander.expand(&request.short_description),
            |prompt| json!({ "prompt_chars": prompt.chars().count() }),
        )?;
        tracing::debug!(%prompt, "expanded prompt");

        let image = run_phase(
            events,
            Phase::Synthesize,
            || self.synthesizer.synthesize(&prompt, Some(request.options)),
            |image| {
                json!({
                    "bytes": image.len(),
                    "mime_type": image.mime_type(),
                    "aspect_ratio": request.options.aspect_ratio.as_str(),
                    "image_size": request.options.image_size.as_str(),
                })
            },
        )?;

        let asset = run_phase(
            events,
            Phase::Publish,
            || self.publisher.publish(&image),
            |asset| {
                json!({
                    "publisher": self.publisher.name(),
                    "asset_kind": asset.kind(),
                    "asset": asset.value(),
                })
            },
        )?;

        run_phase(
            events,
            Phase::Compose,
            || self.composer.compose(&request.anchor, &asset, &prompt),
            |_| json!({ "block_id": request.anchor.append_target() }),
        )?;

        Ok(request.anchor)
    }
}

fn run_phase<T>(
    events: &EventWriter,
    phase: Phase,
    step: impl FnOnce() -> Result<T, PipelineError>,
    describe: impl FnOnce(&T) -> Value,
) -> Result<T, PipelineError> {
    tracing::info!(
        invocation_id = events.invocation_id(),
        phase = phase.as_str(),
        "phase started"
    );
    emit(events, "phase_started", json!({ "phase": phase.as_str() }));
    let started = Instant::now();
    let result = step();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut payload = map_object(json!({
        "phase": phase.as_str(),
        "elapsed_ms": elapsed_ms,
        "ok": result.is_ok(),
    }));
    match &result {
        Ok(value) => payload.extend(map_object(describe(value))),
        Err(err) => {
            payload.insert("error_kind".to_string(), Value::String(err.kind().to_string()));
        }
    }
    emit(events, "phase_finished", Value::Object(payload));
    result
}

/// Event log failures are reported and otherwise ignored.
fn emit(events: &EventWriter, event_type: &str, payload: Value) {
    if let Err(err) = events.emit(event_type, map_object(payload)) {
        tracing::warn!(event_type, "failed to write pipeline event: {err:#}");
    }
}

fn map_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
