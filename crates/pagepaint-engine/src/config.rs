use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pagepaint_contracts::{AspectRatio, ImageOptions, ImageSize};

use crate::error::PipelineError;
use crate::transport::RetryPolicy;

pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PROMPT_MODEL: &str = "gemini-3-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3.1-flash-image-preview";
pub const DEFAULT_PUBLIC_HOST_URL: &str = "https://freeimage.host/api/1/upload";
/// Shared key the public host publishes for anonymous uploads.
pub const DEFAULT_PUBLIC_HOST_KEY: &str = "6d207e02198a847aa98d0a2a901485a5";
const DEFAULT_RETRY_BACKOFF_S: f64 = 1.2;

/// Where generated bytes are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublisherKind {
    /// Two-phase upload into the destination's own storage.
    #[default]
    NotionUpload,
    /// Third-party public image host returning a URL.
    PublicHost,
}

impl PublisherKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotionUpload => "notion",
            Self::PublicHost => "public_host",
        }
    }
}

impl FromStr for PublisherKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "notion" | "notion_upload" | "native" => Ok(Self::NotionUpload),
            "public_host" | "host" => Ok(Self::PublicHost),
            other => Err(format!(
                "unsupported publisher '{other}' (expected notion or public_host)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotionSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub prompt_model: String,
    pub image_model: String,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicHostSettings {
    pub endpoint: String,
    pub api_key: String,
}

/// Process-wide settings, read once and shared read-only by every invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub notion: NotionSettings,
    pub gemini: GeminiSettings,
    pub public_host: PublicHostSettings,
    pub publisher: PublisherKind,
    pub image_defaults: ImageOptions,
    pub request_timeout: Option<Duration>,
    pub events_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(non_empty_env)
    }

    /// Builds the configuration from a key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let aspect_ratio = parse_or_default::<AspectRatio>(get("GEMINI_IMAGE_ASPECT_RATIO"))?;
        let image_size = parse_or_default::<ImageSize>(get("GEMINI_IMAGE_SIZE"))?;
        let publisher = parse_or_default::<PublisherKind>(get("PAGEPAINT_PUBLISHER"))?;
        let request_timeout = get("PAGEPAINT_REQUEST_TIMEOUT_S")
            .map(|raw| parse_seconds("PAGEPAINT_REQUEST_TIMEOUT_S", &raw))
            .transpose()?;
        let max_retries = get("PAGEPAINT_GENERATION_RETRIES")
            .map(|raw| {
                raw.parse::<usize>().map_err(|_| {
                    PipelineError::InvalidConfig(format!(
                        "PAGEPAINT_GENERATION_RETRIES must be a non-negative integer, got '{raw}'"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(0);
        let backoff = get("PAGEPAINT_RETRY_BACKOFF_S")
            .map(|raw| parse_seconds("PAGEPAINT_RETRY_BACKOFF_S", &raw))
            .transpose()?
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_RETRY_BACKOFF_S));

        Ok(Self {
            notion: NotionSettings {
                api_base: get("NOTION_API_BASE")
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_NOTION_API_BASE.to_string()),
                api_key: get("NOTION_API_KEY"),
                version: get("NOTION_VERSION").unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
            },
            gemini: GeminiSettings {
                api_base: get("GEMINI_API_BASE")
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
                api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
                prompt_model: get("GEMINI_PROMPT_MODEL")
                    .unwrap_or_else(|| DEFAULT_PROMPT_MODEL.to_string()),
                image_model: get("GEMINI_IMAGE_MODEL")
                    .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
                retry: RetryPolicy {
                    max_retries,
                    backoff,
                },
            },
            public_host: PublicHostSettings {
                endpoint: get("PUBLIC_IMAGE_HOST_URL")
                    .unwrap_or_else(|| DEFAULT_PUBLIC_HOST_URL.to_string()),
                api_key: get("PUBLIC_IMAGE_HOST_KEY")
                    .unwrap_or_else(|| DEFAULT_PUBLIC_HOST_KEY.to_string()),
            },
            publisher,
            image_defaults: ImageOptions {
                aspect_ratio,
                image_size,
            },
            request_timeout,
            events_path: get("PAGEPAINT_EVENTS").map(PathBuf::from),
        })
    }
}

fn parse_or_default<T>(raw: Option<String>) -> Result<T, PipelineError>
where
    T: FromStr<Err = String> + Default,
{
    raw.map(|value| value.parse::<T>().map_err(PipelineError::InvalidConfig))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration, PipelineError> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "{key} must be a positive number of seconds, got '{raw}'"
            ))
        })
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
