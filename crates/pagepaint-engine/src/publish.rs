use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pagepaint_contracts::{AssetReference, GeneratedImage, MediaType};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{PipelineConfig, PublicHostSettings, PublisherKind};
use crate::error::PipelineError;
use crate::notion::NotionClient;
use crate::transport::{truncate_text, HttpRequest, HttpTransport, MultipartFile, RequestBody};

const FILE_NAME_PREFIX: &str = "nano-banana";

/// Turns image bytes into a reference the destination can display.
pub trait AssetPublisher: Send + Sync {
    fn name(&self) -> &str;
    fn publish(&self, image: &GeneratedImage) -> Result<AssetReference, PipelineError>;
}

pub fn publisher_for(
    config: &PipelineConfig,
    transport: Arc<dyn HttpTransport>,
) -> Arc<dyn AssetPublisher> {
    match config.publisher {
        PublisherKind::NotionUpload => Arc::new(NotionUploadPublisher::new(NotionClient::new(
            transport,
            &config.notion,
        ))),
        PublisherKind::PublicHost => {
            Arc::new(PublicHostPublisher::new(transport, &config.public_host))
        }
    }
}

/// Unique per call: millisecond timestamp plus a random suffix, with the
/// extension implied by the media type.
pub fn upload_file_name(media_type: &MediaType) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{FILE_NAME_PREFIX}-{stamp}-{}.{}",
        &nonce[..8],
        media_type.extension()
    )
}

/// Strategy A: create an upload session, send the bytes, hand back the session id.
pub struct NotionUploadPublisher {
    notion: NotionClient,
}

impl NotionUploadPublisher {
    pub fn new(notion: NotionClient) -> Self {
        Self { notion }
    }

    fn create_session(&self, file_name: &str, content_type: &str) -> Result<(String, String), PipelineError> {
        let reply = self
            .notion
            .create_file_upload(file_name, content_type)
            .map_err(|err| PipelineError::UploadCreate {
                status: None,
                detail: err.to_string(),
            })?;
        let status = Some(reply.status);
        if !reply.is_success() {
            return Err(PipelineError::UploadCreate {
                status,
                detail: truncate_text(&reply.body, 512),
            });
        }
        let payload = reply.json().map_err(|_| PipelineError::UploadCreate {
            status,
            detail: format!("invalid JSON payload: {}", truncate_text(&reply.body, 512)),
        })?;
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        match (field("id"), field("upload_url")) {
            (Some(id), Some(upload_url)) => Ok((id, upload_url)),
            _ => Err(PipelineError::UploadCreate {
                status,
                detail: format!(
                    "response missing id or upload_url: {}",
                    truncate_text(&reply.body, 512)
                ),
            }),
        }
    }
}

impl AssetPublisher for NotionUploadPublisher {
    fn name(&self) -> &str {
        "notion"
    }

    fn publish(&self, image: &GeneratedImage) -> Result<AssetReference, PipelineError> {
        let file_name = upload_file_name(image.media_type());
        let (id, upload_url) = self.create_session(&file_name, image.mime_type())?;
        tracing::debug!(file_upload_id = %id, %file_name, "upload session created");

        let file = MultipartFile {
            field: "file".to_string(),
            file_name,
            mime_type: image.mime_type().to_string(),
            bytes: image.bytes().to_vec(),
        };
        let reply = self
            .notion
            .send_file_upload(&upload_url, file)
            .map_err(|err| PipelineError::UploadSend {
                status: None,
                detail: err.to_string(),
            })?;
        if !reply.is_success() {
            return Err(PipelineError::UploadSend {
                status: Some(reply.status),
                detail: truncate_text(&reply.body, 512),
            });
        }
        Ok(AssetReference::UploadId { id })
    }
}

/// Strategy B: post base64 bytes to a public image host and keep its URL.
pub struct PublicHostPublisher {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    api_key: String,
}

impl PublicHostPublisher {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &PublicHostSettings) -> Self {
        Self {
            transport,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
        }
    }
}

impl AssetPublisher for PublicHostPublisher {
    fn name(&self) -> &str {
        "public_host"
    }

    fn publish(&self, image: &GeneratedImage) -> Result<AssetReference, PipelineError> {
        let fields = vec![
            ("key".to_string(), self.api_key.clone()),
            ("action".to_string(), "upload".to_string()),
            ("source".to_string(), BASE64.encode(image.bytes())),
            ("format".to_string(), "json".to_string()),
        ];
        let reply = self
            .transport
            .send(HttpRequest::post(&self.endpoint, RequestBody::Form(fields)))
            .map_err(|err| PipelineError::HostUpload {
                status: None,
                detail: err.to_string(),
            })?;
        let status = Some(reply.status);
        if !reply.is_success() {
            return Err(PipelineError::HostUpload {
                status,
                detail: truncate_text(&reply.body, 512),
            });
        }
        let payload = reply.json().map_err(|_| PipelineError::HostUpload {
            status,
            detail: format!("invalid JSON payload: {}", truncate_text(&reply.body, 512)),
        })?;
        let url = payload
            .get("image")
            .and_then(|image| image.get("url"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PipelineError::HostUpload {
                status,
                detail: format!("response missing image.url: {}", truncate_text(&reply.body, 512)),
            })?;
        Ok(AssetReference::ExternalUrl {
            url: url.to_string(),
        })
    }
}
