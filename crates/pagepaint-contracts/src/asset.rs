use serde::{Deserialize, Serialize};

/// Durable handle produced by publishing image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetReference {
    /// Destination-native upload id; only resolvable inside the destination.
    UploadId { id: String },
    /// Publicly fetchable URL with no destination-side lifecycle.
    ExternalUrl { url: String },
}

impl AssetReference {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UploadId { .. } => "upload_id",
            Self::ExternalUrl { .. } => "external_url",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::UploadId { id } => id,
            Self::ExternalUrl { url } => url,
        }
    }
}

/// Where new content is appended: a specific block when given, else the page root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAnchor {
    page_id: String,
    block_id: Option<String>,
}

impl TargetAnchor {
    /// Blank block ids count as absent.
    pub fn new(page_id: impl Into<String>, block_id: Option<String>) -> Self {
        Self {
            page_id: page_id.into().trim().to_string(),
            block_id: block_id
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn block_id(&self) -> Option<&str> {
        self.block_id.as_deref()
    }

    pub fn append_target(&self) -> &str {
        self.block_id.as_deref().unwrap_or(&self.page_id)
    }
}
