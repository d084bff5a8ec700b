use std::fmt;

pub const DEFAULT_MIME_TYPE: &str = "image/png";
pub const FALLBACK_EXTENSION: &str = "bin";

/// Media types the pipeline names explicitly; anything else is carried through
/// verbatim as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Webp,
    Gif,
    Other(String),
}

impl MediaType {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/png" => Self::Png,
            "image/webp" => Self::Webp,
            "image/gif" => Self::Gif,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Other(raw) => raw.as_str(),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Other(_) => FALLBACK_EXTENSION,
        }
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::Png
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File extension for a declared media type. Total: unknown input maps to `bin`.
pub fn extension_from_mime_type(mime_type: &str) -> &'static str {
    MediaType::parse(mime_type).extension()
}

/// Image bytes produced by synthesis. Never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    bytes: Vec<u8>,
    media_type: MediaType,
}

impl GeneratedImage {
    /// Returns `None` for an empty payload.
    pub fn new(bytes: Vec<u8>, media_type: MediaType) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Some(Self { bytes, media_type })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn mime_type(&self) -> &str {
        self.media_type.as_str()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}
