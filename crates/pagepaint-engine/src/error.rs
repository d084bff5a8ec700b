/// Failures a pipeline invocation can end with. `Display` is the user-facing text.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0} is not configured.")]
    MissingCredential(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("prompt expansion failed: {0}")]
    Expansion(String),

    #[error("image synthesis failed: {0}")]
    Synthesis(String),

    #[error("Notion file upload create failed: {}{detail}", status_prefix(.status))]
    UploadCreate { status: Option<u16>, detail: String },

    #[error("Notion file upload send failed: {}{detail}", status_prefix(.status))]
    UploadSend { status: Option<u16>, detail: String },

    #[error("public image host upload failed: {}{detail}", status_prefix(.status))]
    HostUpload { status: Option<u16>, detail: String },

    #[error("Notion block append failed: {}{detail}", status_prefix(.status))]
    Compose { status: Option<u16>, detail: String },
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) | Self::InvalidConfig(_) => "configuration",
            Self::InvalidInput(_) => "invalid_input",
            Self::Expansion(_) => "expansion",
            Self::Synthesis(_) => "synthesis",
            Self::UploadCreate { .. } => "upload_create",
            Self::UploadSend { .. } => "upload_send",
            Self::HostUpload { .. } => "host_upload",
            Self::Compose { .. } => "compose",
        }
    }

    /// HTTP status reported by the destination or host, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UploadCreate { status, .. }
            | Self::UploadSend { status, .. }
            | Self::HostUpload { status, .. }
            | Self::Compose { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_prefix(status: &Option<u16>) -> String {
    status.map(|code| format!("{code} ")).unwrap_or_default()
}

/// The request never produced an HTTP response (connect, timeout, body read).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    retryable: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        let retryable = err.is_timeout() || err.is_connect();
        let anyhow_err = anyhow::Error::new(err).context(context.to_string());
        Self {
            message: crate::transport::error_chain_text(&anyhow_err, 512),
            retryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}
