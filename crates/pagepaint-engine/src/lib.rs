pub mod compose;
pub mod config;
pub mod error;
pub mod gemini;
pub mod notion;
pub mod pipeline;
pub mod publish;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use compose::BlockComposer;
pub use config::{PipelineConfig, PublisherKind};
pub use error::{PipelineError, TransportError};
pub use gemini::{GeminiClient, GenerativeService, ImageSynthesizer, PromptExpander};
pub use notion::NotionClient;
pub use pipeline::{validate_input, Phase, Pipeline, PipelineResult};
pub use publish::{AssetPublisher, NotionUploadPublisher, PublicHostPublisher};
pub use transport::{HttpTransport, ReqwestTransport};
