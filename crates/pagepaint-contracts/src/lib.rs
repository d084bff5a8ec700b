pub mod asset;
pub mod events;
pub mod media;
pub mod options;
pub mod tool;

pub use asset::{AssetReference, TargetAnchor};
pub use media::{extension_from_mime_type, GeneratedImage, MediaType};
pub use options::{AspectRatio, ImageOptions, ImageSize};
pub use tool::GenerateImageInput;
