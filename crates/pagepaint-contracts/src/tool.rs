use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::options::{AspectRatio, ImageSize};

pub const TOOL_NAME: &str = "generateNanoBananaImage";
pub const TOOL_TITLE: &str = "Generate Nano Banana Image";
pub const TOOL_DESCRIPTION: &str = "Generate and insert an image into Notion. Always pass page_id. \
If the user asks for a specific section/position, also pass target_block_id so the image is \
inserted under that block. Uses Notion file_upload for native embedding.";

/// Input accepted by the image tool. Enumerated fields stay raw strings here and
/// are validated by the pipeline before any network call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateImageInput {
    pub short_description: String,
    pub page_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
}

impl GenerateImageInput {
    pub fn new(short_description: impl Into<String>, page_id: impl Into<String>) -> Self {
        Self {
            short_description: short_description.into(),
            page_id: page_id.into(),
            ..Self::default()
        }
    }
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "short_description": {
                "type": "string",
                "description": "A short, simple description of the desired image. e.g. 'A cute cat reading a book'",
            },
            "page_id": {
                "type": "string",
                "description": "The Notion Page ID where the image should be embedded. Note: The Notion Integration must be invited to this page.",
            },
            "target_block_id": {
                "type": "string",
                "description": "Optional Notion block ID to control placement. If provided, image and prompt are inserted under this block. If omitted, they are appended to the page root.",
            },
            "aspect_ratio": {
                "type": "string",
                "enum": AspectRatio::ALL.map(AspectRatio::as_str),
                "description": "Optional image aspect ratio. Let the agent choose based on user intent (e.g. portrait uses 9:16, landscape uses 16:9).",
            },
            "image_size": {
                "type": "string",
                "enum": ImageSize::ALL.map(ImageSize::as_str),
                "description": "Optional output resolution tier. 1K is fastest/cheapest, 2K for higher detail, 4K for maximum detail when needed.",
            },
        },
        "required": ["short_description", "page_id"],
        "additionalProperties": false,
    })
}

/// Registration payload for the invoking tool runtime.
pub fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "title": TOOL_TITLE,
        "description": TOOL_DESCRIPTION,
        "schema": input_schema(),
        "output": {"type": "string"},
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_enumerations_and_required_fields() {
        let schema = input_schema();
        assert_eq!(schema["required"], json!(["short_description", "page_id"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(
            schema["properties"]["aspect_ratio"]["enum"],
            json!(["1:1", "2:3", "3:2", "3:4", "4:3", "9:16", "16:9", "21:9"])
        );
        assert_eq!(
            schema["properties"]["image_size"]["enum"],
            json!(["1K", "2K", "4K"])
        );
        assert_eq!(tool_definition()["name"], json!(TOOL_NAME));
    }

    #[test]
    fn input_rejects_unknown_fields() {
        let parsed: Result<GenerateImageInput, _> = serde_json::from_value(json!({
            "short_description": "cat",
            "page_id": "P1",
            "colour": "red",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn input_optional_fields_default_to_none() -> anyhow::Result<()> {
        let parsed: GenerateImageInput = serde_json::from_value(json!({
            "short_description": "A cute cat reading a book",
            "page_id": "P1",
            "aspect_ratio": "16:9",
        }))?;
        assert_eq!(parsed.target_block_id, None);
        assert_eq!(parsed.aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(parsed.image_size, None);
        Ok(())
    }
}
