use pagepaint_contracts::{AssetReference, TargetAnchor};
use serde_json::{json, Value};

use crate::error::PipelineError;
use crate::notion::NotionClient;
use crate::transport::truncate_text;

pub const CAPTION_PREFIX: &str = "Expanded Prompt: ";
/// Per-item content limit for destination rich text.
pub const RICH_TEXT_MAX_CHARS: usize = 2000;

pub fn image_block(asset: &AssetReference) -> Value {
    let image = match asset {
        AssetReference::UploadId { id } => json!({
            "type": "file_upload",
            "file_upload": { "id": id },
        }),
        AssetReference::ExternalUrl { url } => json!({
            "type": "external",
            "external": { "url": url },
        }),
    };
    json!({
        "object": "block",
        "type": "image",
        "image": image,
    })
}

pub fn caption_block(caption: &str) -> Value {
    let text = format!("{CAPTION_PREFIX}{caption}");
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": {
            "rich_text": rich_text_chunks(&text, RICH_TEXT_MAX_CHARS),
        },
    })
}

/// Splits `text` into consecutive rich-text items of at most `max_chars` characters.
pub fn rich_text_chunks(text: &str, max_chars: usize) -> Vec<Value> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![text_item("")];
    }
    chars
        .chunks(max_chars)
        .map(|chunk| text_item(&chunk.iter().collect::<String>()))
        .collect()
}

fn text_item(content: &str) -> Value {
    json!({
        "type": "text",
        "text": { "content": content },
    })
}

/// Appends the image and its caption under an anchor in one request.
pub struct BlockComposer {
    notion: NotionClient,
}

impl BlockComposer {
    pub fn new(notion: NotionClient) -> Self {
        Self { notion }
    }

    pub fn is_configured(&self) -> bool {
        self.notion.is_configured()
    }

    pub fn children(asset: &AssetReference, caption: &str) -> Vec<Value> {
        vec![image_block(asset), caption_block(caption)]
    }

    pub fn compose(
        &self,
        anchor: &TargetAnchor,
        asset: &AssetReference,
        caption: &str,
    ) -> Result<(), PipelineError> {
        let reply = self
            .notion
            .append_block_children(anchor.append_target(), Self::children(asset, caption))
            .map_err(|err| PipelineError::Compose {
                status: None,
                detail: err.to_string(),
            })?;
        if !reply.is_success() {
            return Err(PipelineError::Compose {
                status: Some(reply.status),
                detail: truncate_text(&reply.body, 512),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::NotionSettings;
    use crate::test_support::FakeTransport;
    use crate::transport::RequestBody;

    use super::*;

    fn composer(transport: Arc<FakeTransport>) -> BlockComposer {
        BlockComposer::new(NotionClient::new(
            transport,
            &NotionSettings {
                api_base: "https://notion.test/v1".to_string(),
                api_key: Some("secret_x".to_string()),
                version: "2022-06-28".to_string(),
            },
        ))
    }

    fn caption_text(block: &Value) -> String {
        block["paragraph"]["rich_text"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["text"]["content"].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn image_block_shape_follows_asset_kind() {
        let native = image_block(&AssetReference::UploadId {
            id: "fu_1".to_string(),
        });
        assert_eq!(
            native["image"],
            json!({"type": "file_upload", "file_upload": {"id": "fu_1"}})
        );
        let external = image_block(&AssetReference::ExternalUrl {
            url: "https://img.test/a.png".to_string(),
        });
        assert_eq!(
            external["image"],
            json!({"type": "external", "external": {"url": "https://img.test/a.png"}})
        );
        assert_eq!(external["type"], json!("image"));
    }

    #[test]
    fn caption_is_prefixed_paragraph() {
        let block = caption_block("A tabby cat");
        assert_eq!(block["type"], json!("paragraph"));
        assert_eq!(caption_text(&block), "Expanded Prompt: A tabby cat");
        assert_eq!(block["paragraph"]["rich_text"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn long_captions_split_without_losing_text() {
        let caption = "é".repeat(4500);
        let block = caption_block(&caption);
        let items = block["paragraph"]["rich_text"].as_array().cloned().unwrap_or_default();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| {
            item["text"]["content"]
                .as_str()
                .map(|text| text.chars().count() <= RICH_TEXT_MAX_CHARS)
                .unwrap_or(false)
        }));
        assert_eq!(caption_text(&block), format!("{CAPTION_PREFIX}{caption}"));
    }

    #[test]
    fn compose_appends_both_blocks_in_order_under_anchor() -> anyhow::Result<()> {
        let transport = Arc::new(FakeTransport::new().respond("/children", 200, json!({"results": []})));
        let asset = AssetReference::UploadId {
            id: "fu_1".to_string(),
        };
        composer(transport.clone()).compose(
            &TargetAnchor::new("P1", Some("B2".to_string())),
            &asset,
            "caption",
        )?;

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://notion.test/v1/blocks/B2/children");
        let RequestBody::Json(body) = &requests[0].body else {
            panic!("expected JSON body");
        };
        let children = body["children"].as_array().cloned().unwrap_or_default();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0]["type"], json!("image"));
        assert_eq!(children[1]["type"], json!("paragraph"));
        Ok(())
    }

    #[test]
    fn rejected_batch_reports_status() {
        let transport = Arc::new(FakeTransport::new().respond(
            "/children",
            404,
            json!({"code": "object_not_found"}),
        ));
        let err = composer(transport)
            .compose(
                &TargetAnchor::new("P1", None),
                &AssetReference::ExternalUrl {
                    url: "https://img.test/a.png".to_string(),
                },
                "caption",
            )
            .unwrap_err();
        assert_eq!(err.kind(), "compose");
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("object_not_found"));
    }
}
