use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::NotionSettings;
use crate::error::TransportError;
use crate::transport::{HttpReply, HttpRequest, HttpTransport, MultipartFile, RequestBody};

/// Thin client for the three destination endpoints the pipeline touches.
/// Replies are returned raw; callers decide what counts as failure.
#[derive(Clone)]
pub struct NotionClient {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    api_key: Option<String>,
    version: String,
}

impl NotionClient {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &NotionSettings) -> Self {
        Self {
            transport,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            version: settings.version.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn authorized(&self, request: HttpRequest) -> Result<HttpRequest, TransportError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TransportError::new("NOTION_API_KEY is not configured."))?;
        Ok(request
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Notion-Version", self.version.as_str()))
    }

    /// `POST /file_uploads` opening a single-part upload session.
    pub fn create_file_upload(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<HttpReply, TransportError> {
        let url = format!("{}/file_uploads", self.api_base);
        let request = HttpRequest::post(
            url,
            RequestBody::Json(json!({
                "filename": file_name,
                "content_type": content_type,
                "mode": "single_part",
            })),
        );
        self.transport.send(self.authorized(request)?)
    }

    /// Sends the bytes to the `upload_url` returned by the create call.
    pub fn send_file_upload(
        &self,
        upload_url: &str,
        file: MultipartFile,
    ) -> Result<HttpReply, TransportError> {
        let request = HttpRequest::post(upload_url, RequestBody::Multipart(file));
        self.transport.send(self.authorized(request)?)
    }

    /// Appends `children` under `block_id` (a page id is a valid block id).
    pub fn append_block_children(
        &self,
        block_id: &str,
        children: Vec<Value>,
    ) -> Result<HttpReply, TransportError> {
        let url = format!("{}/blocks/{}/children", self.api_base, block_id.trim());
        let request = HttpRequest::patch(url, RequestBody::Json(json!({ "children": children })));
        self.transport.send(self.authorized(request)?)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::*;
    use crate::test_support::FakeTransport;

    fn settings(api_key: Option<&str>) -> NotionSettings {
        NotionSettings {
            api_base: "https://notion.test/v1/".to_string(),
            api_key: api_key.map(str::to_string),
            version: "2022-06-28".to_string(),
        }
    }

    #[test]
    fn every_call_carries_bearer_and_version_headers() -> anyhow::Result<()> {
        let transport = Arc::new(FakeTransport::new());
        let client = NotionClient::new(transport.clone(), &settings(Some("secret_x")));
        client.create_file_upload("a.png", "image/png")?;
        client.send_file_upload(
            "https://notion.test/v1/file_uploads/fu_1/send",
            MultipartFile {
                field: "file".to_string(),
                file_name: "a.png".to_string(),
                mime_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            },
        )?;
        client.append_block_children("P1", vec![json!({"type": "divider", "divider": {}})])?;

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        for request in &requests {
            assert_eq!(request.header_value("Authorization"), Some("Bearer secret_x"));
            assert_eq!(request.header_value("Notion-Version"), Some("2022-06-28"));
        }
        assert_eq!(requests[0].url, "https://notion.test/v1/file_uploads");
        assert_eq!(requests[0].method, Method::POST);
        let RequestBody::Json(create) = &requests[0].body else {
            panic!("expected JSON body");
        };
        assert_eq!(
            create,
            &json!({"filename": "a.png", "content_type": "image/png", "mode": "single_part"})
        );
        assert!(matches!(requests[1].body, RequestBody::Multipart(_)));
        assert_eq!(requests[2].url, "https://notion.test/v1/blocks/P1/children");
        assert_eq!(requests[2].method, Method::PATCH);
        Ok(())
    }

    #[test]
    fn unconfigured_client_sends_nothing() {
        let transport = Arc::new(FakeTransport::new());
        let client = NotionClient::new(transport.clone(), &settings(None));
        assert!(!client.is_configured());
        let err = client.create_file_upload("a.png", "image/png").unwrap_err();
        assert!(err.to_string().contains("not configured"));
        assert!(transport.requests().is_empty());
    }
}
