use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pagepaint_contracts::ImageOptions;
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::gemini::{GenerativeService, ImageGenerationRequest, TextGenerationRequest};
use crate::transport::{HttpReply, HttpRequest, HttpTransport};

#[derive(Clone)]
enum Outcome {
    Reply(HttpReply),
    Fail(TransportError),
}

struct Route {
    url_suffix: String,
    outcomes: VecDeque<Outcome>,
}

/// Records every request and answers by URL suffix; the longest matching
/// suffix wins. Several outcomes for one suffix are served in order and the
/// last one repeats. Unrouted URLs get a 404.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(mut self, url_suffix: &str, outcome: Outcome) -> Self {
        let routes = self.routes.get_mut().expect("routes lock");
        match routes.iter_mut().find(|route| route.url_suffix == url_suffix) {
            Some(route) => route.outcomes.push_back(outcome),
            None => routes.push(Route {
                url_suffix: url_suffix.to_string(),
                outcomes: VecDeque::from([outcome]),
            }),
        }
        self
    }

    pub(crate) fn respond(self, url_suffix: &str, status: u16, body: Value) -> Self {
        self.respond_text(url_suffix, status, &body.to_string())
    }

    pub(crate) fn respond_text(self, url_suffix: &str, status: u16, body: &str) -> Self {
        self.push(
            url_suffix,
            Outcome::Reply(HttpReply {
                status,
                body: body.to_string(),
            }),
        )
    }

    pub(crate) fn fail(self, url_suffix: &str, message: &str) -> Self {
        self.push(url_suffix, Outcome::Fail(TransportError::new(message)))
    }

    pub(crate) fn fail_retryable(self, url_suffix: &str, message: &str) -> Self {
        self.push(url_suffix, Outcome::Fail(TransportError::retryable(message)))
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn calls_to(&self, url_suffix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.url.ends_with(url_suffix))
            .count()
    }
}

impl HttpTransport for FakeTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let url = request.url.clone();
        self.requests.lock().expect("requests lock").push(request);

        let mut routes = self.routes.lock().expect("routes lock");
        let Some(route) = routes
            .iter_mut()
            .filter(|route| url.ends_with(&route.url_suffix))
            .max_by_key(|route| route.url_suffix.len())
        else {
            return Ok(HttpReply {
                status: 404,
                body: json!({"message": format!("no route for {url}")}).to_string(),
            });
        };
        let outcome = if route.outcomes.len() > 1 {
            route.outcomes.pop_front()
        } else {
            route.outcomes.front().cloned()
        };
        match outcome {
            Some(Outcome::Reply(reply)) => Ok(reply),
            Some(Outcome::Fail(err)) => Err(err),
            None => Ok(HttpReply {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedText {
    pub model: String,
    pub system_instruction: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedImage {
    pub model: String,
    pub contents: String,
    pub options: ImageOptions,
}

/// Generative service returning canned results.
pub(crate) struct ScriptedService {
    text: Option<String>,
    image: Value,
    text_requests: Mutex<Vec<RecordedText>>,
    image_requests: Mutex<Vec<RecordedImage>>,
}

impl ScriptedService {
    pub(crate) fn new(text: Option<&str>, image: Value) -> Self {
        Self {
            text: text.map(str::to_string),
            image,
            text_requests: Mutex::new(Vec::new()),
            image_requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn text(text: Option<&str>) -> Self {
        Self::new(text, json!({}))
    }

    pub(crate) fn image(payload: Value) -> Self {
        Self::new(None, payload)
    }

    pub(crate) fn text_requests(&self) -> Vec<RecordedText> {
        self.text_requests.lock().expect("text lock").clone()
    }

    pub(crate) fn image_requests(&self) -> Vec<RecordedImage> {
        self.image_requests.lock().expect("image lock").clone()
    }
}

impl GenerativeService for ScriptedService {
    fn generate_text(&self, request: &TextGenerationRequest<'_>) -> Result<Option<String>> {
        self.text_requests.lock().expect("text lock").push(RecordedText {
            model: request.model.to_string(),
            system_instruction: request.system_instruction.to_string(),
            contents: request.contents.to_string(),
        });
        Ok(self.text.clone())
    }

    fn generate_image(&self, request: &ImageGenerationRequest<'_>) -> Result<Value> {
        self.image_requests.lock().expect("image lock").push(RecordedImage {
            model: request.model.to_string(),
            contents: request.contents.to_string(),
            options: request.options,
        });
        Ok(self.image.clone())
    }
}

pub(crate) fn gemini_text_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP",
        }]
    })
}

pub(crate) fn gemini_image_response(bytes: &[u8], mime_type: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [
                {"inlineData": {"mimeType": mime_type, "data": BASE64.encode(bytes)}},
            ]},
            "finishReason": "STOP",
        }]
    })
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::*;
    use crate::transport::RequestBody;

    fn patch(url: &str) -> HttpRequest {
        HttpRequest {
            method: Method::PATCH,
            ..HttpRequest::post(url, RequestBody::Json(json!({})))
        }
    }

    #[test]
    fn most_specific_suffix_answers_regardless_of_registration_order() -> Result<()> {
        let transport = FakeTransport::new()
            .respond("/children", 200, json!({"results": []}))
            .respond("/blocks/P1/children", 400, json!({"code": "validation_error"}));

        let specific = transport.send(patch("https://notion.test/v1/blocks/P1/children"))?;
        assert_eq!(specific.status, 400);
        let generic = transport.send(patch("https://notion.test/v1/blocks/B9/children"))?;
        assert_eq!(generic.status, 200);
        let unrouted = transport.send(patch("https://notion.test/v1/pages/P1"))?;
        assert_eq!(unrouted.status, 404);
        assert_eq!(transport.calls_to("/children"), 2);
        Ok(())
    }

    #[test]
    fn queued_outcomes_drain_then_last_repeats() -> Result<()> {
        let transport = FakeTransport::new()
            .fail_retryable("/x", "connect timed out")
            .respond("/x", 200, json!({}));
        assert!(transport.send(patch("https://h.test/x")).is_err());
        assert_eq!(transport.send(patch("https://h.test/x"))?.status, 200);
        assert_eq!(transport.send(patch("https://h.test/x"))?.status, 200);
        Ok(())
    }
}
