#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use soul_observer::{
    analyzer::Analyzer,
    config::Config,
    error::GatewayError,
    models::ChatRequest,
    provider::ChatProvider,
    routes::{app, AppState},
};

pub const BOUNDARY: &str = "soulobserverboundary";

/// Provider double that records every request and answers with a canned reply.
pub struct FakeProvider {
    reply: Mutex<Option<Result<String, GatewayError>>>,
    pub seen: Mutex<Vec<ChatRequest>>,
}

impl FakeProvider {
    pub fn replying(reply: Result<String, GatewayError>) -> Arc<Self> {
        Arc::new(Self { reply: Mutex::new(Some(reply)), seen: Mutex::new(Vec::new()) })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatProvider for FakeProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        self.seen.lock().unwrap().push(request.clone());
        self.reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(GatewayError::Unexpected("fake provider called twice".into())))
    }

    fn model(&self) -> &str {
        "fake-vision"
    }
}

pub fn full_reply() -> String {
    r#"{"analysis":"三个细节","celebrity":"楼下便利店老板","talent":"记路","advice":"早点睡"}"#.to_string()
}

pub fn router(provider: Arc<FakeProvider>) -> axum::Router {
    let config = Config::default();
    let state = AppState { analyzer: Arc::new(Analyzer::new(provider, &config)) };
    app(state, config.max_body_bytes)
}

pub enum FormPart<'a> {
    Text(&'a str, &'a str),
    File { field: &'a str, file_name: &'a str, content_type: &'a str, data: &'a [u8] },
}

pub fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::Text(name, value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File { field, file_name, content_type, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
