use std::sync::Arc;

use tracing::info;

use crate::{
    config::Config,
    error::GatewayError,
    extract::{extract_json_object, validate_against_schema},
    media::{resolve_image_mime, to_data_uri},
    models::{AnalysisResult, ChatRequest, OutputSchema, UploadBundle},
    prompt::{build_system_prompt, build_user_text},
    provider::ChatProvider,
};

/// Per-request pipeline: encode images, build the prompt, call upstream, extract and validate.
pub struct Analyzer {
    provider: Arc<dyn ChatProvider>,
    schema: OutputSchema,
    max_images: usize,
    json_mode: bool,
}

impl Analyzer {
    pub fn new(provider: Arc<dyn ChatProvider>, config: &Config) -> Self {
        Self { provider, schema: config.schema.clone(), max_images: config.max_images, json_mode: config.json_mode }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn build_request(&self, bundle: &UploadBundle) -> ChatRequest {
        let images: Vec<String> = bundle
            .forwarded_images(self.max_images)
            .into_iter()
            .map(|img| to_data_uri(&resolve_image_mime(img.mime_type.as_deref(), img.file_name.as_deref()), &img.bytes))
            .collect();
        ChatRequest {
            system: build_system_prompt(&self.schema),
            user_text: build_user_text(&bundle.reflection, bundle.language, images.len()),
            images,
            json_mode: self.json_mode,
        }
    }

    pub async fn analyze(&self, bundle: UploadBundle) -> Result<AnalysisResult, GatewayError> {
        if bundle.is_empty() {
            return Err(GatewayError::Input("nothing to analyze: upload at least one image or write a reflection".into()));
        }

        let request = self.build_request(&bundle);
        info!(
            "🎯 Analyzing {} image(s) of {} received, reflection {} chars, language {}",
            request.images.len(),
            bundle.images.len(),
            bundle.reflection.chars().count(),
            bundle.language.tag()
        );
        drop(bundle);

        let content = self.provider.complete(&request).await?;
        let parsed = extract_json_object(&content)?;
        let result = validate_against_schema(parsed, &self.schema)?;
        info!("✅ Analysis produced {} fields", result.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ImageUpload, Language};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct Recording {
        reply: String,
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatProvider for Recording {
        async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }

        fn model(&self) -> &str {
            "recording"
        }
    }

    fn analyzer(reply: &str) -> (Arc<Recording>, Analyzer) {
        let provider = Arc::new(Recording { reply: reply.to_string(), seen: Mutex::new(Vec::new()) });
        let analyzer = Analyzer::new(provider.clone(), &Config::default());
        (provider, analyzer)
    }

    fn full_reply() -> &'static str {
        r#"{"analysis":"a","celebrity":"c","talent":"t","advice":"d"}"#
    }

    #[tokio::test]
    async fn empty_bundle_never_reaches_upstream() {
        let (provider, analyzer) = analyzer(full_reply());
        let err = analyzer.analyze(UploadBundle::new("  ", Language::Zh)).await.unwrap_err();
        assert_eq!(err.kind(), "input");
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn images_are_capped_and_encoded_as_image_data_uris() {
        let (provider, analyzer) = analyzer(full_reply());
        let mut bundle = UploadBundle::new("", Language::En);
        for category in Category::ALL {
            for _ in 0..5 {
                bundle.push_image(ImageUpload {
                    category,
                    bytes: Bytes::from_static(b"\xff\xd8\xff"),
                    mime_type: Some("application/octet-stream".into()),
                    file_name: Some("blob".into()),
                });
            }
        }
        let result = analyzer.analyze(bundle).await.unwrap();
        assert_eq!(result.len(), 4);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].images.len(), 4);
        assert!(seen[0].images.iter().all(|uri| uri.starts_with("data:image/jpeg;base64,")));
        assert!(seen[0].json_mode);
    }

    #[tokio::test]
    async fn reply_missing_a_key_is_a_format_error() {
        let (_, analyzer) = analyzer(r#"{"analysis":"a"}"#);
        let err = analyzer.analyze(UploadBundle::new("hi", Language::Zh)).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_format");
    }
}
