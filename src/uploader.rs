use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use bytes::Bytes;
use reqwest::{multipart, Client};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::{
    compress::{jpeg_file_name, normalize_image, NormalizeOptions},
    error::ErrorBody,
    media::resolve_image_mime,
    models::{truncate_chars, AnalysisResult, Category, Language, MAX_REFLECTION_CHARS},
};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("a submission is already in progress")]
    Busy,
    #[error("nothing selected: add an image or write a reflection")]
    Empty,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("image task failed: {0}")]
    Task(String),
}

impl UploadError {
    /// The single failure message shown to the user, whatever went wrong.
    pub fn user_message(&self, language: Language) -> &'static str {
        match language {
            Language::Zh => "分析超时或失败。建议：请减少上传的图片数量，或尝试更稳定的网络。",
            Language::En => "Analysis timed out or failed. Hint: Try with fewer images or a more stable connection.",
        }
    }
}

/// Clears the in-flight flag however the submit future ends, including being dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Client-side form state: per-category selections, reflection and language.
pub struct Uploader {
    http: Client,
    endpoint: String,
    selections: BTreeMap<Category, Vec<SelectedImage>>,
    reflection: String,
    language: Language,
    normalize: NormalizeOptions,
    in_flight: AtomicBool,
}

impl Uploader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            selections: BTreeMap::new(),
            reflection: String::new(),
            language: Language::default(),
            normalize: NormalizeOptions::default(),
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn with_normalize(mut self, options: NormalizeOptions) -> Self {
        self.normalize = options;
        self
    }

    /// Appends to the category and truncates to its cap. Returns how many were dropped.
    pub fn add_images(&mut self, category: Category, incoming: impl IntoIterator<Item = SelectedImage>) -> usize {
        let current = self.selections.entry(category).or_default();
        let mut dropped = 0;
        for image in incoming {
            if current.len() < category.cap() {
                current.push(image);
            } else {
                dropped += 1;
            }
        }
        dropped
    }

    pub fn remove_image(&mut self, category: Category, index: usize) -> Option<SelectedImage> {
        let current = self.selections.get_mut(&category)?;
        (index < current.len()).then(|| current.remove(index))
    }

    pub fn selected(&self, category: Category) -> &[SelectedImage] {
        self.selections.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_reflection(&mut self, text: &str) {
        self.reflection = text.to_string();
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Normalizes every selected image concurrently, then sends one multipart request.
    pub async fn submit(&self) -> Result<AnalysisResult, UploadError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(UploadError::Busy);
        }
        let _guard = InFlightGuard(&self.in_flight);
        self.submit_inner().await
    }

    async fn submit_inner(&self) -> Result<AnalysisResult, UploadError> {
        let reflection = truncate_chars(self.reflection.trim(), MAX_REFLECTION_CHARS);
        let total: usize = self.selections.values().map(Vec::len).sum();
        if total == 0 && reflection.is_empty() {
            return Err(UploadError::Empty);
        }

        let mut form = multipart::Form::new();
        for (category, file_name, bytes, mime) in self.prepare_images().await? {
            let part = multipart::Part::bytes(bytes).file_name(file_name).mime_str(&mime)?;
            form = form.part(category.field_name(), part);
        }
        form = form.text("reflection", reflection).text("language", self.language.tag());

        info!("📤 Submitting {} image(s) to {}", total, self.endpoint);
        let response = self.http.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body).map(|b| b.error).unwrap_or(body);
            warn!("❌ Gateway answered {}: {}", status, message);
            return Err(UploadError::Rejected { status: status.as_u16(), message });
        }
        Ok(response.json::<AnalysisResult>().await?)
    }

    async fn prepare_images(&self) -> Result<Vec<(Category, String, Vec<u8>, String)>, UploadError> {
        let mut tasks = JoinSet::new();
        let mut index = 0usize;
        for category in Category::ALL {
            for image in self.selected(category) {
                let image = image.clone();
                let options = self.normalize;
                let slot = index;
                index += 1;
                tasks.spawn_blocking(move || {
                    let prepared = match normalize_image(&image.bytes, options) {
                        Ok(jpeg) => (jpeg_file_name(&image.file_name), jpeg, "image/jpeg".to_string()),
                        Err(e) => {
                            warn!("⚠️ Could not normalize {}: {}; sending original bytes", image.file_name, e);
                            let mime = resolve_image_mime(None, Some(&image.file_name));
                            (image.file_name, image.bytes.to_vec(), mime)
                        }
                    };
                    (slot, category, prepared)
                });
            }
        }

        let mut prepared = Vec::with_capacity(index);
        while let Some(joined) = tasks.join_next().await {
            let (slot, category, (name, bytes, mime)) = joined.map_err(|e| UploadError::Task(e.to_string()))?;
            prepared.push((slot, (category, name, bytes, mime)));
        }
        prepared.sort_by_key(|(slot, _)| *slot);
        Ok(prepared.into_iter().map(|(_, p)| p).collect())
    }
}
