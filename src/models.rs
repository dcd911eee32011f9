use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hard limit on the reflection text, counted in characters.
pub const MAX_REFLECTION_CHARS: usize = 2000;

/// Upload categories, in the order their images are forwarded upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Moments,
    Playlist,
    Snaps,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Moments, Category::Playlist, Category::Snaps];

    /// Multipart field name carrying files of this category.
    pub fn field_name(self) -> &'static str {
        match self {
            Category::Moments => "moments",
            Category::Playlist => "playlist",
            Category::Snaps => "snaps",
        }
    }

    pub fn cap(self) -> usize {
        match self {
            Category::Moments => 4,
            Category::Playlist => 2,
            Category::Snaps => 2,
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.field_name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Zh,
    En,
}

impl Language {
    /// Lenient parse: only `en` selects English, everything else falls back to Chinese.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("en") { Language::En } else { Language::Zh }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub category: Category,
    pub bytes: Bytes,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
}

/// One user submission. Built once per request and consumed by the analyzer.
#[derive(Debug, Clone, Default)]
pub struct UploadBundle {
    pub images: Vec<ImageUpload>,
    pub reflection: String,
    pub language: Language,
}

impl UploadBundle {
    pub fn new(reflection: &str, language: Language) -> Self {
        Self { images: Vec::new(), reflection: truncate_chars(reflection, MAX_REFLECTION_CHARS), language }
    }

    /// Appends an image unless its category is already full. Returns whether it was kept.
    pub fn push_image(&mut self, image: ImageUpload) -> bool {
        if self.count(image.category) >= image.category.cap() {
            return false;
        }
        self.images.push(image);
        true
    }

    pub fn count(&self, category: Category) -> usize {
        self.images.iter().filter(|i| i.category == category).count()
    }

    pub fn has_reflection(&self) -> bool {
        !self.reflection.trim().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && !self.has_reflection()
    }

    /// Images in category order, cut to `max_total`.
    pub fn forwarded_images(&self, max_total: usize) -> Vec<&ImageUpload> {
        Category::ALL
            .iter()
            .flat_map(|c| self.images.iter().filter(move |i| i.category == *c))
            .take(max_total)
            .collect()
    }
}

/// One key of the structured answer the model must produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    pub key: String,
    pub target_length: u32,
    pub directive: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub fields: Vec<OutputField>,
}

impl Default for OutputSchema {
    fn default() -> Self {
        let field = |key: &str, target_length: u32, directive: &str| OutputField {
            key: key.to_string(),
            target_length,
            directive: directive.to_string(),
        };
        Self {
            fields: vec![
                field("analysis", 350, "a reading grounded in at least three concrete visual details you actually saw (colors, objects, text, composition), the tension between them, and the counter-intuitive trait it reveals"),
                field("celebrity", 100, "one specific, non-celebrity comparator figure (a corner-shop owner, a former teacher) and the traits you share"),
                field("talent", 70, "one hidden ability unrelated to communication or self-expression"),
                field("advice", 50, "one concrete, actionable piece of everyday advice; never 'express yourself more'"),
            ],
        }
    }
}

impl OutputSchema {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }
}

/// Structured answer returned to the caller: exactly the schema keys, string values.
pub type AnalysisResult = Map<String, Value>;

/// Provider-neutral chat request handed to the upstream client.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user_text: String,
    pub images: Vec<String>,
    pub json_mode: bool,
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
