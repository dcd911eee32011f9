use axum::extract::Multipart;
use bytes::Bytes;
use tracing::debug;

use crate::{
    error::GatewayError,
    models::{Category, ImageUpload, Language, UploadBundle},
};

/// One multipart part after it has been read off the wire.
#[derive(Debug, Clone)]
pub struct RawPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

pub async fn read_multipart(mut multipart: Multipart) -> Result<UploadBundle, GatewayError> {
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::Input(format!("malformed multipart body: {}", e.body_text())))?
    {
        let Some(name) = field.name().map(str::to_string) else { continue };
        if name != "reflection" && name != "language" && Category::from_field_name(&name).is_none() {
            debug!("Ignoring unrecognized form field {name}");
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| GatewayError::Input(format!("failed to read field {name}: {}", e.body_text())))?;
        parts.push(RawPart { name, file_name, content_type, data });
    }
    Ok(bundle_from_parts(parts))
}

/// Text fields use their first occurrence. File fields keep arrival order
/// within a category and are truncated to the category cap.
pub fn bundle_from_parts(parts: impl IntoIterator<Item = RawPart>) -> UploadBundle {
    let parts: Vec<RawPart> = parts.into_iter().collect();
    let text = |field: &str| {
        parts
            .iter()
            .find(|p| p.name == field && p.file_name.is_none())
            .map(|p| String::from_utf8_lossy(&p.data).into_owned())
    };
    let language = text("language").map(|t| Language::from_tag(&t)).unwrap_or_default();
    let mut bundle = UploadBundle::new(&text("reflection").unwrap_or_default(), language);

    let mut dropped = 0;
    for part in parts.iter() {
        let Some(category) = Category::from_field_name(&part.name) else { continue };
        if part.file_name.is_none() || part.data.is_empty() {
            continue;
        }
        let kept = bundle.push_image(ImageUpload {
            category,
            bytes: part.data.clone(),
            mime_type: part.content_type.clone(),
            file_name: part.file_name.clone(),
        });
        if !kept {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!("Dropped {dropped} image(s) over their category cap");
    }
    bundle
}
