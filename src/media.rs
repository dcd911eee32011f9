use base64::{engine::general_purpose::STANDARD, Engine};

/// Used whenever neither the declared type nor the extension names an image.
pub const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

/// Picks the MIME hint sent upstream. Providers reject non-image hints for
/// image content, so the result always starts with `image/`.
pub fn resolve_image_mime(declared: Option<&str>, file_name: Option<&str>) -> String {
    if let Some(declared) = declared.map(|d| d.split(';').next().unwrap_or(d).trim().to_ascii_lowercase()) {
        if declared.starts_with("image/") && declared.len() > "image/".len() {
            return declared;
        }
    }
    file_name
        .and_then(|name| mime_guess::from_path(name).first())
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_IMAGE_MIME.to_string())
}

pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Splits a base64 data URI back into its MIME type and raw bytes.
pub fn from_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), bytes))
}

/// Shortens long base64 payloads so request bodies can be logged.
pub fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (_, val) in map.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        serde_json::Value::String(s) => {
            if s.starts_with("data:") && s.len() > 100 {
                *s = format!("{}...[truncated {} chars]", &s[..50], s.len() - 50);
            }
        }
        _ => {}
    }
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}
