//! Photo encoding for the model request: raw image bytes in,
//! `data:<mime>;base64,<data>` out, and the reverse for providers that
//! need the MIME type and payload separately.

use base64::{engine::general_purpose, Engine as _};
use std::path::Path;

use super::interface::IdentifyError;

/// Maximum photo size: 5 MB
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Detect image MIME type from magic bytes.
pub fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    if bytes.starts_with(b"\x89PNG") {
        Some("image/png")
    } else if bytes.starts_with(b"\xFF\xD8\xFF") {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.starts_with(b"RIFF") && bytes.len() > 11 && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

pub fn encode_image_bytes(bytes: &[u8]) -> Result<String, IdentifyError> {
    if bytes.is_empty() {
        return Err(IdentifyError::invalid("Image is empty"));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(IdentifyError::invalid(format!(
            "Image too large: {} bytes (max {})",
            bytes.len(),
            MAX_IMAGE_SIZE
        )));
    }
    let mime = detect_image_mime(bytes)
        .ok_or_else(|| IdentifyError::invalid("Invalid image file: unrecognized format"))?;

    Ok(format!(
        "data:{};base64,{}",
        mime,
        general_purpose::STANDARD.encode(bytes)
    ))
}

/// Read an image from disk and encode it.
pub async fn load_image_file(path: &Path) -> Result<String, IdentifyError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        IdentifyError::invalid(format!("Failed to read {}: {}", path.display(), e))
    })?;
    tracing::debug!("[Identify] Read {} bytes from {}", bytes.len(), path.display());
    encode_image_bytes(&bytes)
}

/// A parsed `data:` URI. `data` stays base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

pub fn parse_data_uri(uri: &str) -> Result<DataUri<'_>, IdentifyError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| IdentifyError::invalid("Photo must be a data URI"))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| IdentifyError::invalid("Data URI has no payload"))?;
    let mime_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| IdentifyError::invalid("Data URI must use base64 encoding"))?;

    if !mime_type.starts_with("image/") {
        return Err(IdentifyError::invalid(format!(
            "Unsupported media type: {}",
            mime_type
        )));
    }
    if data.is_empty() {
        return Err(IdentifyError::invalid("Data URI has no payload"));
    }

    Ok(DataUri { mime_type, data })
}
