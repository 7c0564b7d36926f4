use crate::error::ApiError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use uuid::Uuid;

/// Encoded data-URI ceiling, roughly 5MB decoded.
pub const MAX_ENCODED_LEN: usize = 7_000_000;

const IMAGE_FORMATS: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];

#[derive(Debug)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub format: &'static str,
}

/// Validates and decodes a `data:image/...;base64,` payload. Size is checked
/// on the encoded form, before any decode work.
pub fn parse_data_uri(data: &str) -> Result<ImagePayload, ApiError> {
    if data.len() > MAX_ENCODED_LEN {
        return Err(ApiError::Validation(
            "image is too large (max 5MB)".to_owned(),
        ));
    }

    for format in IMAGE_FORMATS {
        let prefix = format!("data:image/{};base64,", format);
        if let Some(encoded) = data.strip_prefix(prefix.as_str()) {
            let bytes = STANDARD.decode(encoded).map_err(|err| {
                log::warn!("image upload with undecodable base64: {}", err);
                ApiError::Validation("image payload is not valid base64".to_owned())
            })?;
            return Ok(ImagePayload { bytes, format });
        }
    }

    Err(ApiError::Validation(
        "unsupported image format".to_owned(),
    ))
}

/// Seam for the external object store. Handlers only ever see the returned
/// public URL.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, bytes: Vec<u8>, filename: &str) -> Result<String, ApiError>;
}

/// Stand-in store for environments without object storage credentials.
/// Accepts the bytes and issues a placeholder URL keyed by a random id.
pub struct PlaceholderStore;

#[async_trait]
impl ImageStore for PlaceholderStore {
    async fn store(&self, bytes: Vec<u8>, filename: &str) -> Result<String, ApiError> {
        let image_id = Uuid::new_v4().to_string();
        log::info!(
            "PlaceholderStore: store: {} ({} bytes) as {}",
            filename,
            bytes.len(),
            image_id
        );
        Ok(format!(
            "https://via.placeholder.com/600x400/4F46E5/FFFFFF?text=Image+{}",
            &image_id[..8]
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_supported_format() {
        for format in IMAGE_FORMATS {
            let uri = format!("data:image/{};base64,aGVsbG8=", format);
            let payload = parse_data_uri(&uri).unwrap();
            assert_eq!(payload.format, format);
            assert_eq!(payload.bytes, b"hello");
        }
    }

    #[test]
    fn rejects_unknown_mime_prefix() {
        let err = parse_data_uri("data:image/tiff;base64,aGVsbG8=").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = parse_data_uri("data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut uri = String::from("data:image/png;base64,");
        uri.push_str(&"A".repeat(MAX_ENCODED_LEN));
        let err = parse_data_uri(&uri).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn rejects_broken_base64() {
        let err = parse_data_uri("data:image/png;base64,@@@@").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[actix_rt::test]
    async fn placeholder_store_returns_a_url() {
        let url = PlaceholderStore
            .store(b"hello".to_vec(), "image.jpg")
            .await
            .unwrap();
        assert!(url.starts_with("https://"));
    }
}
