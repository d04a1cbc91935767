use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use handle_errors::Error;
use tracing::{info, warn};

const IMAGE_DIR: &str = "recipes/images";

/// Where uploaded recipe images live on disk and how they are addressed.
#[derive(Debug, Clone)]
pub struct Media {
    pub root: PathBuf,
    pub url: String,
}

impl Media {
    pub fn new(root: impl Into<PathBuf>, url: &str) -> Self {
        Media {
            root: root.into(),
            url: url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }

    /// Decodes a base64 data URL and writes it under `recipes/images/`.
    /// Returns the path relative to the media root.
    pub async fn save_image(&self, data_url: &str) -> Result<String, Error> {
        let (extension, bytes) = decode_data_url(data_url)?;
        let dir = self.root.join(IMAGE_DIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(Error::StdFileError)?;

        let file_name = format!("{}.{}", uuid::Uuid::new_v4().to_simple(), extension);
        tokio::fs::write(dir.join(&file_name), &bytes)
            .await
            .map_err(Error::StdFileError)?;

        let relative = format!("{}/{}", IMAGE_DIR, file_name);
        info!("Saved image {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }

    pub async fn remove(&self, path: &str) {
        if let Err(e) = tokio::fs::remove_file(self.root.join(path)).await {
            warn!("Could not remove image {}: {}", path, e);
        }
    }
}

/// Splits `data:image/<ext>;base64,<payload>` into an extension and bytes.
pub fn decode_data_url(data_url: &str) -> Result<(&'static str, Vec<u8>), Error> {
    let (header, payload) = data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or(Error::InvalidImage)?;
    let extension = match header
        .strip_prefix("image/")
        .and_then(|rest| rest.split(';').next())
    {
        Some("jpeg") | Some("jpg") => "jpg",
        Some("gif") => "gif",
        Some("webp") => "webp",
        Some("png") => "png",
        _ => {
            warn!("Image data URL has media type {:?}, storing as png", header);
            "png"
        }
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| Error::InvalidImage)?;
    if bytes.is_empty() {
        return Err(Error::InvalidImage);
    }
    Ok((extension, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_data_url() {
        let (ext, bytes) = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(ext, "png");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn picks_extension_from_mime_type() {
        let (ext, _) = decode_data_url("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(ext, "jpg");
        let (ext, _) = decode_data_url("data:application/octet-stream;base64,aGVsbG8=").unwrap();
        assert_eq!(ext, "png");
    }

    #[test]
    fn rejects_missing_header_and_bad_payload() {
        assert!(matches!(decode_data_url("aGVsbG8="), Err(Error::InvalidImage)));
        assert!(matches!(decode_data_url("foo,aGVsbG8="), Err(Error::InvalidImage)));
        assert!(matches!(
            decode_data_url("image/png;base64,aGVsbG8="),
            Err(Error::InvalidImage)
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,***"),
            Err(Error::InvalidImage)
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,"),
            Err(Error::InvalidImage)
        ));
    }

    #[test]
    fn builds_urls() {
        let media = Media::new("media", "http://localhost/media/");
        assert_eq!(
            media.url_for("recipes/images/a.png"),
            "http://localhost/media/recipes/images/a.png"
        );
    }

    #[tokio::test]
    async fn saves_and_removes_images() {
        let dir = tempfile::tempdir().unwrap();
        let media = Media::new(dir.path(), "http://localhost/media");
        let path = media
            .save_image("data:image/png;base64,aGVsbG8=")
            .await
            .unwrap();
        assert!(path.starts_with("recipes/images/"));
        assert!(path.ends_with(".png"));
        let stored = tokio::fs::read(dir.path().join(&path)).await.unwrap();
        assert_eq!(stored, b"hello");

        media.remove(&path).await;
        assert!(!dir.path().join(&path).exists());
    }
}
