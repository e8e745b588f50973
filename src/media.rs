use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use uuid::Uuid;

use crate::{
    constants::{IMAGE_EXTENSIONS, RECIPE_IMAGE_DIR},
    error::{ApiError, FieldErrors},
};

/// A decoded inline image, not yet written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

impl ImageUpload {
    /// Accepts `data:image/<type>;base64,<data>` or bare base64 (stored as png).
    pub fn decode(value: &str) -> Result<Self, ApiError> {
        let invalid = || ApiError::Validation(FieldErrors::single("image", "Invalid image data."));

        let (extension, data) = match value.trim().strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest.split_once(',').ok_or_else(invalid)?;
                let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;
                let extension = IMAGE_EXTENSIONS
                    .iter()
                    .find_map(|(m, ext)| (*m == mime).then_some(*ext))
                    .ok_or_else(|| {
                        ApiError::Validation(FieldErrors::single(
                            "image",
                            "Unsupported image type.",
                        ))
                    })?;
                (extension, data)
            }
            None => ("png", value.trim()),
        };

        let bytes = STANDARD.decode(data).map_err(|_| invalid())?;
        if bytes.is_empty() {
            return Err(invalid());
        }

        Ok(Self { bytes, extension })
    }
}

/// Stores uploaded images on disk and maps them to public URLs.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    base_url: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        Self {
            root: root.into(),
            base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the image and returns its path relative to the media root.
    pub async fn store(&self, image: &ImageUpload) -> Result<String, ApiError> {
        let relative = format!(
            "{RECIPE_IMAGE_DIR}/{}.{}",
            Uuid::new_v4().simple(),
            image.extension
        );
        let dir = self.root.join(RECIPE_IMAGE_DIR);

        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            log::error!("Failed to create media dir {}: {e}", dir.display());
            ApiError::Store(format!("{e}"))
        })?;

        let path = self.root.join(&relative);
        tokio::fs::write(&path, &image.bytes).await.map_err(|e| {
            log::error!("Failed to write image {}: {e}", path.display());
            ApiError::Store(format!("{e}"))
        })?;

        log::debug!("Stored image {relative} ({} bytes)", image.bytes.len());
        Ok(relative)
    }

    /// Best-effort delete; failures are only logged.
    pub async fn remove(&self, relative: &str) {
        let Some(path) = self.resolve(relative) else {
            log::warn!("Refusing to remove image outside the media root: {relative}");
            return;
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::warn!("Failed to remove image {}: {e}", path.display());
        }
    }

    pub fn url(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative)
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        is_plain.then(|| self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent png
    pub const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_data_url() {
        let image = ImageUpload::decode(&format!("data:image/jpeg;base64,{PIXEL}")).unwrap();
        assert_eq!(image.extension, "jpg");
        assert!(image.bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn bare_base64_defaults_to_png() {
        assert_eq!(ImageUpload::decode(PIXEL).unwrap().extension, "png");
    }

    #[test]
    fn rejects_garbage() {
        for value in ["data:image/png;base64,@@@", "data:text/plain;base64,aGk=", "", "data:image/png,abc"] {
            assert!(matches!(
                ImageUpload::decode(value),
                Err(ApiError::Validation(errors)) if errors.contains("image")
            ));
        }
    }

    #[test]
    fn urls_and_paths() {
        let media = MediaStore::new("/srv/media", "/media");
        assert_eq!(media.url("recipes/a.png"), "/media/recipes/a.png");
        assert!(media.resolve("../etc/passwd").is_none());
        assert_eq!(
            media.resolve("recipes/a.png"),
            Some(PathBuf::from("/srv/media/recipes/a.png"))
        );
    }

    #[tokio::test]
    async fn store_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path(), "/media/");
        let image = ImageUpload::decode(PIXEL).unwrap();

        let relative = media.store(&image).await.unwrap();
        assert!(relative.starts_with("recipes/"));
        assert!(dir.path().join(&relative).exists());

        media.remove(&relative).await;
        assert!(!dir.path().join(&relative).exists());
    }
}
