use actix_web::web;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const IMAGE_BUCKET: &str = "post-thumbnails";

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blocking task error: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error("{0}")]
    Invalid(String),
}

impl From<actix_multipart::MultipartError> for MediaError {
    fn from(e: actix_multipart::MultipartError) -> Self {
        MediaError::Multipart(e.to_string())
    }
}

/// A file received in a multipart form, held in memory until it is stored.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub content_type: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Set when the stream went past the caller's file limit; the excess was discarded.
    pub exceeds_limit: bool,
}

/// Maps a validated MIME type to the extension written to disk.
fn mime_to_safe_extension(mime_type: &str) -> Option<&'static str> {
    let map: BTreeMap<&str, &str> = [
        ("image/avif", "avif"),
        ("image/gif", "gif"),
        ("image/jpeg", "jpg"),
        ("image/png", "png"),
        ("image/webp", "webp"),
    ]
    .iter()
    .cloned()
    .collect();

    map.get(mime_type).cloned()
}

/// Upload checks in the order the user sees them.
pub fn validate_image(image: &UploadedImage) -> Result<&'static str, String> {
    if !image.content_type.starts_with("image/") {
        return Err("Please select an image file".to_string());
    }
    if image.exceeds_limit || image.bytes.len() > MAX_IMAGE_BYTES {
        return Err("Image must be less than 5MB".to_string());
    }
    mime_to_safe_extension(&image.content_type)
        .ok_or_else(|| format!("Unsupported image type '{}'", image.content_type))
}

/// Relative location `<bucket>/<xx>/<yy>/<uuid>.<ext>` for a new object.
fn object_path(extension: &str) -> PathBuf {
    let file_id = Uuid::new_v4().to_string();
    PathBuf::from(IMAGE_BUCKET)
        .join(&file_id[0..2])
        .join(&file_id[2..4])
        .join(format!("{}.{}", file_id, extension))
}

/// Writes the image under `media_root` and returns its public `/media/...` URL.
pub async fn store_image(media_root: &Path, image: UploadedImage) -> Result<String, MediaError> {
    let extension = validate_image(&image).map_err(MediaError::Invalid)?;
    let relative = object_path(extension);
    let full_path = media_root.join(&relative);

    web::block(move || -> std::io::Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, &image.bytes)
    })
    .await??;

    let public_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Ok(format!("/media/{}", public_path))
}
