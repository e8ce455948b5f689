//! Cover image storage
//!
//! Covers go to Cloudinary when credentials are configured, otherwise to the
//! local upload directory served under `/uploads`.

use async_trait::async_trait;
use axum::body::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::config::ImageConfig;
use crate::error::AppError;

pub const BOOKS_FOLDER: &str = "bookshop/books";
pub const MANUALS_FOLDER: &str = "bookshop/manuals";
/// URL prefix of locally stored images
pub const LOCAL_URL_PREFIX: &str = "/uploads";

const ALLOWED_TYPES: [(&str, &str); 4] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("image exceeds {0} bytes")]
    TooLarge(usize),
    #[error("image host request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image host rejected request: {0}")]
    Rejected(String),
    #[error("image storage failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::UnsupportedType(_) => {
                AppError::BadRequest("Only image files (jpeg, png, webp, gif) are allowed".to_string())
            }
            ImageError::TooLarge(_) => AppError::PayloadTooLarge("Image file is too large".to_string()),
            ImageError::Http(e) => AppError::Upstream(format!("Image upload failed: {}", e)),
            ImageError::Rejected(msg) => AppError::Upstream(format!("Image upload failed: {}", msg)),
            ImageError::Io(e) => AppError::Io(e),
        }
    }
}

/// An uploaded file taken from a multipart field
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ImageFile {
    pub fn extension(&self) -> Result<&'static str, ImageError> {
        ALLOWED_TYPES
            .iter()
            .find(|(mime, _)| self.content_type.eq_ignore_ascii_case(mime))
            .map(|(_, ext)| *ext)
            .ok_or_else(|| ImageError::UnsupportedType(self.content_type.clone()))
    }

    /// Check the content type and size; returns the file extension to use.
    pub fn validate(&self, max_size: usize) -> Result<&'static str, ImageError> {
        let ext = self.extension()?;
        if self.bytes.len() > max_size {
            return Err(ImageError::TooLarge(max_size));
        }
        Ok(ext)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, folder: &str, file: ImageFile) -> Result<StoredImage, ImageError>;

    async fn delete(&self, public_id: &str) -> Result<(), ImageError>;

    /// Delete the image behind `url`, logging instead of failing.
    async fn delete_url(&self, url: &str) {
        let Some(public_id) = public_id_from_url(url) else {
            tracing::warn!("Cannot derive image id from {}", url);
            return;
        };
        if let Err(e) = self.delete(&public_id).await {
            tracing::warn!("Failed to delete image {}: {}", public_id, e);
        }
    }
}

/// Public id of a stored image: the path after the upload marker (minus any
/// `v<digits>` version segment) without the extension. URLs without a marker
/// yield just the last segment's stem.
pub fn public_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let tail = ["/image/upload/", "/upload/", "/uploads/"]
        .iter()
        .find_map(|marker| path.find(marker).map(|at| &path[at + marker.len()..]));

    let segments: Vec<&str> = match tail {
        Some(tail) => tail
            .split('/')
            .filter(|s| !s.is_empty())
            .enumerate()
            .filter(|(i, s)| !(*i == 0 && is_version_segment(s)))
            .map(|(_, s)| s)
            .collect(),
        None => path.rsplit('/').next().into_iter().collect(),
    };

    let (last, folders) = segments.split_last()?;
    let stem = last.split('.').next().filter(|s| !s.is_empty())?;
    let mut id = folders.join("/");
    if !id.is_empty() {
        id.push('/');
    }
    id.push_str(stem);
    Some(id)
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].bytes().all(|b| b.is_ascii_digit())
}

/// Cloudinary signature: SHA-256 over the sorted `key=value` pairs joined by
/// `&`, followed by the API secret.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{}{}", joined, api_secret).as_bytes()))
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

pub struct CloudinaryStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryStore {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://api.cloudinary.com/v1_1/{}/image", config.cloud_name),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn upload(&self, folder: &str, file: ImageFile) -> Result<StoredImage, ImageError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", folder), ("timestamp", timestamp.as_str())],
            &self.api_secret,
        );

        let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name)
            .mime_str(&file.content_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_string())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Rejected(format!("{}: {}", status, body)));
        }

        let uploaded: UploadResponse = response.json().await?;
        tracing::debug!("Uploaded image {}", uploaded.public_id);
        Ok(StoredImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), ImageError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("public_id", public_id), ("timestamp", timestamp.as_str())],
            &self.api_secret,
        );

        let response = self
            .client
            .post(format!("{}/destroy", self.base_url))
            .form(&[
                ("public_id", public_id),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let outcome: DestroyResponse = response.json().await?;
        if outcome.result != "ok" {
            tracing::warn!("Image host did not delete {}: {}", public_id, outcome.result);
        }
        Ok(())
    }
}

/// Stores images as `<root>/<folder>/<uuid>.<ext>`.
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn folder_path(&self, folder: &str) -> Result<PathBuf, ImageError> {
        let mut path = self.root.clone();
        for part in folder.split('/').filter(|p| !p.is_empty()) {
            if part == ".." || part == "." {
                return Err(ImageError::Rejected(format!("invalid folder {}", folder)));
            }
            path.push(part);
        }
        Ok(path)
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload(&self, folder: &str, file: ImageFile) -> Result<StoredImage, ImageError> {
        let ext = file.extension()?;
        let dir = self.folder_path(folder)?;
        fs::create_dir_all(&dir).await?;

        let id = Uuid::new_v4();
        let file_name = format!("{}.{}", id, ext);
        fs::write(dir.join(&file_name), &file.bytes).await?;

        let public_id = format!("{}/{}", folder.trim_matches('/'), id);
        Ok(StoredImage {
            url: format!("{}/{}/{}", LOCAL_URL_PREFIX, folder.trim_matches('/'), file_name),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), ImageError> {
        let (folder, stem) = public_id.rsplit_once('/').unwrap_or(("", public_id));
        let dir = self.folder_path(folder)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}
