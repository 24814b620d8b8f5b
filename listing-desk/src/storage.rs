//! Property image storage.
//!
//! Handles:
//! - Upload validation (MIME allow-list, size limit) before any network call
//! - Object key layout: `{property_id}/{millis}-{random}.{ext}`
//! - Mapping public URLs back to object keys for deletion
//! - Bulk removal of a property's folder

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// MIME types accepted for property images.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Largest accepted image (10 MiB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Cache lifetime set on uploaded objects, in seconds.
const CACHE_CONTROL_SECS: u32 = 3600;

/// Trait for the object storage backend.
///
/// This abstracts the storage service so we can use either:
/// - Supabase Storage (production)
/// - In-memory objects (dry-run/testing)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket the objects live in.
    fn bucket(&self) -> &str;

    /// Store an object. Never overwrites an existing key.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;

    /// Remove objects by key.
    async fn remove(&self, keys: &[String]) -> anyhow::Result<()>;

    /// List full keys directly under a folder.
    async fn list(&self, folder: &str) -> anyhow::Result<Vec<String>>;

    /// Public URL for a key.
    fn public_url(&self, key: &str) -> String;
}

/// Supabase Storage REST client.
pub struct SupabaseStorage {
    http_client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

/// Entry from the object list endpoint
#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

impl SupabaseStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            http_client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_role_key.clone(),
            bucket: config.bucket.clone(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", &self.service_key)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let url = self.object_url(&format!("{}/{}", self.bucket, key));

        let response = self
            .authorized(self.http_client.post(&url))
            .header("Content-Type", content_type)
            .header("Cache-Control", format!("max-age={CACHE_CONTROL_SECS}"))
            .header("x-upsert", "false")
            .body(body)
            .send()
            .await
            .context("Failed to reach storage service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Storage API error ({status}): {body}"));
        }

        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> anyhow::Result<()> {
        let url = self.object_url(&self.bucket);

        let response = self
            .authorized(self.http_client.delete(&url))
            .json(&json!({ "prefixes": keys }))
            .send()
            .await
            .context("Failed to reach storage service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Storage API error ({status}): {body}"));
        }

        Ok(())
    }

    async fn list(&self, folder: &str) -> anyhow::Result<Vec<String>> {
        let url = self.object_url(&format!("list/{}", self.bucket));

        let response = self
            .authorized(self.http_client.post(&url))
            .json(&json!({
                "prefix": folder,
                "limit": 1000,
                "offset": 0,
                "sortBy": { "column": "name", "order": "asc" },
            }))
            .send()
            .await
            .context("Failed to reach storage service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Storage API error listing objects ({status}): {body}"));
        }

        let objects: Vec<ListedObject> = response
            .json()
            .await
            .context("Failed to parse object list response")?;

        Ok(objects
            .into_iter()
            .map(|o| format!("{folder}/{}", o.name))
            .collect())
    }

    fn public_url(&self, key: &str) -> String {
        self.object_url(&format!("public/{}/{}", self.bucket, key))
    }
}

/// A stored in-memory object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub body: Bytes,
}

/// In-memory object store for dry-run mode and tests.
///
/// Objects vanish when the process exits.
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    requests: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of put/remove/list calls served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Look up an object by key.
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(anyhow!("Object already exists: {key}"));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                body,
            },
        );
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> anyhow::Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.write().await;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list(&self, folder: &str) -> anyhow::Result<Vec<String>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let prefix = format!("{folder}/");
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|k| k.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/')))
            .cloned()
            .collect())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://storage/v1/object/public/{}/{}", self.bucket, key)
    }
}

/// An image received from the upload form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Validates and stores property images on top of an [`ObjectStore`].
pub struct ImageStore {
    store: Arc<dyn ObjectStore>,
}

impl ImageStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Validate an upload, store it under the property's folder and return its public URL.
    pub async fn upload(&self, upload: ImageUpload, property_id: &str) -> Result<String> {
        let property_id = property_id.trim();
        if property_id.is_empty() {
            return Err(Error::Validation("Property ID is required".to_string()));
        }
        if !ALLOWED_IMAGE_TYPES.contains(&upload.content_type.as_str()) {
            return Err(Error::InvalidFileType(upload.content_type));
        }
        if upload.body.len() > MAX_IMAGE_BYTES {
            return Err(Error::FileTooLarge {
                size: upload.body.len(),
                limit: MAX_IMAGE_BYTES,
            });
        }

        let key = object_key(property_id, &upload.file_name, &upload.content_type);
        let size = upload.body.len();

        self.store
            .put(&key, upload.body, &upload.content_type)
            .await
            .map_err(|e| {
                error!(key = %key, "Image upload failed: {:#}", e);
                Error::Upload(e.to_string())
            })?;

        info!(key = %key, size, "Uploaded image");
        Ok(self.store.public_url(&key))
    }

    /// Delete the object behind a public URL.
    pub async fn delete(&self, image_url: &str) -> Result<()> {
        let key = key_from_url(image_url, self.store.bucket())?;

        self.store
            .remove(std::slice::from_ref(&key))
            .await
            .map_err(|e| {
                error!(key = %key, "Image delete failed: {:#}", e);
                Error::Delete(e.to_string())
            })?;

        info!(key = %key, "Deleted image");
        Ok(())
    }

    /// Remove every object in a property's folder. Returns how many were removed.
    ///
    /// Not called when a property is deleted, so images of deleted listings
    /// stay in the bucket until this is run (see the `purge-images` command).
    pub async fn delete_folder(&self, property_id: &str) -> Result<usize> {
        let keys = self
            .store
            .list(property_id)
            .await
            .map_err(|e| Error::Delete(format!("Error listing images: {e}")))?;

        if keys.is_empty() {
            debug!(property_id = %property_id, "No images to remove");
            return Ok(0);
        }

        self.store
            .remove(&keys)
            .await
            .map_err(|e| Error::Delete(e.to_string()))?;

        info!(property_id = %property_id, count = keys.len(), "Removed property images");
        Ok(keys.len())
    }
}

/// Build the storage key for a new upload.
fn object_key(property_id: &str, file_name: &str, content_type: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!(
        "{property_id}/{}-{suffix}.{}",
        Utc::now().timestamp_millis(),
        extension(file_name, content_type)
    )
}

fn extension(file_name: &str, content_type: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_ascii_lowercase()
        }
        _ => match content_type {
            "image/png" => "png",
            "image/webp" => "webp",
            _ => "jpg",
        }
        .to_string(),
    }
}

/// Everything after the first `"{bucket}/"` in the URL is the object key,
/// including any later occurrence of the bucket name.
fn key_from_url(image_url: &str, bucket: &str) -> Result<String> {
    match image_url.split_once(&format!("{bucket}/")) {
        Some((_, key)) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(Error::InvalidUrlFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<MemoryObjectStore>, ImageStore) {
        let memory = Arc::new(MemoryObjectStore::new("mgsi_bucket"));
        let images = ImageStore::new(memory.clone());
        (memory, images)
    }

    fn upload(name: &str, content_type: &str, size: usize) -> ImageUpload {
        ImageUpload {
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            body: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("house.JPG", "image/jpeg"), "jpg");
        assert_eq!(extension("a.b.webp", "image/webp"), "webp");
        assert_eq!(extension("noext", "image/png"), "png");
        assert_eq!(extension("trailing.", "image/jpeg"), "jpg");
    }

    #[test]
    fn test_key_from_url() {
        let url = "https://x.supabase.co/storage/v1/object/public/mgsi_bucket/abc/1-x.jpg";
        assert_eq!(key_from_url(url, "mgsi_bucket").unwrap(), "abc/1-x.jpg");
        assert!(matches!(
            key_from_url("https://elsewhere/img.jpg", "mgsi_bucket"),
            Err(Error::InvalidUrlFormat)
        ));
        assert!(matches!(
            key_from_url("https://x/mgsi_bucket/", "mgsi_bucket"),
            Err(Error::InvalidUrlFormat)
        ));

        // Only the first bucket segment is the prefix; later repeats belong to the key
        let nested = "https://x.supabase.co/storage/v1/object/public/mgsi_bucket/abc/mgsi_bucket/2.jpg";
        assert_eq!(
            key_from_url(nested, "mgsi_bucket").unwrap(),
            "abc/mgsi_bucket/2.jpg"
        );
    }

    #[test]
    fn test_supabase_urls() {
        let storage = SupabaseStorage::new(&StorageConfig {
            url: "https://x.supabase.co/".into(),
            service_role_key: "key".into(),
            bucket: "mgsi_bucket".into(),
        });
        let url = storage.public_url("abc/1.jpg");
        assert_eq!(
            url,
            "https://x.supabase.co/storage/v1/object/public/mgsi_bucket/abc/1.jpg"
        );
        assert_eq!(key_from_url(&url, storage.bucket()).unwrap(), "abc/1.jpg");
    }

    #[tokio::test]
    async fn test_upload_stores_under_property_folder() {
        let (memory, images) = setup();
        let url = images
            .upload(upload("casa.png", "image/png", 1024), "prop123")
            .await
            .unwrap();

        let keys = memory.keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("prop123/"));
        assert!(keys[0].ends_with(".png"));
        assert!(url.ends_with(&keys[0]));

        let stored = memory.get(&keys[0]).await.unwrap();
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.body.len(), 1024);
    }

    #[tokio::test]
    async fn test_upload_rejects_before_network() {
        let (memory, images) = setup();

        let err = images
            .upload(upload("big.jpg", "image/jpeg", 15 * 1024 * 1024), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));

        let err = images
            .upload(upload("anim.gif", "image/gif", 10), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFileType(_)));

        let err = images
            .upload(upload("ok.jpg", "image/jpeg", 10), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert_eq!(memory.request_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_size_boundary() {
        let (_memory, images) = setup();
        assert!(
            images
                .upload(upload("max.webp", "image/webp", MAX_IMAGE_BYTES), "p")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_delete_by_url() {
        let (memory, images) = setup();
        let url = images
            .upload(upload("a.jpg", "image/jpeg", 4), "p1")
            .await
            .unwrap();
        images.delete(&url).await.unwrap();
        assert!(memory.keys().await.is_empty());

        assert!(matches!(
            images.delete("https://cdn.example.com/a.jpg").await,
            Err(Error::InvalidUrlFormat)
        ));
    }

    #[tokio::test]
    async fn test_delete_folder() {
        let (memory, images) = setup();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            images
                .upload(upload(name, "image/jpeg", 4), "p1")
                .await
                .unwrap();
        }
        images
            .upload(upload("x.jpg", "image/jpeg", 4), "p2")
            .await
            .unwrap();

        assert_eq!(images.delete_folder("p1").await.unwrap(), 3);
        let keys = memory.keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("p2/"));

        assert_eq!(images.delete_folder("p1").await.unwrap(), 0);
    }
}
