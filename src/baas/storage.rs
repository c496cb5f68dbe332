use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file {0} not found")]
    NotFound(Uuid),
    #[error("cannot upload an empty file")]
    Empty,
}

/// An upload as received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredFile {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size: usize,
    pub created_at: DateTime<Utc>,
}

/// Blob store for a single bucket.
#[derive(Clone)]
pub struct Storage {
    endpoint: String,
    project_id: String,
    bucket_id: String,
    files: Arc<DashMap<Uuid, (StoredFile, Arc<[u8]>)>>,
}

impl Storage {
    pub fn new(endpoint: &str, project_id: &str, bucket_id: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            project_id: project_id.to_owned(),
            bucket_id: bucket_id.to_owned(),
            files: Arc::new(DashMap::new()),
        }
    }

    pub async fn upload(&self, file: NewFile) -> Result<StoredFile, StorageError> {
        if file.bytes.is_empty() {
            return Err(StorageError::Empty);
        }

        let meta = StoredFile {
            id: Uuid::now_v7(),
            name: file.name,
            mime_type: file.mime_type,
            size: file.bytes.len(),
            created_at: Utc::now(),
        };
        self.files.insert(meta.id, (meta.clone(), file.bytes.into()));
        debug!(id = %meta.id, size = meta.size, "file uploaded");
        Ok(meta)
    }

    /// Public preview URL for an image, scaled to at most 2000x2000.
    pub fn preview_url(&self, id: Uuid) -> Result<String, StorageError> {
        if !self.files.contains_key(&id) {
            return Err(StorageError::NotFound(id));
        }
        Ok(format!(
            "{}/storage/buckets/{}/files/{}/preview?width=2000&height=2000&gravity=top&quality=100&project={}",
            self.endpoint, self.bucket_id, id, self.project_id
        ))
    }

    pub async fn download(&self, id: Uuid) -> Result<(StoredFile, Arc<[u8]>), StorageError> {
        self.files
            .get(&id)
            .map(|f| f.value().clone())
            .ok_or(StorageError::NotFound(id))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        self.files
            .remove(&id)
            .map(|_| debug!(%id, "file deleted"))
            .ok_or(StorageError::NotFound(id))
    }

    /// Upload an image and resolve its preview URL. The file is discarded again
    /// when no URL can be produced.
    pub async fn upload_image(&self, file: NewFile) -> Result<(Uuid, String), StorageError> {
        let stored = self.upload(file).await?;
        match self.preview_url(stored.id) {
            Ok(url) => Ok((stored.id, url)),
            Err(e) => {
                self.discard(stored.id).await;
                Err(e)
            }
        }
    }

    /// Delete a file as cleanup after another step failed or replaced it.
    /// A failed delete is logged, never returned. Returns whether the file was removed.
    pub async fn discard(&self, id: Uuid) -> bool {
        match self.delete(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, file = %id, "could not delete file, it is now orphaned");
                false
            }
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.files.contains_key(&id)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> NewFile {
        NewFile {
            name: "a.png".into(),
            mime_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn upload_preview_delete() {
        let storage = Storage::new("http://x/v1/", "proj", "media");
        let file = storage.upload(png()).await.unwrap();
        assert_eq!(file.size, 3);

        let url = storage.preview_url(file.id).unwrap();
        assert!(url.starts_with(&format!("http://x/v1/storage/buckets/media/files/{}/preview", file.id)));
        assert!(url.ends_with("project=proj"));

        let (_, bytes) = storage.download(file.id).await.unwrap();
        assert_eq!(&*bytes, &[1, 2, 3]);

        storage.delete(file.id).await.unwrap();
        assert!(matches!(storage.preview_url(file.id), Err(StorageError::NotFound(_))));
        assert!(storage.delete(file.id).await.is_err());
    }

    #[tokio::test]
    async fn upload_image_resolves_preview() {
        let storage = Storage::new("http://x", "p", "b");
        let (id, url) = storage.upload_image(png()).await.unwrap();
        assert!(storage.contains(id));
        assert!(url.contains(&id.to_string()));
    }

    #[tokio::test]
    async fn discard_reports_missing_files_without_failing() {
        let storage = Storage::new("http://x", "p", "b");
        let file = storage.upload(png()).await.unwrap();

        assert!(storage.discard(file.id).await);
        assert!(!storage.contains(file.id));
        assert!(!storage.discard(file.id).await);
        assert_eq!(storage.file_count(), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let storage = Storage::new("http://x", "p", "b");
        let res = storage
            .upload(NewFile {
                bytes: vec![],
                ..png()
            })
            .await;
        assert!(matches!(res, Err(StorageError::Empty)));
    }
}
