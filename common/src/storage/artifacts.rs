// Filesystem-backed artifact store with database-tracked metadata

use crate::db::repositories::FileRepository;
use crate::errors::StorageError;
use crate::models::StoredFile;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Inputs for storing a new artifact
pub struct NewArtifact {
    pub original_name: String,
    pub mime_type: String,
    pub category: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub uploaded_by: Uuid,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist bytes to disk and record their metadata
    async fn save(&self, artifact: NewArtifact, data: &[u8]) -> Result<StoredFile, StorageError>;

    /// Load a stored file's bytes
    async fn load(&self, file: &StoredFile) -> Result<Vec<u8>, StorageError>;

    /// Remove a stored file and its record
    async fn delete(&self, file: &StoredFile) -> Result<(), StorageError>;
}

/// Writes artifacts under a configured upload directory. Disk names are
/// timestamped and unique so repeated uploads of the same filename never
/// collide; the original name survives in the metadata row.
pub struct FsArtifactStore {
    upload_dir: PathBuf,
    files: FileRepository,
}

impl FsArtifactStore {
    pub fn new(upload_dir: impl Into<PathBuf>, files: FileRepository) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            files,
        }
    }

    fn disk_name(original_name: &str) -> String {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let suffix = Uuid::new_v4().simple();
        match original_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => format!("{}_{}.{}", stamp, suffix, ext),
            _ => format!("{}_{}", stamp, suffix),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    #[instrument(skip(self, artifact, data), fields(original_name = %artifact.original_name, size = data.len()))]
    async fn save(&self, artifact: NewArtifact, data: &[u8]) -> Result<StoredFile, StorageError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let name = Self::disk_name(&artifact.original_name);
        let path = self.upload_dir.join(&name);
        tokio::fs::write(&path, data).await?;

        let sha256 = hex::encode(Sha256::digest(data));

        let file = StoredFile {
            id: Uuid::new_v4(),
            name,
            original_name: artifact.original_name,
            path: path.to_string_lossy().into_owned(),
            size: data.len() as i64,
            mime_type: artifact.mime_type,
            sha256,
            category: artifact.category,
            description: artifact.description,
            is_public: artifact.is_public,
            uploaded_by: artifact.uploaded_by,
            download_count: 0,
            created_at: Utc::now(),
        };

        if let Err(e) = self.files.create(&file).await {
            // The metadata row is the source of truth; an orphaned disk file
            // would otherwise be unreachable forever
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                error!(path = %file.path, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }

        info!(file_id = %file.id, path = %file.path, "Artifact stored");
        Ok(file)
    }

    #[instrument(skip(self, file), fields(file_id = %file.id))]
    async fn load(&self, file: &StoredFile) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(&file.path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(
                format!("File missing from disk: {}", file.path),
            )),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, file), fields(file_id = %file.id))]
    async fn delete(&self, file: &StoredFile) -> Result<(), StorageError> {
        self.files.delete(file.id).await?;
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        info!(file_id = %file.id, "Artifact deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_name_keeps_extension() {
        let name = FsArtifactStore::disk_name("report.tar.gz");
        assert!(name.ends_with(".gz"));
        assert!(!name.contains("report"));
    }

    #[test]
    fn test_disk_name_without_extension() {
        let name = FsArtifactStore::disk_name("README");
        assert!(!name.contains('.'));
    }

    #[test]
    fn test_disk_names_are_unique() {
        let a = FsArtifactStore::disk_name("data.csv");
        let b = FsArtifactStore::disk_name("data.csv");
        assert_ne!(a, b);
    }
}
