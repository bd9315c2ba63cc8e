use crate::error::TransferError;
use crate::utils::validation::validate_path_segment;
use std::path::{Path, PathBuf};

/// Owns the local staging tree `<root>/<item_id>/<file_name>`.
///
/// The root is created once per run and never removed automatically, so it
/// outlives the process and is reused by later runs. Files whose push failed
/// stay under it until an operator clears them.
#[derive(Debug, Clone)]
pub struct StagingManager {
    root: PathBuf,
}

impl StagingManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the staging root if absent.
    pub async fn prepare(&self) -> Result<(), TransferError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tracing::info!("📂 Staging root ready: {:?}", self.root);
        Ok(())
    }

    /// Deterministic `<root>/<item_id>/<file_name>`; the item folder exists on return.
    pub async fn path_for(&self, item_id: &str, file_name: &str) -> anyhow::Result<PathBuf> {
        validate_path_segment(item_id)?;
        validate_path_segment(file_name)?;

        let folder = self.root.join(item_id);
        tokio::fs::create_dir_all(&folder).await?;
        Ok(folder.join(file_name))
    }

    /// Marks a staged file world-writable. Best-effort: failure is only logged.
    pub async fn make_writable(&self, path: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o777);
            if let Err(e) = tokio::fs::set_permissions(path, perms).await {
                tracing::error!("❌ Failed to set permissions: {:?}: {}", path, e);
            }
        }

        #[cfg(not(unix))]
        {
            match tokio::fs::metadata(path).await {
                Ok(meta) => {
                    let mut perms = meta.permissions();
                    perms.set_readonly(false);
                    if let Err(e) = tokio::fs::set_permissions(path, perms).await {
                        tracing::error!("❌ Failed to set permissions: {:?}: {}", path, e);
                    }
                }
                Err(e) => tracing::error!("❌ Failed to set permissions: {:?}: {}", path, e),
            }
        }
    }

    pub async fn is_staged(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Best-effort delete of a staged file. Returns the error for the caller's
    /// report but never fails the object; a leftover file is acceptable.
    pub async fn discard(&self, path: &Path) -> Result<(), TransferError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!("🗑️ Deleted temp file: {:?}", path);
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ Failed to delete temp file: {:?}: {}", path, e);
                Err(TransferError::DiscardFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_path_for_creates_item_folder() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(dir.path().join("stage"));
        staging.prepare().await.unwrap();

        let path = staging.path_for("123", "image1.png").await.unwrap();
        assert_eq!(path, dir.path().join("stage").join("123").join("image1.png"));
        assert!(dir.path().join("stage").join("123").is_dir());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_path_for_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(dir.path());

        assert!(staging.path_for("..", "a.png").await.is_err());
        assert!(staging.path_for("1", "../a.png").await.is_err());
        assert!(staging.path_for("", "a.png").await.is_err());
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(dir.path().join("nested").join("stage"));
        staging.prepare().await.unwrap();
        staging.prepare().await.unwrap();
        assert!(staging.root().is_dir());
    }

    #[tokio::test]
    async fn test_discard() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(dir.path());
        let path = staging.path_for("7", "a.jpg").await.unwrap();
        tokio::fs::write(&path, b"bytes").await.unwrap();
        assert!(staging.is_staged(&path).await);

        staging.discard(&path).await.unwrap();
        assert!(!staging.is_staged(&path).await);

        // Second discard reports the failure instead of panicking
        let err = staging.discard(&path).await.unwrap_err();
        assert!(matches!(err, TransferError::DiscardFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_make_writable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(dir.path());
        let path = staging.path_for("7", "a.jpg").await.unwrap();
        tokio::fs::write(&path, b"bytes").await.unwrap();

        staging.make_writable(&path).await;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }
}
