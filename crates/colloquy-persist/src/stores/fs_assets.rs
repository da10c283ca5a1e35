use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{validate_id, PersistError, Result};
use crate::store::AssetStore;

/// Attachment bytes on disk.
///
/// Files land in `assets/<conversation>/` or
/// `projects/<project>/assets/<conversation>/`, prefixed with a short random
/// id so two uploads of the same name never collide.
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn asset_dir(&self, conversation_id: &str, project_id: Option<&str>) -> PathBuf {
        match project_id {
            Some(project) => self
                .root
                .join("projects")
                .join(project)
                .join("assets")
                .join(conversation_id),
            None => self.root.join("assets").join(conversation_id),
        }
    }

    fn check_inside_root(&self, path: &Path) -> Result<()> {
        let escapes = path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(PersistError::InvalidPath(path.display().to_string()));
        }
        Ok(())
    }
}

/// Keep only the final path component and replace anything odd
fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn save(
        &self,
        conversation_id: &str,
        filename: &str,
        bytes: &[u8],
        project_id: Option<&str>,
    ) -> Result<PathBuf> {
        validate_id(conversation_id)?;
        if let Some(project) = project_id {
            validate_id(project)?;
        }

        let dir = self.asset_dir(conversation_id, project_id);
        tokio::fs::create_dir_all(&dir).await?;

        let prefix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let path = dir.join(format!("{}-{}", prefix, sanitize_filename(filename)));
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(conversation_id, path = %path.display(), size = bytes.len(), "Stored asset");
        Ok(path)
    }

    async fn load(&self, _conversation_id: &str, path: &Path) -> Result<Vec<u8>> {
        self.check_inside_root(path)?;

        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistError::AssetNotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, _conversation_id: &str, path: &Path) -> Result<()> {
        self.check_inside_root(path)?;

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self, conversation_id: &str) -> Result<()> {
        validate_id(conversation_id)?;

        remove_dir_if_exists(&self.asset_dir(conversation_id, None)).await?;

        let projects = self.root.join("projects");
        let mut entries = match tokio::fs::read_dir(&projects).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            remove_dir_if_exists(&entry.path().join("assets").join(conversation_id)).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());

        let path = store.save("c1", "cat.png", b"meow", None).await.unwrap();
        assert!(path.starts_with(dir.path().join("assets/c1")));
        assert_eq!(store.load("c1", &path).await.unwrap(), b"meow");

        store.delete("c1", &path).await.unwrap();
        assert!(matches!(
            store.load("c1", &path).await,
            Err(PersistError::AssetNotFound(_))
        ));
        // deleting twice is fine
        store.delete("c1", &path).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_name_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());

        let a = store.save("c1", "x.txt", b"a", None).await.unwrap();
        let b = store.save("c1", "x.txt", b"b", None).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.load("c1", &a).await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_delete_all_covers_projects() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());

        let plain = store.save("c1", "a.txt", b"a", None).await.unwrap();
        let scoped = store.save("c1", "b.txt", b"b", Some("p1")).await.unwrap();
        let other = store.save("c2", "c.txt", b"c", None).await.unwrap();

        store.delete_all("c1").await.unwrap();

        assert!(!plain.exists());
        assert!(!scoped.exists());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path().join("data"));

        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, b"x").unwrap();

        assert!(matches!(
            store.load("c1", &outside).await,
            Err(PersistError::InvalidPath(_))
        ));
    }
}
