//! Artifact persistence: patches, verify reports, plan files.
//!
//! Artifacts live under the data directory rooted at the user's home; files
//! are written with mode 0600 on Unix.

use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Writes run artifacts under a fixed root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The default root: `~/.trcoder/artifacts`, or a relative fallback when
    /// no home directory is resolvable.
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trcoder")
            .join("artifacts")
    }

    /// The directory for one run's artifacts.
    pub fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    /// Write one artifact, creating the run directory as needed. Returns the
    /// absolute path.
    pub async fn write(
        &self,
        run_id: Uuid,
        name: &str,
        content: &str,
    ) -> std::io::Result<PathBuf> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        fs::write(&path, content).await?;
        restrict_mode(&path).await?;
        Ok(path)
    }
}

#[cfg(unix)]
async fn restrict_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_artifact_under_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let run_id = Uuid::new_v4();

        let path = store.write(run_id, "patch.diff", "+x\n").await.unwrap();
        assert!(path.starts_with(store.run_dir(run_id)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "+x\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn artifacts_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let path = store
            .write(Uuid::new_v4(), "report.md", "# report\n")
            .await
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
