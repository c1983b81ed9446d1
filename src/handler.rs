use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncRead;

use crate::error::BackendError;

/// File-access backend consulted by every session.
pub trait Handler: Send + Sync + 'static {
    type Reader: AsyncRead + Unpin + Send;

    /// Open `filename` for reading on behalf of `peer`.
    fn read_file(
        &self,
        peer: SocketAddr,
        filename: &str,
    ) -> impl Future<Output = Result<Self::Reader, BackendError>> + Send;
}

/// Serves regular files below a root directory.
#[derive(Debug, Clone)]
pub struct FsHandler {
    root: PathBuf,
}

impl FsHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `filename` below the root, refusing anything that escapes it.
    async fn resolve(&self, filename: &str) -> Result<PathBuf, BackendError> {
        let relative = filename.trim_start_matches('/');
        let root = tokio::fs::canonicalize(&self.root).await?;
        let path = tokio::fs::canonicalize(root.join(relative)).await?;
        if !path.starts_with(&root) {
            return Err(BackendError::PermissionDenied(format!(
                "{filename}: outside of served directory"
            )));
        }
        Ok(path)
    }
}

impl Handler for FsHandler {
    type Reader = File;

    async fn read_file(&self, peer: SocketAddr, filename: &str) -> Result<File, BackendError> {
        let path = self.resolve(filename).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(BackendError::Other(format!("{filename}: not a regular file")));
        }
        tracing::debug!(%peer, path = %path.display(), "opening file");
        Ok(File::open(&path).await?)
    }
}
