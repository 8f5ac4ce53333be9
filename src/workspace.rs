use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::git::{GitError, LocalRepo};
use crate::pr::{ChangeRequest, PrError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Provider(#[from] PrError),

    #[error("File {path} could not be accessed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path {0} escapes the workspace")]
    OutsideWorkspace(String),

    #[error("{0}")]
    Git(#[from] GitError),
}

/// Where file content is read from and persisted to. Persisting a file
/// includes committing it and pushing it to the pull request branch.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<String, StoreError>;

    async fn write(&self, path: &str, content: &str, message: &str) -> Result<(), StoreError>;
}

/// Files on the pull request branch, through the provider's contents API.
pub struct RemoteFiles<'a> {
    provider: &'a dyn ChangeRequest,
    branch: String,
}

impl<'a> RemoteFiles<'a> {
    pub fn new(provider: &'a dyn ChangeRequest, branch: &str) -> Self {
        Self {
            provider,
            branch: branch.to_string(),
        }
    }
}

#[async_trait]
impl FileStore for RemoteFiles<'_> {
    async fn read(&self, path: &str) -> Result<String, StoreError> {
        Ok(self.provider.get_file_content(path, &self.branch).await?)
    }

    async fn write(&self, path: &str, content: &str, message: &str) -> Result<(), StoreError> {
        self.provider
            .update_file(path, content, &self.branch, message)
            .await?;
        Ok(())
    }
}

/// Files in a local clone that has the pull request branch checked out.
pub struct LocalFiles {
    repo: LocalRepo,
    branch: String,
}

impl LocalFiles {
    pub fn new(repo: LocalRepo, branch: &str) -> Self {
        Self {
            repo,
            branch: branch.to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || path.is_empty() {
            return Err(StoreError::OutsideWorkspace(path.to_string()));
        }
        Ok(self.repo.workdir().join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFiles {
    async fn read(&self, path: &str) -> Result<String, StoreError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_string(),
                source,
            })
    }

    #[instrument(skip(self, content, message), fields(branch = %self.branch))]
    async fn write(&self, path: &str, content: &str, message: &str) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        tokio::fs::write(&full, content)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_string(),
                source,
            })?;
        debug!("wrote file to workspace");

        self.repo.commit(message, &[path]).await?;
        self.repo.push(&self.branch).await?;
        Ok(())
    }
}
