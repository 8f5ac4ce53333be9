//! Thin wrapper around `git` subprocess calls for the local-clone mode.

use std::path::{Path, PathBuf};
use std::process::Output;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
}

/// A local clone the agent commits to and pushes from.
#[derive(Debug, Clone)]
pub struct LocalRepo {
    workdir: PathBuf,
    remote: String,
    author: String,
}

impl LocalRepo {
    pub fn new(workdir: impl Into<PathBuf>, remote: &str, author_name: &str, author_email: &str) -> Self {
        Self {
            workdir: workdir.into(),
            remote: remote.to_string(),
            author: format!("{author_name} <{author_email}>"),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Stage `paths` and commit them with the configured author.
    #[instrument(skip(self, paths), fields(files = paths.len()))]
    pub async fn commit(&self, message: &str, paths: &[&str]) -> Result<(), GitError> {
        let mut add = vec!["add", "--"];
        add.extend_from_slice(paths);
        self.run(&add).await?;

        let author = format!("--author={}", self.author);
        self.run(&["commit", "-m", message, &author]).await?;
        debug!("created commit");
        Ok(())
    }

    /// Push `branch` to the configured remote and set its upstream.
    #[instrument(skip(self))]
    pub async fn push(&self, branch: &str) -> Result<(), GitError> {
        self.run(&["push", "--set-upstream", &self.remote, branch]).await?;
        debug!(remote = %self.remote, "pushed branch");
        Ok(())
    }

    async fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(GitError::Failed {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}
