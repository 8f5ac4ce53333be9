//! `generate`: have the model write code for a task and publish it on a branch.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::llm::{prompts, LlmError, TextGenerator};
use crate::pr::{GitHubClient, PrError, PullRequest};
use crate::respond::extract::strip_code_fence;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Code generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("{0}")]
    Provider(#[from] PrError),
}

/// Repository writes needed to publish generated code.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Create `branch` from the tip of `base`; `false` when it already exists.
    async fn create_branch_from(&self, branch: &str, base: &str) -> Result<bool, PrError>;

    /// Create or replace `path` on `branch` in one commit.
    async fn commit_file(&self, path: &str, content: &str, branch: &str, message: &str) -> Result<(), PrError>;

    async fn open_pull_request(&self, title: &str, body: &str, head: &str, base: &str) -> Result<PullRequest, PrError>;
}

#[async_trait]
impl Publisher for GitHubClient {
    async fn create_branch_from(&self, branch: &str, base: &str) -> Result<bool, PrError> {
        let sha = self.branch_sha(base).await?;
        self.create_branch(branch, &sha).await
    }

    async fn commit_file(&self, path: &str, content: &str, branch: &str, message: &str) -> Result<(), PrError> {
        let existing = self.get_contents(path, branch).await?;
        self.put_file(path, content, branch, message, existing.as_ref().map(|c| c.sha.as_str()))
            .await
    }

    async fn open_pull_request(&self, title: &str, body: &str, head: &str, base: &str) -> Result<PullRequest, PrError> {
        self.create_pull_request(title, body, head, base).await
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub task: String,
    pub output_file: String,
    pub branch: String,
    /// Base branch for the new branch and the pull request
    pub base: String,
    pub create_pr: bool,
    pub title: Option<String>,
}

#[derive(Debug)]
pub struct Generated {
    pub branch_created: bool,
    pub bytes: usize,
    pub pull_request: Option<PullRequest>,
}

#[instrument(skip_all, fields(branch = %request.branch, output = %request.output_file))]
pub async fn generate(
    publisher: &dyn Publisher,
    generator: &dyn TextGenerator,
    request: &GenerateRequest,
) -> Result<Generated, GenerateError> {
    let raw = generator.complete(prompts::GENERATE_SYSTEM, &request.task).await?;
    let mut code = strip_code_fence(&raw).to_string();
    if !code.ends_with('\n') {
        code.push('\n');
    }
    debug!(bytes = code.len(), "generated code");

    let branch_created = publisher
        .create_branch_from(&request.branch, &request.base)
        .await?;
    info!(branch_created, "branch ready");

    let message = format!("feat: {}", request.task);
    publisher
        .commit_file(&request.output_file, &code, &request.branch, &message)
        .await?;
    info!("committed generated code");

    let pull_request = if request.create_pr {
        let title = request.title.clone().unwrap_or_else(|| message.clone());
        let body = format!("Generated code for: {}", request.task);
        let pr = publisher
            .open_pull_request(&title, &body, &request.branch, &request.base)
            .await?;
        info!(number = pr.number, url = %pr.html_url, "pull request ready");
        Some(pr)
    } else {
        None
    };

    Ok(Generated {
        branch_created,
        bytes: code.len(),
        pull_request,
    })
}
