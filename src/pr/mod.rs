pub mod diff;
pub mod types;

pub use types::{PrFile, PullRequest, Repository, ReviewComment, ReviewEvent};

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Config;

const USER_AGENT: &str = "dev-agent";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("GitHub API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found on GitHub: {0}")]
    NotFound(String),

    #[error("Failed to decode GitHub data: {0}")]
    Decode(String),

    #[error("GitHub token not found (set github.token or GITHUB_TOKEN)")]
    MissingToken,

    #[error("GitHub repository not configured (set github.owner/github.repo or GITHUB_REPO_OWNER/GITHUB_REPO_NAME)")]
    MissingRepository,

    #[error("No pull request found for branch {0}")]
    NoPullRequest(String),
}

impl PrError {
    fn is_unprocessable(&self) -> bool {
        matches!(self, PrError::Api { status: 422, .. })
    }
}

/// The change-request operations the review pipeline needs, bound to one
/// pull request. Implemented by [`GitHubPullRequest`]; tests use an
/// in-memory double.
#[async_trait]
pub trait ChangeRequest: Send + Sync {
    fn pull_request(&self) -> &PullRequest;

    async fn list_review_comments(&self) -> Result<Vec<ReviewComment>, PrError>;

    async fn get_file_content(&self, path: &str, git_ref: &str) -> Result<String, PrError>;

    /// Replace the content of `path` on `git_ref`; this commits and pushes in one step.
    async fn update_file(
        &self,
        path: &str,
        content: &str,
        git_ref: &str,
        message: &str,
    ) -> Result<(), PrError>;

    /// Post `text` threaded under `comment`.
    async fn create_reply_comment(&self, comment: &ReviewComment, text: &str) -> Result<(), PrError>;

    /// Post `text` as a general comment on the pull request.
    async fn create_issue_comment(&self, text: &str) -> Result<(), PrError>;

    async fn list_files(&self) -> Result<Vec<PrFile>, PrError>;

    async fn create_line_comment(&self, path: &str, line: usize, text: &str) -> Result<(), PrError>;

    async fn submit_review(&self, event: ReviewEvent, body: &str) -> Result<(), PrError>;
}

/// Repository-scoped GitHub REST client.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    repo: Repository,
    committer: Committer,
}

#[derive(Debug, Clone, Serialize)]
struct Committer {
    name: String,
    email: String,
}

/// File content plus the blob SHA needed to update it.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub text: String,
    pub sha: String,
}

#[derive(Deserialize)]
struct PullJson {
    number: u64,
    title: String,
    html_url: String,
    head: HeadJson,
}

#[derive(Deserialize)]
struct HeadJson {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Deserialize)]
struct ReviewCommentJson {
    id: u64,
    path: String,
    line: Option<usize>,
    /// `LEFT` when `line` counts lines of the base revision
    #[serde(default)]
    side: Option<String>,
    position: Option<usize>,
    #[serde(default)]
    diff_hunk: String,
    body: String,
    in_reply_to_id: Option<u64>,
    commit_id: String,
}

#[derive(Deserialize)]
struct ContentJson {
    sha: String,
    #[serde(rename = "type")]
    kind: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct FileJson {
    filename: String,
    status: String,
    additions: usize,
    deletions: usize,
}

#[derive(Deserialize)]
struct RefJson {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

impl From<PullJson> for PullRequest {
    fn from(json: PullJson) -> Self {
        PullRequest {
            number: json.number,
            title: json.title,
            html_url: json.html_url,
            head_ref: json.head.git_ref,
            head_sha: json.head.sha,
        }
    }
}

impl ReviewCommentJson {
    fn hunk_anchor(&self) -> Option<usize> {
        match diff::anchor_line(&self.diff_hunk) {
            Ok(line) => line,
            Err(e) => {
                warn!(comment_id = self.id, side = ?self.side, error = %e, "could not resolve comment anchor");
                None
            }
        }
    }

    /// Convert to the canonical anchor: the head-revision line. A
    /// right-side `line` is used as is; base-side lines and bare diff
    /// positions are resolved through the comment's hunk.
    fn into_comment(self) -> ReviewComment {
        let on_head = self.side.as_deref() != Some("LEFT");
        let line = match (self.line, self.position) {
            (Some(line), _) if on_head => Some(line),
            (Some(_), _) | (None, Some(_)) => self.hunk_anchor(),
            (None, None) => None,
        };

        ReviewComment {
            id: self.id,
            path: self.path,
            line,
            body: self.body,
            in_reply_to: self.in_reply_to_id,
            commit_id: self.commit_id,
        }
    }
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self, PrError> {
        let token = config.github.token.clone().ok_or(PrError::MissingToken)?;
        let (owner, name) = match (&config.github.owner, &config.github.repo) {
            (Some(owner), Some(name)) => (owner.clone(), name.clone()),
            _ => return Err(PrError::MissingRepository),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.github.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.github.api_url.trim_end_matches('/').to_string(),
            token,
            repo: Repository { owner, name },
            committer: Committer {
                name: config.git.author_name.clone(),
                email: config.git.author_email.clone(),
            },
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Bind this client to one pull request.
    pub fn pull_request(&self, pr: PullRequest) -> GitHubPullRequest<'_> {
        GitHubPullRequest { client: self, pr }
    }

    /// Find the pull request (open or closed) whose head is `branch`.
    #[instrument(skip(self), fields(owner = %self.repo.owner, repo = %self.repo.name))]
    pub async fn find_pull_request(&self, branch: &str) -> Result<PullRequest, PrError> {
        let head = format!("{}:{}", self.repo.owner, branch);
        let url = self.repo_url(&["pulls"])?;
        let pulls: Vec<PullJson> = self
            .send(
                self.request(Method::GET, url)
                    .query(&[("state", "all"), ("head", head.as_str())]),
            )
            .await?
            .json()
            .await?;

        let pr = pulls
            .into_iter()
            .next()
            .map(PullRequest::from)
            .ok_or_else(|| PrError::NoPullRequest(branch.to_string()))?;
        debug!(number = pr.number, title = %pr.title, "found pull request");
        Ok(pr)
    }

    /// Fetch a file at `git_ref`; `None` when it doesn't exist there.
    #[instrument(skip(self))]
    pub async fn get_contents(&self, path: &str, git_ref: &str) -> Result<Option<FileContent>, PrError> {
        let url = self.contents_url(path)?;
        let result = self
            .send(self.request(Method::GET, url).query(&[("ref", git_ref)]))
            .await;
        let response = match result {
            Ok(response) => response,
            Err(PrError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let content: ContentJson = response.json().await?;
        if content.kind != "file" {
            return Err(PrError::Decode(format!("{path} is a {}, not a file", content.kind)));
        }
        let text = decode_content(content.content.as_deref(), content.encoding.as_deref())
            .map_err(|reason| PrError::Decode(format!("{path}: {reason}")))?;
        debug!(bytes = text.len(), "fetched file content");
        Ok(Some(FileContent { text, sha: content.sha }))
    }

    /// Create or replace a file on `branch` as a single commit.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn put_file(
        &self,
        path: &str,
        content: &str,
        branch: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), PrError> {
        let mut body = json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content.as_bytes()),
            "branch": branch,
            "committer": self.committer,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let url = self.contents_url(path)?;
        self.send(self.request(Method::PUT, url).json(&body)).await?;
        debug!("file committed");
        Ok(())
    }

    /// Commit SHA at the tip of `branch`.
    #[instrument(skip(self))]
    pub async fn branch_sha(&self, branch: &str) -> Result<String, PrError> {
        let mut segments = vec!["git", "ref", "heads"];
        segments.extend(branch.split('/'));
        let url = self.repo_url(&segments)?;
        let reference: RefJson = self.send(self.request(Method::GET, url)).await?.json().await?;
        Ok(reference.object.sha)
    }

    /// Create `branch` pointing at `sha`. Returns `false` when it already existed.
    #[instrument(skip(self))]
    pub async fn create_branch(&self, branch: &str, sha: &str) -> Result<bool, PrError> {
        let url = self.repo_url(&["git", "refs"])?;
        let body = json!({ "ref": format!("refs/heads/{branch}"), "sha": sha });
        match self.send(self.request(Method::POST, url).json(&body)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_unprocessable() => {
                debug!("branch already exists");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Open a pull request, or return the existing one for `head`.
    #[instrument(skip(self, body))]
    pub async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, PrError> {
        let url = self.repo_url(&["pulls"])?;
        let payload = json!({ "title": title, "body": body, "head": head, "base": base });
        match self.send(self.request(Method::POST, url).json(&payload)).await {
            Ok(response) => Ok(response.json::<PullJson>().await?.into()),
            Err(e) if e.is_unprocessable() => {
                debug!("pull request already exists");
                self.find_pull_request(head).await
            }
            Err(e) => Err(e),
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PrError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(PrError::NotFound(message)),
            code => Err(PrError::Api { status: code, message }),
        }
    }

    async fn get_paginated<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, PrError> {
        let mut items = Vec::new();
        for page in 1.. {
            let batch: Vec<T> = self
                .send(self.request(Method::GET, url.clone()).query(&[
                    ("per_page", PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ]))
                .await?
                .json()
                .await?;
            let done = batch.len() < PAGE_SIZE;
            items.extend(batch);
            if done {
                break;
            }
        }
        Ok(items)
    }

    fn repo_url(&self, segments: &[&str]) -> Result<Url, PrError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| PrError::Decode(format!("invalid api_url {}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|_| PrError::Decode(format!("invalid api_url {}", self.api_url)))?
            .pop_if_empty()
            .extend(["repos", self.repo.owner.as_str(), self.repo.name.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn contents_url(&self, path: &str) -> Result<Url, PrError> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        self.repo_url(&segments)
    }
}

fn decode_content(content: Option<&str>, encoding: Option<&str>) -> Result<String, String> {
    let content = content.unwrap_or_default();
    match encoding {
        Some("base64") => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| format!("invalid base64: {e}"))?;
            String::from_utf8(bytes).map_err(|_| "content is not valid UTF-8".to_string())
        }
        Some("none") => Err("file too large for the contents API".to_string()),
        _ => Ok(content.to_string()),
    }
}

/// A [`GitHubClient`] bound to one pull request.
pub struct GitHubPullRequest<'a> {
    client: &'a GitHubClient,
    pr: PullRequest,
}

#[async_trait]
impl ChangeRequest for GitHubPullRequest<'_> {
    fn pull_request(&self) -> &PullRequest {
        &self.pr
    }

    #[instrument(skip(self), fields(pr = self.pr.number))]
    async fn list_review_comments(&self) -> Result<Vec<ReviewComment>, PrError> {
        let url = self
            .client
            .repo_url(&["pulls", &self.pr.number.to_string(), "comments"])?;
        let comments: Vec<ReviewCommentJson> = self.client.get_paginated(url).await?;
        debug!(count = comments.len(), "fetched review comments");
        Ok(comments.into_iter().map(ReviewCommentJson::into_comment).collect())
    }

    async fn get_file_content(&self, path: &str, git_ref: &str) -> Result<String, PrError> {
        self.client
            .get_contents(path, git_ref)
            .await?
            .map(|content| content.text)
            .ok_or_else(|| PrError::NotFound(format!("{path} at {git_ref}")))
    }

    async fn update_file(
        &self,
        path: &str,
        content: &str,
        git_ref: &str,
        message: &str,
    ) -> Result<(), PrError> {
        let current = self.client.get_contents(path, git_ref).await?;
        let sha = current.as_ref().map(|c| c.sha.as_str());
        self.client.put_file(path, content, git_ref, message, sha).await
    }

    #[instrument(skip(self, text), fields(pr = self.pr.number, comment_id = comment.id))]
    async fn create_reply_comment(&self, comment: &ReviewComment, text: &str) -> Result<(), PrError> {
        let url = self.client.repo_url(&[
            "pulls",
            &self.pr.number.to_string(),
            "comments",
            &comment.id.to_string(),
            "replies",
        ])?;
        self.client
            .send(self.client.request(Method::POST, url).json(&json!({ "body": text })))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, text), fields(pr = self.pr.number))]
    async fn create_issue_comment(&self, text: &str) -> Result<(), PrError> {
        let url = self
            .client
            .repo_url(&["issues", &self.pr.number.to_string(), "comments"])?;
        self.client
            .send(self.client.request(Method::POST, url).json(&json!({ "body": text })))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(pr = self.pr.number))]
    async fn list_files(&self) -> Result<Vec<PrFile>, PrError> {
        let url = self
            .client
            .repo_url(&["pulls", &self.pr.number.to_string(), "files"])?;
        let files: Vec<FileJson> = self.client.get_paginated(url).await?;
        Ok(files
            .into_iter()
            .map(|f| PrFile {
                filename: f.filename,
                status: f.status,
                additions: f.additions,
                deletions: f.deletions,
            })
            .collect())
    }

    #[instrument(skip(self, text), fields(pr = self.pr.number))]
    async fn create_line_comment(&self, path: &str, line: usize, text: &str) -> Result<(), PrError> {
        let url = self
            .client
            .repo_url(&["pulls", &self.pr.number.to_string(), "comments"])?;
        let body = json!({
            "body": text,
            "commit_id": self.pr.head_sha,
            "path": path,
            "line": line,
            "side": "RIGHT",
        });
        self.client
            .send(self.client.request(Method::POST, url).json(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, body), fields(pr = self.pr.number))]
    async fn submit_review(&self, event: ReviewEvent, body: &str) -> Result<(), PrError> {
        let url = self
            .client
            .repo_url(&["pulls", &self.pr.number.to_string(), "reviews"])?;
        let payload = json!({ "body": body, "event": event.as_api_str() });
        self.client
            .send(self.client.request(Method::POST, url).json(&payload))
            .await?;
        Ok(())
    }
}
