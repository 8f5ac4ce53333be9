/// Owner/name pair identifying the GitHub repository the agent works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

/// Metadata about a pull request fetched from the GitHub API.
#[derive(Debug, Clone)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// PR title
    pub title: String,
    /// Browser URL of the PR
    pub html_url: String,
    /// Head branch name
    pub head_ref: String,
    /// Commit SHA at the head of the branch
    pub head_sha: String,
}

/// A review comment attached to a file of a pull request.
///
/// `line` is the canonical anchor: a 1-based line number in the head
/// revision of `path`. Adapters convert provider-specific anchors (diff
/// positions) into this form; `None` means the comment carries no anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    pub id: u64,
    pub path: String,
    pub line: Option<usize>,
    pub body: String,
    /// Parent comment when this comment is itself a reply
    pub in_reply_to: Option<u64>,
    /// Commit the comment was made against
    pub commit_id: String,
}

/// A file touched by a pull request.
#[derive(Debug, Clone)]
pub struct PrFile {
    pub filename: String,
    /// "added", "modified", "removed", "renamed", ...
    pub status: String,
    pub additions: usize,
    pub deletions: usize,
}

impl PrFile {
    pub fn is_removed(&self) -> bool {
        self.status == "removed"
    }
}

/// Review verdict submitted on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewEvent {
    pub fn as_api_str(self) -> &'static str {
        match self {
            ReviewEvent::Approve => "APPROVE",
            ReviewEvent::RequestChanges => "REQUEST_CHANGES",
            ReviewEvent::Comment => "COMMENT",
        }
    }
}

impl std::fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_api_str())
    }
}
