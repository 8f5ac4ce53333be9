//! In-memory doubles for the text-generation and pull request providers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmError, TextGenerator};
use crate::pr::{ChangeRequest, PrError, PrFile, PullRequest, ReviewComment, ReviewEvent};

/// Helper to create a ReviewComment for testing.
pub fn comment(id: u64, path: &str, line: Option<usize>, body: &str) -> ReviewComment {
    ReviewComment {
        id,
        path: path.to_string(),
        line,
        body: body.to_string(),
        in_reply_to: None,
        commit_id: "c0ffee".to_string(),
    }
}

/// Wire-format answer for scripting the generator.
pub fn decision_json(change_needed: bool, suggested_change: &str, response: &str) -> String {
    serde_json::json!({
        "change_needed": change_needed,
        "suggested_change": suggested_change,
        "response": response,
    })
    .to_string()
}

/// Replays queued answers in order; runs dry with `EmptyResponse`.
#[derive(Default)]
pub struct ScriptedGenerator {
    answers: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, text: impl Into<String>) -> Self {
        self.answers.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, error: LlmError) -> Self {
        self.answers.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub path: String,
    pub content: String,
    pub git_ref: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineComment {
    pub path: String,
    pub line: usize,
    pub text: String,
}

/// In-memory pull request recording every write.
pub struct FakePullRequest {
    pr: PullRequest,
    comments: Vec<ReviewComment>,
    changed_files: Vec<PrFile>,
    files: Mutex<HashMap<String, String>>,
    undecodable: HashSet<String>,
    fail_replies: bool,
    fail_issue_comments: bool,
    fail_updates: bool,
    updates: Mutex<Vec<FileUpdate>>,
    replies: Mutex<Vec<(u64, String)>>,
    issue_comments: Mutex<Vec<String>>,
    line_comments: Mutex<Vec<LineComment>>,
    reviews: Mutex<Vec<(ReviewEvent, String)>>,
}

impl FakePullRequest {
    pub fn new() -> Self {
        Self {
            pr: PullRequest {
                number: 42,
                title: "Add invoice export".to_string(),
                html_url: "https://github.com/acme/billing/pull/42".to_string(),
                head_ref: "feature/x".to_string(),
                head_sha: "c0ffee".to_string(),
            },
            comments: Vec::new(),
            changed_files: Vec::new(),
            files: Mutex::new(HashMap::new()),
            undecodable: HashSet::new(),
            fail_replies: false,
            fail_issue_comments: false,
            fail_updates: false,
            updates: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            issue_comments: Mutex::new(Vec::new()),
            line_comments: Mutex::new(Vec::new()),
            reviews: Mutex::new(Vec::new()),
        }
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_changed_file(mut self, path: &str, status: &str) -> Self {
        self.changed_files.push(PrFile {
            filename: path.to_string(),
            status: status.to_string(),
            additions: 1,
            deletions: 0,
        });
        self
    }

    pub fn with_comments(mut self, comments: Vec<ReviewComment>) -> Self {
        self.comments = comments;
        self
    }

    pub fn with_undecodable(mut self, path: &str) -> Self {
        self.undecodable.insert(path.to_string());
        self
    }

    pub fn failing_replies(mut self) -> Self {
        self.fail_replies = true;
        self
    }

    pub fn failing_issue_comments(mut self) -> Self {
        self.fail_issue_comments = true;
        self
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn updates(&self) -> Vec<FileUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<(u64, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn issue_comments(&self) -> Vec<String> {
        self.issue_comments.lock().unwrap().clone()
    }

    pub fn line_comments(&self) -> Vec<LineComment> {
        self.line_comments.lock().unwrap().clone()
    }

    pub fn reviews(&self) -> Vec<(ReviewEvent, String)> {
        self.reviews.lock().unwrap().clone()
    }

    fn rejected(what: &str) -> PrError {
        PrError::Api {
            status: 422,
            message: format!("{what} rejected"),
        }
    }
}

#[async_trait]
impl ChangeRequest for FakePullRequest {
    fn pull_request(&self) -> &PullRequest {
        &self.pr
    }

    async fn list_review_comments(&self) -> Result<Vec<ReviewComment>, PrError> {
        Ok(self.comments.clone())
    }

    async fn get_file_content(&self, path: &str, git_ref: &str) -> Result<String, PrError> {
        if self.undecodable.contains(path) {
            return Err(PrError::Decode(format!("{path}: content is not valid UTF-8")));
        }
        self.file(path)
            .ok_or_else(|| PrError::NotFound(format!("{path} at {git_ref}")))
    }

    async fn update_file(
        &self,
        path: &str,
        content: &str,
        git_ref: &str,
        message: &str,
    ) -> Result<(), PrError> {
        if self.fail_updates {
            return Err(Self::rejected("update"));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        self.updates.lock().unwrap().push(FileUpdate {
            path: path.to_string(),
            content: content.to_string(),
            git_ref: git_ref.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn create_reply_comment(&self, comment: &ReviewComment, text: &str) -> Result<(), PrError> {
        if self.fail_replies {
            return Err(Self::rejected("reply"));
        }
        self.replies
            .lock()
            .unwrap()
            .push((comment.id, text.to_string()));
        Ok(())
    }

    async fn create_issue_comment(&self, text: &str) -> Result<(), PrError> {
        if self.fail_issue_comments {
            return Err(Self::rejected("issue comment"));
        }
        self.issue_comments.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<PrFile>, PrError> {
        Ok(self.changed_files.clone())
    }

    async fn create_line_comment(&self, path: &str, line: usize, text: &str) -> Result<(), PrError> {
        self.line_comments.lock().unwrap().push(LineComment {
            path: path.to_string(),
            line,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn submit_review(&self, event: ReviewEvent, body: &str) -> Result<(), PrError> {
        self.reviews.lock().unwrap().push((event, body.to_string()));
        Ok(())
    }
}
