//! `review`: ask the model to review each changed file and post what it finds.

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::llm::{prompts, LlmError, TextGenerator};
use crate::pr::{ChangeRequest, PrError, PrFile, ReviewEvent};
use crate::report::types::FileError;
use crate::respond::extract::repair;

const APPROVE_BODY: &str = "All changes look good! 👍";
const REVIEW_BODY: &str = "Review completed. Please check the comments for details.";
const INCOMPLETE_BODY: &str = "Review incomplete: some files could not be reviewed.";

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Failed to list changed files: {0}")]
    ListFiles(#[source] PrError),

    #[error("Review aborted: {0}")]
    Fatal(#[source] LlmError),

    #[error("Failed to submit review: {0}")]
    Submit(#[source] PrError),
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    has_issues: bool,
}

#[derive(Debug, Deserialize)]
struct Issue {
    line: usize,
    message: String,
}

#[derive(Debug, Default)]
pub struct ReviewSummary {
    pub files_reviewed: usize,
    pub issues_posted: usize,
    /// Files whose review couldn't be parsed and was posted verbatim
    pub unparsed_files: usize,
    pub errors: Vec<FileError>,
    pub event: Option<ReviewEvent>,
}

/// Review every file of the pull request and submit a verdict.
pub async fn review(
    provider: &dyn ChangeRequest,
    generator: &dyn TextGenerator,
    approve: bool,
) -> Result<ReviewSummary, ReviewError> {
    let files = provider.list_files().await.map_err(ReviewError::ListFiles)?;
    info!(files = files.len(), "reviewing pull request");

    let mut summary = ReviewSummary::default();
    let mut has_issues = false;
    for file in files.iter().filter(|f| !f.is_removed()) {
        let span = info_span!(
            "review_file",
            path = %file.filename,
            additions = file.additions,
            deletions = file.deletions
        );
        has_issues |= review_file(provider, generator, file, &mut summary)
            .instrument(span)
            .await?;
    }

    // A file that failed to review is not a clean file.
    let incomplete = !summary.errors.is_empty();
    let event = match (approve, has_issues, incomplete) {
        (_, true, _) => ReviewEvent::RequestChanges,
        (true, false, false) => ReviewEvent::Approve,
        _ => ReviewEvent::Comment,
    };
    let body = match event {
        ReviewEvent::Approve => APPROVE_BODY,
        _ if incomplete => INCOMPLETE_BODY,
        _ => REVIEW_BODY,
    };
    provider
        .submit_review(event, body)
        .await
        .map_err(ReviewError::Submit)?;
    info!(%event, issues = summary.issues_posted, "review submitted");

    summary.event = Some(event);
    Ok(summary)
}

/// Returns whether the file has issues.
async fn review_file(
    provider: &dyn ChangeRequest,
    generator: &dyn TextGenerator,
    file: &PrFile,
    summary: &mut ReviewSummary,
) -> Result<bool, ReviewError> {
    let path = file.filename.as_str();
    let head = &provider.pull_request().head_ref;
    let content = match provider.get_file_content(path, head).await {
        Ok(content) => content,
        Err(e) => {
            record(summary, path, format!("could not fetch content: {e}"));
            return Ok(false);
        }
    };

    let raw = match generator
        .complete(prompts::REVIEW_SYSTEM, &prompts::review_user(path, &content))
        .await
    {
        Ok(raw) => raw,
        Err(e) if e.is_fatal() => return Err(ReviewError::Fatal(e)),
        Err(e) => {
            record(summary, path, format!("review generation failed: {e}"));
            return Ok(false);
        }
    };
    summary.files_reviewed += 1;

    let verdict = match serde_json::from_str::<Verdict>(&repair(&raw)) {
        Ok(verdict) => verdict,
        Err(_) => {
            // Unstructured review: post it as is and assume there is something to look at.
            summary.unparsed_files += 1;
            if let Err(e) = provider
                .create_issue_comment(&format!("Review for {path}:\n\n{}", raw.trim()))
                .await
            {
                record(summary, path, format!("could not post review: {e}"));
            }
            return Ok(true);
        }
    };

    for issue in &verdict.issues {
        match provider.create_line_comment(path, issue.line, &issue.message).await {
            Ok(()) => summary.issues_posted += 1,
            Err(e) => record(summary, path, format!("could not comment on line {}: {e}", issue.line)),
        }
    }
    info!(issues = verdict.issues.len(), summary = %verdict.summary, "file reviewed");
    Ok(verdict.has_issues || !verdict.issues.is_empty())
}

fn record(summary: &mut ReviewSummary, path: &str, message: String) {
    warn!(%message, "review step failed");
    summary.errors.push(FileError {
        path: path.to_string(),
        message,
    });
}
