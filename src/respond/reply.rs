use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::pr::{ChangeRequest, PrError, ReviewComment};

#[derive(Debug, Error)]
#[error("Could not reply to comment {comment_id}: threaded reply failed ({threaded}); fallback comment failed ({fallback})")]
pub struct PostError {
    pub comment_id: u64,
    pub threaded: PrError,
    pub fallback: PrError,
}

/// How a reply ended up on the pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Threaded,
    Fallback,
}

pub struct ReplyPoster<'a> {
    provider: &'a dyn ChangeRequest,
}

impl<'a> ReplyPoster<'a> {
    pub fn new(provider: &'a dyn ChangeRequest) -> Self {
        Self { provider }
    }

    /// Reply in the comment's thread, falling back to a general comment that
    /// quotes the original when threading fails.
    #[instrument(skip(self, comment, text), fields(comment_id = comment.id, path = %comment.path))]
    pub async fn reply(&self, comment: &ReviewComment, text: &str) -> Result<ReplyOutcome, PostError> {
        let threaded = match self.provider.create_reply_comment(comment, text).await {
            Ok(()) => {
                debug!("posted threaded reply");
                return Ok(ReplyOutcome::Threaded);
            }
            Err(e) => e,
        };
        warn!(error = %threaded, "threaded reply failed, posting general comment");

        match self.provider.create_issue_comment(&fallback_body(comment, text)).await {
            Ok(()) => Ok(ReplyOutcome::Fallback),
            Err(fallback) => Err(PostError {
                comment_id: comment.id,
                threaded,
                fallback,
            }),
        }
    }
}

/// General-comment body: the original comment quoted, then the reply.
fn fallback_body(comment: &ReviewComment, text: &str) -> String {
    let location = match comment.line {
        Some(line) => format!("`{}:{}`", comment.path, line),
        None => format!("`{}`", comment.path),
    };
    let quoted: Vec<String> = comment.body.lines().map(|line| format!("> {line}")).collect();
    format!("Re: review comment on {location}\n\n{}\n\n{text}", quoted.join("\n"))
}
