pub mod analyzer;
pub mod extract;
pub mod patch;
pub mod reply;
pub mod types;

pub use analyzer::{AnalysisError, ChangeAnalyzer};
pub use reply::{ReplyOutcome, ReplyPoster};
pub use types::{ChangeDecision, FileBatch, PendingChange};

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::llm::{LlmError, TextGenerator};
use crate::pr::{ChangeRequest, PrError, ReviewComment};
use crate::report::types::{CommentError, FileError, ProcessingSummary};
use crate::workspace::FileStore;

const UNANALYZED_REPLY: &str =
    "I couldn't analyze this comment automatically; it needs a human follow-up.";
const CHANGED_REPLY: &str = "Addressed in the latest commit.";
const UNCHANGED_REPLY: &str = "Reviewed; no change was needed.";
const NO_CONTENT_NOTE: &str =
    "_The change was not applied automatically because the file content could not be read._";
const SUPERSEDED_NOTE: &str =
    "_The change was not applied because an earlier comment already changes this line._";
const NOT_APPLIED_REPLY: &str = "Reviewed; the suggested change was not applied.";
const NOT_APPLIED_NOTE: &str = "_No change was committed for this comment._";

#[derive(Debug, Error)]
pub enum RespondError {
    #[error("Processing aborted: {source}")]
    Aborted {
        #[source]
        source: LlmError,
        /// What was done before the abort
        summary: Box<ProcessingSummary>,
    },

    #[error("Failed to list review comments: {0}")]
    ListComments(#[from] PrError),
}

/// Group comments by file path: files in first-seen order, comments in
/// arrival order within each file.
pub fn group_by_file(comments: Vec<ReviewComment>) -> Vec<FileBatch> {
    let mut batches: Vec<FileBatch> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for comment in comments {
        match index.get(&comment.path) {
            Some(&i) => batches[i].comments.push(comment),
            None => {
                index.insert(comment.path.clone(), batches.len());
                batches.push(FileBatch {
                    path: comment.path.clone(),
                    comments: vec![comment],
                });
            }
        }
    }
    batches
}

/// Keep only comments that start a thread; replies (including our own) are
/// conversation, not review requests.
pub fn thread_starters(comments: Vec<ReviewComment>) -> Vec<ReviewComment> {
    comments.into_iter().filter(|c| c.in_reply_to.is_none()).collect()
}

/// Run the whole pipeline against the review comments of `provider`'s pull request.
pub async fn respond(
    provider: &dyn ChangeRequest,
    files: &dyn FileStore,
    generator: &dyn TextGenerator,
    max_attempts: u32,
) -> Result<ProcessingSummary, RespondError> {
    let all = provider.list_review_comments().await?;
    let total = all.len();
    let comments = thread_starters(all);
    info!(total, threads = comments.len(), "loaded review comments");

    let dispatcher = Dispatcher::new(
        ChangeAnalyzer::new(generator, max_attempts),
        files,
        ReplyPoster::new(provider),
    );
    dispatcher.process(comments).await
}

struct PlannedReply<'c> {
    comment: &'c ReviewComment,
    text: String,
}

/// Drives analyze → patch → reply for each file, one comment at a time.
pub struct Dispatcher<'a> {
    analyzer: ChangeAnalyzer<'a>,
    files: &'a dyn FileStore,
    replies: ReplyPoster<'a>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(analyzer: ChangeAnalyzer<'a>, files: &'a dyn FileStore, replies: ReplyPoster<'a>) -> Self {
        Self {
            analyzer,
            files,
            replies,
        }
    }

    /// Process every comment. Per-file and per-comment failures are recorded
    /// in the summary; only a fatal provider error stops the run.
    pub async fn process(&self, comments: Vec<ReviewComment>) -> Result<ProcessingSummary, RespondError> {
        let mut summary = ProcessingSummary::default();
        let batches = group_by_file(comments);
        info!(files = batches.len(), "processing review comments");

        for batch in &batches {
            let span = info_span!("file", path = %batch.path, comments = batch.comments.len());
            if let Err(source) = self.process_file(batch, &mut summary).instrument(span).await {
                warn!(error = %source, "fatal provider error, aborting");
                return Err(RespondError::Aborted {
                    source,
                    summary: Box::new(summary),
                });
            }
        }

        info!(
            comments = summary.comments_handled,
            changes = summary.changes_applied,
            replies = summary.replies_posted,
            errors = summary.error_count(),
            "processing complete"
        );
        Ok(summary)
    }

    async fn process_file(&self, batch: &FileBatch, summary: &mut ProcessingSummary) -> Result<(), LlmError> {
        let content = match self.files.read(&batch.path).await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(error = %e, "could not fetch file content, replying only");
                summary.file_errors.push(FileError {
                    path: batch.path.clone(),
                    message: format!("could not fetch content: {e}"),
                });
                None
            }
        };

        let mut planned = Vec::with_capacity(batch.comments.len());
        let mut pending = Vec::new();
        for comment in &batch.comments {
            debug!(comment_id = comment.id, commit = %comment.commit_id, line = ?comment.line, "analyzing comment");
            let text = match self
                .analyzer
                .analyze(&comment.body, content.as_deref().unwrap_or_default())
                .await
            {
                Ok(decision) => {
                    let mut text = reply_text(&decision);
                    if decision.change_needed {
                        if content.is_some() {
                            pending.push(PendingChange::new(comment, &decision));
                        } else {
                            text = format!("{text}\n\n{NO_CONTENT_NOTE}");
                        }
                    }
                    text
                }
                Err(AnalysisError::Fatal(e)) => return Err(e),
                Err(e) => {
                    warn!(comment_id = comment.id, error = %e, "skipping change for comment");
                    summary.comment_errors.push(CommentError {
                        comment_id: comment.id,
                        path: batch.path.clone(),
                        message: e.to_string(),
                    });
                    UNANALYZED_REPLY.to_string()
                }
            };
            summary.comments_handled += 1;
            planned.push(PlannedReply { comment, text });
        }

        if let Some(content) = &content {
            self.apply_changes(&batch.path, content, pending, &mut planned, summary)
                .await;
        }

        for reply in &planned {
            match self.replies.reply(reply.comment, &reply.text).await {
                Ok(outcome) => {
                    summary.replies_posted += 1;
                    if outcome == ReplyOutcome::Fallback {
                        summary.fallback_replies += 1;
                    }
                }
                Err(e) => summary.comment_errors.push(CommentError {
                    comment_id: reply.comment.id,
                    path: batch.path.clone(),
                    message: e.to_string(),
                }),
            }
        }
        Ok(())
    }

    async fn apply_changes(
        &self,
        path: &str,
        content: &str,
        pending: Vec<PendingChange>,
        planned: &mut [PlannedReply<'_>],
        summary: &mut ProcessingSummary,
    ) {
        let (kept, superseded) = patch::partition_duplicates(pending);
        for change in &superseded {
            debug!(comment_id = change.comment_id, line = change.position, "change superseded");
            summary.comment_errors.push(CommentError {
                comment_id: change.comment_id,
                path: path.to_string(),
                message: format!("superseded by an earlier comment on line {}", change.position),
            });
            if let Some(reply) = planned.iter_mut().find(|r| r.comment.id == change.comment_id) {
                reply.text = format!("{}\n\n{SUPERSEDED_NOTE}", reply.text);
            }
        }

        let (applicable, empty): (Vec<_>, Vec<_>) =
            kept.into_iter().partition(|c| !c.suggested_change.is_empty());
        for change in &empty {
            mark_not_applied(planned, change.comment_id);
        }
        if applicable.is_empty() {
            debug!("no changes to apply");
            return;
        }

        let new_content = patch::join_lines(&patch::apply(&patch::split_lines(content), &applicable));
        if new_content == content {
            debug!("suggestions leave the file unchanged");
            for change in &applicable {
                mark_not_applied(planned, change.comment_id);
            }
            return;
        }

        let message = format!("Address review comments for {path}");
        match self.files.write(path, &new_content, &message).await {
            Ok(()) => {
                info!(changes = applicable.len(), "committed changes");
                summary.changes_applied += applicable.len();
                summary.files_touched.push(path.to_string());
            }
            Err(e) => {
                warn!(error = %e, "could not persist changes");
                summary.file_errors.push(FileError {
                    path: path.to_string(),
                    message: format!("could not persist changes: {e}"),
                });
                for change in &applicable {
                    mark_not_applied(planned, change.comment_id);
                }
            }
        }
    }
}

/// Keep a reply from claiming a change that never reached the branch.
fn mark_not_applied(planned: &mut [PlannedReply<'_>], comment_id: u64) {
    if let Some(reply) = planned.iter_mut().find(|r| r.comment.id == comment_id) {
        reply.text = if reply.text == CHANGED_REPLY {
            NOT_APPLIED_REPLY.to_string()
        } else {
            format!("{}\n\n{NOT_APPLIED_NOTE}", reply.text)
        };
    }
}

fn reply_text(decision: &ChangeDecision) -> String {
    let response = decision.response.trim();
    if !response.is_empty() {
        response.to_string()
    } else if decision.change_needed {
        CHANGED_REPLY.to_string()
    } else {
        UNCHANGED_REPLY.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{comment, decision_json, FakePullRequest, ScriptedGenerator};
    use crate::workspace::RemoteFiles;

    async fn run(
        provider: &FakePullRequest,
        generator: &ScriptedGenerator,
        comments: Vec<ReviewComment>,
    ) -> Result<ProcessingSummary, RespondError> {
        let files = RemoteFiles::new(provider, "feature/x");
        let dispatcher = Dispatcher::new(
            ChangeAnalyzer::new(generator, analyzer::DEFAULT_MAX_ATTEMPTS),
            &files,
            ReplyPoster::new(provider),
        );
        dispatcher.process(comments).await
    }

    #[test]
    fn test_group_by_file_preserves_order() {
        let batches = group_by_file(vec![
            comment(1, "b.py", Some(1), "one"),
            comment(2, "a.py", Some(1), "two"),
            comment(3, "b.py", Some(2), "three"),
        ]);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].path, "b.py");
        assert_eq!(batches[0].comments.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(batches[1].path, "a.py");
    }

    #[test]
    fn test_thread_starters_drop_replies() {
        let mut reply = comment(2, "a.py", Some(1), "Done.");
        reply.in_reply_to = Some(1);
        let kept = thread_starters(vec![comment(1, "a.py", Some(1), "rename"), reply]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }

    #[test]
    fn test_reply_text_defaults() {
        let mut decision = ChangeDecision::default();
        assert_eq!(reply_text(&decision), UNCHANGED_REPLY);
        decision.change_needed = true;
        assert_eq!(reply_text(&decision), CHANGED_REPLY);
        decision.response = "  Fixed.  ".to_string();
        assert_eq!(reply_text(&decision), "Fixed.");
    }

    #[tokio::test]
    async fn test_no_comments_touches_nothing() {
        let provider = FakePullRequest::new().with_file("app.py", "x = 1\n");
        let generator = ScriptedGenerator::new();

        let summary = run(&provider, &generator, vec![]).await.unwrap();
        assert_eq!(summary, ProcessingSummary::default());
        assert!(provider.updates().is_empty());
        assert!(provider.replies().is_empty());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_rename_scenario() {
        let provider = FakePullRequest::new().with_file("app.py", "x = 1\n");
        let generator = ScriptedGenerator::new().answer(
            r#"{"change_needed": true, "suggested_change": "clarity = 1", "response": "Renamed for clarity."}"#,
        );

        let summary = run(
            &provider,
            &generator,
            vec![comment(11, "app.py", Some(1), "this variable name is unclear")],
        )
        .await
        .unwrap();

        assert_eq!(provider.file("app.py").as_deref(), Some("clarity = 1\n"));
        let updates = provider.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].message, "Address review comments for app.py");
        assert_eq!(updates[0].git_ref, "feature/x");
        assert_eq!(provider.replies(), vec![(11, "Renamed for clarity.".to_string())]);

        assert_eq!(summary.comments_handled, 1);
        assert_eq!(summary.changes_applied, 1);
        assert_eq!(summary.replies_posted, 1);
        assert_eq!(summary.files_touched, vec!["app.py".to_string()]);
        assert_eq!(summary.error_count(), 0);
    }

    #[tokio::test]
    async fn test_several_comments_one_commit() {
        let provider = FakePullRequest::new().with_file("calc.py", "a = 1\nb = 2\nc = 3");
        let generator = ScriptedGenerator::new()
            .answer(decision_json(true, "alpha = 1", "Renamed a."))
            .answer(decision_json(false, "", "b is fine."))
            .answer(decision_json(true, "gamma = 3", "Renamed c."));

        let summary = run(
            &provider,
            &generator,
            vec![
                comment(1, "calc.py", Some(1), "rename a"),
                comment(2, "calc.py", Some(2), "rename b?"),
                comment(3, "calc.py", Some(3), "rename c"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(provider.file("calc.py").as_deref(), Some("alpha = 1\nb = 2\ngamma = 3"));
        assert_eq!(provider.updates().len(), 1);
        assert_eq!(summary.changes_applied, 2);
        assert_eq!(summary.replies_posted, 3);
        assert_eq!(provider.replies()[1], (2, "b is fine.".to_string()));
    }

    #[tokio::test]
    async fn test_no_change_needed_only_replies() {
        let provider = FakePullRequest::new().with_file("app.py", "x = 1\n");
        let generator = ScriptedGenerator::new().answer(decision_json(false, "", "Intentional."));

        let summary = run(&provider, &generator, vec![comment(1, "app.py", Some(1), "why?")])
            .await
            .unwrap();
        assert!(provider.updates().is_empty());
        assert_eq!(summary.changes_applied, 0);
        assert_eq!(provider.replies(), vec![(1, "Intentional.".to_string())]);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_batch() {
        let provider = FakePullRequest::new()
            .with_file("a.py", "x = 1\n")
            .with_file("b.py", "y = 2\n");
        let generator = ScriptedGenerator::new()
            .fail(LlmError::AccountInactive { message: "billing".into() })
            .answer(decision_json(true, "z = 3", "unused"));

        let error = run(
            &provider,
            &generator,
            vec![comment(1, "a.py", Some(1), "one"), comment(2, "b.py", Some(1), "two")],
        )
        .await
        .unwrap_err();

        match error {
            RespondError::Aborted { source, summary } => {
                assert!(matches!(source, LlmError::AccountInactive { .. }));
                assert_eq!(summary.comments_handled, 0);
                assert_eq!(summary.changes_applied, 0);
                assert_eq!(summary.replies_posted, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(generator.calls(), 1);
        assert!(provider.updates().is_empty());
        assert!(provider.replies().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_analysis_still_replies() {
        let provider = FakePullRequest::new().with_file("app.py", "x = 1\ny = 2\n");
        let generator = ScriptedGenerator::new()
            .answer("garbage")
            .answer("garbage")
            .answer("garbage")
            .answer(decision_json(true, "why = 2", "Renamed y."));

        let summary = run(
            &provider,
            &generator,
            vec![comment(1, "app.py", Some(1), "hmm"), comment(2, "app.py", Some(2), "rename y")],
        )
        .await
        .unwrap();

        assert_eq!(provider.file("app.py").as_deref(), Some("x = 1\nwhy = 2\n"));
        assert_eq!(summary.comments_handled, 2);
        assert_eq!(summary.changes_applied, 1);
        assert_eq!(summary.comment_errors.len(), 1);
        assert_eq!(summary.comment_errors[0].comment_id, 1);
        assert_eq!(
            provider.replies(),
            vec![(1, UNANALYZED_REPLY.to_string()), (2, "Renamed y.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_file_replies_without_writing() {
        let provider = FakePullRequest::new().with_file("b.py", "b = 1\n");
        let generator = ScriptedGenerator::new()
            .answer(decision_json(true, "a = 2", "Changed a."))
            .answer(decision_json(false, "", "No change."))
            .answer(decision_json(true, "bee = 1", "Renamed b."));

        let summary = run(
            &provider,
            &generator,
            vec![
                comment(1, "gone.py", Some(1), "change a"),
                comment(2, "gone.py", Some(2), "ok?"),
                comment(3, "b.py", Some(1), "rename b"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(summary.file_errors.len(), 1);
        assert_eq!(summary.file_errors[0].path, "gone.py");
        assert_eq!(summary.replies_posted, 3);
        assert_eq!(summary.files_touched, vec!["b.py".to_string()]);

        let replies = provider.replies();
        assert!(replies[0].1.starts_with("Changed a."));
        assert!(replies[0].1.contains(NO_CONTENT_NOTE));
        assert_eq!(replies[1].1, "No change.");
        assert_eq!(provider.updates().len(), 1);
        assert_eq!(provider.updates()[0].path, "b.py");

        // Analysis still ran, with empty content as context.
        assert!(generator.user_prompts()[0].starts_with("Code:\n\n"));
    }

    #[tokio::test]
    async fn test_undecodable_file_does_not_stop_next_file() {
        let provider = FakePullRequest::new()
            .with_file("ok.py", "v = 1\n")
            .with_undecodable("blob.bin");
        let generator = ScriptedGenerator::new()
            .answer(decision_json(false, "", "Binary file, skipping."))
            .answer(decision_json(true, "value = 1", "Renamed."));

        let summary = run(
            &provider,
            &generator,
            vec![comment(1, "blob.bin", None, "?"), comment(2, "ok.py", Some(1), "rename")],
        )
        .await
        .unwrap();

        assert_eq!(summary.file_errors.len(), 1);
        assert_eq!(provider.file("ok.py").as_deref(), Some("value = 1\n"));
    }

    #[tokio::test]
    async fn test_duplicate_positions_first_comment_wins() {
        let provider = FakePullRequest::new().with_file("app.py", "x = 1\n");
        let generator = ScriptedGenerator::new()
            .answer(decision_json(true, "first = 1", "First."))
            .answer(decision_json(true, "second = 1", "Second."));

        let summary = run(
            &provider,
            &generator,
            vec![comment(1, "app.py", Some(1), "a"), comment(2, "app.py", Some(1), "b")],
        )
        .await
        .unwrap();

        assert_eq!(provider.file("app.py").as_deref(), Some("first = 1\n"));
        assert_eq!(summary.changes_applied, 1);
        assert_eq!(summary.comment_errors.len(), 1);
        assert_eq!(summary.comment_errors[0].comment_id, 2);
        assert!(provider.replies()[1].1.contains(SUPERSEDED_NOTE));
    }

    #[tokio::test]
    async fn test_unanchored_comment_targets_first_line() {
        let provider = FakePullRequest::new().with_file("app.py", "#!/bin/sh\necho hi\n");
        let generator =
            ScriptedGenerator::new().answer(decision_json(true, "#!/usr/bin/env bash", "Use env."));

        run(&provider, &generator, vec![comment(1, "app.py", None, "portable shebang")])
            .await
            .unwrap();
        assert_eq!(provider.file("app.py").as_deref(), Some("#!/usr/bin/env bash\necho hi\n"));
    }

    #[tokio::test]
    async fn test_persist_failure_is_recorded_and_replies_posted() {
        let provider = FakePullRequest::new()
            .with_file("app.py", "x = 1\n")
            .failing_updates();
        let generator = ScriptedGenerator::new().answer(decision_json(true, "y = 1", "Renamed."));

        let summary = run(&provider, &generator, vec![comment(1, "app.py", Some(1), "rename")])
            .await
            .unwrap();
        assert_eq!(summary.changes_applied, 0);
        assert_eq!(summary.file_errors.len(), 1);
        assert!(summary.file_errors[0].message.contains("could not persist"));
        assert_eq!(summary.replies_posted, 1);
        assert_eq!(provider.replies(), vec![(1, format!("Renamed.\n\n{NOT_APPLIED_NOTE}"))]);
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_not_reported_as_addressed() {
        let provider = FakePullRequest::new().with_file("app.py", "x = 1\ny = 2\n");
        let generator = ScriptedGenerator::new()
            .answer(decision_json(true, "", ""))
            .answer(decision_json(true, "y = 2", "Already done."));

        let summary = run(
            &provider,
            &generator,
            vec![comment(1, "app.py", Some(1), "rename x"), comment(2, "app.py", Some(2), "rename y")],
        )
        .await
        .unwrap();

        assert!(provider.updates().is_empty());
        assert_eq!(summary.changes_applied, 0);
        assert_eq!(
            provider.replies(),
            vec![
                (1, NOT_APPLIED_REPLY.to_string()),
                (2, format!("Already done.\n\n{NOT_APPLIED_NOTE}")),
            ]
        );
    }

    #[tokio::test]
    async fn test_change_past_last_line_appends_before_final_newline() {
        let provider = FakePullRequest::new()
            .with_file("next.py", "x = 1\n")
            .with_file("far.py", "x = 1\n");
        let generator = ScriptedGenerator::new()
            .answer(decision_json(true, "y = 2", "Added y."))
            .answer(decision_json(true, "y = 2", "Added y."));

        let summary = run(
            &provider,
            &generator,
            vec![comment(1, "next.py", Some(2), "add y"), comment(2, "far.py", Some(5), "add y")],
        )
        .await
        .unwrap();

        assert_eq!(summary.changes_applied, 2);
        assert_eq!(provider.file("next.py").as_deref(), Some("x = 1\ny = 2\n"));
        assert_eq!(provider.file("far.py").as_deref(), Some("x = 1\ny = 2\n"));
    }

    #[tokio::test]
    async fn test_reply_failures_are_recorded() {
        let provider = FakePullRequest::new()
            .with_file("app.py", "x = 1\n")
            .failing_replies();
        let generator = ScriptedGenerator::new()
            .answer(decision_json(false, "", "Fine."))
            .answer(decision_json(false, "", "Also fine."));

        let summary = run(
            &provider,
            &generator,
            vec![comment(1, "app.py", Some(1), "a"), comment(2, "app.py", Some(1), "b")],
        )
        .await
        .unwrap();
        assert_eq!(summary.replies_posted, 2);
        assert_eq!(summary.fallback_replies, 2);
        assert_eq!(provider.issue_comments().len(), 2);

        let provider = FakePullRequest::new()
            .with_file("app.py", "x = 1\n")
            .failing_replies()
            .failing_issue_comments();
        let generator = ScriptedGenerator::new().answer(decision_json(false, "", "Fine."));
        let summary = run(&provider, &generator, vec![comment(1, "app.py", Some(1), "a")])
            .await
            .unwrap();
        assert_eq!(summary.replies_posted, 0);
        assert_eq!(summary.comment_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_respond_lists_and_filters_comments() {
        let mut own_reply = comment(2, "app.py", Some(1), "Renamed.");
        own_reply.in_reply_to = Some(1);
        let provider = FakePullRequest::new()
            .with_file("app.py", "x = 1\n")
            .with_comments(vec![comment(1, "app.py", Some(1), "rename x"), own_reply]);
        let generator = ScriptedGenerator::new().answer(decision_json(true, "count = 1", "Renamed."));
        let files = RemoteFiles::new(&provider, "feature/x");

        let summary = respond(&provider, &files, &generator, 3).await.unwrap();
        assert_eq!(summary.comments_handled, 1);
        assert_eq!(generator.calls(), 1);
        assert_eq!(provider.file("app.py").as_deref(), Some("count = 1\n"));
    }
}
