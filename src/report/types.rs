/// A file whose processing failed in part or in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub path: String,
    pub message: String,
}

/// A comment whose change or reply didn't go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentError {
    pub comment_id: u64,
    pub path: String,
    pub message: String,
}

/// Aggregate outcome of one pass over a pull request's review comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    /// Comments analysed (successfully or not)
    pub comments_handled: usize,
    /// Suggestions written to files
    pub changes_applied: usize,
    /// Replies posted, threaded or as a fallback comment
    pub replies_posted: usize,
    /// Replies that had to fall back to a general comment
    pub fallback_replies: usize,
    /// Files committed, in processing order
    pub files_touched: Vec<String>,
    pub file_errors: Vec<FileError>,
    pub comment_errors: Vec<CommentError>,
}

impl ProcessingSummary {
    pub fn error_count(&self) -> usize {
        self.file_errors.len() + self.comment_errors.len()
    }
}

/// Summary plus the pull request it belongs to, ready for output.
#[derive(Debug)]
pub struct Report {
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_url: String,
    pub summary: ProcessingSummary,
    /// Set when the run stopped early on a fatal provider error
    pub aborted: Option<String>,
}
