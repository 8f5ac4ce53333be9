use crate::pr::ReviewComment;

/// The structured decision the text-generation provider is asked for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeDecision {
    pub change_needed: bool,
    /// Full replacement for the anchored line, not a diff
    pub suggested_change: Option<String>,
    /// Reply addressed to the commenter
    pub response: String,
}

impl ChangeDecision {
    /// Single-line wire form: exactly `change_needed`, `suggested_change`, `response`.
    pub fn to_wire(&self) -> String {
        serde_json::json!({
            "change_needed": self.change_needed,
            "suggested_change": self.suggested_change.as_deref().unwrap_or_default(),
            "response": self.response,
        })
        .to_string()
    }
}

/// An accepted, not-yet-applied edit derived from one comment's analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub comment_id: u64,
    /// 1-based line the suggestion replaces
    pub position: usize,
    pub suggested_change: String,
}

impl PendingChange {
    /// Anchor the decision to the comment's line, defaulting to line 1.
    pub fn new(comment: &ReviewComment, decision: &ChangeDecision) -> Self {
        Self {
            comment_id: comment.id,
            position: comment.line.unwrap_or(1).max(1),
            suggested_change: decision.suggested_change.clone().unwrap_or_default(),
        }
    }
}

/// Review comments targeting one file, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBatch {
    pub path: String,
    pub comments: Vec<ReviewComment>,
}
