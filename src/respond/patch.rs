use std::collections::HashSet;

use super::types::PendingChange;

/// Split file content into lines. A trailing newline becomes a trailing
/// empty line so [`join_lines`] restores it exactly.
pub fn split_lines(content: &str) -> Vec<String> {
    content.split('\n').map(str::to_string).collect()
}

pub fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

/// Split `pending` into the changes to apply and those superseded by an
/// earlier change (in arrival order) at the same position.
pub fn partition_duplicates(pending: Vec<PendingChange>) -> (Vec<PendingChange>, Vec<PendingChange>) {
    let mut seen = HashSet::new();
    pending
        .into_iter()
        .partition(|change| seen.insert(change.position))
}

/// Apply pending changes to `original`, returning the new line sequence.
///
/// Each change replaces its whole 1-based line; a position past the last
/// line appends instead, ahead of the final newline when there is one.
/// Changes with an empty suggestion are skipped, and at a duplicated
/// position only the first change in arrival order applies. Changes are
/// applied from the highest position down so a replacement never shifts a
/// line still waiting to be patched.
pub fn apply(original: &[String], pending: &[PendingChange]) -> Vec<String> {
    let mut lines = original.to_vec();
    // The empty element `split_lines` leaves after a final newline is not a line.
    let terminated = lines.len() > 1 && lines.last().is_some_and(|last| last.is_empty());
    let terminator = if terminated { lines.pop() } else { None };

    let (mut effective, _) = partition_duplicates(
        pending
            .iter()
            .filter(|change| !change.suggested_change.is_empty())
            .cloned()
            .collect(),
    );
    effective.sort_by(|a, b| b.position.cmp(&a.position));

    let mut appended = Vec::new();
    for change in effective {
        let position = change.position.max(1);
        if position <= lines.len() {
            lines[position - 1] = change.suggested_change;
        } else {
            appended.push(change.suggested_change);
        }
    }
    // Appends keep ascending position order.
    lines.extend(appended.into_iter().rev());
    lines.extend(terminator);

    lines
}
