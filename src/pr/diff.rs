use super::PrError;

/// Translate the `diff_hunk` GitHub attaches to a review comment into the
/// 1-based line of the new file the comment points at.
///
/// The hunk runs from its `@@ -a,b +c,d @@` header down to the commented
/// line, so the anchor is the new-file line reached by the last hunk line.
/// Removed lines don't advance the new-file counter; a comment on a removed
/// line resolves to the nearest preceding new-file line.
pub fn anchor_line(diff_hunk: &str) -> Result<Option<usize>, PrError> {
    let mut lines = diff_hunk.lines().skip_while(|line| !line.starts_with("@@"));
    let Some(header) = lines.next() else {
        return Ok(None);
    };
    let (_, _, new_start, _) = parse_hunk_header(header)?;

    let mut next_line = new_start;
    let mut last_seen = None;
    for line in lines {
        if line.starts_with('-') {
            continue;
        }
        last_seen = Some(next_line);
        next_line += 1;
    }

    Ok(last_seen.or(if new_start > 0 { Some(new_start) } else { None }))
}

pub(crate) fn parse_hunk_header(line: &str) -> Result<(usize, usize, usize, usize), PrError> {
    let header = line
        .trim()
        .strip_prefix("@@")
        .ok_or_else(|| PrError::Decode("Invalid hunk header".to_string()))?
        .trim();
    let header = match header.find("@@") {
        Some(end) => header[..end].trim(),
        None => header,
    };
    let mut parts = header.split_whitespace();
    let old_part = parts
        .next()
        .ok_or_else(|| PrError::Decode("Missing old range".to_string()))?;
    let new_part = parts
        .next()
        .ok_or_else(|| PrError::Decode("Missing new range".to_string()))?;

    let (old_start, old_count) = parse_range(old_part, '-')?;
    let (new_start, new_count) = parse_range(new_part, '+')?;

    Ok((old_start, old_count, new_start, new_count))
}

fn parse_range(part: &str, prefix: char) -> Result<(usize, usize), PrError> {
    let range = part
        .strip_prefix(prefix)
        .ok_or_else(|| PrError::Decode("Invalid range prefix".to_string()))?;
    let (start_str, count_str) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    let start = start_str
        .parse::<usize>()
        .map_err(|_| PrError::Decode(format!("Invalid range start in {}", part)))?;
    let count = count_str
        .parse::<usize>()
        .map_err(|_| PrError::Decode(format!("Invalid range count in {}", part)))?;
    Ok((start, count))
}
