//! Fixed instructions sent to the text-generation provider.

pub const RESPOND_SYSTEM: &str = "You are a skilled code reviewer and developer. \
Analyze the review comment and decide whether the code needs to change. \
If a change is needed, supply the full replacement text for the commented line \
and a short reply to the reviewer. \
Respond with a single-line JSON object with exactly these keys: \
\"change_needed\" (boolean), \"suggested_change\" (string, empty when no change is needed), \
\"response\" (string addressed to the reviewer). \
Do not include any other text or formatting. \
Do not put newlines in the JSON structure; escape newlines inside string values.";

pub const REVIEW_SYSTEM: &str = "You are a skilled code reviewer. \
Review the file and report concrete problems only. \
Respond with a single-line JSON object with exactly these keys: \
\"issues\" (array of objects with \"line\" (1-based integer) and \"message\" (string)), \
\"summary\" (string), \"has_issues\" (boolean). \
Do not include any other text or formatting.";

pub const GENERATE_SYSTEM: &str = "You are a skilled software developer. \
Generate code for the following task. \
Return only the file content, without explanations.";

pub fn respond_user(comment_body: &str, file_content: &str) -> String {
    format!(
        "Code:\n{file_content}\n\nReview comment:\n{comment_body}\n\n\
         Decide whether changes are needed and answer in the specified JSON format."
    )
}

pub fn review_user(path: &str, file_content: &str) -> String {
    format!("File: {path}\n\n{file_content}")
}
