pub mod types;

pub use types::{ProcessingSummary, Report};

use crate::pr::PullRequest;
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Attach pull request metadata to a processing summary.
pub fn build(summary: ProcessingSummary, pr: &PullRequest, aborted: Option<String>) -> Report {
    Report {
        pr_number: pr.number,
        pr_title: pr.title.clone(),
        pr_url: pr.html_url.clone(),
        summary,
        aborted,
    }
}

/// Output the report to the terminal (default) or to a markdown file.
#[instrument(skip(report), fields(pr = report.pr_number))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, render_markdown(report))?;
            Ok(())
        }
    }
}

/// PR #42: "Add invoice export"
/// https://github.com/acme/billing/pull/42
///
/// ═══ Review comments ═══
/// Comments handled: 3 | Changes applied: 2 | Replies posted: 3
/// Files touched:
///   • src/export.rs
/// Errors:
///   • src/legacy.rs: could not fetch content: ...
fn print_terminal_report(report: &Report) {
    let summary = &report.summary;
    println!();
    println!("PR #{}: \"{}\"", report.pr_number, report.pr_title);
    println!("{}", report.pr_url);
    println!();

    println!("═══ Review comments ═══");
    println!(
        "Comments handled: {} | Changes applied: {} | Replies posted: {}",
        summary.comments_handled, summary.changes_applied, summary.replies_posted
    );
    if summary.fallback_replies > 0 {
        println!(
            "  {} replies posted as general comments",
            summary.fallback_replies.to_string().yellow()
        );
    }

    if summary.files_touched.is_empty() {
        println!("Files touched: none");
    } else {
        println!("Files touched:");
        for path in &summary.files_touched {
            println!("  • {}", path.green());
        }
    }

    if summary.error_count() > 0 {
        println!("Errors:");
        for error in &summary.file_errors {
            println!("  • {}: {}", error.path.red(), error.message);
        }
        for error in &summary.comment_errors {
            println!("  • {} (comment {}): {}", error.path.red(), error.comment_id, error.message);
        }
    }
    println!();

    match &report.aborted {
        Some(reason) => println!("═══ {} ═══", format!("Aborted: {reason}").red().bold()),
        None if summary.error_count() > 0 => println!("═══ {} ═══", "Completed with errors".yellow().bold()),
        None => println!("═══ {} ═══", "Completed".green().bold()),
    }
    println!();
}

fn render_markdown(report: &Report) -> String {
    let summary = &report.summary;
    let mut md = String::new();
    md.push_str(&format!("# PR #{}: \"{}\"\n\n", report.pr_number, report.pr_title));
    md.push_str(&format!("{}\n\n", report.pr_url));
    md.push_str(&format!(
        "**Comments handled:** {} | **Changes applied:** {} | **Replies posted:** {}\n\n",
        summary.comments_handled, summary.changes_applied, summary.replies_posted
    ));

    md.push_str("## Files touched\n\n");
    if summary.files_touched.is_empty() {
        md.push_str("None.\n\n");
    } else {
        for path in &summary.files_touched {
            md.push_str(&format!("- `{}`\n", path));
        }
        md.push('\n');
    }

    if summary.error_count() > 0 {
        md.push_str("## Errors\n\n");
        for error in &summary.file_errors {
            md.push_str(&format!("- `{}`: {}\n", error.path, error.message));
        }
        for error in &summary.comment_errors {
            md.push_str(&format!(
                "- `{}` (comment {}): {}\n",
                error.path, error.comment_id, error.message
            ));
        }
        md.push('\n');
    }

    match &report.aborted {
        Some(reason) => md.push_str(&format!("## Aborted\n\n{}\n", reason)),
        None => md.push_str("## Completed\n"),
    }
    md
}
