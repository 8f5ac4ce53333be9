mod config;
mod generate;
mod git;
mod llm;
mod pr;
mod report;
mod respond;
mod review;
#[cfg(test)]
mod test_support;
mod workspace;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use crate::pr::ChangeRequest;
use crate::respond::RespondError;
use crate::workspace::{FileStore, LocalFiles, RemoteFiles};

/// Dev Agent: generates code, reviews pull requests, and resolves review
/// comments on GitHub with a language model.
#[derive(Parser, Debug)]
#[command(name = "dev-agent", version, about)]
struct Cli {
    /// Config file (defaults to .dev-agent.toml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the review comments on the pull request for a branch
    Respond {
        /// Head branch of the pull request (e.g. feature/my-branch)
        branch: String,

        /// Local clone to edit, commit, and push from instead of the GitHub contents API
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Optional output file path for a markdown summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Review the changed files of the pull request for a branch
    Review {
        /// Head branch of the pull request
        branch: String,

        /// Approve the pull request if no issues are found
        #[arg(long)]
        approve: bool,
    },

    /// Generate code for a task and commit it to a new branch
    Generate {
        /// Task description
        task: String,

        /// Path of the file to write, relative to the repository root
        output_file: String,

        /// Branch to create (used as given)
        branch: String,

        /// Open a pull request for the branch
        #[arg(long)]
        create_pr: bool,

        /// Pull request title (defaults to "feat: <task>")
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;
    debug!(model = %config.llm.model, api_url = %config.github.api_url, "configuration loaded");

    let github = pr::GitHubClient::new(&config)?;
    let repo = github.repository();
    debug!(owner = %repo.owner, name = %repo.name, "using repository");
    let generator = llm::OpenAiClient::new(&config.llm)?;

    match cli.command {
        Command::Respond {
            branch,
            workspace,
            output,
        } => {
            let _span = info_span!("respond", branch = %branch).entered();

            let pull = github.find_pull_request(&branch).await?;
            info!(number = pull.number, url = %pull.html_url, head = %pull.head_sha, "found pull request");
            let provider = github.pull_request(pull);

            let files: Box<dyn FileStore + '_> = match workspace {
                Some(dir) => {
                    info!(workspace = %dir.display(), "using local clone");
                    let repo = git::LocalRepo::new(
                        dir,
                        &config.git.remote,
                        &config.git.author_name,
                        &config.git.author_email,
                    );
                    Box::new(LocalFiles::new(repo, &branch))
                }
                None => Box::new(RemoteFiles::new(&provider, &branch)),
            };

            let outcome =
                respond::respond(&provider, files.as_ref(), &generator, config.llm.max_attempts).await;
            let (summary, aborted) = match outcome {
                Ok(summary) => (summary, None),
                Err(RespondError::Aborted { source, summary }) => (*summary, Some(source)),
                Err(e) => return Err(e.into()),
            };

            let built = report::build(
                summary,
                provider.pull_request(),
                aborted.as_ref().map(|e| e.to_string()),
            );
            report::output(&built, output.as_deref())?;

            if let Some(source) = aborted {
                return Err(source.into());
            }
            info!(changes = built.summary.changes_applied, "done");
        }

        Command::Review { branch, approve } => {
            let _span = info_span!("review", branch = %branch).entered();

            let pull = github.find_pull_request(&branch).await?;
            let provider = github.pull_request(pull);
            let summary = review::review(&provider, &generator, approve).await?;

            println!(
                "Reviewed {} files of {}: {} issues posted, verdict {}",
                summary.files_reviewed,
                provider.pull_request().html_url,
                summary.issues_posted,
                summary
                    .event
                    .map(|event| event.to_string())
                    .unwrap_or_default(),
            );
            for error in &summary.errors {
                eprintln!("  {}: {}", error.path, error.message);
            }
        }

        Command::Generate {
            task,
            output_file,
            branch,
            create_pr,
            title,
        } => {
            let _span = info_span!("generate", branch = %branch).entered();

            let request = generate::GenerateRequest {
                task,
                output_file,
                branch,
                base: config.git.default_branch.clone(),
                create_pr,
                title,
            };
            let generated = generate::generate(&github, &generator, &request).await?;

            let branch_state = if generated.branch_created { "new branch" } else { "existing branch" };
            println!(
                "Committed {} bytes to {} on {} ({branch_state})",
                generated.bytes, request.output_file, request.branch
            );
            if let Some(pr) = generated.pull_request {
                println!("Pull request: {}", pr.html_url);
            }
        }
    }

    Ok(())
}
