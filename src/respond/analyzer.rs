use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::extract::{extract, MalformedResponse};
use super::types::ChangeDecision;
use crate::llm::{prompts, LlmError, TextGenerator};

/// Total provider calls per comment unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: AttemptFailure },

    #[error("Text-generation provider unusable: {0}")]
    Fatal(#[source] LlmError),
}

/// Why a single attempt produced no decision.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error(transparent)]
    Malformed(#[from] MalformedResponse),

    #[error(transparent)]
    Provider(#[from] LlmError),
}

/// Decides, for one comment against one file, whether and how the file should change.
pub struct ChangeAnalyzer<'a> {
    generator: &'a dyn TextGenerator,
    max_attempts: u32,
}

impl<'a> ChangeAnalyzer<'a> {
    pub fn new(generator: &'a dyn TextGenerator, max_attempts: u32) -> Self {
        Self {
            generator,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Ask the provider for a decision, retrying malformed output and
    /// transient provider failures. A fatal provider error stops at once.
    #[instrument(skip_all, fields(comment_bytes = comment_body.len(), file_bytes = file_content.len()))]
    pub async fn analyze(
        &self,
        comment_body: &str,
        file_content: &str,
    ) -> Result<ChangeDecision, AnalysisError> {
        let user_prompt = prompts::respond_user(comment_body, file_content);
        let mut last = None;

        for attempt in 1..=self.max_attempts {
            debug!(attempt, "requesting change decision");
            let failure = match self.generator.complete(prompts::RESPOND_SYSTEM, &user_prompt).await {
                Ok(raw) => match extract(&raw) {
                    Ok(decision) => {
                        info!(attempt, change_needed = decision.change_needed, "analysis complete");
                        debug!(decision = %decision.to_wire());
                        return Ok(decision);
                    }
                    Err(e) => AttemptFailure::from(e),
                },
                Err(e) if e.is_fatal() => return Err(AnalysisError::Fatal(e)),
                Err(e) => AttemptFailure::from(e),
            };
            warn!(attempt, max_attempts = self.max_attempts, error = %failure, "analysis attempt failed");
            last = Some(failure);
        }

        Err(AnalysisError::Exhausted {
            attempts: self.max_attempts,
            last: last.unwrap_or(AttemptFailure::Provider(LlmError::EmptyResponse)),
        })
    }
}
