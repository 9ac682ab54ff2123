//! Verify-classify-patch loop for install scripts.
//!
//! Each attempt verifies the current generation. On failure the assistant
//! proposes a directive, the patched text is written as the next generation,
//! and the loop continues with it. The final failed verification is not
//! patched, so `max_attempts` verifications produce at most
//! `max_attempts - 1` new generations.
use crate::assistant::Assistant;
use crate::schema::{
    FixDirective, HealAttempt, HealOutcome, HealingSession, ScriptArtifact, VerificationResult,
};
use crate::script::{load_artifact, write_generation};
use crate::verify::ScriptVerifier;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Final state handed back to the caller.
#[derive(Debug, Clone)]
pub struct HealReport {
    pub outcome: HealOutcome,
    pub final_path: PathBuf,
    pub session: HealingSession,
}

pub struct Healer<'a> {
    verifier: &'a ScriptVerifier,
    assistant: &'a dyn Assistant,
    max_attempts: u32,
}

impl<'a> Healer<'a> {
    pub fn new(
        verifier: &'a ScriptVerifier,
        assistant: &'a dyn Assistant,
        max_attempts: u32,
    ) -> Self {
        Self {
            verifier,
            assistant,
            max_attempts,
        }
    }

    /// Heal `initial` until it verifies or the attempt budget is spent.
    ///
    /// Only reading the initial script or writing a new generation can fail;
    /// every verification outcome ends up in the report.
    pub fn heal(&self, initial: &Path) -> Result<HealReport> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        let mut session = HealingSession {
            attempts: Vec::new(),
            max_attempts: self.max_attempts,
            outcome: HealOutcome::Pending,
        };
        let mut current = load_artifact(initial)?;
        let mut attempt = 1;

        loop {
            tracing::info!(
                attempt,
                max_attempts = self.max_attempts,
                script = %current.path.display(),
                "heal attempt"
            );
            let verification = self.verifier.verify(&current.path);

            if verification.succeeded {
                tracing::info!(script = %current.path.display(), "script healed");
                return Ok(finish(session, current, verification, None, HealOutcome::Healed));
            }
            if attempt == self.max_attempts {
                tracing::warn!(
                    attempts = attempt,
                    script = %current.path.display(),
                    "heal attempts exhausted"
                );
                return Ok(finish(
                    session,
                    current,
                    verification,
                    None,
                    HealOutcome::Exhausted,
                ));
            }

            let diagnostic = verification.diagnostic();
            let Some(directive) = self.assistant.diagnose(&diagnostic, &current.source_text)
            else {
                tracing::warn!("assistant produced no directive; giving up");
                return Ok(finish(
                    session,
                    current,
                    verification,
                    None,
                    HealOutcome::Exhausted,
                ));
            };

            let patched = self.assistant.apply(&current.source_text, &directive);
            let next = write_generation(initial, attempt, patched)?;
            tracing::info!(
                generation = next.generation_index,
                script = %next.path.display(),
                "wrote patched script"
            );
            session.attempts.push(HealAttempt {
                artifact: current,
                verification,
                directive: Some(directive),
            });
            current = next;
            attempt += 1;
        }
    }
}

fn finish(
    mut session: HealingSession,
    artifact: ScriptArtifact,
    verification: VerificationResult,
    directive: Option<FixDirective>,
    outcome: HealOutcome,
) -> HealReport {
    let final_path = artifact.path.clone();
    session.attempts.push(HealAttempt {
        artifact,
        verification,
        directive,
    });
    session.outcome = outcome;
    HealReport {
        outcome,
        final_path,
        session,
    }
}
