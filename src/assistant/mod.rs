//! Failure diagnosis for install scripts.
//!
//! The assistant maps a verification diagnostic to a [`FixDirective`] using a
//! fixed table of failure signatures, then rewrites the script text to apply
//! it. Rules are checked in table order and the first match wins; anything
//! unrecognized falls through to a plain retry so the heal loop always has a
//! next step.
mod patch;
mod ui;

pub use patch::apply_fix;
pub use ui::{decide_next_action, render_step_code};

use crate::schema::{FixAction, FixDirective};
use crate::script::{ADAPTIVE_WAIT, INSTALL_CALL_ANCHOR, TIMEOUT_PARAM};

/// Timeout written into a script after a timeout failure.
pub const WIDENED_TIMEOUT_SECS: u64 = 1200;

/// Decision seam between the heal loop and whatever proposes fixes.
pub trait Assistant {
    /// Propose a fix, or `None` when no directive can be produced.
    fn diagnose(&self, diagnostic: &str, script: &str) -> Option<FixDirective>;

    fn apply(&self, script: &str, directive: &FixDirective) -> String {
        apply_fix(script, directive)
    }
}

/// Deterministic assistant backed by [`FAILURE_RULES`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBook;

impl Assistant for RuleBook {
    fn diagnose(&self, diagnostic: &str, _script: &str) -> Option<FixDirective> {
        Some(classify(diagnostic))
    }
}

/// One signature family and the directive it maps to.
pub struct FailureRule {
    pub name: &'static str,
    pub signatures: &'static [&'static str],
    pub directive: fn() -> FixDirective,
}

impl FailureRule {
    fn matches(&self, diagnostic: &str) -> bool {
        self.signatures
            .iter()
            .any(|signature| diagnostic.contains(signature))
    }
}

/// Ordered rule table; add new signatures here.
pub const FAILURE_RULES: &[FailureRule] = &[
    FailureRule {
        name: "timeout",
        signatures: &["TimeoutExpired", "timed out"],
        directive: widen_timeout,
    },
    FailureRule {
        name: "element_not_found",
        signatures: &["ElementNotFoundError", "element not found"],
        directive: wait_before_install,
    },
];

/// Map a diagnostic to a directive. Never fails.
pub fn classify(diagnostic: &str) -> FixDirective {
    match FAILURE_RULES.iter().find(|rule| rule.matches(diagnostic)) {
        Some(rule) => {
            let directive = (rule.directive)();
            tracing::info!(rule = rule.name, reason = %directive.reason, "failure classified");
            directive
        }
        None => {
            tracing::info!("no failure signature matched; retrying");
            retry()
        }
    }
}

fn widen_timeout() -> FixDirective {
    FixDirective {
        action: FixAction::ModifyParameter {
            name: TIMEOUT_PARAM.to_string(),
            new_value: WIDENED_TIMEOUT_SECS,
        },
        reason: "Installation took longer than expected.".to_string(),
    }
}

fn wait_before_install() -> FixDirective {
    FixDirective {
        action: FixAction::InsertStatement {
            code: ADAPTIVE_WAIT.to_string(),
            anchor_pattern: INSTALL_CALL_ANCHOR.to_string(),
        },
        reason: "Element not found, likely timing issue.".to_string(),
    }
}

fn retry() -> FixDirective {
    FixDirective {
        action: FixAction::Retry,
        reason: "Transient error suspected.".to_string(),
    }
}
