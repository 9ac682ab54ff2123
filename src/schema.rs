//! Schema types for installer descriptions, script artifacts, and heal sessions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    Msi,
    Exe,
    Unknown,
}

/// What static analysis learned about one installer binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerDescription {
    pub source_path: PathBuf,
    pub package_kind: PackageKind,
    pub declared_properties: BTreeMap<String, String>,
    pub candidate_flags: Vec<String>,
    pub install_command: String,
}

/// One generation of an install script on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptArtifact {
    pub path: PathBuf,
    #[serde(skip)]
    pub source_text: String,
    pub generation_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    None,
    NonZeroExit,
    ProcessError,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub succeeded: bool,
    pub failure_reason: FailureReason,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Launch error or timeout note; empty when the script ran to completion.
    pub message: String,
    pub duration_ms: u128,
}

impl VerificationResult {
    /// Failure before anything was spawned (missing script, bad interpreter).
    pub fn process_error(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            failure_reason: FailureReason::ProcessError,
            exit_code: None,
            exit_signal: None,
            stdout: String::new(),
            stderr: String::new(),
            message: message.into(),
            duration_ms: 0,
        }
    }

    /// Combined stdout/stderr text handed to the error classifier.
    pub fn diagnostic(&self) -> String {
        let mut text = format!("Output: {}\nError: {}", self.stdout, self.stderr);
        if !self.message.is_empty() {
            text.push('\n');
            text.push_str(&self.message);
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixAction {
    ModifyParameter { name: String, new_value: u64 },
    InsertStatement { code: String, anchor_pattern: String },
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixDirective {
    pub action: FixAction,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealOutcome {
    Pending,
    Healed,
    Exhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealAttempt {
    pub artifact: ScriptArtifact,
    pub verification: VerificationResult,
    pub directive: Option<FixDirective>,
}

/// Audit trail for one `heal` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingSession {
    pub attempts: Vec<HealAttempt>,
    pub max_attempts: u32,
    pub outcome: HealOutcome,
}

/// A control captured from an installer window by the UI automation driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiElement {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub control_type: String,
    #[serde(default)]
    pub toggle_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSelector {
    pub title: String,
    pub control_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UiAction {
    Click { selector: UiSelector, reason: String },
}
