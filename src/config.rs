//! Runtime configuration helpers.
//!
//! Settings come from an optional JSON file and are then overridden by CLI
//! flags, so one config can be shared across analyze/generate/heal runs.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Wall-clock ceiling for one script verification.
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 600;

/// Seconds a generated script allows the installer itself to run.
pub const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 300;

/// Verification attempts per heal request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Installers keep their flag strings near the header and resource section.
pub const DEFAULT_EXE_SCAN_LIMIT_BYTES: u64 = 5 * 1024 * 1024;

pub const DEFAULT_INTERPRETER: &str = "sh";

/// Environment fallback for the interpreter when neither flag nor config set it.
pub const INTERPRETER_ENV: &str = "AUTOINST_INTERPRETER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoinstConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,
    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_exe_scan_limit_bytes")]
    pub exe_scan_limit_bytes: u64,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_verify_timeout_secs() -> u64 {
    DEFAULT_VERIFY_TIMEOUT_SECS
}

fn default_install_timeout_secs() -> u64 {
    DEFAULT_INSTALL_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_exe_scan_limit_bytes() -> u64 {
    DEFAULT_EXE_SCAN_LIMIT_BYTES
}

impl Default for AutoinstConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            interpreter: None,
            verify_timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
            install_timeout_secs: DEFAULT_INSTALL_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            exe_scan_limit_bytes: DEFAULT_EXE_SCAN_LIMIT_BYTES,
            output_dir: None,
        }
    }
}

impl AutoinstConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    /// Interpreter argv, resolved from config, then environment, then default.
    pub fn interpreter_argv(&self) -> Result<Vec<String>> {
        let raw = match &self.interpreter {
            Some(command) => command.clone(),
            None => std::env::var(INTERPRETER_ENV)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string()),
        };
        let argv =
            shell_words::split(&raw).with_context(|| format!("parse interpreter command: {raw}"))?;
        if argv.is_empty() {
            return Err(anyhow!("interpreter command is empty"));
        }
        Ok(argv)
    }

    /// Directory generated scripts are written into.
    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("resolve current directory"),
        }
    }
}

/// Load a config file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<AutoinstConfig> {
    let Some(path) = path else {
        return Ok(AutoinstConfig::default());
    };
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: AutoinstConfig =
        serde_json::from_slice(&bytes).context("parse autoinst config JSON")?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs that would make the heal loop or verifier meaningless.
pub fn validate_config(config: &AutoinstConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported autoinst config schema_version {}",
            config.schema_version
        ));
    }
    if config.verify_timeout_secs == 0 {
        return Err(anyhow!("verify_timeout_secs must be greater than zero"));
    }
    if config.install_timeout_secs == 0 {
        return Err(anyhow!("install_timeout_secs must be greater than zero"));
    }
    if config.max_attempts == 0 {
        return Err(anyhow!("max_attempts must be at least 1"));
    }
    if config.exe_scan_limit_bytes == 0 {
        return Err(anyhow!("exe_scan_limit_bytes must be greater than zero"));
    }
    if let Some(interpreter) = &config.interpreter {
        if interpreter.trim().is_empty() {
            return Err(anyhow!("interpreter must not be empty when set"));
        }
    }
    Ok(())
}
