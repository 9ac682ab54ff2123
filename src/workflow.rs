//! Subcommand handlers.
//!
//! Each handler resolves configuration, calls into the core modules, and
//! prints a short transcript on stdout. Logs go to stderr via tracing.
use crate::analyze::Analyzer;
use crate::assistant::{decide_next_action, render_step_code, RuleBook};
use crate::cli::{
    AdviseArgs, AnalyzeArgs, Command, GenerateArgs, GlobalArgs, HealArgs, HealOptions, RootArgs,
    RunArgs, VerifyArgs,
};
use crate::config::{load_config, validate_config, AutoinstConfig};
use crate::heal::{HealReport, Healer};
use crate::schema::{HealOutcome, InstallerDescription, UiAction, UiElement};
use crate::script::{default_script_name, render_script, write_script, GeneratorOptions};
use crate::util::{read_json, truncate_string, write_json};
use crate::verify::ScriptVerifier;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Diagnostic output shown on the terminal is capped; reports keep it all.
const MAX_PRINTED_OUTPUT_BYTES: usize = 4096;

pub fn run(args: RootArgs) -> Result<ExitCode> {
    let config = resolve_config(&args.global)?;
    match args.command {
        Command::Analyze(args) => cmd_analyze(&config, args),
        Command::Generate(args) => cmd_generate(&config, args),
        Command::Verify(args) => cmd_verify(&config, args),
        Command::Heal(args) => cmd_heal(&config, args),
        Command::Run(args) => cmd_run(&config, args),
        Command::Advise(args) => cmd_advise(args),
    }
}

fn resolve_config(global: &GlobalArgs) -> Result<AutoinstConfig> {
    let mut config = load_config(global.config.as_deref())?;
    if let Some(interpreter) = &global.interpreter {
        config.interpreter = Some(interpreter.clone());
    }
    if let Some(timeout_secs) = global.timeout_secs {
        config.verify_timeout_secs = timeout_secs;
    }
    if let Some(output_dir) = &global.output_dir {
        config.output_dir = Some(output_dir.clone());
    }
    validate_config(&config)?;
    Ok(config)
}

fn cmd_analyze(config: &AutoinstConfig, args: AnalyzeArgs) -> Result<ExitCode> {
    let description = analyze_installer(config, &args.installer)?;
    match &args.out {
        Some(out) => {
            write_json(out, &description)?;
            println!("Wrote installer description to {}", out.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&description)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_generate(config: &AutoinstConfig, args: GenerateArgs) -> Result<ExitCode> {
    let description = analyze_installer(config, &args.installer)?;
    let path = generate_script(config, &description, args.out)?;
    println!("Wrote install script to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_verify(config: &AutoinstConfig, args: VerifyArgs) -> Result<ExitCode> {
    let verifier = build_verifier(config)?;
    let result = verifier.verify(&args.script);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "{}",
            if result.succeeded {
                "VERIFICATION PASSED"
            } else {
                "VERIFICATION FAILED"
            }
        );
        println!(
            "{}",
            truncate_string(&result.diagnostic(), MAX_PRINTED_OUTPUT_BYTES)
        );
    }
    Ok(exit_code(result.succeeded))
}

fn cmd_heal(config: &AutoinstConfig, args: HealArgs) -> Result<ExitCode> {
    let report = heal_script(config, &args.script, &args.options)?;
    Ok(exit_code(report.outcome == HealOutcome::Healed))
}

fn cmd_run(config: &AutoinstConfig, args: RunArgs) -> Result<ExitCode> {
    let description = analyze_installer(config, &args.installer)?;
    println!("{}", serde_json::to_string_pretty(&description)?);
    let path = generate_script(config, &description, None)?;
    println!("Wrote install script to {}", path.display());
    if !args.heal {
        return Ok(ExitCode::SUCCESS);
    }
    let report = heal_script(config, &path, &args.options)?;
    Ok(exit_code(report.outcome == HealOutcome::Healed))
}

/// Accepts either a bare element list or elements plus prior actions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AdviseInput {
    Elements(Vec<UiElement>),
    Request {
        elements: Vec<UiElement>,
        #[serde(default)]
        history: Vec<UiAction>,
    },
}

#[derive(Debug, Serialize)]
struct Advice {
    action: Option<UiAction>,
    code: String,
}

fn cmd_advise(args: AdviseArgs) -> Result<ExitCode> {
    let input: AdviseInput = read_json(&args.elements)?;
    let (elements, history) = match input {
        AdviseInput::Elements(elements) => (elements, Vec::new()),
        AdviseInput::Request { elements, history } => (elements, history),
    };
    let action = decide_next_action(&elements, &history);
    let code = render_step_code(action.as_ref());
    println!(
        "{}",
        serde_json::to_string_pretty(&Advice { action, code })?
    );
    Ok(ExitCode::SUCCESS)
}

fn analyze_installer(config: &AutoinstConfig, installer: &Path) -> Result<InstallerDescription> {
    if !installer.is_file() {
        return Err(anyhow!("installer not found: {}", installer.display()));
    }
    Ok(Analyzer::new(config.exe_scan_limit_bytes).analyze(installer))
}

fn generate_script(
    config: &AutoinstConfig,
    description: &InstallerDescription,
    out: Option<PathBuf>,
) -> Result<PathBuf> {
    let path = match out {
        Some(path) => path,
        None => config.output_dir()?.join(default_script_name(description)),
    };
    let options = GeneratorOptions {
        install_timeout_secs: config.install_timeout_secs,
    };
    write_script(&path, &render_script(description, &options))?;
    Ok(path)
}

fn heal_script(config: &AutoinstConfig, script: &Path, options: &HealOptions) -> Result<HealReport> {
    let verifier = build_verifier(config)?;
    let max_attempts = options.max_attempts.unwrap_or(config.max_attempts);
    let report = Healer::new(&verifier, &RuleBook, max_attempts).heal(script)?;

    if let Some(path) = &options.report {
        write_json(path, &report.session)?;
        println!("Wrote heal report to {}", path.display());
    }
    match report.outcome {
        HealOutcome::Healed => println!("HEALED: {}", report.final_path.display()),
        _ => {
            println!(
                "EXHAUSTED after {} attempt(s): {}",
                report.session.attempts.len(),
                report.final_path.display()
            );
            if let Some(last) = report.session.attempts.last() {
                println!(
                    "{}",
                    truncate_string(&last.verification.diagnostic(), MAX_PRINTED_OUTPUT_BYTES)
                );
            }
        }
    }
    Ok(report)
}

fn build_verifier(config: &AutoinstConfig) -> Result<ScriptVerifier> {
    Ok(ScriptVerifier::new(
        config.interpreter_argv()?,
        config.verify_timeout(),
    ))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
