//! CLI argument parsing for the analyze/generate/heal workflow.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "autoinst",
    version,
    about = "Infer silent installs and heal the generated install scripts",
    after_help = "Commands:\n  analyze <installer>   Print the static analysis of an installer\n  generate <installer>  Write an unattended install script\n  verify <script>       Run a script once under the verifier\n  heal <script>         Verify, diagnose and patch until the script passes\n  run <installer>       analyze + generate (+ heal with --heal)\n  advise <elements>     Pick the next wizard click from captured UI elements\n\nExamples:\n  autoinst analyze ./setup.exe\n  autoinst run ./product.msi --heal --report heal.json\n  autoinst heal ./install_setup.exe.sh --max-attempts 5",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every subcommand; they override the config file.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// JSON config file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Interpreter command used to run scripts (default: sh)
    #[arg(long, value_name = "CMD", global = true)]
    pub interpreter: Option<String>,

    /// Verification timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Directory generated scripts are written to
    #[arg(long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Analyze(AnalyzeArgs),
    Generate(GenerateArgs),
    Verify(VerifyArgs),
    Heal(HealArgs),
    Run(RunArgs),
    Advise(AdviseArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Statically analyze an installer")]
pub struct AnalyzeArgs {
    /// Installer to analyze (.msi or .exe)
    #[arg(value_name = "INSTALLER")]
    pub installer: PathBuf,

    /// Write the description JSON here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Generate an unattended install script")]
pub struct GenerateArgs {
    #[arg(value_name = "INSTALLER")]
    pub installer: PathBuf,

    /// Script path (default: <output-dir>/install_<installer>.sh)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Run a script once and report the result")]
pub struct VerifyArgs {
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Emit the verification result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Verify and repair a script until it passes")]
pub struct HealArgs {
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    #[command(flatten)]
    pub options: HealOptions,
}

#[derive(Parser, Debug)]
#[command(about = "Analyze, generate, and optionally heal in one step")]
pub struct RunArgs {
    #[arg(value_name = "INSTALLER")]
    pub installer: PathBuf,

    /// Heal the generated script after writing it
    #[arg(long)]
    pub heal: bool,

    #[command(flatten)]
    pub options: HealOptions,
}

#[derive(Args, Debug)]
pub struct HealOptions {
    /// Verification attempts before giving up
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Write the heal session (every generation and result) as JSON
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Suggest the next wizard action from captured UI elements")]
pub struct AdviseArgs {
    /// JSON file: an element array, or {"elements": [...], "history": [...]}
    #[arg(value_name = "ELEMENTS_JSON")]
    pub elements: PathBuf,
}
