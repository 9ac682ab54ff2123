//! Install script rendering and on-disk script generations.
//!
//! Scripts are POSIX shell. The heal loop relies on two shapes in the rendered
//! text: a `timeout=<seconds>` assignment and a single line that launches the
//! installer through coreutils `timeout`.
use crate::schema::{InstallerDescription, PackageKind, ScriptArtifact};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the timeout assignment in rendered scripts.
pub const TIMEOUT_PARAM: &str = "timeout";

/// Matches the line that launches the installer subprocess.
pub const INSTALL_CALL_ANCHOR: &str = r#"^\s*timeout\s+"\$timeout"\s"#;

/// Statement inserted before the install call when UI timing looks racy.
pub const ADAPTIVE_WAIT: &str = "sleep 5 # adaptive wait for slow UI";

/// Exit status coreutils `timeout` reports when it killed the command.
const TIMEOUT_EXIT_STATUS: i32 = 124;

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Seconds written into the `timeout=` assignment.
    pub install_timeout_secs: u64,
}

/// Render the install script for an analyzed installer.
pub fn render_script(description: &InstallerDescription, options: &GeneratorOptions) -> String {
    let name = installer_file_name(&description.source_path);
    let mut out = String::new();
    push_line(&mut out, "#!/bin/sh");
    push_line(
        &mut out,
        &format!("# Unattended install for {}", comment_safe(&shell_words::quote(&name))),
    );
    push_line(
        &mut out,
        &format!("# package kind: {}", kind_label(description.package_kind)),
    );
    if !description.candidate_flags.is_empty() {
        push_line(
            &mut out,
            &format!("# silent flags found: {}", description.candidate_flags.join(" ")),
        );
    }
    push_line(&mut out, "");
    push_line(
        &mut out,
        &format!("{TIMEOUT_PARAM}={}", options.install_timeout_secs),
    );
    push_line(&mut out, "");

    if description.install_command.trim().is_empty() {
        push_line(
            &mut out,
            &format!(
                "echo {} >&2",
                shell_words::quote(&format!("no unattended install command known for {name}"))
            ),
        );
        push_line(&mut out, "exit 1");
        return out;
    }

    push_line(
        &mut out,
        &format!(
            "echo {}",
            shell_words::quote(&format!("Starting unattended install of {name}"))
        ),
    );
    push_line(
        &mut out,
        &format!("timeout \"$timeout\" {}", shell_install_command(description)),
    );
    push_line(&mut out, "status=$?");
    push_line(&mut out, &format!("if [ \"$status\" -eq {TIMEOUT_EXIT_STATUS} ]; then"));
    push_line(
        &mut out,
        "    echo \"install timed out after ${timeout} seconds\" >&2",
    );
    push_line(&mut out, "    exit 1");
    push_line(&mut out, "fi");
    push_line(&mut out, "if [ \"$status\" -ne 0 ]; then");
    push_line(
        &mut out,
        "    echo \"install failed with exit code $status\" >&2",
    );
    push_line(&mut out, "    exit \"$status\"");
    push_line(&mut out, "fi");
    push_line(&mut out, "echo \"install complete\"");
    out
}

/// Default script file name for an installer, e.g. `install_setup.exe.sh`.
pub fn default_script_name(description: &InstallerDescription) -> String {
    format!(
        "install_{}.sh",
        installer_file_name(&description.source_path)
    )
}

/// Path of generation `generation` of `original`: `<stem>_v<n>.<ext>`.
///
/// Always derived from the original script so suffixes never stack.
pub fn generation_path(original: &Path, generation: u32) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "script".to_string());
    let file_name = match original.extension() {
        Some(ext) => format!("{stem}_v{generation}.{}", ext.to_string_lossy()),
        None => format!("{stem}_v{generation}"),
    };
    original.with_file_name(file_name)
}

/// Load the original script as generation 0.
pub fn load_artifact(path: &Path) -> Result<ScriptArtifact> {
    let source_text =
        fs::read_to_string(path).with_context(|| format!("read script {}", path.display()))?;
    Ok(ScriptArtifact {
        path: path.to_path_buf(),
        source_text,
        generation_index: 0,
    })
}

/// Persist a new generation next to `original`; earlier generations stay untouched.
pub fn write_generation(
    original: &Path,
    generation: u32,
    source_text: String,
) -> Result<ScriptArtifact> {
    let path = generation_path(original, generation);
    write_script(&path, &source_text)?;
    Ok(ScriptArtifact {
        path,
        source_text,
        generation_index: generation,
    })
}

/// Write script text and mark it executable where the platform supports it.
pub fn write_script(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("chmod {}", path.display()))?;
    }
    Ok(())
}

fn installer_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "installer".to_string())
}

/// The install command with its double-quoted installer path re-quoted for
/// `sh`, so `$`, backticks and quotes in the path stay literal.
fn shell_install_command(description: &InstallerDescription) -> String {
    let path = description.source_path.display().to_string();
    description
        .install_command
        .replacen(&format!("\"{path}\""), &shell_words::quote(&path), 1)
}

fn comment_safe(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

fn kind_label(kind: PackageKind) -> &'static str {
    match kind {
        PackageKind::Msi => "msi",
        PackageKind::Exe => "exe",
        PackageKind::Unknown => "unknown",
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}
