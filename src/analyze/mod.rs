//! Static installer analysis.
//!
//! Produces an [`InstallerDescription`] from the installer file alone. Nothing
//! here executes the installer, and read failures degrade the description
//! instead of aborting the run.
mod flags;
mod property_table;

pub use flags::{scan_flags, synthesize_exe_command, CANDIDATE_FLAGS};
pub use property_table::{MsiDatabase, PropertyTable};

use crate::schema::{InstallerDescription, PackageKind};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Switches every Windows Installer package honors.
pub const MSI_SILENT_FLAGS: &[&str] = &["/qn", "/norestart"];

/// Derive the package kind from the file extension only.
pub fn detect_kind(path: &Path) -> PackageKind {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("msi") => PackageKind::Msi,
        Some("exe") => PackageKind::Exe,
        _ => PackageKind::Unknown,
    }
}

pub fn msi_install_command(path: &Path) -> String {
    format!("msiexec /i \"{}\" /qn /norestart", path.display())
}

/// Installer classifier with its collaborators.
pub struct Analyzer {
    properties: Box<dyn PropertyTable>,
    scan_limit_bytes: u64,
}

impl Analyzer {
    pub fn new(scan_limit_bytes: u64) -> Self {
        Self {
            properties: Box::new(MsiDatabase),
            scan_limit_bytes,
        }
    }

    #[cfg(test)]
    pub fn with_property_table(mut self, properties: Box<dyn PropertyTable>) -> Self {
        self.properties = properties;
        self
    }

    pub fn analyze(&self, path: &Path) -> InstallerDescription {
        let source_path = absolute_path(path);
        let package_kind = detect_kind(&source_path);
        tracing::info!(path = %source_path.display(), kind = ?package_kind, "analyzing installer");

        let (declared_properties, candidate_flags, install_command) = match package_kind {
            PackageKind::Msi => self.analyze_msi(&source_path),
            PackageKind::Exe => self.analyze_exe(&source_path),
            PackageKind::Unknown => (BTreeMap::new(), Vec::new(), String::new()),
        };

        InstallerDescription {
            source_path,
            package_kind,
            declared_properties,
            candidate_flags,
            install_command,
        }
    }

    fn analyze_msi(&self, path: &Path) -> (BTreeMap<String, String>, Vec<String>, String) {
        let properties = match self.properties.read_properties(path) {
            Ok(properties) => properties,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "MSI property read failed");
                BTreeMap::from([("error".to_string(), format!("{err:#}"))])
            }
        };
        let flags = MSI_SILENT_FLAGS.iter().map(|flag| flag.to_string()).collect();
        (properties, flags, msi_install_command(path))
    }

    fn analyze_exe(&self, path: &Path) -> (BTreeMap<String, String>, Vec<String>, String) {
        let flags = match read_head(path, self.scan_limit_bytes) {
            Ok(buffer) => scan_flags(&buffer, CANDIDATE_FLAGS),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "EXE read failed");
                Vec::new()
            }
        };
        tracing::debug!(flags = ?flags, "silent flag scan complete");
        let command = synthesize_exe_command(&path.display().to_string(), &flags);
        (BTreeMap::new(), flags, command)
    }
}

fn read_head(path: &Path, limit: u64) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buffer = Vec::new();
    file.take(limit)
        .read_to_end(&mut buffer)
        .with_context(|| format!("read {}", path.display()))?;
    Ok(buffer)
}

fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FailingTable;

    impl PropertyTable for FailingTable {
        fn read_properties(&self, _path: &Path) -> Result<BTreeMap<String, String>> {
            Err(anyhow!("database is locked"))
        }
    }

    struct FixedTable;

    impl PropertyTable for FixedTable {
        fn read_properties(&self, _path: &Path) -> Result<BTreeMap<String, String>> {
            Ok(BTreeMap::from([
                ("ProductName".to_string(), "Widget".to_string()),
                ("ProductVersion".to_string(), "1.2.3".to_string()),
            ]))
        }
    }

    fn analyzer() -> Analyzer {
        Analyzer::new(crate::config::DEFAULT_EXE_SCAN_LIMIT_BYTES)
    }

    #[test]
    fn kind_comes_from_extension_case_insensitively() {
        assert_eq!(detect_kind(Path::new("Setup.EXE")), PackageKind::Exe);
        assert_eq!(detect_kind(Path::new("pkg.Msi")), PackageKind::Msi);
        assert_eq!(detect_kind(Path::new("archive.zip")), PackageKind::Unknown);
        assert_eq!(detect_kind(Path::new("noext")), PackageKind::Unknown);
    }

    #[test]
    fn msi_command_survives_property_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("product.msi");
        std::fs::write(&path, b"garbage").expect("write");

        let description = analyzer()
            .with_property_table(Box::new(FailingTable))
            .analyze(&path);

        assert_eq!(description.package_kind, PackageKind::Msi);
        assert_eq!(
            description.install_command,
            format!("msiexec /i \"{}\" /qn /norestart", description.source_path.display())
        );
        assert_eq!(description.candidate_flags, vec!["/qn", "/norestart"]);
        assert_eq!(
            description.declared_properties.get("error").map(String::as_str),
            Some("database is locked")
        );
    }

    #[test]
    fn msi_properties_are_recorded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("product.msi");
        std::fs::write(&path, b"").expect("write");

        let description = analyzer()
            .with_property_table(Box::new(FixedTable))
            .analyze(&path);

        assert_eq!(
            description.declared_properties.get("ProductName").map(String::as_str),
            Some("Widget")
        );
        assert!(!description.declared_properties.contains_key("error"));
    }

    #[test]
    fn real_msi_reader_degrades_on_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("corrupt.msi");
        std::fs::write(&path, b"not an msi").expect("write");

        let description = analyzer().analyze(&path);

        assert!(description.declared_properties.contains_key("error"));
        assert!(description.install_command.starts_with("msiexec /i "));
    }

    #[test]
    fn exe_without_flags_is_bare_quoted_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plain.exe");
        std::fs::write(&path, b"MZ nothing interesting here").expect("write");

        let description = analyzer().analyze(&path);

        assert!(description.candidate_flags.is_empty());
        assert_eq!(
            description.install_command,
            format!("\"{}\"", description.source_path.display())
        );
    }

    #[test]
    fn exe_with_nsis_and_inno_prefers_nsis() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("both.exe");
        std::fs::write(&path, b"MZ /S ... /verysilent ...").expect("write");

        let description = analyzer().analyze(&path);

        assert_eq!(description.candidate_flags, vec!["/S", "/verysilent"]);
        assert!(description.install_command.ends_with("\" /S"));
    }

    #[test]
    fn exe_scan_stops_at_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("late.exe");
        let mut bytes = vec![0u8; 64];
        bytes.extend(b"/S");
        std::fs::write(&path, &bytes).expect("write");

        let description = Analyzer::new(64).analyze(&path);

        assert!(description.candidate_flags.is_empty());
    }

    #[test]
    fn missing_exe_degrades_to_bare_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gone.exe");

        let description = analyzer().analyze(&path);

        assert!(description.candidate_flags.is_empty());
        assert!(!description.install_command.is_empty());
    }

    #[test]
    fn unknown_kind_has_empty_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("readme.txt");
        std::fs::write(&path, b"/S /quiet").expect("write");

        let description = analyzer().analyze(&path);

        assert_eq!(description.package_kind, PackageKind::Unknown);
        assert!(description.candidate_flags.is_empty());
        assert!(description.declared_properties.is_empty());
        assert!(description.install_command.is_empty());
    }
}
