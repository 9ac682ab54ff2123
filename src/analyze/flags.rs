//! Silent-flag inference over raw installer bytes.
//!
//! Installer toolkits embed their accepted switches as string literals, either
//! ASCII or UTF-16LE in the resource section. Finding the literal is a strong
//! hint that the switch is honored, without ever running the installer.
use std::collections::BTreeSet;

/// Candidate switches in reporting order.
pub const CANDIDATE_FLAGS: &[&str] = &[
    "/S",
    "/silent",
    "/q",
    "/quiet",
    "-q",
    "--silent",
    "/verysilent",
    "/supressmsgboxes",
];

const NSIS_FLAG: &str = "/S";
const INNO_FLAG: &str = "/VERYSILENT";
const INNO_COMMAND_SUFFIX: &str = "/VERYSILENT /SUPPRESSMSGBOXES /NORESTART";

/// Return the candidates present in `buffer`, in candidate order, each once.
pub fn scan_flags(buffer: &[u8], candidates: &[&str]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    candidates
        .iter()
        .filter(|flag| seen.insert(**flag))
        .filter(|flag| contains_token(buffer, flag))
        .map(|flag| flag.to_string())
        .collect()
}

fn contains_token(buffer: &[u8], token: &str) -> bool {
    contains_subslice(buffer, token.as_bytes()) || contains_subslice(buffer, &wide_bytes(token))
}

fn wide_bytes(token: &str) -> Vec<u8> {
    token.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Compose the unattended command line for an EXE installer.
///
/// Precedence follows toolkit prevalence: NSIS `/S`, then Inno Setup, then
/// whatever switch was found first, then a bare invocation.
///
/// The scan records Inno's switch as lowercase `/verysilent`, so the Inno
/// check compares without case. An exact `/VERYSILENT` match would never fire.
pub fn synthesize_exe_command(path: &str, found: &[String]) -> String {
    let quoted = format!("\"{path}\"");
    if found.iter().any(|flag| flag == NSIS_FLAG) {
        return format!("{quoted} {NSIS_FLAG}");
    }
    if found.iter().any(|flag| flag.eq_ignore_ascii_case(INNO_FLAG)) {
        return format!("{quoted} {INNO_COMMAND_SUFFIX}");
    }
    match found.first() {
        Some(flag) => format!("{quoted} {flag}"),
        None => quoted,
    }
}
