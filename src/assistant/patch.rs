//! Text-level script rewrites for fix directives.
//!
//! Patches never parse or run the script. A directive whose assumptions do not
//! hold for the given text (no anchor line, no parameter) leaves it unchanged.
use crate::schema::{FixAction, FixDirective};
use regex::{NoExpand, Regex};

/// Apply `directive` to `script`, returning the rewritten text.
pub fn apply_fix(script: &str, directive: &FixDirective) -> String {
    tracing::info!(reason = %directive.reason, "applying fix");
    match &directive.action {
        FixAction::ModifyParameter { name, new_value } => {
            modify_parameter(script, name, *new_value)
        }
        FixAction::InsertStatement {
            code,
            anchor_pattern,
        } => insert_statement(script, code, anchor_pattern),
        FixAction::Retry => script.to_string(),
    }
}

/// Rewrite every `<name> = <digits>` to `<name>=<value>`.
fn modify_parameter(script: &str, name: &str, value: u64) -> String {
    let pattern = format!(r"{}\s*=\s*\d+", regex::escape(name));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            tracing::warn!(%err, "parameter pattern rejected");
            return script.to_string();
        }
    };
    let replacement = format!("{name}={value}");
    re.replace_all(script, NoExpand(&replacement)).into_owned()
}

/// Insert `code` above the first line matching `anchor_pattern`, at its indentation.
fn insert_statement(script: &str, code: &str, anchor_pattern: &str) -> String {
    let anchor = match Regex::new(anchor_pattern) {
        Ok(anchor) => anchor,
        Err(err) => {
            tracing::warn!(%err, anchor_pattern, "anchor pattern rejected");
            return script.to_string();
        }
    };

    let mut out = String::with_capacity(script.len() + code.len() + 16);
    let mut inserted = false;
    for line in script.split_inclusive('\n') {
        if !inserted {
            let content = line.trim_end_matches(['\n', '\r']);
            if anchor.is_match(content) {
                let indent = &content[..content.len() - content.trim_start().len()];
                let ending = if line.ends_with("\r\n") { "\r\n" } else { "\n" };
                out.push_str(indent);
                out.push_str(code);
                out.push_str(ending);
                inserted = true;
            }
        }
        out.push_str(line);
    }
    if !inserted {
        tracing::debug!(anchor_pattern, "anchor not found; script unchanged");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ADAPTIVE_WAIT, INSTALL_CALL_ANCHOR};

    const SCRIPT: &str = "#!/bin/sh\ntimeout=1\n\nif true; then\n    timeout \"$timeout\" \"/tmp/setup.exe\" /S\nfi\ntimeout \"$timeout\" \"/tmp/other.exe\"\n";

    fn directive(action: FixAction) -> FixDirective {
        FixDirective {
            action,
            reason: "test".to_string(),
        }
    }

    fn timeout_values(text: &str) -> Vec<String> {
        let re = Regex::new(r"timeout\s*=\s*(\d+)").expect("regex");
        re.captures_iter(text)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    #[test]
    fn retry_is_identity_even_when_repeated() {
        let retry = directive(FixAction::Retry);
        let once = apply_fix(SCRIPT, &retry);
        let twice = apply_fix(&once, &retry);
        assert_eq!(once, SCRIPT);
        assert_eq!(twice, SCRIPT);
    }

    #[test]
    fn modify_timeout_rewrites_every_assignment() {
        let text = "timeout=1\nrun(timeout = 600)\nx(timeout=  5)\n";
        let fixed = apply_fix(
            text,
            &directive(FixAction::ModifyParameter {
                name: "timeout".to_string(),
                new_value: 1200,
            }),
        );
        assert_eq!(fixed, "timeout=1200\nrun(timeout=1200)\nx(timeout=1200)\n");
        assert_eq!(timeout_values(&fixed), vec!["1200", "1200", "1200"]);
    }

    #[test]
    fn modify_timeout_leaves_invocation_line_alone() {
        let fixed = apply_fix(
            SCRIPT,
            &directive(FixAction::ModifyParameter {
                name: "timeout".to_string(),
                new_value: 1200,
            }),
        );
        assert!(fixed.contains("\ntimeout=1200\n"));
        assert!(fixed.contains("    timeout \"$timeout\" \"/tmp/setup.exe\" /S\n"));
        assert_eq!(timeout_values(&fixed), vec!["1200"]);
    }

    #[test]
    fn insert_goes_before_first_anchor_with_its_indent() {
        let fixed = apply_fix(
            SCRIPT,
            &directive(FixAction::InsertStatement {
                code: ADAPTIVE_WAIT.to_string(),
                anchor_pattern: INSTALL_CALL_ANCHOR.to_string(),
            }),
        );
        let expected = SCRIPT.replace(
            "    timeout \"$timeout\" \"/tmp/setup.exe\"",
            &format!("    {ADAPTIVE_WAIT}\n    timeout \"$timeout\" \"/tmp/setup.exe\""),
        );
        assert_eq!(fixed, expected);
        assert_eq!(fixed.matches(ADAPTIVE_WAIT).count(), 1);
    }

    #[test]
    fn missing_anchor_is_a_no_op() {
        let text = "#!/bin/sh\necho nothing to see\n";
        let fixed = apply_fix(
            text,
            &directive(FixAction::InsertStatement {
                code: ADAPTIVE_WAIT.to_string(),
                anchor_pattern: INSTALL_CALL_ANCHOR.to_string(),
            }),
        );
        assert_eq!(fixed, text);
    }

    #[test]
    fn invalid_anchor_is_a_no_op() {
        let fixed = apply_fix(
            SCRIPT,
            &directive(FixAction::InsertStatement {
                code: "sleep 1".to_string(),
                anchor_pattern: "(unclosed".to_string(),
            }),
        );
        assert_eq!(fixed, SCRIPT);
    }

    #[test]
    fn insert_keeps_crlf_line_endings() {
        let text = "a\r\n  subprocess.run(x)\r\n";
        let fixed = apply_fix(
            text,
            &directive(FixAction::InsertStatement {
                code: "time.sleep(5)".to_string(),
                anchor_pattern: "subprocess\\.run".to_string(),
            }),
        );
        assert_eq!(fixed, "a\r\n  time.sleep(5)\r\n  subprocess.run(x)\r\n");
    }
}
