// trustedhtml/tests/cli_integration_tests.rs
//! Command-line integration tests for the `trustedhtml` binary.
//!
//! The binary is run with `assert_cmd`; inputs, policies, outputs and audit
//! logs live in `tempfile` locations so every test is isolated. stderr is
//! not a terminal under test, so status lines carry no color codes.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

fn run_trustedhtml(input: &str, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("trustedhtml").unwrap();
    cmd.env_remove("TRUSTEDHTML_POLICY");
    cmd.args(args).write_stdin(input).assert()
}

#[test]
fn test_sanitizes_stdin_to_stdout() {
    run_trustedhtml("Hello <b onclick=\"x()\">world</b><script>alert(1)</script>", &[])
        .success()
        .stdout("<p>Hello <b>world</b></p>\n");
}

#[test]
fn test_text_and_json_formats() -> Result<()> {
    run_trustedhtml("<p>Fish &amp; chips</p>", &["--format", "text"])
        .success()
        .stdout("Fish & chips\n");

    let assert = run_trustedhtml("<p>Fish &amp; chips</p>", &["--format", "json"]).success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(json["html"], "<p>Fish &amp; chips</p>");
    assert_eq!(json["plain_text"], "Fish & chips");
    Ok(())
}

#[test]
fn test_deny_removes_elements() {
    run_trustedhtml("<p>keep <img src=\"http://x.org/a.png\"><a href=\"http://x.org\">link</a></p>", &["--deny", "img,a"])
        .success()
        .stdout(predicate::str::contains("<img").not())
        .stdout(predicate::str::contains("<a ").not())
        .stdout(predicate::str::contains("<p>keep"));
}

#[test]
fn test_custom_policy_is_merged_over_defaults() -> Result<()> {
    let mut policy = NamedTempFile::new()?;
    policy.write_all(b"elements:\n  mark:\n    - title: { type: text }\n")?;
    let policy_path = policy.path().to_str().unwrap();

    run_trustedhtml("<mark title=\"t\" id=\"x\">hi</mark> and <b>bold</b>", &["--policy", policy_path])
        .success()
        .stdout("<p><mark title=\"t\">hi</mark> and <b>bold</b></p>\n");
    Ok(())
}

#[test]
fn test_invalid_policy_fails_without_output() -> Result<()> {
    let mut policy = NamedTempFile::new()?;
    policy.write_all(b"elements:\n  p:\n    - title: { type: regexp, pattern: \"(\" }\n")?;
    let policy_path = policy.path().to_str().unwrap();

    run_trustedhtml("<p>x</p>", &["--policy", policy_path])
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("invalid pattern"));
    Ok(())
}

#[test]
fn test_input_and_output_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input_path = dir.path().join("in.html");
    let output_path = dir.path().join("out.html");
    fs::write(&input_path, "<div style=\"color: red; position: fixed\">x</div>")?;

    run_trustedhtml(
        "",
        &["-i", input_path.to_str().unwrap(), "-o", output_path.to_str().unwrap()],
    )
    .success()
    .stdout("")
    .stderr(predicate::str::contains("Writing sanitized content to file"));

    assert_eq!(fs::read_to_string(&output_path)?, "<div style=\"color: red;\">x</div>\n");
    Ok(())
}

#[test]
fn test_non_convergent_input_fails_and_writes_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output_path = dir.path().join("out.html");

    run_trustedhtml("&#&#&#53;&#52;;&#&#53;&#51;;;", &["-o", output_path.to_str().unwrap()])
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("did not converge"));

    assert!(!output_path.exists());
    Ok(())
}

#[test]
fn test_audit_log_receives_json_lines() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let audit_path = dir.path().join("audit.jsonl");

    run_trustedhtml("<p>one</p>", &["--audit-log", audit_path.to_str().unwrap(), "-q"]).success();
    run_trustedhtml("<p>two</p>", &["--audit-log", audit_path.to_str().unwrap(), "-q"]).success();

    let contents = fs::read_to_string(&audit_path)?;
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    let last: serde_json::Value = serde_json::from_str(lines[1])?;
    assert_eq!(last["input"], "<p>two</p>");
    assert_eq!(last["accepted"], true);
    Ok(())
}

#[test]
fn test_trace_logs_decisions_to_stderr() {
    run_trustedhtml("<p dir=\"sideways\">x</p><blink>y</blink>", &["--trace"])
        .success()
        .stdout("<p>x</p>\n")
        .stderr(predicate::str::contains("blink"));
}

#[test]
fn test_quiet_suppresses_status_lines() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output_path = dir.path().join("out.html");
    run_trustedhtml("<script>x</script>", &["-q", "-o", output_path.to_str().unwrap()])
        .success()
        .stderr("");
    assert_eq!(fs::read_to_string(&output_path)?, "\n");
    Ok(())
}
