//! CLI arg handling for hwcheck: help text and usage errors.
use std::process::Command;

fn run(args: &[&str]) -> (Option<i32>, String) {
    let out = Command::new(env!("CARGO_BIN_EXE_hwcheck"))
        .args(args)
        .output()
        .expect("run hwcheck");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    (out.status.code(), text)
}

#[test]
fn help_mentions_modes_and_short_flags() {
    let (code, text) = run(&["--help"]);
    assert_eq!(code, Some(0));
    for flag in [
        "--list", "-l", "--visualize", "-v", "--check", "-C", "--create-default-config",
        "--config", "-c", "--replay", "-r", "--json", "--debug", "--force",
    ] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn help_wins_over_other_flags() {
    let (code, text) = run(&["fan", "--check", "-c", "/nonexistent.json", "--help"]);
    assert_eq!(code, Some(0));
    assert!(text.contains("Usage:"));
}

#[test]
fn usage_errors_exit_2() {
    for args in [
        &[][..],
        &["gpu"][..],
        &["fan", "--check", "--visualize"][..],
        &["fan", "--replay"][..],
        &["fan", "--frobnicate"][..],
    ] {
        let (code, text) = run(args);
        assert_eq!(code, Some(2), "args {args:?}: {text}");
        assert!(text.contains("Usage:"), "args {args:?}: {text}");
    }
}
