//! CLI tests for `ralph init`, `ralph prompt` and `ralph stacks`.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use ralph::exit_codes;

fn ralph(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ralph"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn ralph")
}

#[test]
fn init_then_prompt_uses_recorded_stack() {
    let temp = tempfile::tempdir().expect("tempdir");

    let init = ralph(temp.path(), &["init", "--stack", "phoenix"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(".ralph/config.toml").is_file());
    assert!(temp.path().join("IMPLEMENTATION_PLAN.md").is_file());
    assert!(temp.path().join("AGENTS.md").is_file());

    let prompt = ralph(temp.path(), &["prompt", "add a login page"]);
    assert_eq!(prompt.status.code(), Some(exit_codes::OK));
    let text = String::from_utf8_lossy(&prompt.stdout);
    assert!(text.contains("add a login page"));
    assert!(text.contains("## Stack: phoenix"));
    assert!(text.contains("mix credo --strict"));
}

#[test]
fn second_init_needs_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(
        ralph(temp.path(), &["init"]).status.code(),
        Some(exit_codes::OK)
    );
    fs::write(temp.path().join("IMPLEMENTATION_PLAN.md"), "- [x] mine\n").expect("write");

    let again = ralph(temp.path(), &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));

    let forced = ralph(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
    let plan = fs::read_to_string(temp.path().join("IMPLEMENTATION_PLAN.md")).expect("plan");
    assert!(plan.starts_with("# Implementation Plan"));
}

#[test]
fn stacks_lists_configured_and_builtin_selectors() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(temp.path().join(".ralph")).expect("mkdir");
    fs::write(
        temp.path().join(".ralph/config.toml"),
        "[stacks.rust]\ndescription = \"Rust crate\"\nverify = [\"cargo test\"]\n",
    )
    .expect("write config");

    let output = ralph(temp.path(), &["stacks"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("full (default) - "));
    assert!(text.contains("rust - Rust crate"));
    assert!(text.contains("    cargo test"));
}
