//! CLI tests for `ralph run`.
//!
//! Spawns the ralph binary against an `sh` script standing in for the agent and
//! verifies invocation counts and exit codes.

use std::fs;
use std::process::{Command, Output};

use ralph::exit_codes;
use ralph::io::config::{AgentConfig, RalphConfig};
use ralph::test_support::TestProject;

/// Bumps `count` in the project root on every invocation and leaves `$n` set.
const COUNTER: &str = "n=$(cat count 2>/dev/null || echo 0); n=$((n+1)); echo $n > count;";

fn ralph(project: &TestProject, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ralph"))
        .current_dir(project.path())
        .args(args)
        .output()
        .expect("spawn ralph")
}

fn invocations(project: &TestProject) -> u32 {
    project
        .read("count")
        .map(|s| s.trim().parse().expect("count"))
        .unwrap_or(0)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn completes_when_sentinel_appears_on_third_iteration() {
    let project = TestProject::with_script(&format!(
        "{COUNTER} echo \"working $n\"; if [ $n -ge 3 ]; then echo RALPH_COMPLETE; fi"
    ))
    .expect("project");

    let output = ralph(&project, &["run", "add a button", "3", "react"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(invocations(&project), 3);
    assert!(stdout(&output).contains("complete after 3 iteration(s)"));
}

#[test]
fn exhausts_budget_without_sentinel() {
    let project =
        TestProject::with_script(&format!("{COUNTER} echo still working")).expect("project");

    let output = ralph(&project, &["run", "add a button", "2", "react"]);

    assert_eq!(output.status.code(), Some(exit_codes::EXHAUSTED));
    assert_eq!(invocations(&project), 2);
    assert!(stdout(&output).contains("stopped after 2 iteration(s)"));
}

#[test]
fn failing_agent_does_not_abort_the_run() {
    let project = TestProject::with_script(&format!(
        "{COUNTER} if [ $n -eq 1 ]; then echo boom 1>&2; exit 1; fi; echo RALPH_COMPLETE"
    ))
    .expect("project");

    let output = ralph(&project, &["run", "fix the build", "5", "phoenix"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(invocations(&project), 2);
    assert!(stdout(&output).contains("agent exited with status 1; continuing"));
}

#[test]
fn blocked_marker_warns_but_keeps_going() {
    let project = TestProject::with_script(&format!(
        "{COUNTER} if [ $n -eq 2 ]; then echo '[BLOCKED] need an API key'; fi"
    ))
    .expect("project");

    let output = ralph(&project, &["run", "add a button", "5", "react"]);

    assert_eq!(output.status.code(), Some(exit_codes::EXHAUSTED));
    assert_eq!(invocations(&project), 5);
    let out = stdout(&output);
    assert!(out.contains("[BLOCKED] reported in iteration 2"));
    assert!(out.contains("blocked tasks were reported in iteration(s) 2"));
}

#[test]
fn zero_or_negative_budget_runs_nothing() {
    let project = TestProject::with_script(&format!("{COUNTER} echo RALPH_COMPLETE"))
        .expect("project");

    for budget in ["0", "-3"] {
        let output = ralph(&project, &["run", "add a button", budget]);
        assert_eq!(output.status.code(), Some(exit_codes::EXHAUSTED));
    }
    assert_eq!(invocations(&project), 0);
}

#[test]
fn prompt_is_written_to_agent_stdin() {
    let project =
        TestProject::with_script("cat > prompt.txt; echo RALPH_COMPLETE").expect("project");

    let output = ralph(&project, &["run", "add a button", "1", "react", "--quiet"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let prompt = project.read("prompt.txt").expect("prompt");
    assert!(prompt.contains("add a button"));
    assert!(prompt.contains("npx tsc --noEmit"));
    // --quiet keeps agent output off the console.
    assert!(!stdout(&output).contains("RALPH_COMPLETE"));
}

#[test]
fn writes_iteration_logs() {
    let project = TestProject::with_script("echo hello from agent; echo RALPH_COMPLETE")
        .expect("project");

    let output = ralph(&project, &["run", "add a button", "2"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let runs: Vec<_> = fs::read_dir(project.paths().iterations_dir)
        .expect("iterations dir")
        .collect::<Result<_, _>>()
        .expect("entries");
    assert_eq!(runs.len(), 1);
    let iter_dir = runs[0].path().join("1");
    let log = fs::read_to_string(iter_dir.join("output.log")).expect("output log");
    assert!(log.contains("hello from agent"));
    assert!(iter_dir.join("meta.json").is_file());
}

#[test]
fn unknown_stack_is_rejected_before_invoking() {
    let project = TestProject::with_script(&format!("{COUNTER} echo RALPH_COMPLETE"))
        .expect("project");

    let output = ralph(&project, &["run", "add a button", "3", "cobol"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert_eq!(invocations(&project), 0);
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown stack"));
}

#[test]
fn blank_task_is_rejected() {
    let project = TestProject::with_script(&format!("{COUNTER} echo RALPH_COMPLETE"))
        .expect("project");

    let output = ralph(&project, &["run", "   ", "3"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert_eq!(invocations(&project), 0);
}

#[test]
fn sentinel_after_output_limit_still_completes() {
    let cfg = RalphConfig {
        delay_secs: 0,
        output_limit_bytes: 64,
        agent: AgentConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "i=0; while [ $i -lt 100 ]; do echo noisy build output $i; i=$((i+1)); done; \
                 echo RALPH_COMPLETE"
                    .to_string(),
            ],
        },
        ..RalphConfig::default()
    };
    let project = TestProject::with_config(&cfg).expect("project");

    let output = ralph(&project, &["run", "add a button", "2", "--quiet"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("complete after 1 iteration(s)"));
}

#[test]
fn agent_stderr_is_echoed_to_stderr() {
    let project =
        TestProject::with_script("echo agent-progress; echo agent-warning 1>&2; echo RALPH_COMPLETE")
            .expect("project");

    let output = ralph(&project, &["run", "add a button", "1"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let out = stdout(&output);
    assert!(out.contains("agent-progress"));
    assert!(!out.contains("agent-warning"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("agent-warning"));
}
