//! The iteration loop behind `ralph run`.

use std::thread;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::core::signal::{Detector, Signal};
use crate::core::types::{
    IterationReport, LoopEvent, LoopOutcome, LoopSettings, LoopStop, RunRequest,
};
use crate::io::agent::{Agent, AgentReply, AgentRequest};

/// Invoke `agent` until its output carries the completion sentinel or the budget
/// runs out.
///
/// Agent failures (non-zero exit, timeout, failure to spawn) never stop the loop:
/// the output is inspected regardless and the next iteration follows. The blocked
/// marker is reported through `on_event` and collected in the outcome, but it
/// does not change control flow.
#[instrument(skip_all, fields(stack = %request.stack.name, max_iterations = settings.max_iterations))]
pub fn run_loop<A: Agent + ?Sized, F: FnMut(LoopEvent<'_>)>(
    agent: &A,
    request: &RunRequest,
    settings: &LoopSettings,
    detector: &dyn Detector,
    mut on_event: F,
) -> LoopOutcome {
    let mut blocked_iterations = Vec::new();
    let mut iteration = 0u32;

    while iteration < settings.max_iterations {
        iteration += 1;
        info!(iteration, "invoking agent");
        on_event(LoopEvent::Started {
            iteration,
            max_iterations: settings.max_iterations,
        });

        let started = Instant::now();
        let (reply, error) = match agent.invoke(&AgentRequest {
            iteration,
            task: &request.task,
            stack: &request.stack.name,
            prompt: &request.prompt,
        }) {
            Ok(reply) => (reply, None),
            Err(err) => {
                let message = format!("{err:#}");
                warn!(iteration, err = %message, "agent invocation failed, continuing");
                (
                    AgentReply {
                        output: String::new(),
                        exit_code: None,
                        success: false,
                        timed_out: false,
                    },
                    Some(message),
                )
            }
        };

        let inspection = detector.inspect(&reply.output);
        if inspection.blocked {
            warn!(iteration, "agent reported a blocked task");
            blocked_iterations.push(iteration);
        }

        let report = IterationReport {
            iteration,
            max_iterations: settings.max_iterations,
            output: reply.output,
            exit_code: reply.exit_code,
            success: reply.success,
            timed_out: reply.timed_out,
            error,
            signal: inspection.signal,
            blocked: inspection.blocked,
            duration: started.elapsed(),
        };
        on_event(LoopEvent::Finished(&report));

        if inspection.signal == Signal::Complete {
            info!(iteration, "completion sentinel seen");
            return LoopOutcome {
                stop: LoopStop::Completed,
                iterations: iteration,
                blocked_iterations,
            };
        }

        if iteration < settings.max_iterations && !settings.delay.is_zero() {
            thread::sleep(settings.delay);
        }
    }

    info!(iterations = iteration, "iteration budget exhausted");
    LoopOutcome {
        stop: LoopStop::Exhausted,
        iterations: iteration,
        blocked_iterations,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::signal::{Sentinels, SubstringDetector};
    use crate::core::stacks::StackCatalog;
    use crate::test_support::{ScriptedAgent, ScriptedReply};

    fn request(stack: &str) -> RunRequest {
        let profile = StackCatalog::builtin().resolve(stack).expect("stack").clone();
        RunRequest::new("add a button", profile, "prompt".to_string()).expect("request")
    }

    fn settings(max_iterations: u32) -> LoopSettings {
        LoopSettings {
            max_iterations,
            delay: Duration::ZERO,
        }
    }

    fn detector() -> SubstringDetector {
        SubstringDetector::new(Sentinels::default())
    }

    #[test]
    fn completes_on_the_iteration_that_prints_the_sentinel() {
        let agent = ScriptedAgent::new(vec![
            ScriptedReply::output("working on task 1"),
            ScriptedReply::output("working on task 2"),
            ScriptedReply::output("all done\nRALPH_COMPLETE\n"),
        ]);

        let outcome = run_loop(&agent, &request("react"), &settings(3), &detector(), |_| {});

        assert_eq!(agent.calls(), 3);
        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.is_completed());
    }

    #[test]
    fn stops_early_and_leaves_remaining_budget_unused() {
        let agent = ScriptedAgent::new(vec![
            ScriptedReply::output("noise before RALPH_COMPLETE noise after"),
            ScriptedReply::output("never reached"),
        ]);

        let outcome = run_loop(&agent, &request("full"), &settings(10), &detector(), |_| {});

        assert_eq!(agent.calls(), 1);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.stop, LoopStop::Completed);
    }

    #[test]
    fn exhausts_budget_without_sentinel() {
        let agent = ScriptedAgent::new(vec![
            ScriptedReply::output("still going"),
            ScriptedReply::output("still going"),
        ]);

        let outcome = run_loop(&agent, &request("react"), &settings(2), &detector(), |_| {});

        assert_eq!(agent.calls(), 2);
        assert_eq!(outcome.stop, LoopStop::Exhausted);
        assert_eq!(outcome.iterations, 2);
    }

    #[test]
    fn zero_budget_never_invokes_agent() {
        let agent = ScriptedAgent::new(vec![ScriptedReply::output("RALPH_COMPLETE")]);

        let outcome = run_loop(&agent, &request("full"), &settings(0), &detector(), |_| {});

        assert_eq!(agent.calls(), 0);
        assert_eq!(outcome.stop, LoopStop::Exhausted);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn blocked_marker_does_not_stop_the_loop() {
        let agent = ScriptedAgent::new(vec![
            ScriptedReply::output("task 1 done"),
            ScriptedReply::output("[BLOCKED] waiting on credentials"),
            ScriptedReply::output("task 3 done"),
            ScriptedReply::output("task 4 done"),
            ScriptedReply::output("task 5 done"),
        ]);
        let mut seen = Vec::new();

        let outcome = run_loop(
            &agent,
            &request("phoenix"),
            &settings(5),
            &detector(),
            |event| {
                if let LoopEvent::Finished(report) = event {
                    seen.push((report.iteration, report.blocked));
                }
            },
        );

        assert_eq!(agent.calls(), 5);
        assert_eq!(outcome.stop, LoopStop::Exhausted);
        assert_eq!(outcome.blocked_iterations, vec![2]);
        assert_eq!(
            seen,
            vec![(1, false), (2, true), (3, false), (4, false), (5, false)]
        );
    }

    #[test]
    fn failed_invocation_does_not_abort_the_run() {
        let agent = ScriptedAgent::new(vec![
            ScriptedReply::exit(1, "compile error"),
            ScriptedReply::output("fixed it\nRALPH_COMPLETE"),
        ]);
        let mut reports = Vec::new();

        let outcome = run_loop(
            &agent,
            &request("react"),
            &settings(5),
            &detector(),
            |event| {
                if let LoopEvent::Finished(report) = event {
                    reports.push(report.clone());
                }
            },
        );

        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(outcome.iterations, 2);
        assert!(!reports[0].success);
        assert_eq!(reports[0].exit_code, Some(1));
        assert!(reports[1].success);
    }

    #[test]
    fn spawn_errors_are_swallowed_and_reported() {
        let agent = ScriptedAgent::new(vec![
            ScriptedReply::error("agent binary not found"),
            ScriptedReply::output("RALPH_COMPLETE"),
        ]);
        let mut errors = Vec::new();

        let outcome = run_loop(
            &agent,
            &request("expo"),
            &settings(3),
            &detector(),
            |event| {
                if let LoopEvent::Finished(report) = event {
                    errors.push(report.error.clone());
                }
            },
        );

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(
            errors,
            vec![Some("agent binary not found".to_string()), None]
        );
    }

    #[test]
    fn passes_run_inputs_to_agent() {
        let agent = ScriptedAgent::new(vec![
            ScriptedReply::output(""),
            ScriptedReply::output("RALPH_COMPLETE"),
        ]);

        run_loop(&agent, &request("react"), &settings(4), &detector(), |_| {});

        let requests = agent.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].iteration, 1);
        assert_eq!(requests[1].iteration, 2);
        assert!(requests.iter().all(|r| r.task == "add a button"));
        assert!(requests.iter().all(|r| r.stack == "react"));
        assert!(requests.iter().all(|r| r.prompt == "prompt"));
    }

    #[test]
    fn emits_started_before_each_finished() {
        let agent = ScriptedAgent::new(vec![ScriptedReply::output("a")]);
        let mut events = Vec::new();

        run_loop(&agent, &request("full"), &settings(2), &detector(), |event| {
            events.push(match event {
                LoopEvent::Started {
                    iteration,
                    max_iterations,
                } => format!("start {iteration}/{max_iterations}"),
                LoopEvent::Finished(report) => format!("done {}", report.iteration),
            });
        });

        assert_eq!(events, vec!["start 1/2", "done 1", "start 2/2", "done 2"]);
    }
}
