//! Bounded agent loop runner.
//!
//! `ralph run` hands a task to an external coding agent over and over until the
//! agent prints the completion sentinel or the iteration budget runs out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use ralph::core::signal::detector_for;
use ralph::core::stacks::StackProfile;
use ralph::core::types::{LoopEvent, LoopSettings, LoopStop, RunRequest, normalize_limit};
use ralph::exit_codes;
use ralph::io::agent::CommandAgent;
use ralph::io::config::RalphConfig;
use ralph::io::init::{InitOptions, RalphPaths, init_project, load_project_config};
use ralph::io::iteration_log::{IterationMeta, new_run_id, write_iteration};
use ralph::io::prompt::{PromptInputs, render_prompt};
use ralph::logging;
use ralph::looping::run_loop;

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Run a coding agent in a loop until it reports completion"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Invoke the agent once per iteration until it prints the completion sentinel.
    Run {
        /// What the agent should build.
        task: String,
        /// Iteration budget (default: `max_iterations` from config). Zero or negative runs nothing.
        #[arg(allow_negative_numbers = true)]
        iterations: Option<i64>,
        /// Stack selector (see `ralph stacks`; default: `default_stack` from config).
        stack: Option<String>,
        /// Config file (default: `.ralph/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Do not echo agent output while it runs.
        #[arg(short, long)]
        quiet: bool,
    },
    /// Create `.ralph/config.toml` and the plan and guidance documents.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
        /// Stack to record as the default.
        #[arg(long)]
        stack: Option<String>,
    },
    /// Print the prompt `ralph run` would send, without invoking the agent.
    Prompt {
        task: String,
        stack: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List stack selectors with their verification commands.
    Stacks {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ralph: {:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Run {
            task,
            iterations,
            stack,
            config,
            quiet,
        } => cmd_run(
            &root,
            RunArgs {
                task,
                iterations,
                stack,
                config,
                quiet,
            },
        ),
        Command::Init { force, stack } => cmd_init(&root, force, stack),
        Command::Prompt {
            task,
            stack,
            config,
        } => cmd_prompt(&root, &task, stack.as_deref(), config.as_deref()),
        Command::Stacks { config } => cmd_stacks(&root, config.as_deref()),
    }
}

struct RunArgs {
    task: String,
    iterations: Option<i64>,
    stack: Option<String>,
    config: Option<PathBuf>,
    quiet: bool,
}

fn cmd_run(root: &Path, args: RunArgs) -> Result<i32> {
    let cfg = load_project_config(root, args.config.as_deref())?;
    let max_iterations = args
        .iterations
        .map(normalize_limit)
        .unwrap_or(cfg.max_iterations);
    let stack = resolve_stack(&cfg, args.stack.as_deref())?;
    let prompt = build_prompt(root, &cfg, &args.task, &stack, max_iterations)?;
    let request = RunRequest::new(args.task, stack, prompt)?;
    let detector = detector_for(cfg.sentinels.match_mode, cfg.sentinels.sentinels())?;

    let mut agent = CommandAgent::new(&cfg.agent.command, root)?
        .with_timeout(cfg.agent_timeout())
        .with_output_limit(cfg.output_limit_bytes)
        .with_markers(vec![
            cfg.sentinels.complete.clone(),
            cfg.sentinels.blocked.clone(),
        ]);
    if !args.quiet {
        agent = agent.with_echo(std::io::stdout(), std::io::stderr());
    }

    let paths = RalphPaths::new(root);
    let run_id = new_run_id();
    println!(
        "ralph: {} (stack: {}, up to {} iterations)",
        request.task.trim(),
        request.stack.name,
        max_iterations
    );

    let settings = LoopSettings {
        max_iterations,
        delay: cfg.delay(),
    };
    let outcome = run_loop(&agent, &request, &settings, detector.as_ref(), |event| {
        match event {
            LoopEvent::Started {
                iteration,
                max_iterations,
            } => println!("=== iteration {iteration}/{max_iterations} ==="),
            LoopEvent::Finished(report) => {
                if let Some(err) = &report.error {
                    println!("ralph: agent failed to start: {err}; continuing");
                } else if report.timed_out {
                    println!("ralph: agent timed out; continuing");
                } else if !report.success {
                    println!(
                        "ralph: agent exited with status {}; continuing",
                        report
                            .exit_code
                            .map_or_else(|| "unknown".to_string(), |c| c.to_string())
                    );
                }
                if report.blocked {
                    println!(
                        "ralph: warning: {} reported in iteration {}; check {}",
                        cfg.sentinels.blocked,
                        report.iteration,
                        cfg.paths.plan.display()
                    );
                }
                if cfg.write_iteration_logs {
                    let meta = IterationMeta::from_report(
                        &run_id,
                        &request.task,
                        &request.stack.name,
                        report,
                    );
                    if let Err(err) = write_iteration(&paths.iterations_dir, &meta, &report.output)
                    {
                        let message = format!("{err:#}");
                        warn!(err = %message, "failed to write iteration log");
                    }
                }
            }
        }
    });

    if !outcome.blocked_iterations.is_empty() {
        let list: Vec<String> = outcome
            .blocked_iterations
            .iter()
            .map(u32::to_string)
            .collect();
        println!(
            "ralph: blocked tasks were reported in iteration(s) {}",
            list.join(", ")
        );
    }

    match outcome.stop {
        LoopStop::Completed => {
            println!("ralph: complete after {} iteration(s)", outcome.iterations);
            Ok(exit_codes::OK)
        }
        LoopStop::Exhausted => {
            println!(
                "ralph: stopped after {} iteration(s) without {}; see {} for remaining work",
                outcome.iterations,
                cfg.sentinels.complete,
                cfg.paths.plan.display()
            );
            Ok(exit_codes::EXHAUSTED)
        }
    }
}

fn cmd_init(root: &Path, force: bool, stack: Option<String>) -> Result<i32> {
    let outcome = init_project(root, &InitOptions { force, stack })?;
    for path in &outcome.written {
        println!("wrote {}", display_relative(root, path));
    }
    for path in &outcome.skipped {
        println!("kept {}", display_relative(root, path));
    }
    Ok(exit_codes::OK)
}

fn cmd_prompt(
    root: &Path,
    task: &str,
    stack: Option<&str>,
    config: Option<&Path>,
) -> Result<i32> {
    let cfg = load_project_config(root, config)?;
    let stack = resolve_stack(&cfg, stack)?;
    let prompt = build_prompt(root, &cfg, task, &stack, cfg.max_iterations)?;
    print!("{prompt}");
    if !prompt.ends_with('\n') {
        println!();
    }
    Ok(exit_codes::OK)
}

fn cmd_stacks(root: &Path, config: Option<&Path>) -> Result<i32> {
    let cfg = load_project_config(root, config)?;
    let catalog = cfg.stack_catalog();
    for profile in catalog.profiles() {
        let marker = if profile.name == cfg.default_stack {
            " (default)"
        } else {
            ""
        };
        println!("{}{} - {}", profile.name, marker, profile.description);
        for cmd in &profile.verify {
            println!("    {cmd}");
        }
    }
    Ok(exit_codes::OK)
}

fn resolve_stack(cfg: &RalphConfig, selector: Option<&str>) -> Result<StackProfile> {
    let selector = selector.unwrap_or(cfg.default_stack.as_str());
    Ok(cfg.stack_catalog().resolve(selector)?.clone())
}

fn build_prompt(
    root: &Path,
    cfg: &RalphConfig,
    task: &str,
    stack: &StackProfile,
    max_iterations: u32,
) -> Result<String> {
    let sentinels = cfg.sentinels.sentinels();
    let template = cfg.paths.prompt_template.as_ref().map(|p| root.join(p));
    render_prompt(
        template.as_deref(),
        &PromptInputs {
            task,
            stack,
            plan_path: &cfg.paths.plan,
            guidance_path: &cfg.paths.guidance,
            sentinels: &sentinels,
            max_iterations,
        },
    )
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
