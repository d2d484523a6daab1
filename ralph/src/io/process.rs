//! Helpers for running child processes with optional timeouts and bounded output.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::bytes;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Sink that receives every output line as soon as the child produces it.
pub type Tee = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wrap a writer so it can be handed to a reader thread.
pub fn tee(writer: impl Write + Send + 'static) -> Tee {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Upper bound on lines kept past the output cap because they carry a marker.
const RETAINED_LIMIT_BYTES: usize = 1024 * 1024;
/// Longest marker line kept whole; longer lines keep only a window around the match.
const RETAINED_LINE_MAX: usize = 64 * 1024;
const RETAINED_WINDOW: usize = 256;

/// How child output is captured.
#[derive(Clone)]
pub struct Capture {
    /// Keep at most this many bytes of each stream in memory.
    pub output_limit_bytes: usize,
    /// Lines containing any of these are kept even past `output_limit_bytes`.
    pub markers: Vec<String>,
    pub stdout_tee: Option<Tee>,
    pub stderr_tee: Option<Tee>,
}

impl Capture {
    pub fn limited(output_limit_bytes: usize) -> Self {
        Self {
            output_limit_bytes,
            markers: Vec::new(),
            stdout_tee: None,
            stderr_tee: None,
        }
    }

    fn marker_regex(&self) -> Result<Option<bytes::Regex>> {
        let markers: Vec<String> = self
            .markers
            .iter()
            .filter(|m| !m.is_empty())
            .map(|m| regex::escape(m))
            .collect();
        if markers.is_empty() {
            return Ok(None);
        }
        let re = bytes::Regex::new(&markers.join("|")).context("compile output markers")?;
        Ok(Some(re))
    }
}

/// One captured stream.
#[derive(Debug, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes read past the cap and dropped.
    pub truncated: usize,
    /// Marker lines seen past the cap, newline terminated.
    pub retained: Vec<u8>,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stdout followed by stderr as one lossy UTF-8 blob. Marker lines that fell
    /// past the cap follow each truncation notice.
    pub fn combined_text(&self) -> String {
        let mut text = String::new();
        push_stream(&mut text, "stdout", &self.stdout);
        push_stream(&mut text, "stderr", &self.stderr);
        text
    }
}

fn push_stream(text: &mut String, label: &str, stream: &Captured) {
    if !stream.bytes.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&String::from_utf8_lossy(&stream.bytes));
    }
    if stream.truncated > 0 {
        text.push_str(&format!("\n[{label} truncated {} bytes]\n", stream.truncated));
        text.push_str(&String::from_utf8_lossy(&stream.retained));
    }
}

/// Run a command, capturing stdout/stderr without risking pipe deadlocks.
///
/// Stdin is written and output is read on their own threads while the child runs, so
/// the timeout applies however much input the child leaves unread. With
/// `timeout: None` the call waits for as long as the child runs.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes = capture.output_limit_bytes))]
pub fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
    capture: &Capture,
) -> Result<CommandOutput> {
    let markers = capture.marker_regex()?;

    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        reap(&mut child);
        return Err(anyhow!("stdout/stderr were not piped"));
    };
    let child_stdin = child.stdin.take();

    let limit = capture.output_limit_bytes;
    let (stdout_tee, stdout_markers) = (capture.stdout_tee.clone(), markers.clone());
    let stdout_handle =
        thread::spawn(move || read_lines_limited(stdout, limit, stdout_markers, stdout_tee));
    let stderr_tee = capture.stderr_tee.clone();
    let stderr_handle =
        thread::spawn(move || read_lines_limited(stderr, limit, markers, stderr_tee));

    let writer_handle = match (stdin, child_stdin) {
        (Some(input), Some(pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || write_stdin(pipe, &input)))
        }
        (None, _) => None,
        (Some(_), None) => {
            reap(&mut child);
            return Err(anyhow!("stdin was not piped"));
        }
    };

    let waited = wait_child(&mut child, timeout);

    // The child is gone (or killed), so every pipe end is closed and the joins finish.
    let writer_result = match writer_handle {
        Some(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(anyhow!("stdin writer thread panicked"))),
        None => Ok(()),
    };
    let stdout = join_output(stdout_handle).context("join stdout");
    let stderr = join_output(stderr_handle).context("join stderr");

    let (status, timed_out) = waited?;
    writer_result?;
    let (stdout, stderr) = (stdout?, stderr?);

    if stdout.truncated > 0 || stderr.truncated > 0 {
        warn!(
            stdout_truncated = stdout.truncated,
            stderr_truncated = stderr.truncated,
            "output truncated"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// Wait for the child, killing it once `timeout` elapses. A failed wait also kills it.
fn wait_child(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let waited = match timeout {
        Some(limit) => child.wait_timeout(limit).context("wait for command"),
        None => child.wait().map(Some).context("wait for command"),
    };
    match waited {
        Ok(Some(status)) => Ok((status, false)),
        Ok(None) => {
            warn!(?timeout, "command timed out, killing");
            child.kill().context("kill command")?;
            let status = child.wait().context("wait command after kill")?;
            Ok((status, true))
        }
        Err(err) => {
            reap(child);
            Err(err)
        }
    }
}

/// Best-effort kill and wait used on error paths.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(err = %e, "kill after error");
    }
    if let Err(e) = child.wait() {
        debug!(err = %e, "wait after error");
    }
}

fn write_stdin(mut pipe: ChildStdin, input: &[u8]) -> Result<()> {
    match pipe.write_all(input) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            warn!("child closed stdin before reading all input");
            Ok(())
        }
        Err(e) => Err(e).context("write stdin"),
    }
}

fn join_output(handle: thread::JoinHandle<Result<Captured>>) -> Result<Captured> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line by line with a size limit, optionally tee-ing each line.
///
/// Past the limit, lines matching `markers` still go to `retained`.
fn read_lines_limited<R: Read>(
    reader: R,
    limit: usize,
    markers: Option<bytes::Regex>,
    tee: Option<Tee>,
) -> Result<Captured> {
    let mut buf_reader = BufReader::new(reader);
    let mut captured = Captured::default();

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        if let Some(sink) = &tee
            && let Ok(mut writer) = sink.lock()
        {
            if let Err(e) = writer.write_all(&line) {
                warn!(err = %e, "failed to write to tee");
            } else if let Err(e) = writer.flush() {
                warn!(err = %e, "failed to flush tee");
            }
        }

        let remaining = limit.saturating_sub(captured.bytes.len());
        let keep = n.min(remaining);
        captured.bytes.extend_from_slice(&line[..keep]);
        if keep < n {
            captured.truncated += n - keep;
            if let Some(re) = &markers {
                retain_marker_line(&mut captured.retained, re, &line);
            }
        }
    }

    Ok(captured)
}

fn retain_marker_line(retained: &mut Vec<u8>, markers: &bytes::Regex, line: &[u8]) {
    let Some(found) = markers.find(line) else {
        return;
    };
    let body = line.strip_suffix(b"\n").unwrap_or(line);
    let kept = if body.len() <= RETAINED_LINE_MAX {
        body
    } else {
        let from = found.start().saturating_sub(RETAINED_WINDOW);
        let to = (found.end() + RETAINED_WINDOW).min(body.len());
        &body[from..to]
    };
    if retained.len() + kept.len() + 1 > RETAINED_LIMIT_BYTES {
        warn!("retained marker lines over limit, dropping");
        return;
    }
    retained.extend_from_slice(kept);
    retained.push(b'\n');
}
