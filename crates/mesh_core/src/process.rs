//! Helpers for running external tools.
//!
//! Every external invocation (frame extraction, detection, stages) goes
//! through [`run_streaming`], which reads stdout and stderr concurrently
//! and hands each line to a callback in arrival order.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

/// Exit code reported when a program could not be started.
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; `128 + signal` when killed by a signal.
    pub exit_code: i32,
    /// Combined stdout/stderr lines in arrival order.
    pub lines: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn `command`, retrying briefly while the executable is busy.
///
/// A freshly written or unpacked executable can report ETXTBSY on Linux
/// until every writer handle is closed.
pub fn spawn(command: &mut Command) -> io::Result<Child> {
    let mut attempts = 0u64;
    loop {
        match command.spawn() {
            Err(e) if is_text_file_busy(&e) && attempts < 5 => {
                attempts += 1;
                thread::sleep(Duration::from_millis(20 * attempts));
            }
            other => return other,
        }
    }
}

#[cfg(target_os = "linux")]
fn is_text_file_busy(e: &io::Error) -> bool {
    e.raw_os_error() == Some(26)
}

#[cfg(not(target_os = "linux"))]
fn is_text_file_busy(_e: &io::Error) -> bool {
    false
}

/// Run `command` to completion, streaming output lines to `on_line`.
///
/// The callback receives `(line, is_stderr)`. stdin is closed.
pub fn run_streaming<F>(command: &mut Command, mut on_line: F) -> io::Result<ProcessOutput>
where
    F: FnMut(&str, bool),
{
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = spawn(command)?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (tx, rx) = mpsc::channel::<(String, bool)>();
    let mut lines = Vec::new();

    thread::scope(|scope| {
        if let Some(out) = stdout {
            let tx = tx.clone();
            scope.spawn(move || forward_lines(out, false, tx));
        }
        if let Some(err) = stderr {
            let tx = tx.clone();
            scope.spawn(move || forward_lines(err, true, tx));
        }
        drop(tx);

        for (line, is_stderr) in rx {
            on_line(&line, is_stderr);
            lines.push(line);
        }
    });

    let status = child.wait()?;
    Ok(ProcessOutput {
        exit_code: exit_code(&status),
        lines,
    })
}

fn forward_lines<R: Read>(reader: R, is_stderr: bool, tx: Sender<(String, bool)>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send((line, is_stderr)).is_err() {
                    break;
                }
            }
        }
    }
}

/// Map an exit status to a shell-style exit code.
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Render a program and its arguments for logs, quoting where needed.
pub fn display_command<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut out = quote(program);
    for arg in args {
        out.push(' ');
        out.push_str(&quote(arg.as_ref()));
    }
    out
}

fn quote(part: &str) -> String {
    if !part.is_empty() && !part.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', "'\\''"))
    }
}
