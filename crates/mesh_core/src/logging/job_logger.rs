//! Per-job log file with an optional console mirror.
//!
//! Orchestrator messages go to `<logs>/<job>.log`. External tool output is
//! kept in a bounded tail so a failing stage can show its last lines; in
//! compact mode that tail is the only place tool output ends up.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{ConsoleCallback, LogConfig, LogLevel, MessagePrefix};

/// Where formatted lines are written.
struct Sinks {
    file: Option<BufWriter<File>>,
    console: Option<ConsoleCallback>,
}

impl Sinks {
    fn write_line(&mut self, line: &str) {
        if let Some(file) = self.file.as_mut() {
            let _ = writeln!(file, "{}", line);
        }
        if let Some(console) = self.console.as_ref() {
            console(line);
        }
    }
}

/// Most recent tool output lines, oldest first.
#[derive(Debug)]
struct ToolTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl ToolTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }
}

/// Logger for one reconstruction job.
pub struct JobLogger {
    job_name: String,
    log_path: PathBuf,
    config: LogConfig,
    sinks: Mutex<Sinks>,
    tail: Mutex<ToolTail>,
}

impl JobLogger {
    /// Create `<log_dir>/<job_name>.log`, truncating an earlier log.
    ///
    /// `console`, when given, receives every formatted line.
    pub fn new(
        job_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        console: Option<ConsoleCallback>,
    ) -> std::io::Result<Self> {
        let job_name = job_name.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&job_name)));
        let file = File::create(&log_path)?;

        Ok(Self {
            job_name,
            log_path,
            sinks: Mutex::new(Sinks {
                file: Some(BufWriter::new(file)),
                console,
            }),
            tail: Mutex::new(ToolTail::new(config.error_tail)),
            config,
        })
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Write `message` if `level` passes the configured threshold.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level >= self.config.level {
            self.emit(message);
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// An external command about to run.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    /// Marker for entering a pipeline state.
    pub fn phase(&self, phase_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(phase_name));
    }

    pub fn section(&self, section_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Section.format(section_name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// One line of external tool output.
    ///
    /// Always kept in the tail; written out only when compact mode is off.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        self.tail.lock().push(line);

        if !self.config.compact {
            let tagged = if is_stderr {
                format!("[stderr] {}", line)
            } else {
                line.to_string()
            };
            self.emit(&tagged);
        }
    }

    /// Write the collected tool output under a `[header/tail]` marker.
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }
        self.emit(&format!("[{}/tail]", header));
        for line in &lines {
            self.emit(line);
        }
    }

    /// Forget collected tool output. Each stage starts with an empty tail.
    pub fn clear_tail(&self) {
        self.tail.lock().lines.clear();
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail.lock().lines.iter().cloned().collect()
    }

    /// Debug dump of an invocation, one flag and its values per line.
    pub fn command_pretty(&self, program: &str, args: &[String]) {
        if self.config.level > LogLevel::Debug {
            return;
        }
        let mut rendered = String::from(program);
        for group in group_flags(args) {
            rendered.push_str(" \\\n    ");
            rendered.push_str(&group);
        }
        self.debug(&rendered);
    }

    pub fn flush(&self) {
        if let Some(file) = self.sinks.lock().file.as_mut() {
            let _ = file.flush();
        }
    }

    /// Flush and release the log file. Later lines only reach the console.
    pub fn close(&self) {
        let mut sinks = self.sinks.lock();
        if let Some(mut file) = sinks.file.take() {
            let _ = file.flush();
        }
    }

    fn emit(&self, message: &str) {
        let line = if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        };
        self.sinks.lock().write_line(&line);
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Group `--flag value...` runs so each flag starts a line.
fn group_flags(args: &[String]) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for arg in args {
        match groups.last_mut() {
            Some(group) if !arg.starts_with("--") => {
                group.push(' ');
                group.push_str(arg);
            }
            _ => groups.push(arg.clone()),
        }
    }
    groups
}

/// Replace characters that are not allowed in file names.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
