//! Thin wrappers around [`std::process::Command`] for packaging scripts.
//!
//! A command is either a shell line, interpreted by `sh -c` so redirections
//! and pipelines work, or an argument list that is executed directly. The
//! choice is made by the caller through [`CommandSpec`]: string inputs
//! convert to [`CommandSpec::Shell`], arrays and vectors to
//! [`CommandSpec::Args`].

use crate::errors::{CommandFailure, PkgError, ProcessError, Result};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use tracing::debug;

/// What to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// A line handed to the platform shell.
    Shell(String),
    /// Program followed by its arguments; no shell is involved.
    Args(Vec<String>),
}

impl CommandSpec {
    pub fn shell(line: impl Into<String>) -> Self {
        CommandSpec::Shell(line.into())
    }

    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::Args(args.into_iter().map(Into::into).collect())
    }

    fn to_command(&self, opts: &RunOptions) -> Result<Command> {
        let mut cmd = match self {
            CommandSpec::Shell(line) => shell_command(line),
            CommandSpec::Args(args) => {
                let (program, rest) = args.split_first().ok_or_else(|| PkgError::Spawn {
                    command: self.to_string(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "empty argument list"),
                })?;
                let mut cmd = Command::new(program);
                cmd.args(rest);
                cmd
            }
        };
        if let Some(dir) = &opts.current_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(opts.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(cmd)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Shell(line) => f.write_str(line),
            CommandSpec::Args(args) => f.write_str(&args.join(" ")),
        }
    }
}

impl From<&str> for CommandSpec {
    fn from(line: &str) -> Self {
        CommandSpec::shell(line)
    }
}

impl From<String> for CommandSpec {
    fn from(line: String) -> Self {
        CommandSpec::Shell(line)
    }
}

impl<const N: usize> From<[&str; N]> for CommandSpec {
    fn from(args: [&str; N]) -> Self {
        CommandSpec::args(args)
    }
}

impl From<&[&str]> for CommandSpec {
    fn from(args: &[&str]) -> Self {
        CommandSpec::args(args.iter().copied())
    }
}

impl From<Vec<&str>> for CommandSpec {
    fn from(args: Vec<&str>) -> Self {
        CommandSpec::args(args)
    }
}

impl From<Vec<String>> for CommandSpec {
    fn from(args: Vec<String>) -> Self {
        CommandSpec::Args(args)
    }
}

/// Creates a shell invocation for `line`, using `cmd.exe /C` on Windows.
fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", line]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", line]);
        cmd
    }
}

/// Options shared by every runner.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Keep captured output as bytes instead of decoding it as UTF-8.
    pub raw: bool,
    /// Turn a non-zero exit code into [`ProcessError`].
    pub check: bool,
    /// Capture stdout and stderr in [`run`]; otherwise they are inherited.
    pub capture: bool,
    pub current_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

/// Captured output of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Text(String),
    Bytes(Vec<u8>),
}

impl Output {
    fn decode(bytes: Vec<u8>, raw: bool) -> Self {
        if raw {
            Output::Bytes(bytes)
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => Output::Text(text),
                Err(err) => Output::Text(String::from_utf8_lossy(err.as_bytes()).into_owned()),
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Output::Text(text) => Some(text),
            Output::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Output::Text(text) => text.as_bytes(),
            Output::Bytes(bytes) => bytes,
        }
    }

    pub fn into_string_lossy(self) -> String {
        match self {
            Output::Text(text) => text,
            Output::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

/// Result of [`run`].
#[derive(Debug, Clone)]
pub struct Completed {
    pub command: String,
    pub code: i32,
    pub stdout: Option<Output>,
    pub stderr: Option<Output>,
}

impl Completed {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs `cmd` to completion.
///
/// Output is captured only when [`RunOptions::capture`] is set. A non-zero
/// exit code is returned as-is unless [`RunOptions::check`] is set.
///
/// # Examples
/// ```no_run
/// use pkgkit::process::{RunOptions, run};
///
/// let done = run("make gen", &RunOptions::new()).unwrap();
/// if !done.success() {
///     eprintln!("make exited with {}", done.code);
/// }
/// ```
pub fn run(cmd: impl Into<CommandSpec>, opts: &RunOptions) -> Result<Completed> {
    let spec = cmd.into();
    let command_line = spec.to_string();
    let mut command = spec.to_command(opts)?;
    debug!(command = %command_line, capture = opts.capture, "running command");

    let completed = if opts.capture {
        let output = command
            .stdin(Stdio::inherit())
            .output()
            .map_err(|source| spawn_error(&command_line, source))?;
        Completed {
            command: command_line,
            code: exit_code(output.status),
            stdout: Some(Output::decode(output.stdout, opts.raw)),
            stderr: Some(Output::decode(output.stderr, opts.raw)),
        }
    } else {
        let status = command
            .status()
            .map_err(|source| spawn_error(&command_line, source))?;
        Completed {
            command: command_line,
            code: exit_code(status),
            stdout: None,
            stderr: None,
        }
    };

    if opts.check && !completed.success() {
        return Err(ProcessError {
            command: completed.command,
            code: completed.code,
            stdout: completed.stdout.map(Output::into_string_lossy),
            stderr: completed.stderr.map(Output::into_string_lossy),
        }
        .into());
    }

    Ok(completed)
}

/// Like [`run`] with `check` forced on.
pub fn run_checked(cmd: impl Into<CommandSpec>, opts: &RunOptions) -> Result<Completed> {
    let opts = opts.clone().check(true);
    run(cmd, &opts)
}

/// Runs `cmd` with stderr merged into stdout and returns the text together
/// with the exit code. Never fails because of the exit code.
///
/// Text capture always decodes; a [`RunOptions::raw`] request is rejected
/// with [`PkgError::InvalidOptions`]. Use [`capture_output`] for bytes.
pub fn capture_text(cmd: impl Into<CommandSpec>, opts: &RunOptions) -> Result<(String, i32)> {
    reject_raw(opts, "capture_text")?;
    let (output, code) = capture_output(cmd, opts)?;
    Ok((output.into_string_lossy(), code))
}

/// Like [`capture_text`] but a non-zero exit code becomes a
/// [`CommandFailure`] carrying the command and everything it printed.
pub fn capture_text_checked(cmd: impl Into<CommandSpec>, opts: &RunOptions) -> Result<String> {
    reject_raw(opts, "capture_text_checked")?;
    let spec = cmd.into();
    let command_line = spec.to_string();
    let (output, code) = capture_merged(&spec, &command_line, opts)?;
    let output = output.into_string_lossy();
    if code != 0 {
        return Err(CommandFailure {
            command: command_line,
            code,
            output,
        }
        .into());
    }
    Ok(output)
}

/// Merged stdout and stderr as [`Output`], bytes when `raw` is set.
pub fn capture_output(cmd: impl Into<CommandSpec>, opts: &RunOptions) -> Result<(Output, i32)> {
    let spec = cmd.into();
    let command_line = spec.to_string();
    capture_merged(&spec, &command_line, opts)
}

fn reject_raw(opts: &RunOptions, operation: &str) -> Result<()> {
    if opts.raw {
        return Err(PkgError::InvalidOptions(format!(
            "{operation} always decodes output; use capture_output for raw bytes"
        )));
    }
    Ok(())
}

fn capture_merged(
    spec: &CommandSpec,
    command_line: &str,
    opts: &RunOptions,
) -> Result<(Output, i32)> {
    let mut command = spec.to_command(opts)?;
    let (mut reader, writer) = io::pipe()?;
    command.stdout(writer.try_clone()?).stderr(writer);
    debug!(command = %command_line, "capturing command output");

    let mut child = command
        .spawn()
        .map_err(|source| spawn_error(command_line, source))?;
    // The command still owns the write ends; the read below only sees EOF
    // once they are closed.
    drop(command);

    let mut bytes = Vec::new();
    if let Err(err) = reader.read_to_end(&mut bytes) {
        drop(reader);
        let _ = child.wait();
        return Err(err.into());
    }
    let status = child.wait()?;
    Ok((Output::decode(bytes, opts.raw), exit_code(status)))
}

/// Starts `cmd` with its stdout connected to a pipe and returns at once.
///
/// The caller reads the output at its own pace and must call
/// [`PipedChild::finish`] to reap the process.
pub fn spawn_pipe(cmd: impl Into<CommandSpec>, opts: &RunOptions) -> Result<PipedChild> {
    let spec = cmd.into();
    let command_line = spec.to_string();
    let mut command = spec.to_command(opts)?;
    command.stdout(Stdio::piped());
    debug!(command = %command_line, "spawning piped command");

    let mut child = command
        .spawn()
        .map_err(|source| spawn_error(&command_line, source))?;
    let stdout = child.stdout.take().ok_or_else(|| {
        spawn_error(
            &command_line,
            io::Error::new(io::ErrorKind::BrokenPipe, "stdout was not captured"),
        )
    })?;

    Ok(PipedChild {
        command: command_line,
        child,
        stdout: BufReader::new(stdout),
    })
}

/// A running child whose stdout is readable incrementally.
#[derive(Debug)]
pub struct PipedChild {
    command: String,
    child: Child,
    stdout: BufReader<ChildStdout>,
}

impl PipedChild {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Buffered access to the raw output bytes.
    pub fn stdout(&mut self) -> &mut BufReader<ChildStdout> {
        &mut self.stdout
    }

    /// Output lines, without their terminators.
    pub fn lines(&mut self) -> impl Iterator<Item = io::Result<String>> + '_ {
        (&mut self.stdout).lines()
    }

    /// Drains any unread output, waits for the child and returns its exit code.
    ///
    /// The child is reaped even when draining fails.
    pub fn finish(self) -> Result<i32> {
        let PipedChild {
            mut child,
            mut stdout,
            ..
        } = self;
        let drained = io::copy(&mut stdout, &mut io::sink());
        drop(stdout);
        let status = child.wait()?;
        drained?;
        Ok(exit_code(status))
    }
}

fn spawn_error(command: &str, source: io::Error) -> PkgError {
    PkgError::Spawn {
        command: command.to_string(),
        source,
    }
}

/// Exit code of a finished child; a child killed by a signal reports the
/// negated signal number.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
