use crate::RuntimeError;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::trace;

/// Ceiling on captured output, per stream.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// A single external command: program, arguments, optional stdin text and
/// optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            working_dir: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured output of one finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::new(exit_code, "", stderr)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run the command to completion.
    ///
    /// A non-zero exit status is not an error here; callers decide what it
    /// means. Errors are reserved for failing to start the process, I/O on
    /// its pipes, and output exceeding [`MAX_OUTPUT_BYTES`].
    fn run(&self, invocation: &Invocation) -> Result<CommandResult, RuntimeError>;

    /// Like [`CommandRunner::run`], but a non-zero exit becomes
    /// [`RuntimeError::CommandFailed`].
    fn run_checked(&self, invocation: &Invocation) -> Result<CommandResult, RuntimeError> {
        let result = self.run(invocation)?;
        trace!("exit code: {}", result.exit_code);
        if !result.stdout.is_empty() {
            trace!("stdout: {}", result.stdout);
        }
        if !result.stderr.is_empty() {
            trace!("stderr: {}", result.stderr);
        }
        if result.success() {
            Ok(result)
        } else {
            Err(RuntimeError::CommandFailed {
                command: invocation.to_string(),
                code: result.exit_code,
                stderr: result.stderr,
            })
        }
    }
}

/// Runs real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

enum Captured {
    Complete(Vec<u8>),
    Overflow,
}

/// Read at most `limit` bytes. Past the limit the rest of the stream is
/// drained and discarded so the child never blocks on a full pipe.
fn read_bounded(pipe: Option<impl Read>, limit: usize) -> io::Result<Captured> {
    let Some(mut pipe) = pipe else {
        return Ok(Captured::Complete(Vec::new()));
    };
    let mut buf = Vec::new();
    (&mut pipe).take(limit as u64 + 1).read_to_end(&mut buf)?;
    if buf.len() > limit {
        io::copy(&mut pipe, &mut io::sink())?;
        return Ok(Captured::Overflow);
    }
    Ok(Captured::Complete(buf))
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandResult, RuntimeError> {
        trace!("executing: {invocation}");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| RuntimeError::Spawn {
            program: invocation.program_name(),
            source,
        })?;

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let input = invocation.stdin.as_deref().unwrap_or_default();

        let (stdout, stderr) = std::thread::scope(|scope| {
            if let Some(mut pipe) = stdin_pipe {
                scope.spawn(move || {
                    // The child may exit without reading; a broken pipe is fine.
                    let _ = pipe.write_all(input.as_bytes());
                });
            }
            let stderr_reader = scope.spawn(move || read_bounded(stderr_pipe, MAX_OUTPUT_BYTES));
            let stdout = read_bounded(stdout_pipe, MAX_OUTPUT_BYTES);
            let stderr = stderr_reader
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")));
            (stdout, stderr)
        });

        let status = child.wait()?;
        let exit_code = status.code().unwrap_or(-1);

        let overflow = |stream| RuntimeError::OutputLimitExceeded {
            program: invocation.program_name(),
            stream,
            limit: MAX_OUTPUT_BYTES,
        };
        let stdout = match stdout? {
            Captured::Complete(bytes) => decode(&bytes),
            Captured::Overflow => return Err(overflow("stdout")),
        };
        let stderr = match stderr? {
            Captured::Complete(bytes) => decode(&bytes),
            Captured::Overflow => return Err(overflow("stderr")),
        };

        Ok(CommandResult {
            stdout,
            stderr,
            exit_code,
        })
    }
}
