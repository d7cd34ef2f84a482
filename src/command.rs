use crate::config::Config;
use crate::error::VcsError;
use log::debug;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

/// Log target of the invocation trace. The binary always enables it when
/// debug is on, whatever the rest of the filter says.
pub const TRACE_TARGET: &str = "pacman_vcs::trace";

/// One external command bound to a canonical working directory.
///
/// The consuming methods take the handle by value, so a prepared process is
/// started at most once. Prepare a new handle for every attempt.
#[derive(Debug)]
pub struct ProcessHandle {
    cwd: PathBuf,
    cmd: Vec<String>,
}

impl ProcessHandle {
    /// Resolves `cwd` to its real path and binds `cmd` to it. Nothing is
    /// started yet. With `debug` set, the invocation is traced at debug level.
    pub fn prepare(cwd: &Path, cmd: &[&str], debug: bool) -> Result<Self, VcsError> {
        let real_cwd = fs::canonicalize(cwd).map_err(|source| VcsError::PathResolution {
            path: cwd.to_path_buf(),
            source,
        })?;

        if cmd.is_empty() {
            return Err(VcsError::Execution(format!(
                "Empty command line for {}",
                real_cwd.display()
            )));
        }

        if debug {
            debug!(target: TRACE_TARGET, "{}", render_trace(&real_cwd, cmd).trim_end());
        }

        Ok(ProcessHandle {
            cwd: real_cwd,
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn command_line(&self) -> &[String] {
        &self.cmd
    }

    /// Runs the process attached to our own stdin, stdout and stderr and
    /// returns its exit code. Prompts from the child reach the user as-is.
    pub fn wait_for(self) -> Result<i32, VcsError> {
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| VcsError::Execution(format!("Failed to execute '{}': {}", self, e)))?;

        debug!("'{}' finished: {}", self, status);
        exit_code(status)
            .ok_or_else(|| VcsError::Execution(format!("'{}' reported no exit status", self)))
    }

    /// Like [`ProcessHandle::wait_for`], but anything other than `exit_code`
    /// becomes [`VcsError::CommandFailed`] carrying `on_error`.
    pub fn expect(self, exit_code: i32, on_error: &str) -> Result<(), VcsError> {
        check_exit(self.wait_for()?, exit_code, on_error)
    }

    /// Runs the process and returns everything it wrote to stdout, one entry
    /// per line, in order.
    pub fn output(self) -> Result<Vec<String>, VcsError> {
        let mut child = self.spawn(Stdio::piped(), Stdio::null())?;
        let stream = child.stdout.take();
        self.collect(child, stream)
    }

    /// Runs the process and returns everything it wrote to stderr, one entry
    /// per line, in order.
    pub fn error_output(self) -> Result<Vec<String>, VcsError> {
        let mut child = self.spawn(Stdio::null(), Stdio::piped())?;
        let stream = child.stderr.take();
        self.collect(child, stream)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.cmd[0]);
        command.args(&self.cmd[1..]).current_dir(&self.cwd);
        command
    }

    fn spawn(&self, stdout: Stdio, stderr: Stdio) -> Result<Child, VcsError> {
        self.command()
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| VcsError::Execution(format!("Failed to execute '{}': {}", self, e)))
    }

    fn collect<R: Read>(
        &self,
        mut child: Child,
        stream: Option<R>,
    ) -> Result<Vec<String>, VcsError> {
        // The reader is consumed here, so the pipe is closed before we reap.
        let lines = match stream {
            Some(stream) => read_lines(BufReader::new(stream)),
            None => Ok(Vec::new()),
        };
        let waited = child.wait();

        let lines = lines.map_err(|e| {
            VcsError::Execution(format!("Failed to read output of '{}': {}", self, e))
        })?;
        let status = waited
            .map_err(|e| VcsError::Execution(format!("Failed to wait for '{}': {}", self, e)))?;
        debug!("'{}' finished: {} ({} lines captured)", self, status, lines.len());

        Ok(lines)
    }
}

impl std::fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cmd.join(" "))
    }
}

/// A child killed by a signal reports `128 + signal`, the way shells do.
#[cfg(unix)]
fn exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|sig| 128 + sig))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

fn check_exit(actual: i32, expected: i32, on_error: &str) -> Result<(), VcsError> {
    if actual != expected {
        return Err(VcsError::CommandFailed(on_error.to_string()));
    }
    Ok(())
}

/// Splits a byte stream into lines. A trailing `\r` is dropped and invalid
/// UTF-8 is replaced rather than rejected.
fn read_lines<R: BufRead>(mut reader: R) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        lines.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Ok(lines)
}

/// Human readable rendering of an invocation: the directory, the program,
/// then one line per argument with each flag grouped with the token after it.
pub fn render_trace(cwd: &Path, cmd: &[&str]) -> String {
    let mut out = format!("Exec in {}\n", cwd.display());
    let Some((program, args)) = cmd.split_first() else {
        return out;
    };
    out.push_str(&format!("  {}\n", program));

    let mut open_flag = false;
    for arg in args {
        if open_flag {
            out.push_str(&format!(" {}\n", arg));
            open_flag = false;
        } else if !arg.starts_with('-') {
            out.push_str(&format!("     {}\n", arg));
        } else {
            out.push_str(&format!("     {}", arg));
            open_flag = true;
        }
    }
    if open_flag {
        out.push('\n');
    }
    out
}

pub trait CommandRunner {
    fn wait_for(&self, cwd: &Path, cmd: &[&str]) -> Result<i32, VcsError>;

    fn output(&self, cwd: &Path, cmd: &[&str]) -> Result<Vec<String>, VcsError>;

    fn error_output(&self, cwd: &Path, cmd: &[&str]) -> Result<Vec<String>, VcsError>;

    fn expect(
        &self,
        cwd: &Path,
        cmd: &[&str],
        exit_code: i32,
        on_error: &str,
    ) -> Result<(), VcsError> {
        check_exit(self.wait_for(cwd, cmd)?, exit_code, on_error)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner {
    debug: bool,
}

impl SystemCommandRunner {
    pub fn new(config: &Config) -> Self {
        SystemCommandRunner { debug: config.debug }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn wait_for(&self, cwd: &Path, cmd: &[&str]) -> Result<i32, VcsError> {
        ProcessHandle::prepare(cwd, cmd, self.debug)?.wait_for()
    }

    fn output(&self, cwd: &Path, cmd: &[&str]) -> Result<Vec<String>, VcsError> {
        ProcessHandle::prepare(cwd, cmd, self.debug)?.output()
    }

    fn error_output(&self, cwd: &Path, cmd: &[&str]) -> Result<Vec<String>, VcsError> {
        ProcessHandle::prepare(cwd, cmd, self.debug)?.error_output()
    }
}
