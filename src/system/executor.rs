// src/system/executor.rs

use crate::constants::POLL_INTERVAL;
use crate::models::CommandOutput;
use crate::system::heartbeat::Heartbeat;
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command as StdCommand, Output, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    Spawn(String, std::io::Error),
    #[error("Command '{command}' on {host} exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        host: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("Command '{command}' on {host} did not complete within {timeout:?}.")]
    TimedOut {
        command: String,
        host: String,
        timeout: Duration,
    },
    #[error("Remote command '{command}' on {host} is not allowed in dry-run mode.")]
    NotAllowed { command: String, host: String },
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::TimedOut { .. })
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// The only capability the core needs from the outside world: run a command
/// and report its output.
pub trait RemoteExecutor: Send + Sync {
    /// Runs `command` on the local machine and captures its output. A non-zero
    /// exit code is reported in the output, not as an error.
    fn run_local(&self, command: &str) -> ExecutionResult<CommandOutput>;

    /// Runs `command` on `host` as `user` and returns its stdout. A non-zero
    /// exit code is an error.
    fn run_remote(&self, command: &str, host: &str, user: Option<&str>) -> ExecutionResult<String>;

    /// Like `run_remote`, with `input` fed to the command's stdin. File
    /// contents travel this way so they never become part of a shell string.
    fn run_remote_with_input(
        &self,
        command: &str,
        input: &str,
        host: &str,
        user: Option<&str>,
    ) -> ExecutionResult<String>;

    /// Like `run_remote`, killing the command once `timeout` has passed.
    fn run_remote_with_timeout(
        &self,
        command: &str,
        host: &str,
        user: Option<&str>,
        timeout: Duration,
    ) -> ExecutionResult<String>;

    /// Runs a command that only inspects `host`. Unlike `run_remote`, this is
    /// allowed in dry-run mode.
    fn query_remote(&self, command: &str, host: &str, user: Option<&str>) -> ExecutionResult<String> {
        self.run_remote(command, host, user)
    }

    /// `query_remote` under a hard deadline.
    fn query_remote_with_timeout(
        &self,
        command: &str,
        host: &str,
        user: Option<&str>,
        timeout: Duration,
    ) -> ExecutionResult<String> {
        self.run_remote_with_timeout(command, host, user, timeout)
    }

    /// Whether mutating remote calls are refused.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs commands through local processes and `ssh`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    dry_run: bool,
    /// Host names that are executed locally without SSH.
    local_hosts: Vec<String>,
    ssh_options: Vec<String>,
    heartbeat: bool,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            dry_run: false,
            local_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            ssh_options: vec![
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
            ],
            heartbeat: false,
        }
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Prints progress dots while remote commands run.
    pub fn with_heartbeat(mut self, enabled: bool) -> Self {
        self.heartbeat = enabled;
        self
    }

    fn is_local(&self, host: &str) -> bool {
        self.local_hosts.iter().any(|h| h == host)
    }

    fn build_local(&self, command_line: &str) -> ExecutionResult<StdCommand> {
        let parts = shlex::split(command_line)
            .ok_or_else(|| ExecutionError::CommandParse(command_line.to_string()))?;
        let (program, args) = parts.split_first().ok_or(ExecutionError::EmptyCommand)?;

        let mut command = StdCommand::new(program);
        command.args(args);
        Ok(command)
    }

    fn build_remote(&self, command_line: &str, host: &str, user: Option<&str>) -> StdCommand {
        let destination = match user {
            Some(u) => format!("{}@{}", u, host),
            None => host.to_string(),
        };
        let mut command = StdCommand::new("ssh");
        command.args(&self.ssh_options).arg(destination).arg(command_line);
        command
    }

    fn command_for(
        &self,
        command_line: &str,
        host: &str,
        user: Option<&str>,
        mutating: bool,
    ) -> ExecutionResult<StdCommand> {
        let trimmed = command_line.trim();
        if trimmed.is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        if self.dry_run && mutating {
            return Err(ExecutionError::NotAllowed {
                command: trimmed.to_string(),
                host: host.to_string(),
            });
        }
        if self.is_local(host) {
            // Remote commands are shell strings; run them through a local shell.
            let mut command = StdCommand::new("sh");
            command.arg("-c").arg(trimmed);
            Ok(command)
        } else {
            Ok(self.build_remote(trimmed, host, user))
        }
    }

    fn finish_remote(command_line: &str, host: &str, output: CommandOutput) -> ExecutionResult<String> {
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ExecutionError::CommandFailed {
                command: command_line.trim().to_string(),
                host: host.to_string(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }

    fn run_with_deadline(
        &self,
        command_line: &str,
        host: &str,
        user: Option<&str>,
        timeout: Duration,
        mutating: bool,
    ) -> ExecutionResult<String> {
        let mut command = self.command_for(command_line, host, user, mutating)?;
        log::debug!(
            "Running on {} with a {:?} limit: {}",
            host,
            timeout,
            command_line.trim()
        );
        let _heartbeat = (self.heartbeat && mutating).then(Heartbeat::start);

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecutionError::Spawn(command_line.trim().to_string(), e))?;

        let output = wait_with_deadline(child, command_line.trim(), host, timeout)?;
        Self::finish_remote(command_line, host, output)
    }
}

impl RemoteExecutor for ShellExecutor {
    fn run_local(&self, command_line: &str) -> ExecutionResult<CommandOutput> {
        let trimmed = command_line.trim();
        if trimmed.is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        log::debug!("Running local command: {}", trimmed);
        let mut command = self.build_local(trimmed)?;
        capture(&mut command, trimmed)
    }

    fn run_remote(&self, command_line: &str, host: &str, user: Option<&str>) -> ExecutionResult<String> {
        let mut command = self.command_for(command_line, host, user, true)?;
        log::debug!("Running on {}: {}", host, command_line.trim());
        let _heartbeat = self.heartbeat.then(Heartbeat::start);
        let output = capture(&mut command, command_line.trim())?;
        Self::finish_remote(command_line, host, output)
    }

    fn run_remote_with_input(
        &self,
        command_line: &str,
        input: &str,
        host: &str,
        user: Option<&str>,
    ) -> ExecutionResult<String> {
        let mut command = self.command_for(command_line, host, user, true)?;
        log::debug!(
            "Running on {} with {} bytes of input: {}",
            host,
            input.len(),
            command_line.trim()
        );
        let output = capture_with_input(&mut command, command_line.trim(), input)?;
        Self::finish_remote(command_line, host, output)
    }

    fn run_remote_with_timeout(
        &self,
        command_line: &str,
        host: &str,
        user: Option<&str>,
        timeout: Duration,
    ) -> ExecutionResult<String> {
        self.run_with_deadline(command_line, host, user, timeout, true)
    }

    fn query_remote(&self, command_line: &str, host: &str, user: Option<&str>) -> ExecutionResult<String> {
        let mut command = self.command_for(command_line, host, user, false)?;
        log::debug!("Querying {}: {}", host, command_line.trim());
        let output = capture(&mut command, command_line.trim())?;
        Self::finish_remote(command_line, host, output)
    }

    fn query_remote_with_timeout(
        &self,
        command_line: &str,
        host: &str,
        user: Option<&str>,
        timeout: Duration,
    ) -> ExecutionResult<String> {
        self.run_with_deadline(command_line, host, user, timeout, false)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

fn to_command_output(output: Output) -> CommandOutput {
    CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

fn capture(command: &mut StdCommand, command_line: &str) -> ExecutionResult<CommandOutput> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ExecutionError::Spawn(command_line.to_string(), e))?;
    Ok(to_command_output(output))
}

fn capture_with_input(command: &mut StdCommand, command_line: &str, input: &str) -> ExecutionResult<CommandOutput> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExecutionError::Spawn(command_line.to_string(), e))?;

    // Written from its own thread so a full stdout pipe cannot stall the write.
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.as_bytes().to_vec();
        std::thread::spawn(move || stdin.write_all(&input))
    });

    let output = child
        .wait_with_output()
        .map_err(|e| ExecutionError::Spawn(command_line.to_string(), e))?;

    if let Some(Ok(Err(e))) = writer.map(JoinHandle::join)
        && e.kind() != ErrorKind::BrokenPipe
    {
        return Err(ExecutionError::Spawn(command_line.to_string(), e));
    }
    Ok(to_command_output(output))
}

/// Collects one output pipe of a child on a background thread.
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl PipeReader {
    fn spawn<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let handle = std::thread::spawn(move || {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(chunk.get(..n).unwrap_or_default()),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::debug!("Stopped reading child output: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buffer, handle }
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn contents(&self) -> String {
        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Non-blocking wait loop with a hard wall-clock cutoff. The child is killed
/// when the deadline passes.
///
/// Both pipes are drained while the child runs. A background process started
/// by the command may keep them open after it exits, so the readers are only
/// waited for until the deadline.
fn wait_with_deadline(
    mut child: Child,
    command_line: &str,
    host: &str,
    timeout: Duration,
) -> ExecutionResult<CommandOutput> {
    let deadline = Instant::now() + timeout;
    let stdout = PipeReader::spawn(child.stdout.take());
    let stderr = PipeReader::spawn(child.stderr.take());

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                while !(stdout.is_finished() && stderr.is_finished()) && Instant::now() < deadline {
                    std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
                }
                return Ok(CommandOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: stdout.contents(),
                    stderr: stderr.contents(),
                });
            }
            Ok(None) => {
                let now = Instant::now();
                if now >= deadline {
                    log::debug!(
                        "Deadline passed, killing child process (PID: {})...",
                        child.id()
                    );
                    if let Err(e) = child.kill() {
                        log::warn!("Failed to kill child process {}: {}", child.id(), e);
                    }
                    child.wait().ok();
                    return Err(ExecutionError::TimedOut {
                        command: command_line.to_string(),
                        host: host.to_string(),
                        timeout,
                    });
                }
                std::thread::sleep(POLL_INTERVAL.min(deadline - now));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExecutionError::Spawn(command_line.to_string(), e)),
        }
    }
}

/// Polls `probe` until it reports success or `timeout` elapses.
///
/// The probe receives the time left and must not run past it. Probe errors
/// are treated as "not yet". Used for waits such as a manager accepting
/// connections or a database finishing its start-up.
pub fn wait_for<F>(what: &str, host: &str, timeout: Duration, interval: Duration, mut probe: F) -> ExecutionResult<()>
where
    F: FnMut(Duration) -> ExecutionResult<bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ExecutionError::TimedOut {
                command: what.to_string(),
                host: host.to_string(),
                timeout,
            });
        }
        match probe(remaining) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e @ ExecutionError::NotAllowed { .. }) => return Err(e),
            Err(e) => log::debug!("Waiting for {} on {}: {}", what, host, e),
        }
        std::thread::sleep(interval.min(deadline.saturating_duration_since(Instant::now())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_refuses_remote_commands() {
        let executor = ShellExecutor::new().dry_run(true);
        let result = executor.run_remote("rm -rf /opt/continuent", "db1", Some("tungsten"));
        assert!(matches!(result, Err(ExecutionError::NotAllowed { .. })));
        assert!(executor.is_dry_run());
    }

    #[cfg(unix)]
    #[test]
    fn test_dry_run_still_allows_queries() {
        let executor = ShellExecutor::new().dry_run(true);
        let out = executor.query_remote("echo probe", "localhost", None).unwrap();
        assert_eq!(out.trim(), "probe");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let executor = ShellExecutor::new();
        assert!(matches!(executor.run_local("   "), Err(ExecutionError::EmptyCommand)));
    }

    #[test]
    fn test_unbalanced_quotes_fail_to_parse() {
        let executor = ShellExecutor::new();
        assert!(matches!(
            executor.run_local("echo 'unterminated"),
            Err(ExecutionError::CommandParse(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_local_command_output_is_captured() {
        let executor = ShellExecutor::new();
        let output = executor.run_local("echo hello").unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");

        let failed = executor.run_local("false").unwrap();
        assert!(!failed.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_localhost_runs_without_ssh() {
        let executor = ShellExecutor::new();
        let out = executor.run_remote("echo local", "localhost", None).unwrap();
        assert_eq!(out.trim(), "local");

        let err = executor.run_remote("false", "localhost", None).unwrap_err();
        assert!(matches!(err, ExecutionError::CommandFailed { exit_code: 1, .. }));

        let piped = executor.run_remote("echo a && echo b", "localhost", None).unwrap();
        assert_eq!(piped, "a\nb\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_is_distinct_from_failure() {
        let executor = ShellExecutor::new();
        let err = executor
            .run_remote_with_timeout("sleep 5", "localhost", None, Duration::from_millis(200))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[cfg(unix)]
    #[test]
    fn test_large_output_within_deadline() {
        let executor = ShellExecutor::new();
        let out = executor
            .run_remote_with_timeout(
                "head -c 200000 /dev/zero | tr '\\0' a",
                "localhost",
                None,
                Duration::from_secs(3),
            )
            .unwrap();
        assert_eq!(out.len(), 200_000);
        assert!(out.bytes().all(|b| b == b'a'));
    }

    #[cfg(unix)]
    #[test]
    fn test_input_is_passed_on_stdin() {
        let executor = ShellExecutor::new();
        let body = "TPM_EOF\n$(echo injected)\n".repeat(20_000);
        let out = executor
            .run_remote_with_input("cat", &body, "localhost", None)
            .unwrap();
        assert_eq!(out, body);

        let dry = ShellExecutor::new().dry_run(true);
        assert!(matches!(
            dry.run_remote_with_input("cat", "x", "localhost", None),
            Err(ExecutionError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_wait_for_times_out() {
        let result = wait_for(
            "manager",
            "db1",
            Duration::from_millis(50),
            Duration::from_millis(10),
            |_| Ok(false),
        );
        assert!(matches!(result, Err(ExecutionError::TimedOut { .. })));

        let mut attempts = 0;
        let result = wait_for("manager", "db1", Duration::from_secs(1), Duration::from_millis(1), |_| {
            attempts += 1;
            Ok(attempts >= 3)
        });
        assert!(result.is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_for_is_a_hard_cutoff() {
        let executor = ShellExecutor::new();
        let started = Instant::now();
        let err = wait_for(
            "manager",
            "localhost",
            Duration::from_millis(300),
            Duration::from_secs(5),
            |remaining| {
                executor
                    .query_remote_with_timeout("sleep 3; false", "localhost", None, remaining)
                    .map(|_| true)
            },
        )
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("within 300ms"), "{}", err);
    }
}
