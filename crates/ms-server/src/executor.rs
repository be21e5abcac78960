//! Bounded-time command execution
//!
//! Runs `argv[0]` directly (no shell) with stdin closed. Stdout and stderr are
//! read by two tasks feeding one channel, so the captured text is interleaved
//! in the order the chunks arrived. On Unix the child leads its own process
//! group, and a timeout kills the whole group before reaping the child.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ms_protocol::message::{MSG_EXEC_FAILED, MSG_EXEC_SUCCESS};
use ms_protocol::{Response, ResponseData};

/// Default wall-clock bound on a single command
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Read buffer size for the output pipes
const PIPE_BUFFER_SIZE: usize = 4096;

/// Longest wait for output pipes to close once the child is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Ways a command run can fail
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The program could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a non-zero status
    #[error("exit status {0}")]
    NonZeroExit(i32),

    /// The program was terminated by a signal
    #[error("terminated by signal {0}")]
    Signal(i32),

    /// The program outlived the wall-clock bound and was killed
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// Waiting on the program failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything learned from one run
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// The argv joined with spaces
    pub command: String,
    /// Combined stdout/stderr
    pub output: String,
    /// Process id, if the program started
    pub pid: Option<u32>,
    /// Wall-clock time spent
    pub elapsed: Duration,
    /// `Ok` only for a zero exit status
    pub result: Result<(), ExecutionError>,
}

impl ExecutionOutcome {
    /// Whether the program ran and exited successfully
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Build the response for this run.
    ///
    /// `command` and `output` are always present; `error` only on failure.
    pub fn into_response(self) -> Response {
        let (success, message, error) = match self.result {
            Ok(()) => (true, MSG_EXEC_SUCCESS, None),
            Err(e) => (false, MSG_EXEC_FAILED, Some(e.to_string())),
        };

        Response::new(
            success,
            message,
            Some(ResponseData {
                command: Some(self.command),
                output: Some(self.output),
                error,
            }),
        )
    }
}

/// Runs programs under a wall-clock bound
#[derive(Debug, Clone)]
pub struct Executor {
    timeout: Duration,
}

impl Executor {
    /// Create an executor with the given bound
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The wall-clock bound
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `argv[0]` with `argv[1..]`.
    ///
    /// Never panics on an empty argv; that is reported as a spawn failure,
    /// though callers are expected to validate first.
    pub async fn run(&self, argv: &[String]) -> ExecutionOutcome {
        let started = Instant::now();
        let command_line = argv.join(" ");

        let Some((program, args)) = argv.split_first() else {
            return ExecutionOutcome {
                command: command_line,
                output: String::new(),
                pid: None,
                elapsed: started.elapsed(),
                result: Err(ExecutionError::Spawn {
                    program: String::new(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
                }),
            };
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                return ExecutionOutcome {
                    command: command_line,
                    output: String::new(),
                    pid: None,
                    elapsed: started.elapsed(),
                    result: Err(ExecutionError::Spawn {
                        program: program.clone(),
                        source,
                    }),
                };
            }
        };

        let pid = child.id();
        tracing::debug!("Spawned {} with PID {:?}", program, pid);

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_pipe_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_pipe_reader(stderr, tx.clone()));
        }
        drop(tx);

        let mut output = Vec::new();
        let run = async {
            while let Some(chunk) = rx.recv().await {
                output.extend_from_slice(&chunk);
            }
            child.wait().await
        };

        let waited = tokio::time::timeout(self.timeout, run).await;
        let result = match waited {
            Ok(Ok(status)) => exit_result(status),
            Ok(Err(e)) => Err(ExecutionError::Io(e)),
            Err(_) => {
                tracing::warn!("Command exceeded {:?}, killing PID {:?}", self.timeout, pid);
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    tracing::error!("Failed to kill PID {:?}: {}", pid, e);
                }
                Err(ExecutionError::Timeout(self.timeout))
            }
        };

        // Draining is bounded: a descendant that left the process group can
        // hold a pipe open past the kill.
        for mut reader in readers {
            if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                tracing::warn!("Output pipe of PID {:?} still open, abandoning it", pid);
                reader.abort();
            }
        }
        while let Ok(chunk) = rx.try_recv() {
            output.extend_from_slice(&chunk);
        }

        ExecutionOutcome {
            command: command_line,
            output: String::from_utf8_lossy(&output).into_owned(),
            pid,
            elapsed: started.elapsed(),
            result,
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_EXEC_TIMEOUT)
    }
}

fn exit_result(status: ExitStatus) -> Result<(), ExecutionError> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(ExecutionError::NonZeroExit(code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(ExecutionError::Signal(signal));
        }
    }
    Err(ExecutionError::NonZeroExit(-1))
}

fn spawn_pipe_reader<R>(mut pipe: R, tx: mpsc::UnboundedSender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; PIPE_BUFFER_SIZE];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("Pipe read error: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    // The child was started with process_group(0), so its pid is the pgid.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            "killpg({}) failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
