//! Bounded external tool execution.
//!
//! The build/test runner is treated as an opaque subprocess: it receives
//! arguments and hands back an exit code plus its output. `ToolRunner` is the
//! seam the phase runner is written against, so scenario tests can substitute
//! a scripted runner for the real toolchain.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use testrig_common::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to keep reading output after the tool has exited. A grandchild
/// that inherited the pipes can hold them open past the tool's own exit.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// One invocation of an external tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Space-joined command line, for logs and reports.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether any argument equals or starts with `prefix`.
    pub fn has_arg(&self, prefix: &str) -> bool {
        self.args.iter().any(|a| a.starts_with(prefix))
    }
}

/// Captured result of a finished (or timed-out) tool run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// `None` when the tool was killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// stdout followed by stderr, separated by a newline when both are present.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Runs an external tool to completion.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// `Err` only when the tool could not be started at all; a nonzero exit
    /// or a timeout is reported through `ToolOutput`.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// `ToolRunner` backed by real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct ProcessToolRunner;

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        run_tool(invocation).await
    }
}

/// Run a tool, capturing stdout/stderr. The child is killed if the timeout
/// elapses; whatever it wrote before that is still returned.
pub async fn run_tool(invocation: &ToolInvocation) -> Result<ToolOutput> {
    debug!("Running tool: {}", invocation.command_line());

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(ref dir) = invocation.working_dir {
        cmd.current_dir(dir);
    }
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| Error::tool(&invocation.program, e.to_string()))?;

    let (stdout_buf, stdout_task) = drain(child.stdout.take());
    let (stderr_buf, stderr_task) = drain(child.stderr.take());

    let status = match invocation.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Some(status),
            Err(_) => {
                warn!(
                    "Tool timed out after {:?}: {}",
                    limit,
                    invocation.command_line()
                );
                kill_and_reap(&mut child).await;
                None
            }
        },
        None => Some(child.wait().await),
    }
    .transpose()
    .map_err(|e| Error::tool(&invocation.program, format!("failed to wait for tool: {}", e)))?;

    for task in [stdout_task, stderr_task].into_iter().flatten() {
        let abort = task.abort_handle();
        if tokio::time::timeout(DRAIN_GRACE, task).await.is_err() {
            debug!("Output pipe of {} still open, keeping what was read", invocation.program);
            abort.abort();
        }
    }

    let stdout = String::from_utf8_lossy(&stdout_buf.lock().await).into_owned();
    let mut stderr = String::from_utf8_lossy(&stderr_buf.lock().await).into_owned();

    let result = match status {
        Some(status) => ToolOutput {
            exit_code: status.code(),
            stdout,
            stderr,
            duration: started.elapsed(),
            timed_out: false,
        },
        None => {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            if let Some(limit) = invocation.timeout {
                stderr.push_str(&format!("timed out after {:?}", limit));
            }
            ToolOutput {
                exit_code: None,
                stdout,
                stderr,
                duration: started.elapsed(),
                timed_out: true,
            }
        }
    };

    debug!(
        "Tool finished: {} (exit={:?}, {:?})",
        invocation.program, result.exit_code, result.duration
    );
    Ok(result)
}

/// Copy everything `reader` yields into a shared buffer, so a partial read
/// survives the task being aborted.
fn drain<R>(reader: Option<R>) -> (OutputBuffer, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = OutputBuffer::default();
    let task = reader.map(|mut reader| {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buffer.lock().await.extend_from_slice(&chunk[..n]),
                }
            }
        })
    });
    (buffer, task)
}

async fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill timed-out tool: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap timed-out tool: {}", e);
    }
}
