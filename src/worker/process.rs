use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::StopPolicy;
use crate::error::{Result, SnowflakeError};
use crate::worker::controller::{CapturedOutput, JobController};

const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;

/// How long an exited run waits for its output readers to hit EOF.
const READER_DRAIN: Duration = Duration::from_millis(500);

/// Script extension -> interpreter used when a deploy names no command.
const INTERPRETERS: &[(&str, &str)] = &[
    ("py", "python3"),
    ("sh", "bash"),
    ("js", "node"),
    ("go", "go run"),
];

/// Pick an interpreter for `target_path` from its file extension.
pub fn infer_command(target_path: &str) -> Option<&'static str> {
    let ext = Path::new(target_path).extension()?.to_str()?;
    INTERPRETERS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, command)| *command)
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs `<command> <target_path> [arguments..]` as a child process.
///
/// Standard output and error are drained by background tasks into bounded
/// buffers, so neither `start()` nor `output()` ever waits on the child.
///
/// On unix the child leads its own process group, and `stop()` signals the
/// whole group so that work the interpreter spawned goes down with it.
pub struct ProcessController {
    label: String,
    program: String,
    args: Vec<String>,
    stop_policy: StopPolicy,
    output_limit: usize,
    child: Option<Child>,
    group: Option<u32>,
    readers: Vec<JoinHandle<()>>,
    captured: Arc<Mutex<CapturedOutput>>,
}

impl ProcessController {
    /// Build a controller, inferring the command from the target path's
    /// extension when `command` is absent or blank.
    pub fn new(target_path: &str, command: Option<&str>, arguments: Vec<String>) -> Result<Self> {
        let command = match command.map(str::trim).filter(|c| !c.is_empty()) {
            Some(explicit) => explicit,
            None => infer_command(target_path)
                .ok_or_else(|| SnowflakeError::CommandResolution(target_path.to_string()))?,
        };

        // Commands like "go run" carry their own leading arguments
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| SnowflakeError::CommandResolution(target_path.to_string()))?;
        let mut args: Vec<String> = words.collect();
        args.push(target_path.to_string());
        args.extend(arguments);

        Ok(Self {
            label: String::new(),
            program,
            args,
            stop_policy: StopPolicy::default(),
            output_limit: DEFAULT_OUTPUT_LIMIT,
            child: None,
            group: None,
            readers: Vec::new(),
            captured: Arc::new(Mutex::new(CapturedOutput::default())),
        })
    }

    /// Tag log lines with the owning job's id.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_stop_policy(mut self, stop_policy: StopPolicy) -> Self {
        self.stop_policy = stop_policy;
        self
    }

    pub fn with_output_limit(mut self, output_limit: usize) -> Self {
        self.output_limit = output_limit.max(1);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Reap the child if it has exited. Returns whether it is still running.
    ///
    /// An exited run only reports not-alive once its output readers have
    /// drained, so `output()` afterwards holds everything the run wrote.
    async fn poll(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        let exit_code = match child.try_wait() {
            Ok(None) => return true,
            Ok(Some(status)) => {
                tracing::debug!(job_id = %self.label, status = %status, "Process exited");
                status.code()
            }
            Err(e) => {
                tracing::warn!(job_id = %self.label, error = %e, "Cannot poll process, dropping handle");
                None
            }
        };
        self.child = None;
        self.drain_readers().await;
        self.captured.lock().exit_code = exit_code;
        if !self.group_alive() {
            self.group = None;
        }
        false
    }

    async fn drain_readers(&mut self) {
        let deadline = tokio::time::Instant::now() + READER_DRAIN;
        for reader in self.readers.drain(..) {
            if tokio::time::timeout_at(deadline, reader).await.is_err() {
                // Something outside the run still holds the pipe
                tracing::debug!(job_id = %self.label, "Output reader still open after exit");
            }
        }
    }

    /// Whether any process is left in the run's process group.
    fn group_alive(&self) -> bool {
        #[cfg(unix)]
        {
            use nix::sys::signal::killpg;
            use nix::unistd::Pid;

            if let Some(group) = self.group {
                return killpg(Pid::from_raw(group as i32), None).is_ok();
            }
        }
        false
    }

    /// Kill whatever the run left behind in its group once the leader is gone.
    async fn clear_group(&mut self) {
        if self.group_alive() {
            tracing::debug!(job_id = %self.label, group = ?self.group, "Killing leftover processes of the run");
            if let Err(e) = self.signal(false) {
                tracing::warn!(job_id = %self.label, group = ?self.group, error = %e, "Could not kill leftover processes");
            }
            tokio::time::sleep(self.stop_policy.pause()).await;
        }
        self.group = None;
    }

    /// SIGTERM on the first attempt, SIGKILL afterwards, to the whole group.
    fn signal(&mut self, graceful: bool) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(group) = self.group {
                let signal = if graceful { Signal::SIGTERM } else { Signal::SIGKILL };
                return match killpg(Pid::from_raw(group as i32), signal) {
                    Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
                    Err(e) => Err(std::io::Error::from(e)),
                };
            }
        }
        #[cfg(not(unix))]
        let _ = graceful;

        match self.child.as_mut() {
            Some(child) => child.start_kill(),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobController for ProcessController {
    async fn start(&mut self) -> Result<()> {
        if self.poll().await {
            tracing::warn!(job_id = %self.label, pid = ?self.pid(), "Process is already alive");
            return Ok(());
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SnowflakeError::Spawn {
            command: self.describe(),
            source,
        })?;

        // Fresh buffers per run; readers of an earlier run keep their own
        self.captured = Arc::new(Mutex::new(CapturedOutput::default()));
        self.readers.clear();
        if let Some(stdout) = child.stdout.take() {
            self.readers.push(tokio::spawn(capture(
                stdout,
                self.captured.clone(),
                Stream::Stdout,
                self.output_limit,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers.push(tokio::spawn(capture(
                stderr,
                self.captured.clone(),
                Stream::Stderr,
                self.output_limit,
            )));
        }

        tracing::info!(job_id = %self.label, pid = ?child.id(), command = %self.describe(), "Process started");
        self.group = child.id();
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let pid = self.pid();
        let attempts = self.stop_policy.attempts;

        for attempt in 0..attempts {
            if !self.poll().await {
                self.clear_group().await;
                return Ok(());
            }
            if let Err(e) = self.signal(attempt == 0) {
                tracing::warn!(job_id = %self.label, pid = ?pid, attempt, error = %e, "Termination signal failed");
            }
            tokio::time::sleep(self.stop_policy.pause()).await;
        }

        if self.poll().await {
            return Err(SnowflakeError::StopFailed { pid, attempts });
        }
        self.clear_group().await;
        Ok(())
    }

    async fn is_alive(&mut self) -> bool {
        self.poll().await
    }

    fn output(&self) -> CapturedOutput {
        self.captured.lock().clone()
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

async fn capture<R>(mut reader: R, sink: Arc<Mutex<CapturedOutput>>, stream: Stream, limit: usize)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&chunk[..n]);
                let mut captured = sink.lock();
                let buffer = match stream {
                    Stream::Stdout => &mut captured.stdout,
                    Stream::Stderr => &mut captured.stderr,
                };
                append_bounded(buffer, &text, limit);
            }
            Err(e) => {
                tracing::debug!(stream = ?stream, error = %e, "Output stream closed with error");
                break;
            }
        }
    }
}

/// Append and keep only the newest `limit` bytes.
fn append_bounded(buffer: &mut String, text: &str, limit: usize) {
    buffer.push_str(text);
    if buffer.len() > limit {
        let mut cut = buffer.len() - limit;
        while !buffer.is_char_boundary(cut) {
            cut += 1;
        }
        buffer.drain(..cut);
    }
}
