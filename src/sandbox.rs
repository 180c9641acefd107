//! Bounded execution of generated commands.
//!
//! Each command runs as `<shell> -c <command>` in its own process group with
//! stdin on `/dev/null` and stdout/stderr merged into one pipe. The parent
//! polls the pipe on a fixed tick; once the runtime budget is exhausted (or
//! shutdown is requested) it escalates SIGTERM, then a bounded number of
//! SIGKILLs, one step per tick, all addressed to the whole group.
//!
//! # Limitations
//! - After the last kill attempt the child is abandoned without being reaped.
//! - A grandchild that keeps the pipe open past the child's exit is not
//!   waited for; only data already buffered is collected.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::error::ExecError;
use crate::shutdown::Shutdown;

const READ_CHUNK: usize = 8 * 1024;

/// Runs a rendered command and returns its captured output.
pub trait CommandExecutor: Send + Sync {
    /// Executes `command`, honouring `shutdown`.
    ///
    /// # Errors
    /// Any failure to start, observe, or finish the command normally.
    fn execute(&self, command: &str, shutdown: &Shutdown) -> Result<Vec<u8>, ExecError>;
}

/// Signal sent to the process group at an escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// SIGTERM.
    Terminate,
    /// SIGKILL.
    Kill,
}

impl GroupSignal {
    const fn raw(self) -> libc::c_int {
        match self {
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

/// What to do at the next escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStep {
    /// Deliver a signal to the group.
    Signal(GroupSignal),
    /// Stop trying and report the child as unresponsive.
    GiveUp,
}

/// Termination state of a running child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escalation {
    /// No signal sent yet.
    #[default]
    Running,
    /// SIGTERM sent.
    TermSent,
    /// This many SIGKILLs sent.
    KillSent(u32),
}

impl Escalation {
    /// Returns the next state and the step that leads to it.
    #[must_use]
    pub const fn advance(self, kill_attempts: u32) -> (Self, EscalationStep) {
        match self {
            Self::Running => (Self::TermSent, EscalationStep::Signal(GroupSignal::Terminate)),
            Self::TermSent if kill_attempts > 0 => {
                (Self::KillSent(1), EscalationStep::Signal(GroupSignal::Kill))
            }
            Self::KillSent(sent) if sent < kill_attempts => {
                (Self::KillSent(sent + 1), EscalationStep::Signal(GroupSignal::Kill))
            }
            other => (other, EscalationStep::GiveUp),
        }
    }

    /// Number of signals delivered so far.
    #[must_use]
    pub const fn stage(self) -> u32 {
        match self {
            Self::Running => 0,
            Self::TermSent => 1,
            Self::KillSent(sent) => 1 + sent,
        }
    }

    /// True once any signal was sent.
    #[must_use]
    pub const fn started(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Process-group sandbox backed by `/bin/sh -c`.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    /// Creates a sandbox with the given limits.
    #[must_use]
    pub const fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Sandbox settings.
    #[must_use]
    pub const fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn spawn(&self, command: &str) -> Result<(Child, File), ExecError> {
        let (reader, writer) = output_pipe().map_err(|source| ExecError::Pipe { source })?;
        let stderr = writer.try_clone().map_err(|source| ExecError::Pipe { source })?;
        set_nonblocking(reader.as_fd()).map_err(|source| ExecError::Pipe { source })?;

        // The Command owns the write ends; dropping it at the end of this
        // block leaves the child as the only writer.
        let child = {
            let mut cmd = Command::new(&self.config.shell);
            cmd.arg("-c")
                .arg(command)
                .stdin(Stdio::null())
                .stdout(Stdio::from(writer))
                .stderr(Stdio::from(stderr))
                .process_group(0);
            cmd.spawn().map_err(|source| ExecError::Spawn { source })?
        };

        Ok((child, File::from(reader)))
    }
}

impl CommandExecutor for ProcessSandbox {
    fn execute(&self, command: &str, shutdown: &Shutdown) -> Result<Vec<u8>, ExecError> {
        let (mut child, mut reader) = self.spawn(command)?;
        let pid = child.id();
        let tick = self.config.poll_interval();
        let budget = self.config.runtime_budget();
        let cap = self.config.max_output_bytes;

        let started = Instant::now();
        let mut output = Vec::new();
        let mut eof = false;
        let mut escalation = Escalation::Running;
        let mut last_signal: Option<Instant> = None;

        loop {
            if eof {
                thread::sleep(tick);
            } else {
                match wait_readable(reader.as_fd(), tick) {
                    Ok(true) => eof = drain(&mut reader, &mut output, cap),
                    Ok(false) => {}
                    Err(source) => {
                        signal_group(pid, GroupSignal::Kill);
                        return Err(ExecError::Poll { source });
                    }
                }
            }

            let status = match child.try_wait() {
                Ok(status) => status,
                Err(source) => {
                    signal_group(pid, GroupSignal::Kill);
                    return Err(ExecError::Wait { source });
                }
            };
            if let Some(status) = status {
                if !eof {
                    drain(&mut reader, &mut output, cap);
                }
                debug!(pid, %status, bytes = output.len(), elapsed = ?started.elapsed(), "command finished");
                if escalation.started() {
                    return Err(ExecError::Interrupted {
                        signal_stage: escalation.stage(),
                    });
                }
                return Ok(output);
            }

            let over_budget = started.elapsed() >= budget;
            let cancelled = self.config.escalate_on_shutdown && shutdown.is_requested();
            let due = last_signal.map_or(true, |at| at.elapsed() >= tick);
            if (over_budget || cancelled) && due {
                let (next, step) = escalation.advance(self.config.kill_attempts);
                match step {
                    EscalationStep::Signal(signal) => {
                        debug!(pid, ?signal, over_budget, cancelled, "escalating");
                        signal_group(pid, signal);
                        escalation = next;
                        last_signal = Some(Instant::now());
                    }
                    EscalationStep::GiveUp => {
                        warn!(pid, attempts = self.config.kill_attempts, "child did not exit, abandoning it");
                        return Err(ExecError::Unresponsive {
                            attempts: self.config.kill_attempts,
                        });
                    }
                }
            }
        }
    }
}

/// Renders at most `limit` bytes of `output` with non-printable bytes escaped.
#[must_use]
pub fn output_preview(output: &[u8], limit: usize) -> String {
    let shown = &output[..output.len().min(limit)];
    let mut preview = shown.escape_ascii().to_string();
    if output.len() > limit {
        preview.push_str("...");
    }
    preview
}

#[cfg(target_os = "linux")]
fn output_pipe() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe2 writes.
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are owned by nobody else.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

#[cfg(not(target_os = "linux"))]
fn output_pipe() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are owned by nobody else.
    let (reader, writer) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in [&reader, &writer] {
        // SAFETY: fd is a valid open descriptor.
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok((reader, writer))
}

fn set_nonblocking(fd: BorrowedFd<'_>) -> std::io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: raw is a valid open descriptor for the duration of the borrow.
    unsafe {
        let flags = libc::fcntl(raw, libc::F_GETFL);
        if flags < 0 || libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Waits up to `timeout` for the descriptor to become readable or hang up.
fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: `pfd` is a single valid pollfd.
    let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
    if ready < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(ready > 0)
}

/// Reads everything currently available. Returns `true` at end of stream.
fn drain(reader: &mut File, output: &mut Vec<u8>, cap: usize) -> bool {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return true,
            Ok(n) => {
                let room = cap.saturating_sub(output.len());
                output.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                debug!(error = %e, "output read failed");
                return true;
            }
        }
    }
}

fn signal_group(pid: u32, signal: GroupSignal) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, signal.raw()) };
    if rc != 0 {
        debug!(pid, ?signal, error = %std::io::Error::last_os_error(), "group signal failed");
    }
}
