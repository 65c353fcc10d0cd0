//! Launches the external assembler and simulator on a worker thread.
//!
//! Output is forwarded over a channel as raw chunks; the receiving side owns
//! all parsing state. A run is abandoned through its [`Cancel`] handle, which
//! kills the child in flight even if it never writes anything. Dropping the
//! receiver has the same effect once the worker next tries to send.

use std::ffi::OsStr;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::config;
use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Stage {
    Assemble,
    Simulate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Assemble => write!(f, "assembler"),
            Stage::Simulate => write!(f, "simulator"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub assembler: PathBuf,
    pub simulator: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Toolchain {
            assembler: PathBuf::from(config::DEFAULT_ASSEMBLER),
            simulator: PathBuf::from(config::DEFAULT_SIMULATOR),
        }
    }
}

/// What a worker should do: optionally assemble `source` into `binary`,
/// then simulate `binary`.
#[derive(Debug, Clone)]
pub struct Job {
    pub source: Option<PathBuf>,
    pub binary: PathBuf,
}

#[derive(Debug)]
pub enum RunEvent {
    Started(Stage),
    Output(Stage, Vec<u8>),
    Exited(Stage, ExitStatus),
    Failed(Error),
    /// Sent once after the last event of a run.
    Done,
}

/// Kill switch shared by a worker and whoever started it.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<Mutex<Slot>>);

#[derive(Debug, Default)]
struct Slot {
    cancelled: bool,
    child: Option<Child>,
}

impl Cancel {
    /// Kills the running child, if any, and keeps the worker from starting
    /// another stage.
    pub fn cancel(&self) {
        let mut slot = self.lock();
        slot.cancelled = true;
        if let Some(child) = slot.child.as_mut() {
            tracing::debug!(pid = child.id(), "killing abandoned child");
            let _ = child.kill();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parks `child` where `cancel` can reach it. Returns `false`, with the
    /// child already killed and reaped, if the run was cancelled first.
    fn adopt(&self, mut child: Child) -> bool {
        let mut slot = self.lock();
        if slot.cancelled {
            let _ = child.kill();
            let _ = child.wait();
            return false;
        }
        slot.child = Some(child);
        true
    }

    fn release(&self) -> Option<Child> {
        self.lock().child.take()
    }

    fn abandon(&self) {
        self.cancel();
        if let Some(mut child) = self.release() {
            tracing::debug!(pid = child.id(), "abandoning run");
            let _ = child.wait();
        }
    }
}

pub fn spawn(toolchain: Toolchain, job: Job, tx: Sender<RunEvent>, cancel: Cancel) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(error) = execute(&toolchain, &job, &tx, &cancel) {
            tracing::warn!(%error, "run failed");
            let _ = tx.send(RunEvent::Failed(error));
        }
        let _ = tx.send(RunEvent::Done);
    })
}

fn execute(toolchain: &Toolchain, job: &Job, tx: &Sender<RunEvent>, cancel: &Cancel) -> Result<()> {
    if let Some(source) = &job.source {
        let args = [source.as_os_str(), OsStr::new("-o"), job.binary.as_os_str()];
        match run_tool(Stage::Assemble, &toolchain.assembler, &args, tx, cancel)? {
            Some(status) if status.success() => {}
            Some(status) => {
                tracing::info!(%status, "assembler failed, not simulating");
                return Ok(());
            }
            None => return Ok(()),
        }
    }

    run_tool(Stage::Simulate, &toolchain.simulator, &[job.binary.as_os_str()], tx, cancel)?;
    Ok(())
}

/// Runs one tool to completion with stdout and stderr merged into one pipe.
///
/// Returns `None` when the run was cancelled or the receiver went away.
fn run_tool<S: AsRef<OsStr>>(
    stage: Stage,
    program: &Path,
    args: &[S],
    tx: &Sender<RunEvent>,
    cancel: &Cancel,
) -> Result<Option<ExitStatus>> {
    let (mut reader, writer) = io::pipe().map_err(|source| Error::Pipe { stage, source })?;

    let child = {
        let stderr = writer
            .try_clone()
            .map_err(|source| Error::Pipe { stage, source })?;
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr);
        tracing::info!(%stage, program = %program.display(), "launching");
        // `command` owns our copies of the write end; it must drop before
        // reading or the pipe never reaches EOF.
        command.spawn().map_err(|source| Error::Launch {
            stage,
            program: program.to_path_buf(),
            source,
        })?
    };

    if !cancel.adopt(child) {
        return Ok(None);
    }
    if tx.send(RunEvent::Started(stage)).is_err() {
        cancel.abandon();
        return Ok(None);
    }

    let mut buf = [0u8; config::READ_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                cancel.abandon();
                return Err(Error::Read { stage, source });
            }
        };
        if tx.send(RunEvent::Output(stage, buf[..n].to_vec())).is_err() {
            cancel.abandon();
            return Ok(None);
        }
    }

    let Some(mut child) = cancel.release() else {
        return Ok(None);
    };
    let status = child.wait().map_err(|source| Error::Wait { stage, source })?;
    if cancel.is_cancelled() {
        tracing::debug!(%stage, %status, "cancelled run exited");
        return Ok(None);
    }
    tracing::info!(%stage, %status, "exited");
    if tx.send(RunEvent::Exited(stage, status)).is_err() {
        return Ok(None);
    }
    Ok(Some(status))
}
