//! Player process spawning and child tracking.
//!
//! The controller only sees the [`Spawner`] and [`ChildHandle`] traits.
//! [`ForkSpawner`] is the real implementation on top of fork/exec.

use std::ffi::{c_char, CString};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid, SysconfVar};
use serde::Serialize;

use super::launch::{find_player, LaunchError, LaunchSpec, EXEC_FAILED_STATUS};

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;
const STDERR: RawFd = 2;

/// Upper bound for the descriptor sweep in the child.
const MAX_CLOSE_FD: RawFd = 65536;

/// Signal severity used while stopping the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
  /// SIGTERM
  Graceful,
  /// SIGKILL
  Forced,
}

impl Termination {
  fn signal(self) -> Signal {
    match self {
      Termination::Graceful => Signal::SIGTERM,
      Termination::Forced => Signal::SIGKILL,
    }
  }
}

/// How the child went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitKind {
  /// Normal exit with status code.
  Exited(i32),
  /// Killed by a signal number.
  Signaled(i32),
  /// Already reaped by someone else.
  Vanished,
}

impl ExitKind {
  /// The child could not exec the player binary.
  pub fn is_exec_failure(&self) -> bool {
    matches!(self, ExitKind::Exited(code) if *code == EXEC_FAILED_STATUS)
  }
}

/// A running child process.
pub trait ChildHandle: Send {
  fn pid(&self) -> u32;

  /// Non-blocking wait. `Ok(None)` while the child is alive.
  fn try_wait(&mut self) -> io::Result<Option<ExitKind>>;

  fn signal(&mut self, termination: Termination) -> io::Result<()>;
}

/// Parent ends of the slave pipes.
pub struct SlavePipes {
  /// Written by us, the child's stdin.
  pub command: File,
  /// Read by us, the child's stdout and stderr.
  pub status: File,
}

pub struct SpawnedPlayer {
  pub child: Box<dyn ChildHandle>,
  /// Present iff the spec asked for slave mode.
  pub pipes: Option<SlavePipes>,
}

/// Starts player processes.
pub trait Spawner: Send {
  fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedPlayer, LaunchError>;
}

/// Spawner using fork/exec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForkSpawner;

impl Spawner for ForkSpawner {
  fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedPlayer, LaunchError> {
    spawn_player(spec)
  }
}

struct ChildPipes {
  command_read: OwnedFd,
  command_write: OwnedFd,
  status_read: OwnedFd,
  status_write: OwnedFd,
}

fn to_cstring(bytes: &[u8]) -> Result<CString, LaunchError> {
  CString::new(bytes)
    .map_err(|_| LaunchError::InvalidArgument(String::from_utf8_lossy(bytes).into_owned()))
}

fn descriptor_limit() -> RawFd {
  match unistd::sysconf(SysconfVar::OPEN_MAX) {
    Ok(Some(n)) => RawFd::try_from(n).unwrap_or(MAX_CLOSE_FD).min(MAX_CLOSE_FD),
    _ => 1024,
  }
}

/// Fork and exec the player described by `spec`.
fn spawn_player(spec: &LaunchSpec) -> Result<SpawnedPlayer, LaunchError> {
  let args = spec.args()?;
  let executable = find_player(&spec.executable);

  // everything the child needs is allocated before fork
  let exe = to_cstring(executable.as_os_str().as_bytes())?;
  let argv = args
    .iter()
    .map(|arg| to_cstring(arg.as_bytes()))
    .collect::<Result<Vec<_>, _>>()?;
  // NULL-terminated pointer array for execv, borrowed from `argv`
  let argv_ptrs: Vec<*const c_char> = argv
    .iter()
    .map(|arg| arg.as_ptr())
    .chain(std::iter::once(std::ptr::null()))
    .collect();
  let max_fd = descriptor_limit();

  let pipes = if spec.slave {
    let (command_read, command_write) = unistd::pipe().map_err(LaunchError::PipeCreation)?;
    let (status_read, status_write) = unistd::pipe().map_err(LaunchError::PipeCreation)?;
    Some(ChildPipes {
      command_read,
      command_write,
      status_read,
      status_write,
    })
  } else {
    None
  };

  log::info!("Spawning player: {:?} with args: {:?}", executable, &args[1..]);

  // SAFETY: the child branch only calls dup2, close, execv and _exit, none of
  // which allocate. `exe`, `argv` and `argv_ptrs` outlive the exec.
  match unsafe { unistd::fork() }.map_err(LaunchError::Fork)? {
    ForkResult::Child => {
      if let Some(pipes) = &pipes {
        let _ = unistd::dup2(pipes.command_read.as_raw_fd(), STDIN);
        let _ = unistd::dup2(pipes.status_write.as_raw_fd(), STDOUT);
        let _ = unistd::dup2(pipes.status_write.as_raw_fd(), STDERR);
      }
      for fd in (STDERR + 1)..max_fd {
        let _ = unistd::close(fd);
      }
      unsafe {
        libc::execv(exe.as_ptr(), argv_ptrs.as_ptr());
        libc::_exit(EXEC_FAILED_STATUS)
      }
    }
    ForkResult::Parent { child } => {
      log::info!("Player started (pid: {})", child);
      // the child's ends are dropped here
      let pipes = pipes.map(|p| SlavePipes {
        command: File::from(p.command_write),
        status: File::from(p.status_read),
      });
      Ok(SpawnedPlayer {
        child: Box::new(ForkedChild { pid: child }),
        pipes,
      })
    }
  }
}

/// Child created by [`ForkSpawner`].
#[derive(Debug)]
struct ForkedChild {
  pid: Pid,
}

impl ChildHandle for ForkedChild {
  fn pid(&self) -> u32 {
    self.pid.as_raw() as u32
  }

  fn try_wait(&mut self) -> io::Result<Option<ExitKind>> {
    match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
      Ok(WaitStatus::Exited(_, code)) => Ok(Some(ExitKind::Exited(code))),
      Ok(WaitStatus::Signaled(_, signal, _)) => Ok(Some(ExitKind::Signaled(signal as i32))),
      Ok(_) => Ok(None),
      Err(Errno::ECHILD) => Ok(Some(ExitKind::Vanished)),
      Err(e) => Err(e.into()),
    }
  }

  fn signal(&mut self, termination: Termination) -> io::Result<()> {
    kill(self.pid, termination.signal())?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exec_failure_status() {
    assert!(ExitKind::Exited(EXEC_FAILED_STATUS).is_exec_failure());
    assert!(!ExitKind::Exited(0).is_exec_failure());
    assert!(!ExitKind::Signaled(9).is_exec_failure());
  }

  #[test]
  fn test_termination_signals() {
    assert_eq!(Termination::Graceful.signal(), Signal::SIGTERM);
    assert_eq!(Termination::Forced.signal(), Signal::SIGKILL);
  }

  #[test]
  fn test_missing_binary_exits_with_exec_failure_status() {
    let dir = tempfile::tempdir().unwrap();
    let spec = LaunchSpec::new(dir.path().join("missing-player"), "/video/a.mkv");
    let mut child = ForkSpawner.spawn(&spec).unwrap().child;

    let started = std::time::Instant::now();
    let kind = loop {
      if let Some(kind) = child.try_wait().unwrap() {
        break kind;
      }
      assert!(started.elapsed() < std::time::Duration::from_secs(10));
      std::thread::sleep(std::time::Duration::from_millis(2));
    };
    assert_eq!(kind, ExitKind::Exited(EXEC_FAILED_STATUS));
  }

  #[test]
  fn test_nul_byte_rejected() {
    let mut spec = LaunchSpec::new("/bin/true", "bad\0name");
    spec.slave = true;
    assert!(matches!(
      ForkSpawner.spawn(&spec),
      Err(LaunchError::InvalidArgument(_))
    ));
  }
}
