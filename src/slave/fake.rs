//! Simulated children and spawner for unit tests.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::sync::Arc;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;

use super::launch::{LaunchError, LaunchSpec};
use super::platform::{ChildHandle, ExitKind, SlavePipes, SpawnedPlayer, Spawner, Termination};

/// OS pipe as `(write end, read end)`.
pub fn pipe_pair() -> (File, File) {
  let (read, write) = nix::unistd::pipe().unwrap();
  (File::from(write), File::from(read))
}

/// Read whatever is buffered in the pipe without blocking.
pub fn drain(file: &mut File) -> String {
  let ready = {
    let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
    poll(&mut fds, PollTimeout::ZERO).unwrap() > 0
  };
  if !ready {
    return String::new();
  }
  let mut buf = vec![0; 4096];
  let n = file.read(&mut buf).unwrap();
  String::from_utf8(buf[..n].to_vec()).unwrap()
}

#[derive(Debug, Default)]
pub struct FakeState {
  pub signals: Vec<Termination>,
  pub exit: Option<ExitKind>,
  /// Weakest signal the child dies from, `None` for never.
  pub dies_on: Option<Termination>,
  /// Exit on its own after this many liveness checks.
  pub exit_after_polls: Option<usize>,
  pub polls: usize,
}

pub struct FakeChild {
  pid: u32,
  state: Arc<Mutex<FakeState>>,
}

impl FakeChild {
  pub fn new(pid: u32, state: Arc<Mutex<FakeState>>) -> Self {
    Self { pid, state }
  }
}

impl ChildHandle for FakeChild {
  fn pid(&self) -> u32 {
    self.pid
  }

  fn try_wait(&mut self) -> io::Result<Option<ExitKind>> {
    let mut state = self.state.lock();
    state.polls += 1;
    if state.exit.is_none() && state.exit_after_polls.is_some_and(|n| state.polls >= n) {
      state.exit = Some(ExitKind::Exited(0));
    }
    Ok(state.exit)
  }

  fn signal(&mut self, termination: Termination) -> io::Result<()> {
    let mut state = self.state.lock();
    state.signals.push(termination);
    let dies = match (state.dies_on, termination) {
      (Some(Termination::Graceful), _) => true,
      (Some(Termination::Forced), Termination::Forced) => true,
      _ => false,
    };
    if dies && state.exit.is_none() {
      let signo = match termination {
        Termination::Graceful => 15,
        Termination::Forced => 9,
      };
      state.exit = Some(ExitKind::Signaled(signo));
    }
    Ok(())
  }
}

/// Far ends of one simulated launch.
pub struct FakeLaunch {
  pub spec: LaunchSpec,
  pub child: Arc<Mutex<FakeState>>,
  /// Reads what the controller wrote to the player.
  pub stdin: Option<File>,
  /// Writes status lines as the player would.
  pub stdout: Option<File>,
}

#[derive(Clone, Default)]
pub struct FakeSpawner {
  pub launches: Arc<Mutex<Vec<FakeLaunch>>>,
  pub dies_on: Option<Termination>,
  pub fail: bool,
}

impl FakeSpawner {
  pub fn dying_on(termination: Termination) -> Self {
    Self {
      dies_on: Some(termination),
      ..Self::default()
    }
  }
}

impl Spawner for FakeSpawner {
  fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedPlayer, LaunchError> {
    if self.fail {
      return Err(LaunchError::Fork(nix::errno::Errno::EAGAIN));
    }
    spec.args()?;

    let state = Arc::new(Mutex::new(FakeState {
      dies_on: self.dies_on,
      ..FakeState::default()
    }));
    let mut launches = self.launches.lock();
    let pid = 1000 + launches.len() as u32;

    let (pipes, stdin, stdout) = if spec.slave {
      let (command, stdin) = pipe_pair();
      let (stdout, status) = pipe_pair();
      (Some(SlavePipes { command, status }), Some(stdin), Some(stdout))
    } else {
      (None, None, None)
    };

    launches.push(FakeLaunch {
      spec: spec.clone(),
      child: state.clone(),
      stdin,
      stdout,
    });
    Ok(SpawnedPlayer {
      child: Box::new(FakeChild::new(pid, state)),
      pipes,
    })
  }
}
