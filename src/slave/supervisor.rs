//! Player liveness and shutdown.
//!
//! Shutdown escalates SIGTERM -> SIGKILL, each stage with a bounded wait, and
//! gives up instead of blocking on a child that refuses to die.

use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use super::platform::{ExitKind, Termination};
use super::process::PlayerProcess;

/// Lifecycle of a [`PlayerProcess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
  Running,
  Terminating(Termination),
  Stopped,
}

/// Wait policy for each shutdown stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
  pub poll_interval: Duration,
  pub timeout: Duration,
}

impl Default for ShutdownPolicy {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_millis(1),
      timeout: Duration::from_millis(500),
    }
  }
}

#[derive(Error, Debug)]
#[error("Can't stop player process {pid}, abandoning it")]
pub struct ShutdownTimeoutError {
  pub pid: u32,
}

impl PlayerProcess {
  /// Non-blocking liveness check.
  ///
  /// Records the exit status and moves to [`ProcessState::Stopped`] once the
  /// child is gone.
  pub fn is_running(&mut self) -> bool {
    let Some(child) = self.child.as_mut() else {
      return false;
    };

    match child.try_wait() {
      Ok(None) => true,
      Ok(Some(kind)) => {
        match kind {
          ExitKind::Exited(code) if kind.is_exec_failure() => {
            log::warn!("Player {} exited immediately ({}), exec failed?", self.pid, code)
          }
          ExitKind::Exited(code) => log::info!("Player {} exited ({})", self.pid, code),
          ExitKind::Signaled(signal) => log::info!("Player {} killed ({})", self.pid, signal),
          ExitKind::Vanished => log::warn!("Player {} already reaped", self.pid),
        }
        self.exit = Some(kind);
        self.child = None;
        self.state = ProcessState::Stopped;
        false
      }
      Err(e) => {
        log::warn!("Failed to query player {}: {}", self.pid, e);
        true
      }
    }
  }

  /// Stop the player, escalating from SIGTERM to SIGKILL.
  ///
  /// Pipes are closed in every case. On timeout the child is abandoned and
  /// the process counts as stopped.
  pub fn shutdown(&mut self, policy: &ShutdownPolicy) -> Result<(), ShutdownTimeoutError> {
    let result = self.terminate(policy);
    if let Some(transport) = self.transport.as_mut() {
      transport.close();
    }
    result
  }

  fn terminate(&mut self, policy: &ShutdownPolicy) -> Result<(), ShutdownTimeoutError> {
    for stage in [Termination::Graceful, Termination::Forced] {
      if !self.is_running() {
        return Ok(());
      }
      self.state = ProcessState::Terminating(stage);
      log::debug!("Stopping player {} ({:?})", self.pid, stage);
      if let Some(child) = self.child.as_mut() {
        if let Err(e) = child.signal(stage) {
          log::warn!("Failed to signal player {}: {}", self.pid, e);
        }
      }
      if self.wait_for_exit(policy) {
        return Ok(());
      }
    }

    log::error!("Can't stop player {}", self.pid);
    self.child = None;
    self.state = ProcessState::Stopped;
    Err(ShutdownTimeoutError { pid: self.pid })
  }

  fn wait_for_exit(&mut self, policy: &ShutdownPolicy) -> bool {
    let deadline = Instant::now() + policy.timeout;
    loop {
      if !self.is_running() {
        return true;
      }
      if Instant::now() >= deadline {
        return false;
      }
      thread::sleep(policy.poll_interval);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::slave::fake::FakeSpawner;
  use crate::slave::launch::LaunchSpec;

  fn policy(timeout_ms: u64) -> ShutdownPolicy {
    ShutdownPolicy {
      poll_interval: Duration::from_millis(1),
      timeout: Duration::from_millis(timeout_ms),
    }
  }

  fn launch(spawner: &FakeSpawner) -> PlayerProcess {
    let mut spec = LaunchSpec::new("/usr/bin/mplayer", "/video/a.mkv");
    spec.slave = true;
    PlayerProcess::launch(spawner, &spec, 256).unwrap()
  }

  #[test]
  fn test_graceful_exit_skips_kill() {
    let spawner = FakeSpawner::dying_on(Termination::Graceful);
    let mut process = launch(&spawner);
    assert!(process.is_running());

    process.shutdown(&policy(50)).unwrap();
    assert_eq!(process.state(), ProcessState::Stopped);
    assert_eq!(process.exit_kind(), Some(ExitKind::Signaled(15)));
    let launches = spawner.launches.lock();
    assert_eq!(launches[0].child.lock().signals, vec![Termination::Graceful]);
  }

  #[test]
  fn test_kill_after_ignored_term() {
    let spawner = FakeSpawner::dying_on(Termination::Forced);
    let mut process = launch(&spawner);

    process.shutdown(&policy(20)).unwrap();
    assert_eq!(process.exit_kind(), Some(ExitKind::Signaled(9)));
    let launches = spawner.launches.lock();
    assert_eq!(
      launches[0].child.lock().signals,
      vec![Termination::Graceful, Termination::Forced]
    );
  }

  #[test]
  fn test_unkillable_child_times_out() {
    let spawner = FakeSpawner::default();
    let mut process = launch(&spawner);
    let timeout = Duration::from_millis(30);

    let started = Instant::now();
    let err = process
      .shutdown(&ShutdownPolicy {
        poll_interval: Duration::from_millis(1),
        timeout,
      })
      .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.pid, process.pid());
    assert!(elapsed >= timeout * 2, "elapsed {:?}", elapsed);
    assert!(elapsed < timeout * 2 + Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert_eq!(process.state(), ProcessState::Stopped);
    assert!(!process.is_running());
    assert!(process.transport.as_ref().is_some_and(|t| !t.has_command_pipe()));
    let launches = spawner.launches.lock();
    assert_eq!(
      launches[0].child.lock().signals,
      vec![Termination::Graceful, Termination::Forced]
    );
  }

  #[test]
  fn test_natural_exit_before_shutdown() {
    let spawner = FakeSpawner::default();
    let mut process = launch(&spawner);
    spawner.launches.lock()[0].child.lock().exit_after_polls = Some(2);

    assert!(process.is_running());
    assert!(!process.is_running());
    assert_eq!(process.exit_kind(), Some(ExitKind::Exited(0)));
    process.shutdown(&policy(10)).unwrap();
    assert!(spawner.launches.lock()[0].child.lock().signals.is_empty());
  }

  #[test]
  fn test_child_exits_during_graceful_wait() {
    let spawner = FakeSpawner::default();
    let mut process = launch(&spawner);
    spawner.launches.lock()[0].child.lock().exit_after_polls = Some(5);

    process.shutdown(&policy(100)).unwrap();
    assert_eq!(
      spawner.launches.lock()[0].child.lock().signals,
      vec![Termination::Graceful]
    );
  }
}
