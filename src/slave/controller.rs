//! Host-facing player controller.
//!
//! The host adapter calls [`PlayerController::attach`] when playback starts,
//! [`PlayerController::tick`] periodically, [`PlayerController::handle_intent`]
//! on key presses and [`PlayerController::on_volume_changed`] from its audio
//! status hook. Parsed status events come out of [`PlayerController::events`].

use async_channel::{Receiver, Sender};
use serde::Serialize;
use thiserror::Error;

use crate::config::PlayConfig;

use super::launch::LaunchError;
use super::platform::{ExitKind, ForkSpawner, Spawner};
use super::process::PlayerProcess;
use super::protocol::{NavDirection, StatusEvent};
use super::supervisor::{ShutdownPolicy, ShutdownTimeoutError};
use super::transport::TransportError;

/// Upper bound on status reads when draining an exited player.
const MAX_DRAIN_PASSES: usize = 16;

#[derive(Error, Debug)]
pub enum PlayerError {
  #[error("Launch error: {0}")]
  Launch(#[from] LaunchError),
  #[error("Transport error: {0}")]
  Transport(#[from] TransportError),
  #[error(transparent)]
  Shutdown(#[from] ShutdownTimeoutError),
}

/// User intent mapped from a host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
  /// Quit the player and return to the browser.
  Back,
  /// Stop the player and close the replay control.
  Stop,
  /// Resume normal playback.
  Play,
  TogglePause,
  FastForward,
  SlowDown,
  /// Relative seek in seconds.
  Seek(i32),
  Navigate(NavDirection),
}

/// What the host should do after an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Back,
  End,
}

/// Event delivered to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlayerEvent {
  Status(StatusEvent),
  Exited(ExitKind),
}

/// Owns at most one running player.
pub struct PlayerController {
  config: PlayConfig,
  spawner: Box<dyn Spawner>,
  process: Option<PlayerProcess>,
  window_id: Option<u32>,
  /// Host volume 0-255, follows absolute and relative changes.
  host_volume: i32,
  event_tx: Sender<PlayerEvent>,
  event_rx: Receiver<PlayerEvent>,
}

impl PlayerController {
  pub fn new(config: PlayConfig) -> Self {
    Self::with_spawner(config, Box::new(ForkSpawner))
  }

  pub fn with_spawner(config: PlayConfig, spawner: Box<dyn Spawner>) -> Self {
    let (event_tx, event_rx) = async_channel::unbounded();
    Self {
      config,
      spawner,
      process: None,
      window_id: None,
      host_volume: 0,
      event_tx,
      event_rx,
    }
  }

  pub fn config(&self) -> &PlayConfig {
    &self.config
  }

  /// Takes effect on the next attach.
  pub fn set_config(&mut self, config: PlayConfig) {
    self.config = config;
  }

  /// Overlay window the player renders into (takes effect on next attach).
  pub fn set_window_id(&mut self, window_id: Option<u32>) {
    self.window_id = window_id;
  }

  pub fn process(&self) -> Option<&PlayerProcess> {
    self.process.as_ref()
  }

  /// Get the event receiver for parsed status lines and player exits.
  pub fn events(&self) -> Receiver<PlayerEvent> {
    self.event_rx.clone()
  }

  pub fn is_running(&mut self) -> bool {
    self.process.as_mut().is_some_and(|p| p.is_running())
  }

  /// Start playing `locator`, stopping a previous player first.
  ///
  /// `volume` is the host's current volume (0-255), if it reports one.
  pub fn attach(&mut self, locator: &str, volume: Option<u8>) -> Result<(), PlayerError> {
    if let Err(e) = self.detach() {
      log::error!("Previous player not stopped: {}", e);
    }

    let mut spec = self.config.launch_spec(locator);
    spec.volume = volume;
    spec.window_id = self.window_id;
    if let Some(volume) = volume {
      self.host_volume = i32::from(volume);
    }

    log::info!("Playing '{}'", locator);
    let process = PlayerProcess::launch(self.spawner.as_ref(), &spec, self.config.receive_buffer)?;
    self.process = Some(process);
    Ok(())
  }

  /// Stop the player: `quit` in slave mode, then signal escalation.
  pub fn detach(&mut self) -> Result<(), PlayerError> {
    match self.release() {
      Some(release) => release.stop(),
      None => Ok(()),
    }
  }

  /// Take the player out of the controller so it can be stopped without
  /// holding on to the controller.
  pub(super) fn release(&mut self) -> Option<ReleasedPlayer> {
    let process = self.process.take()?;
    Some(ReleasedPlayer {
      process,
      policy: self.config.shutdown_policy(),
      events: self.event_tx.clone(),
    })
  }

  /// Handle one key intent. Returns [`Flow::End`] once the player is gone.
  pub fn handle_intent(&mut self, intent: Intent) -> Result<Flow, PlayerError> {
    self.tick();
    if !self.is_running() {
      return Ok(Flow::End);
    }
    if intent == Intent::Stop {
      self.detach()?;
      return Ok(Flow::End);
    }
    let Some(process) = self.process.as_mut() else {
      return Ok(Flow::End);
    };

    log::debug!("Player intent: {:?}", intent);
    match intent {
      Intent::Back => {
        process.quit()?;
        return Ok(Flow::Back);
      }
      Intent::Play => {
        if process.is_paused() {
          process.toggle_pause()?;
        }
        process.reset_speed()?;
      }
      Intent::TogglePause => process.toggle_pause()?,
      Intent::FastForward => process.speed_up()?,
      Intent::SlowDown => process.speed_down()?,
      Intent::Seek(secs) => process.seek(secs)?,
      Intent::Navigate(direction) => process.navigate(direction)?,
      Intent::Stop => {}
    }
    Ok(Flow::Continue)
  }

  /// Poll the status pipe and forward events. Call every few milliseconds.
  pub fn tick(&mut self) {
    let Some(process) = self.process.as_mut() else {
      return;
    };

    forward(&self.event_tx, process.poll_incoming());
    if process.is_running() {
      return;
    }

    // pick up what the player wrote before it went away
    for _ in 0..MAX_DRAIN_PASSES {
      let events = process.poll_incoming();
      if events.is_empty() {
        break;
      }
      forward(&self.event_tx, events);
    }
    let exit = process.exit_kind();
    self.process = None;
    if let Some(kind) = exit {
      let _ = self.event_tx.try_send(PlayerEvent::Exited(kind));
    }
  }

  /// Host volume hook. Relative changes accumulate; the result is clamped to
  /// 0-255 and forwarded to the player.
  pub fn on_volume_changed(&mut self, volume: i32, absolute: bool) -> Result<(), PlayerError> {
    let volume = if absolute {
      volume
    } else {
      self.host_volume.saturating_add(volume)
    };
    self.host_volume = volume.clamp(0, 255);
    log::debug!("Host volume {} ({})", self.host_volume, if absolute { "abs" } else { "rel" });

    if let Some(process) = self.process.as_mut() {
      process.set_volume(self.host_volume as u8)?;
    }
    Ok(())
  }
}

/// A player detached from its controller, still to be stopped.
pub(super) struct ReleasedPlayer {
  process: PlayerProcess,
  policy: ShutdownPolicy,
  events: Sender<PlayerEvent>,
}

impl ReleasedPlayer {
  /// Blocks for up to two shutdown timeouts.
  pub(super) fn stop(mut self) -> Result<(), PlayerError> {
    if let Err(e) = self.process.quit() {
      log::warn!("Failed to send quit: {}", e);
    }
    let result = self.process.shutdown(&self.policy);
    if let Some(kind) = self.process.exit_kind() {
      let _ = self.events.try_send(PlayerEvent::Exited(kind));
    }
    result?;
    Ok(())
  }
}

fn forward(tx: &Sender<PlayerEvent>, events: Vec<StatusEvent>) {
  for event in events {
    if !matches!(event, StatusEvent::Unrecognized(_)) {
      let _ = tx.try_send(PlayerEvent::Status(event));
    }
  }
}
