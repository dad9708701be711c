//! One spawned player with its playback state.

use std::collections::BTreeMap;

use serde::Serialize;

use super::launch::{LaunchError, LaunchSpec};
use super::platform::{ChildHandle, ExitKind, SpawnedPlayer, Spawner};
use super::protocol::{NavDirection, NavigationMode, SlaveCommand, Speed, StatusEvent};
use super::supervisor::{ProcessState, ShutdownPolicy};
use super::transport::{PipeTransport, TransportError};

/// Stream metadata reported by the player.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
  pub disc_label: Option<String>,
  /// Audio track id to language code.
  pub audio_tracks: BTreeMap<u32, String>,
  pub subtitle_tracks: BTreeMap<u32, String>,
  /// Length in seconds.
  pub length: Option<f64>,
}

/// A launched player.
///
/// The transport exists iff the player runs in slave mode. Without it every
/// command method is a silent no-op.
pub struct PlayerProcess {
  pub(super) child: Option<Box<dyn ChildHandle>>,
  pub(super) pid: u32,
  pub(super) transport: Option<PipeTransport>,
  pub(super) state: ProcessState,
  pub(super) exit: Option<ExitKind>,
  volume: Option<u8>,
  paused: bool,
  speed: Speed,
  navigation: NavigationMode,
  media: MediaInfo,
}

impl PlayerProcess {
  /// Spawn the player described by `spec`.
  pub fn launch(
    spawner: &dyn Spawner,
    spec: &LaunchSpec,
    buffer_capacity: usize,
  ) -> Result<Self, LaunchError> {
    let spawned = spawner.spawn(spec)?;
    Ok(Self::from_spawned(spawned, spec.volume, buffer_capacity))
  }

  pub fn from_spawned(spawned: SpawnedPlayer, volume: Option<u8>, buffer_capacity: usize) -> Self {
    let pid = spawned.child.pid();
    Self {
      child: Some(spawned.child),
      pid,
      transport: spawned
        .pipes
        .map(|pipes| PipeTransport::new(pipes, buffer_capacity)),
      state: ProcessState::Running,
      exit: None,
      volume,
      paused: false,
      speed: Speed::NORMAL,
      navigation: NavigationMode::Off,
      media: MediaInfo::default(),
    }
  }

  pub fn pid(&self) -> u32 {
    self.pid
  }

  pub fn is_slave(&self) -> bool {
    self.transport.is_some()
  }

  pub fn state(&self) -> ProcessState {
    self.state
  }

  /// Exit recorded by the last liveness check.
  pub fn exit_kind(&self) -> Option<ExitKind> {
    self.exit
  }

  pub fn volume(&self) -> Option<u8> {
    self.volume
  }

  pub fn is_paused(&self) -> bool {
    self.paused
  }

  pub fn speed(&self) -> Speed {
    self.speed
  }

  pub fn navigation_mode(&self) -> NavigationMode {
    self.navigation
  }

  pub fn media_info(&self) -> &MediaInfo {
    &self.media
  }

  /// Drain the status pipe and parse every completed line.
  ///
  /// Navigation and media events are applied to this process before they
  /// are returned.
  pub fn poll_incoming(&mut self) -> Vec<StatusEvent> {
    let Some(transport) = self.transport.as_mut() else {
      return Vec::new();
    };
    let events: Vec<StatusEvent> = transport
      .poll_incoming()
      .iter()
      .map(|line| StatusEvent::parse(line))
      .collect();
    for event in &events {
      self.apply(event);
    }
    events
  }

  fn apply(&mut self, event: &StatusEvent) {
    match event {
      StatusEvent::Navigation(mode) => {
        log::debug!("Player navigation mode: {:?}", mode);
        self.navigation = *mode;
      }
      StatusEvent::DiscLabel(label) => self.media.disc_label = Some(label.clone()),
      StatusEvent::AudioTrack { id, lang } => {
        self.media.audio_tracks.insert(*id, lang.clone());
      }
      StatusEvent::SubtitleTrack { id, lang } => {
        self.media.subtitle_tracks.insert(*id, lang.clone());
      }
      StatusEvent::Length(secs) => self.media.length = Some(*secs),
      StatusEvent::Exit(reason) => log::info!("Player exiting: {}", reason),
      StatusEvent::Unrecognized(line) => log::trace!("player: {}", line),
    }
  }

  /// Send a command if slave mode is active and the player is running.
  pub fn send(&mut self, command: SlaveCommand) -> Result<(), TransportError> {
    self.try_send(command).map(|_| ())
  }

  /// Like [`send`](Self::send), returning whether the line was written.
  fn try_send(&mut self, command: SlaveCommand) -> Result<bool, TransportError> {
    if !self.transport.as_ref().is_some_and(|t| t.has_command_pipe()) || !self.is_running() {
      return Ok(false);
    }
    match self.transport.as_mut() {
      Some(transport) => transport.send_line(&command.to_string()).map(|()| true),
      None => Ok(false),
    }
  }

  pub fn quit(&mut self) -> Result<(), TransportError> {
    self.send(SlaveCommand::Quit)
  }

  pub fn toggle_pause(&mut self) -> Result<(), TransportError> {
    if self.try_send(SlaveCommand::Pause)? {
      self.paused = !self.paused;
    }
    Ok(())
  }

  /// Double the playback speed, up to [`Speed::MAX`].
  pub fn speed_up(&mut self) -> Result<(), TransportError> {
    self.set_speed(self.speed.faster())
  }

  /// Halve the playback speed, down to [`Speed::NORMAL`].
  pub fn speed_down(&mut self) -> Result<(), TransportError> {
    self.set_speed(self.speed.slower())
  }

  pub fn reset_speed(&mut self) -> Result<(), TransportError> {
    self.set_speed(Speed::NORMAL)
  }

  fn set_speed(&mut self, speed: Speed) -> Result<(), TransportError> {
    if speed != self.speed && self.try_send(SlaveCommand::SetSpeed(speed))? {
      self.speed = speed;
    }
    Ok(())
  }

  /// Relative seek in seconds.
  pub fn seek(&mut self, secs: i32) -> Result<(), TransportError> {
    self.send(SlaveCommand::Seek(secs))
  }

  /// Set volume 0-255. Unchanged volume sends nothing.
  pub fn set_volume(&mut self, volume: u8) -> Result<(), TransportError> {
    if self.volume != Some(volume) && self.try_send(SlaveCommand::SetVolume(volume))? {
      self.volume = Some(volume);
    }
    Ok(())
  }

  /// Disc menu input, ignored outside dvdnav menus and movies.
  pub fn navigate(&mut self, direction: NavDirection) -> Result<(), TransportError> {
    if self.navigation == NavigationMode::Off {
      log::debug!("Ignoring dvdnav {}: navigation is off", direction.as_str());
      return Ok(());
    }
    self.send(SlaveCommand::Navigate(direction))
  }
}

impl Drop for PlayerProcess {
  fn drop(&mut self) {
    if self.child.is_some() {
      let _ = self.shutdown(&ShutdownPolicy::default());
    }
    if let Some(transport) = self.transport.as_mut() {
      transport.close();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::slave::fake::{drain, FakeSpawner};
  use crate::slave::platform::Termination;
  use std::io::Write;

  fn slave_spec() -> LaunchSpec {
    let mut spec = LaunchSpec::new("/usr/bin/mplayer", "dvdnav://");
    spec.slave = true;
    spec
  }

  fn launch(spawner: &FakeSpawner, spec: &LaunchSpec) -> PlayerProcess {
    PlayerProcess::launch(spawner, spec, 256).unwrap()
  }

  #[test]
  fn test_non_slave_is_silent() {
    let spawner = FakeSpawner::dying_on(Termination::Graceful);
    let spec = LaunchSpec::new("/usr/bin/mplayer", "/video/a.mkv");
    let mut process = launch(&spawner, &spec);
    assert!(!process.is_slave());
    process.quit().unwrap();
    process.toggle_pause().unwrap();
    process.speed_up().unwrap();
    process.set_volume(10).unwrap();
    assert!(process.poll_incoming().is_empty());
    assert!(!process.is_paused());
    assert_eq!(process.speed(), Speed::NORMAL);
    assert!(spawner.launches.lock()[0].stdin.is_none());
  }

  #[test]
  fn test_speed_sequence() {
    let spawner = FakeSpawner::dying_on(Termination::Graceful);
    let mut process = launch(&spawner, &slave_spec());
    for n in 1..=7u32 {
      process.speed_up().unwrap();
      assert_eq!(u32::from(process.speed().get()), 2u32.pow(n).min(32));
    }
    for n in 1..=7u32 {
      process.speed_down().unwrap();
      assert_eq!(u32::from(process.speed().get()), (32 >> n.min(5)).max(1));
    }

    let mut launches = spawner.launches.lock();
    let sent = drain(launches[0].stdin.as_mut().unwrap());
    let expected: String = [2, 4, 8, 16, 32, 16, 8, 4, 2, 1]
      .iter()
      .map(|n| format!("pausing_keep speed_set {}\n", n))
      .collect();
    assert_eq!(sent, expected);
  }

  #[test]
  fn test_navigation_follows_status_lines() {
    let spawner = FakeSpawner::dying_on(Termination::Graceful);
    let mut process = launch(&spawner, &slave_spec());

    process.navigate(NavDirection::Up).unwrap();
    {
      let mut launches = spawner.launches.lock();
      assert_eq!(drain(launches[0].stdin.as_mut().unwrap()), "");
      launches[0]
        .stdout
        .as_mut()
        .unwrap()
        .write_all(b"ID_DVD_VOLUME_ID=HOLIDAY\nID_DVDNAV_TITLE_IS_MENU\nID_AID_128_LANG=en\n")
        .unwrap();
    }

    let events = process.poll_incoming();
    assert_eq!(events.len(), 3);
    assert_eq!(process.navigation_mode(), NavigationMode::Menu);
    assert_eq!(process.media_info().disc_label.as_deref(), Some("HOLIDAY"));
    assert_eq!(process.media_info().audio_tracks.get(&128).map(String::as_str), Some("en"));

    process.navigate(NavDirection::Select).unwrap();
    let mut launches = spawner.launches.lock();
    assert_eq!(
      drain(launches[0].stdin.as_mut().unwrap()),
      "pausing_keep dvdnav select\n"
    );
  }

  #[test]
  fn test_pause_volume_seek() {
    let spawner = FakeSpawner::dying_on(Termination::Graceful);
    let mut spec = slave_spec();
    spec.volume = Some(255);
    let mut process = launch(&spawner, &spec);

    process.toggle_pause().unwrap();
    assert!(process.is_paused());
    process.set_volume(255).unwrap();
    process.set_volume(0).unwrap();
    process.seek(-10).unwrap();
    process.quit().unwrap();

    let mut launches = spawner.launches.lock();
    assert_eq!(
      drain(launches[0].stdin.as_mut().unwrap()),
      "pause\npausing_keep volume 0.00 1\npausing_keep seek -10 0\nquit\n"
    );
  }

  #[test]
  fn test_no_commands_after_exit() {
    let spawner = FakeSpawner::dying_on(Termination::Graceful);
    let mut process = launch(&spawner, &slave_spec());
    spawner.launches.lock()[0].child.lock().exit = Some(ExitKind::Exited(0));

    process.quit().unwrap();
    process.toggle_pause().unwrap();
    process.speed_up().unwrap();
    process.set_volume(10).unwrap();
    assert!(!process.is_paused());
    assert_eq!(process.speed(), Speed::NORMAL);
    assert_eq!(process.volume(), None);
    assert_eq!(process.state(), ProcessState::Stopped);
    assert_eq!(process.exit_kind(), Some(ExitKind::Exited(0)));
    let mut launches = spawner.launches.lock();
    assert_eq!(drain(launches[0].stdin.as_mut().unwrap()), "");
  }
}
