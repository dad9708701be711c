//! Launch specification and player argument vector.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::protocol::volume_percent;

/// Hard upper bound on the argument vector, executable included.
pub const ARGV_CAPACITY: usize = 48;

/// Exit status of a child whose exec failed.
pub const EXEC_FAILED_STATUS: i32 = 255;

const MSG_LEVEL: &str = "all=2:global=2:cplayer=2:identify=4";
const VDPAU_CODECS: &str = "ffmpeg12vdpau,ffwmv3vdpau,ffvc1vdpau,ffh264vdpau,ffodivxvdpau,";
const CDDA_CACHE: &str = "1000";

#[derive(Error, Debug)]
pub enum LaunchError {
  #[error("Failed to create player pipe: {0}")]
  PipeCreation(#[source] nix::Error),
  #[error("Failed to fork player: {0}")]
  Fork(#[source] nix::Error),
  #[error("Player needs {count} arguments, capacity is {capacity}")]
  TooManyArguments { count: usize, capacity: usize },
  #[error("Player argument contains a NUL byte: {0:?}")]
  InvalidArgument(String),
}

/// Configuration snapshot taken when playback starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
  pub executable: PathBuf,
  /// X11 window the player should render into.
  pub window_id: Option<u32>,
  pub video_out: Option<String>,
  pub audio_out: Option<String>,
  pub audio_mixer: Option<String>,
  pub mixer_channel: Option<String>,
  pub display: Option<String>,
  pub fullscreen: bool,
  /// OSD overlay on top of the player window.
  pub overlay: bool,
  pub slave: bool,
  /// Initial volume 0-255, `None` keeps the player default.
  pub volume: Option<u8>,
  /// User supplied arguments, placed right before the locator.
  pub extra_args: Vec<String>,
  /// File path or scheme URI (`dvdnav://`, `cdda://`).
  pub locator: String,
}

impl LaunchSpec {
  pub fn new(executable: impl Into<PathBuf>, locator: impl Into<String>) -> Self {
    Self {
      executable: executable.into(),
      window_id: None,
      video_out: None,
      audio_out: None,
      audio_mixer: None,
      mixer_channel: None,
      display: None,
      fullscreen: false,
      overlay: false,
      slave: false,
      volume: None,
      extra_args: Vec::new(),
      locator: locator.into(),
    }
  }

  /// Whether the locator needs the player's read cache.
  ///
  /// Only disc audio plays better cached; dvdnav refuses to work with it.
  pub fn wants_cache(&self) -> bool {
    self.locator.starts_with("cdda://")
  }

  /// Assemble the full argument vector, `args[0]` being the executable.
  pub fn args(&self) -> Result<Vec<String>, LaunchError> {
    let mut args = vec![
      self.executable.to_string_lossy().into_owned(),
      "-quiet".into(),
      "-msglevel".into(),
      MSG_LEVEL.into(),
      if self.overlay { "-noontop" } else { "-ontop" }.into(),
      "-noborder".into(),
      "-nolirc".into(),
      "-nojoystick".into(),
      "-noar".into(),
      "-nomouseinput".into(),
      "-nograbpointer".into(),
      "-noconsolecontrols".into(),
      "-fixed-vo".into(),
    ];

    if self.wants_cache() {
      args.push("-cache".into());
      args.push(CDDA_CACHE.into());
    } else {
      args.push("-nocache".into());
    }
    if self.slave {
      args.push("-slave".into());
    }
    if self.overlay {
      args.push("-osdlevel".into());
      args.push("0".into());
    }
    if self.fullscreen {
      args.push("-fs".into());
      args.push("-zoom".into());
    } else {
      args.push("-nofs".into());
    }
    if let Some(wid) = self.window_id {
      args.push("-wid".into());
      args.push(wid.to_string());
    }
    if let Some(vo) = &self.video_out {
      args.push("-vo".into());
      args.push(vo.clone());
      // decoder acceleration matching the output driver
      if vo.starts_with("vdpau") {
        args.push("-vc".into());
        args.push(VDPAU_CODECS.into());
      } else if vo.starts_with("vaapi") {
        args.push("-va".into());
        args.push("vaapi".into());
      }
    }
    push_opt(&mut args, "-ao", &self.audio_out);
    push_opt(&mut args, "-mixer", &self.audio_mixer);
    push_opt(&mut args, "-mixer-channel", &self.mixer_channel);
    push_opt(&mut args, "-display", &self.display);
    if let Some(volume) = self.volume {
      args.push("-volume".into());
      args.push(volume_percent(volume));
    }
    args.extend(self.extra_args.iter().cloned());
    args.push(self.locator.clone());

    if args.len() > ARGV_CAPACITY {
      return Err(LaunchError::TooManyArguments {
        count: args.len(),
        capacity: ARGV_CAPACITY,
      });
    }
    Ok(args)
  }
}

fn push_opt(args: &mut Vec<String>, flag: &str, value: &Option<String>) {
  if let Some(value) = value {
    args.push(flag.into());
    args.push(value.clone());
  }
}

/// Resolve the player executable.
///
/// Paths are used as given. A bare name is looked up in `PATH`; when that
/// fails the name is passed through and the exec failure shows up as an
/// immediate child exit.
pub fn find_player(executable: &Path) -> PathBuf {
  if executable.components().count() > 1 {
    return executable.to_path_buf();
  }
  match which::which(executable) {
    Ok(path) => path,
    Err(e) => {
      log::warn!("Player {:?} not found in PATH: {}", executable, e);
      executable.to_path_buf()
    }
  }
}
