//! Player configuration: defaults, config file and plugin arguments.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::slave::{LaunchSpec, ShutdownPolicy};

const CONFIG_DIR: &str = "play";
const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config: {0}")]
  Io(#[from] std::io::Error),
  #[error("Invalid config file: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Invalid plugin arguments: {0}")]
  Args(#[from] clap::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayConfig {
  /// mplayer executable, a path or a name looked up in PATH.
  #[serde(default = "default_executable")]
  pub executable: String,

  /// X11 display the player opens its window on.
  #[serde(default = "default_x11_display")]
  pub x11_display: String,

  /// mplayer `-vo` driver (e.g. `vdpau:deint=4,hqscaling=1`).
  #[serde(default)]
  pub video_out: Option<String>,

  /// mplayer `-ao` driver (e.g. `alsa:device=hw=0.0`).
  #[serde(default)]
  pub audio_out: Option<String>,

  #[serde(default)]
  pub audio_mixer: Option<String>,

  #[serde(default)]
  pub mixer_channel: Option<String>,

  #[serde(default)]
  pub fullscreen: bool,

  /// Keep the OSD on top of the player window.
  #[serde(default)]
  pub osd_overlay: bool,

  /// Drive the player through its slave-mode pipes.
  #[serde(default)]
  pub slave_mode: bool,

  /// Additional mplayer command-line arguments.
  #[serde(default)]
  pub extra_args: Vec<String>,

  #[serde(default)]
  pub hide_main_menu_entry: bool,

  /// Start directory of the "in video directory" browsers.
  #[serde(default = "default_video_directory")]
  pub video_directory: PathBuf,

  #[serde(default = "default_shutdown_poll_ms")]
  pub shutdown_poll_ms: u64,

  /// Wait per shutdown stage before escalating.
  #[serde(default = "default_shutdown_timeout_ms")]
  pub shutdown_timeout_ms: u64,

  /// Status pipe polling period.
  #[serde(default = "default_tick_interval_ms")]
  pub tick_interval_ms: u64,

  /// Receive buffer size in bytes.
  #[serde(default = "default_receive_buffer")]
  pub receive_buffer: usize,
}

fn default_executable() -> String {
  "/usr/bin/mplayer".to_string()
}

fn default_x11_display() -> String {
  ":0.0".to_string()
}

fn default_video_directory() -> PathBuf {
  PathBuf::from("/video")
}

fn default_shutdown_poll_ms() -> u64 {
  1
}

fn default_shutdown_timeout_ms() -> u64 {
  500
}

fn default_tick_interval_ms() -> u64 {
  10
}

fn default_receive_buffer() -> usize {
  crate::slave::DEFAULT_CAPACITY
}

impl Default for PlayConfig {
  fn default() -> Self {
    Self {
      executable: default_executable(),
      x11_display: default_x11_display(),
      video_out: None,
      audio_out: None,
      audio_mixer: None,
      mixer_channel: None,
      fullscreen: false,
      osd_overlay: false,
      slave_mode: false,
      extra_args: Vec::new(),
      hide_main_menu_entry: false,
      video_directory: default_video_directory(),
      shutdown_poll_ms: default_shutdown_poll_ms(),
      shutdown_timeout_ms: default_shutdown_timeout_ms(),
      tick_interval_ms: default_tick_interval_ms(),
      receive_buffer: default_receive_buffer(),
    }
  }
}

/// Plugin command line, as handed over by the host.
#[derive(Parser, Debug)]
#[command(name = "play", about = "A play plugin")]
struct PluginArgs {
  /// mplayer -ao (alsa:device=hw=0.0) overwrites mplayer.conf
  #[arg(short = 'a', value_name = "audio")]
  audio: Option<String>,

  /// X11 display (default :0.0) overwrites $DISPLAY
  #[arg(short = 'd', value_name = "display")]
  display: Option<String>,

  /// mplayer fullscreen playback
  #[arg(short = 'f')]
  fullscreen: bool,

  /// filename of mplayer executable
  #[arg(short = 'm', value_name = "mplayer")]
  mplayer: Option<String>,

  /// osd overlay experiments
  #[arg(short = 'o')]
  overlay: bool,

  /// mplayer slave mode
  #[arg(short = 's')]
  slave: bool,

  /// mplayer -vo (vdpau:deint=4,hqscaling=1) overwrites mplayer.conf
  #[arg(short = 'v', value_name = "video")]
  video: Option<String>,
}

impl PlayConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.executable.trim().is_empty() {
      return Err("Player executable cannot be empty".to_string());
    }
    if self.shutdown_poll_ms == 0 || self.shutdown_timeout_ms == 0 {
      return Err("Shutdown poll interval and timeout must be positive".to_string());
    }
    if self.shutdown_poll_ms > self.shutdown_timeout_ms {
      return Err("Shutdown poll interval cannot exceed the timeout".to_string());
    }
    if self.tick_interval_ms == 0 {
      return Err("Tick interval must be positive".to_string());
    }
    if self.receive_buffer < 64 {
      return Err("Receive buffer must hold at least 64 bytes".to_string());
    }
    Ok(())
  }

  /// Default config file location.
  pub fn path() -> PathBuf {
    dirs::config_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join(CONFIG_DIR)
      .join(CONFIG_FILE)
  }

  /// Load from the default location, falling back to defaults.
  pub fn load() -> Result<Self, ConfigError> {
    Self::load_from(&Self::path())
  }

  /// Load from `path`. A missing file yields the defaults.
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      log::info!("No config at {}, using defaults", path.display());
      return Ok(Self::default());
    }
    let content = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&content)?;
    config.validate().map_err(ConfigError::Invalid)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
  }

  /// Apply the plugin command line (`argv[0]` is the plugin name).
  ///
  /// `$DISPLAY` overrides the configured display, `-d` overrides both.
  pub fn apply_args<I, T>(&mut self, args: I) -> Result<(), ConfigError>
  where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
  {
    let args = PluginArgs::try_parse_from(args)?;

    if let Ok(display) = std::env::var("DISPLAY") {
      if !display.is_empty() {
        self.x11_display = display;
      }
    }
    if let Some(display) = args.display {
      self.x11_display = display;
    }
    if let Some(audio) = args.audio {
      self.audio_out = Some(audio);
    }
    if let Some(video) = args.video {
      self.video_out = Some(video);
    }
    if let Some(mplayer) = args.mplayer {
      self.executable = mplayer;
    }
    self.fullscreen |= args.fullscreen;
    self.osd_overlay |= args.overlay;
    self.slave_mode |= args.slave;

    self.validate().map_err(ConfigError::Invalid)
  }

  pub fn shutdown_policy(&self) -> ShutdownPolicy {
    ShutdownPolicy {
      poll_interval: Duration::from_millis(self.shutdown_poll_ms),
      timeout: Duration::from_millis(self.shutdown_timeout_ms),
    }
  }

  pub fn tick_interval(&self) -> Duration {
    Duration::from_millis(self.tick_interval_ms)
  }

  /// Snapshot the settings for playing `locator`.
  pub fn launch_spec(&self, locator: &str) -> LaunchSpec {
    let mut spec = LaunchSpec::new(&self.executable, locator);
    spec.video_out = non_empty(&self.video_out);
    spec.audio_out = non_empty(&self.audio_out);
    spec.audio_mixer = non_empty(&self.audio_mixer);
    spec.mixer_channel = non_empty(&self.mixer_channel);
    spec.display = Some(self.x11_display.clone()).filter(|d| !d.is_empty());
    spec.fullscreen = self.fullscreen;
    spec.overlay = self.osd_overlay;
    spec.slave = self.slave_mode;
    spec.extra_args = self.extra_args.clone();
    spec
  }
}

fn non_empty(value: &Option<String>) -> Option<String> {
  value.clone().filter(|v| !v.trim().is_empty())
}
