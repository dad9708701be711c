//! mplayer slave protocol: status lines in, command lines out.
//!
//! Reference: mplayer `DOCS/tech/slave.txt` and the `-identify` output.

use std::fmt;

use serde::Serialize;

/// Disc menu interaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NavigationMode {
  #[default]
  Off,
  Menu,
  Movie,
}

/// Event parsed from one status line of the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StatusEvent {
  Navigation(NavigationMode),
  DiscLabel(String),
  AudioTrack { id: u32, lang: String },
  SubtitleTrack { id: u32, lang: String },
  /// Stream length in seconds.
  Length(f64),
  /// Reason given by the player on exit (`QUIT`, `EOF`, `ERROR`).
  Exit(String),
  Unrecognized(String),
}

impl StatusEvent {
  /// Parse a status line. Never fails; unknown or malformed input is
  /// [`StatusEvent::Unrecognized`].
  pub fn parse(line: &str) -> Self {
    let line = line.trim_end();
    Self::parse_known(line).unwrap_or_else(|| StatusEvent::Unrecognized(line.to_string()))
  }

  fn parse_known(line: &str) -> Option<Self> {
    if strip_prefix_ci(line, "ID_DVDNAV_TITLE_IS_MENU").is_some() {
      return Some(StatusEvent::Navigation(NavigationMode::Menu));
    }
    if strip_prefix_ci(line, "ID_DVDNAV_TITLE_IS_MOVIE").is_some() {
      return Some(StatusEvent::Navigation(NavigationMode::Movie));
    }
    if let Some(label) = strip_prefix_ci(line, "ID_DVD_VOLUME_ID=") {
      return Some(StatusEvent::DiscLabel(label.to_string()));
    }
    if strip_prefix_ci(line, "ID_AID_").is_some() {
      let (id, lang) = parse_track(line, "ID_AID_")?;
      return Some(StatusEvent::AudioTrack { id, lang });
    }
    if strip_prefix_ci(line, "ID_SID_").is_some() {
      let (id, lang) = parse_track(line, "ID_SID_")?;
      return Some(StatusEvent::SubtitleTrack { id, lang });
    }
    if let Some(secs) = strip_prefix_ci(line, "ID_LENGTH=") {
      let secs: f64 = secs.parse().ok()?;
      return (secs.is_finite() && secs >= 0.0).then_some(StatusEvent::Length(secs));
    }
    if let Some(reason) = strip_prefix_ci(line, "ID_EXIT=") {
      return Some(StatusEvent::Exit(reason.to_string()));
    }
    None
  }
}

/// ASCII case-insensitive `str::strip_prefix`.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
  let head = s.get(..prefix.len())?;
  if head.eq_ignore_ascii_case(prefix) {
    Some(&s[prefix.len()..])
  } else {
    None
  }
}

/// `<prefix><id>_LANG=<lang>`
fn parse_track(line: &str, prefix: &str) -> Option<(u32, String)> {
  let rest = strip_prefix_ci(line, prefix)?;
  let (id, rest) = rest.split_once('_')?;
  let lang = strip_prefix_ci(rest, "LANG=")?;
  let id = id.parse().ok()?;
  Some((id, lang.to_string()))
}

/// Volume 0-255 as the player's percentage with two decimals.
///
/// Rust float formatting does not depend on the locale, so the decimal
/// separator is always a dot.
pub(crate) fn volume_percent(volume: u8) -> String {
  format!("{:.2}", f64::from(volume) * 100.0 / 255.0)
}

/// Playback speed multiplier, a power of two in `1..=32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Speed(u8);

impl Default for Speed {
  fn default() -> Self {
    Self::NORMAL
  }
}

impl Speed {
  pub const NORMAL: Speed = Speed(1);
  pub const MAX: Speed = Speed(32);

  pub fn get(self) -> u8 {
    self.0
  }

  pub fn faster(self) -> Self {
    Speed((self.0 * 2).min(Self::MAX.0))
  }

  pub fn slower(self) -> Self {
    Speed((self.0 / 2).max(Self::NORMAL.0))
  }
}

/// dvdnav menu input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavDirection {
  Up,
  Down,
  Left,
  Right,
  Menu,
  Select,
  Prev,
}

impl NavDirection {
  pub fn as_str(self) -> &'static str {
    match self {
      NavDirection::Up => "up",
      NavDirection::Down => "down",
      NavDirection::Left => "left",
      NavDirection::Right => "right",
      NavDirection::Menu => "menu",
      NavDirection::Select => "select",
      NavDirection::Prev => "prev",
    }
  }
}

/// Command sent to the player's stdin. `Display` yields the protocol line
/// without the terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveCommand {
  Quit,
  /// Toggles pause.
  Pause,
  SetSpeed(Speed),
  /// Relative seek in seconds.
  Seek(i32),
  /// Volume 0-255.
  SetVolume(u8),
  Navigate(NavDirection),
}

impl fmt::Display for SlaveCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SlaveCommand::Quit => write!(f, "quit"),
      SlaveCommand::Pause => write!(f, "pause"),
      SlaveCommand::SetSpeed(speed) => write!(f, "pausing_keep speed_set {}", speed.get()),
      SlaveCommand::Seek(secs) => write!(f, "pausing_keep seek {:+} 0", secs),
      SlaveCommand::SetVolume(volume) => {
        write!(f, "pausing_keep volume {} 1", volume_percent(*volume))
      }
      SlaveCommand::Navigate(direction) => write!(f, "pausing_keep dvdnav {}", direction.as_str()),
    }
  }
}
