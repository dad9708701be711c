//! Media file browser and main menu entries.
//!
//! The host renders the entries; this module only decides what is listed and
//! what a selection plays.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::PlayConfig;

/// Name of the entry leading one level up.
pub const PARENT: &str = "..";

/// Directory name that plays as a DVD through dvdnav.
const DVD_DIRECTORY: &str = "VIDEO_TS";

const VIDEO_SUFFIXES: &[&str] = &[
  ".ts", ".avi", ".iso", ".m4v", ".mkv", ".mp4", ".mpg", ".vdr", ".vob", ".wmv",
];

const AUDIO_SUFFIXES: &[&str] = &[".flac", ".mp3", ".ogg", ".wav"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Video,
  Audio,
}

impl MediaKind {
  pub fn suffixes(self) -> &'static [&'static str] {
    match self {
      MediaKind::Video => VIDEO_SUFFIXES,
      MediaKind::Audio => AUDIO_SUFFIXES,
    }
  }

  /// Case-insensitive suffix match.
  pub fn matches(self, name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    self.suffixes().iter().any(|suffix| name.ends_with(suffix))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
  pub name: String,
  pub is_dir: bool,
}

/// What selecting an entry did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
  /// The browser moved to this directory.
  Directory(PathBuf),
  /// Play this locator.
  Play(String),
}

/// One directory level of the file picker.
#[derive(Debug)]
pub struct Browser {
  dir: PathBuf,
  kind: MediaKind,
  entries: Vec<Entry>,
}

impl Browser {
  pub fn open(dir: impl Into<PathBuf>, kind: MediaKind) -> io::Result<Self> {
    let dir = dir.into();
    let entries = read_directory(&dir, kind)?;
    Ok(Self { dir, kind, entries })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn kind(&self) -> MediaKind {
    self.kind
  }

  /// Directories first, then matching files, each sorted by name.
  /// [`PARENT`] is not included.
  pub fn entries(&self) -> &[Entry] {
    &self.entries
  }

  /// Go one level up. The root stays the root.
  pub fn up(&mut self) -> io::Result<()> {
    if let Some(parent) = self.dir.parent() {
      let parent = parent.to_path_buf();
      self.entries = read_directory(&parent, self.kind)?;
      self.dir = parent;
    }
    Ok(())
  }

  /// Select the entry called `name`.
  ///
  /// A directory is entered, except `VIDEO_TS` which plays as a DVD. A
  /// failing directory read keeps the current listing.
  pub fn select(&mut self, name: &str) -> io::Result<Selection> {
    if name == PARENT {
      self.up()?;
      return Ok(Selection::Directory(self.dir.clone()));
    }

    let path = self.dir.join(name);
    if !path.is_dir() {
      return Ok(Selection::Play(path.to_string_lossy().into_owned()));
    }
    if name == DVD_DIRECTORY {
      return Ok(Selection::Play(format!("dvdnav://{}", path.display())));
    }

    self.entries = read_directory(&path, self.kind)?;
    self.dir = path;
    Ok(Selection::Directory(self.dir.clone()))
  }
}

fn read_directory(dir: &Path, kind: MediaKind) -> io::Result<Vec<Entry>> {
  log::debug!("Scanning directory {}", dir.display());
  let mut dirs = Vec::new();
  let mut files = Vec::new();

  for entry in WalkDir::new(dir)
    .min_depth(1)
    .max_depth(1)
    .follow_links(true)
    .sort_by_file_name()
  {
    let entry = match entry {
      Ok(entry) => entry,
      // the directory itself is unreadable
      Err(e) if e.depth() == 0 => return Err(e.into()),
      Err(e) => {
        log::debug!("Skipping entry: {}", e);
        continue;
      }
    };
    let name = entry.file_name().to_string_lossy().into_owned();
    if name.starts_with('.') {
      continue;
    }
    if entry.file_type().is_dir() {
      dirs.push(Entry { name, is_dir: true });
    } else if kind.matches(&name) {
      files.push(Entry {
        name,
        is_dir: false,
      });
    }
  }

  dirs.extend(files);
  Ok(dirs)
}

const MAIN_MENU_ENTRY: &str = "Play";

/// Label of the host's main menu entry, `None` when configured hidden.
pub fn main_menu_entry(config: &PlayConfig) -> Option<&'static str> {
  (!config.hide_main_menu_entry).then_some(MAIN_MENU_ENTRY)
}

/// Entries of the plugin's main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
  PlayDvd,
  BrowseVideoDirectory,
  BrowseVideoFilesystem,
  PlayCd,
  BrowseAudioDirectory,
  BrowseAudioFilesystem,
}

/// Result of a main menu choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
  Play(String),
  Browse { dir: PathBuf, kind: MediaKind },
}

impl MenuAction {
  /// Open the browser a `Browse` action asks for.
  pub fn open_browser(&self) -> Option<io::Result<Browser>> {
    match self {
      MenuAction::Browse { dir, kind } => Some(Browser::open(dir.clone(), *kind)),
      MenuAction::Play(_) => None,
    }
  }
}

impl MenuEntry {
  pub const ALL: [MenuEntry; 6] = [
    MenuEntry::PlayDvd,
    MenuEntry::BrowseVideoDirectory,
    MenuEntry::BrowseVideoFilesystem,
    MenuEntry::PlayCd,
    MenuEntry::BrowseAudioDirectory,
    MenuEntry::BrowseAudioFilesystem,
  ];

  pub fn label(self) -> &'static str {
    match self {
      MenuEntry::PlayDvd => "Play DVD",
      MenuEntry::BrowseVideoDirectory => "Browse Video in VideoDir",
      MenuEntry::BrowseVideoFilesystem => "Browse Video in Filesystem",
      MenuEntry::PlayCd => "Play CD",
      MenuEntry::BrowseAudioDirectory => "Browse Audio in VideoDir",
      MenuEntry::BrowseAudioFilesystem => "Browse Audio in Filesystem",
    }
  }

  /// [`action`](Self::action) with the configured video directory.
  pub fn choose(self, config: &PlayConfig) -> MenuAction {
    self.action(&config.video_directory)
  }

  pub fn action(self, video_directory: &Path) -> MenuAction {
    let browse = |dir: &Path, kind| MenuAction::Browse {
      dir: dir.to_path_buf(),
      kind,
    };
    match self {
      MenuEntry::PlayDvd => MenuAction::Play("dvdnav://".into()),
      MenuEntry::PlayCd => MenuAction::Play("cdda://".into()),
      MenuEntry::BrowseVideoDirectory => browse(video_directory, MediaKind::Video),
      MenuEntry::BrowseVideoFilesystem => browse(Path::new("/"), MediaKind::Video),
      MenuEntry::BrowseAudioDirectory => browse(video_directory, MediaKind::Audio),
      MenuEntry::BrowseAudioFilesystem => browse(Path::new("/"), MediaKind::Audio),
    }
  }
}
