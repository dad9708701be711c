//! Drive an external mplayer from a host application.
//!
//! - [`config`] - player settings from the config file and plugin arguments
//! - [`browser`] - media file picker and main menu entries
//! - the player itself: [`PlayerController`] / [`PlayerHandle`]

pub mod browser;
pub mod config;
mod slave;

pub use config::{ConfigError, PlayConfig};
pub use slave::*;
