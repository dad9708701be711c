//! Slave-mode player module - spawns an external mplayer and drives it over pipes.
//!
//! Architecture:
//! - `launch.rs` - Launch specification and argument vector assembly
//! - `platform.rs` - fork/exec of the player, child liveness and signals
//! - `buffer.rs` - Fixed-capacity receive buffer splitting the child's output into lines
//! - `transport.rs` - Non-blocking status pipe reader and command pipe writer
//! - `protocol.rs` - Status line parsing and slave command formatting
//! - `process.rs` - One spawned player with its playback state and command methods
//! - `supervisor.rs` - Liveness checks and two-stage shutdown
//! - `controller.rs` - Host-facing controller (attach/detach/intent/tick)
//! - `handle.rs` - Shared handle with a periodic tick task

mod buffer;
mod controller;
mod handle;
mod launch;
mod platform;
mod process;
mod protocol;
mod supervisor;
mod transport;

#[cfg(test)]
mod fake;

pub use buffer::{ReceiveBuffer, DEFAULT_CAPACITY};
pub use controller::{Flow, Intent, PlayerController, PlayerError, PlayerEvent};
pub use handle::PlayerHandle;
pub use launch::{find_player, LaunchError, LaunchSpec, ARGV_CAPACITY, EXEC_FAILED_STATUS};
pub use platform::{ChildHandle, ExitKind, ForkSpawner, SlavePipes, SpawnedPlayer, Spawner, Termination};
pub use process::{MediaInfo, PlayerProcess};
pub use protocol::{NavDirection, NavigationMode, SlaveCommand, Speed, StatusEvent};
pub use supervisor::{ProcessState, ShutdownPolicy, ShutdownTimeoutError};
pub use transport::{PipeTransport, TransportError};
