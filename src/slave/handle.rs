//! Shared controller handle with a periodic tick task.

use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::controller::{Flow, Intent, PlayerController, PlayerError, PlayerEvent};

/// Clonable handle for hosts that reach the controller from several threads.
#[derive(Clone)]
pub struct PlayerHandle {
  inner: Arc<Mutex<PlayerController>>,
  events: Receiver<PlayerEvent>,
}

impl PlayerHandle {
  pub fn new(controller: PlayerController) -> Self {
    let events = controller.events();
    Self {
      inner: Arc::new(Mutex::new(controller)),
      events,
    }
  }

  /// Lock the controller. Do not hold the guard across an await.
  pub fn lock(&self) -> MutexGuard<'_, PlayerController> {
    self.inner.lock()
  }

  pub fn events(&self) -> Receiver<PlayerEvent> {
    self.events.clone()
  }

  pub fn attach(&self, locator: &str, volume: Option<u8>) -> Result<(), PlayerError> {
    self.inner.lock().attach(locator, volume)
  }

  pub fn handle_intent(&self, intent: Intent) -> Result<Flow, PlayerError> {
    self.inner.lock().handle_intent(intent)
  }

  pub fn on_volume_changed(&self, volume: i32, absolute: bool) -> Result<(), PlayerError> {
    self.inner.lock().on_volume_changed(volume, absolute)
  }

  /// [`spawn_ticker`](Self::spawn_ticker) with the configured tick interval.
  pub fn spawn_configured_ticker(&self, cancel: CancellationToken) -> JoinHandle<()> {
    let interval = self.inner.lock().config().tick_interval();
    self.spawn_ticker(interval, cancel)
  }

  /// Run [`PlayerController::tick`] every `interval` until `cancel` fires.
  ///
  /// A tick is skipped while another caller holds the controller.
  pub fn spawn_ticker(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    let inner = self.inner.clone();
    tokio::spawn(async move {
      log::debug!("Player ticker started ({:?})", interval);
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        tokio::select! {
          _ = cancel.cancelled() => break,
          _ = ticker.tick() => {
            if let Some(mut controller) = inner.try_lock() {
              controller.tick();
            }
          }
        }
      }
      log::debug!("Player ticker stopped");
    })
  }

  /// Stop the player without blocking the async runtime.
  ///
  /// The controller is only locked to take the player out; the shutdown
  /// itself runs on the blocking pool.
  pub async fn stop(&self) -> Result<(), PlayerError> {
    let released = self.inner.lock().release();
    let Some(released) = released else {
      return Ok(());
    };
    match tokio::task::spawn_blocking(move || released.stop()).await {
      Ok(result) => result,
      Err(e) => {
        log::error!("spawn_blocking panicked during player shutdown: {}", e);
        Ok(())
      }
    }
  }
}
