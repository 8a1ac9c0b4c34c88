//! Re-run a load whenever connectivity changes.
//!
//! # Example
//!
//! ```ignore
//! let catalog = Arc::new(catalog);
//! let monitor = catalog.monitor().clone();
//! let (subscription, mut events) = watch(&monitor, move || {
//!   let catalog = catalog.clone();
//!   async move { catalog.load_countries(&CountryFilter::default()).await }
//! });
//!
//! while let Some(event) = events.recv().await {
//!   match event {
//!     WatchEvent::Connectivity(online) => show_banner(!online),
//!     WatchEvent::Refreshed(Ok(result)) => render(result.data),
//!     WatchEvent::Refreshed(Err(e)) => show_error(e),
//!   }
//! }
//! ```

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::CacheResult;
use crate::connectivity::{ConnectivityMonitor, Subscription};
use crate::error::StoreResult;

/// Events delivered to a watcher
#[derive(Debug)]
pub enum WatchEvent<T> {
  /// Connectivity changed (the first one is the baseline)
  Connectivity(bool),
  /// A refresh triggered by a connectivity change finished
  Refreshed(StoreResult<CacheResult<T>>),
}

/// Subscribe to `monitor` and run `refresh` on every transition.
///
/// At most one refresh runs at a time. Transitions that arrive while one is
/// running are reported immediately and coalesced into a single refresh once
/// it finishes. A panicking refresh is logged and does not stop later ones.
/// Dropping the returned [`Subscription`] stops the probing; a refresh
/// already started finishes.
pub fn watch<T, F, Fut>(
  monitor: &ConnectivityMonitor,
  refresh: F,
) -> (Subscription, mpsc::UnboundedReceiver<WatchEvent<T>>)
where
  T: Send + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = StoreResult<CacheResult<T>>> + Send + 'static,
{
  let (tx, rx) = mpsc::unbounded_channel();
  let refresh = Arc::new(refresh);
  let running = Arc::new(AtomicBool::new(false));
  let pending = Arc::new(AtomicBool::new(false));

  let subscription = monitor.subscribe(move |online| {
    // Ignore send errors - receiver may have been dropped
    let _ = tx.send(WatchEvent::Connectivity(online));

    pending.store(true, Ordering::SeqCst);
    if running.swap(true, Ordering::SeqCst) {
      debug!(online, "refresh in flight, queued another");
      return;
    }

    tokio::spawn(run_refreshes(
      Arc::clone(&refresh),
      tx.clone(),
      Arc::clone(&running),
      Arc::clone(&pending),
    ));
  });

  (subscription, rx)
}

/// Owns the `running` flag until no transition is left unserved.
async fn run_refreshes<T, F, Fut>(
  refresh: Arc<F>,
  tx: mpsc::UnboundedSender<WatchEvent<T>>,
  running: Arc<AtomicBool>,
  pending: Arc<AtomicBool>,
) where
  F: Fn() -> Fut,
  Fut: Future<Output = StoreResult<CacheResult<T>>>,
{
  loop {
    pending.store(false, Ordering::SeqCst);

    match AssertUnwindSafe(async { (*refresh)().await }).catch_unwind().await {
      Ok(result) => {
        let _ = tx.send(WatchEvent::Refreshed(result));
      }
      Err(_) => warn!("refresh panicked"),
    }

    if pending.load(Ordering::SeqCst) {
      continue;
    }
    running.store(false, Ordering::SeqCst);
    // A transition may have queued itself between the check and the release.
    if !pending.load(Ordering::SeqCst) || running.swap(true, Ordering::SeqCst) {
      break;
    }
  }
}
