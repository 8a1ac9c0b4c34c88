//! Online/offline decision procedure shared by every resource.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use super::traits::CacheResult;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{StoreResult, SyncError};

/// Decides, per request, between remote refresh and a plain cache read.
///
/// 1. Offline: read the cache, never touch the network
/// 2. Online: fetch remotely, persist, read back from the cache
/// 3. Online path failed or timed out: read the cache instead
///
/// Only cache read errors reach the caller. At most one online sync runs per
/// key at a time; a second caller for the same key waits for the first. The
/// timeout covers that wait too, so no caller spends longer than
/// `remote_timeout` before falling back.
#[derive(Clone)]
pub struct SyncPolicy {
  monitor: ConnectivityMonitor,
  remote_timeout: Duration,
  in_flight: Arc<InFlight>,
}

impl SyncPolicy {
  pub fn new(monitor: ConnectivityMonitor, remote_timeout: Duration) -> Self {
    Self {
      monitor,
      remote_timeout,
      in_flight: Arc::new(InFlight::default()),
    }
  }

  pub fn monitor(&self) -> &ConnectivityMonitor {
    &self.monitor
  }

  /// Run the policy for one resource.
  ///
  /// `key` names the resource for the in-flight guard (e.g. "countries").
  /// `fetch_remote_and_persist` must finish with a cache read so both paths
  /// return the same record shape.
  pub async fn handle_request<T, R, RFut, C>(
    &self,
    key: &str,
    fetch_remote_and_persist: R,
    read_from_cache: C,
  ) -> StoreResult<CacheResult<T>>
  where
    R: FnOnce() -> RFut,
    RFut: Future<Output = Result<T, SyncError>>,
    C: FnOnce() -> StoreResult<T>,
  {
    if !self.monitor.is_online().await {
      info!(key, "offline, reading from cache");
      return read_from_cache().map(CacheResult::offline);
    }

    let sync = async {
      let _permit = self.in_flight.acquire(key).await;
      fetch_remote_and_persist().await
    };

    let outcome = match tokio::time::timeout(self.remote_timeout, sync).await {
      Ok(result) => result,
      Err(_) => Err(SyncError::Timeout(self.remote_timeout)),
    };

    match outcome {
      Ok(data) => {
        info!(key, "synced from remote");
        Ok(CacheResult::from_remote(data))
      }
      Err(error) => {
        warn!(key, %error, "remote sync failed, falling back to cache");
        read_from_cache().map(CacheResult::fallback)
      }
    }
  }
}

/// Per-key async locks.
///
/// An entry whose only reference is the map is unused. `release` removes its
/// own key; a waiter cancelled after the holder left can still orphan one,
/// so `acquire` sweeps those first.
#[derive(Default)]
struct InFlight {
  locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InFlight {
  async fn acquire(&self, key: &str) -> Permit<'_> {
    let lock = {
      let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
      locks.retain(|_, lock| Arc::strong_count(lock) > 1);
      Arc::clone(locks.entry(key.to_string()).or_default())
    };

    Permit {
      owner: self,
      key: key.to_string(),
      guard: Some(lock.lock_owned().await),
    }
  }

  fn release(&self, key: &str) {
    let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
    if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
      locks.remove(key);
    }
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.locks.lock().unwrap().len()
  }
}

struct Permit<'a> {
  owner: &'a InFlight,
  key: String,
  guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Permit<'_> {
  fn drop(&mut self) {
    self.guard.take();
    self.owner.release(&self.key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::connectivity::ManualConnectivity;
  use crate::error::{RemoteError, StoreError};
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  fn policy(online: bool, timeout: Duration) -> SyncPolicy {
    let monitor = ConnectivityMonitor::new(
      Arc::new(ManualConnectivity::new(online)),
      Duration::from_secs(3),
    );
    SyncPolicy::new(monitor, timeout)
  }

  fn remote_failure() -> SyncError {
    SyncError::Remote(RemoteError::InvalidUrl(url::ParseError::EmptyHost))
  }

  #[tokio::test]
  async fn test_offline_never_calls_remote() {
    let policy = policy(false, Duration::from_secs(1));
    let called = AtomicBool::new(false);
    let flag = &called;

    let result = policy
      .handle_request(
        "countries",
        move || async move {
          flag.store(true, Ordering::SeqCst);
          Ok::<_, SyncError>(vec!["remote"])
        },
        || Ok(vec!["cached"]),
      )
      .await
      .unwrap();

    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(result.data, vec!["cached"]);
    assert_eq!(result.source, CacheSource::Offline);
  }

  #[tokio::test]
  async fn test_online_returns_remote_result() {
    let policy = policy(true, Duration::from_secs(1));

    let result = policy
      .handle_request("countries", || async { Ok::<_, SyncError>(1) }, || Ok(2))
      .await
      .unwrap();

    assert_eq!(result.data, 1);
    assert_eq!(result.source, CacheSource::Remote);
  }

  #[tokio::test]
  async fn test_remote_failure_falls_back_to_cache() {
    let policy = policy(true, Duration::from_secs(1));

    let result = policy
      .handle_request(
        "countries",
        || async { Err::<i32, _>(remote_failure()) },
        || Ok(2),
      )
      .await
      .unwrap();

    assert_eq!(result.data, 2);
    assert_eq!(result.source, CacheSource::Fallback);
  }

  #[tokio::test]
  async fn test_persist_failure_falls_back_to_cache() {
    let policy = policy(true, Duration::from_secs(1));

    let result = policy
      .handle_request(
        "countries",
        || async { Err::<&str, _>(SyncError::Store(StoreError::LockPoisoned)) },
        || Ok("cached"),
      )
      .await
      .unwrap();

    assert_eq!(result.data, "cached");
    assert_eq!(result.source, CacheSource::Fallback);
  }

  #[tokio::test]
  async fn test_timeout_falls_back_to_cache() {
    let policy = policy(true, Duration::from_millis(50));
    let started = std::time::Instant::now();

    let result = policy
      .handle_request(
        "countries",
        || async {
          tokio::time::sleep(Duration::from_secs(10)).await;
          Ok::<_, SyncError>("remote")
        },
        || Ok("cached"),
      )
      .await
      .unwrap();

    assert_eq!(result.data, "cached");
    assert_eq!(result.source, CacheSource::Fallback);
    assert!(started.elapsed() < Duration::from_secs(2));
  }

  #[tokio::test]
  async fn test_cache_errors_propagate() {
    let offline = policy(false, Duration::from_secs(1));
    let result = offline
      .handle_request(
        "countries",
        || async { Ok::<_, SyncError>(()) },
        || Err(StoreError::LockPoisoned),
      )
      .await;
    assert!(matches!(result, Err(StoreError::LockPoisoned)));

    let online = policy(true, Duration::from_secs(1));
    let result = online
      .handle_request(
        "countries",
        || async { Err::<(), _>(remote_failure()) },
        || Err(StoreError::NoDataDir),
      )
      .await;
    assert!(matches!(result, Err(StoreError::NoDataDir)));
  }

  /// One request whose remote phase takes 30ms, tracking how many remote
  /// phases are active at once.
  async fn tracked_sync(
    policy: &SyncPolicy,
    key: &str,
    active: &AtomicUsize,
    peak: &AtomicUsize,
  ) -> StoreResult<CacheResult<()>> {
    policy
      .handle_request(
        key,
        move || async move {
          let now = active.fetch_add(1, Ordering::SeqCst) + 1;
          peak.fetch_max(now, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(30)).await;
          active.fetch_sub(1, Ordering::SeqCst);
          Ok::<_, SyncError>(())
        },
        || Ok(()),
      )
      .await
  }

  async fn peak_concurrency(policy: &SyncPolicy, first: &str, second: &str) -> usize {
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    let (a, b) = tokio::join!(
      tracked_sync(policy, first, &active, &peak),
      tracked_sync(policy, second, &active, &peak),
    );
    a.unwrap();
    b.unwrap();

    peak.load(Ordering::SeqCst)
  }

  #[tokio::test]
  async fn test_same_key_syncs_do_not_overlap() {
    let policy = policy(true, Duration::from_secs(1));
    assert_eq!(peak_concurrency(&policy, "universities:KE", "universities:KE").await, 1);
    assert_eq!(policy.in_flight.len(), 0);
  }

  #[tokio::test]
  async fn test_waiting_for_same_key_counts_against_timeout() {
    let policy = policy(true, Duration::from_millis(100));
    let slow = || async {
      tokio::time::sleep(Duration::from_millis(80)).await;
      Ok::<_, SyncError>("remote")
    };
    let started = std::time::Instant::now();

    let (first, second) = tokio::join!(
      policy.handle_request("countries", slow, || Ok("cached")),
      policy.handle_request("countries", slow, || Ok("cached")),
    );

    assert_eq!(first.unwrap().source, CacheSource::Remote);
    assert_eq!(second.unwrap().source, CacheSource::Fallback);
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(policy.in_flight.len(), 0);
  }

  #[tokio::test]
  async fn test_cancelled_waiter_entry_is_swept() {
    let in_flight = InFlight::default();
    let holder = in_flight.acquire("universities:KE").await;

    let mut waiter = Box::pin(in_flight.acquire("universities:KE"));
    assert!(futures::poll!(waiter.as_mut()).is_pending());
    drop(holder);
    drop(waiter);
    assert_eq!(in_flight.len(), 1);

    let other = in_flight.acquire("universities:GH").await;
    assert_eq!(in_flight.len(), 1);
    drop(other);
    assert_eq!(in_flight.len(), 0);
  }

  #[tokio::test]
  async fn test_different_keys_sync_independently() {
    let policy = policy(true, Duration::from_secs(1));
    assert_eq!(peak_concurrency(&policy, "universities:KE", "universities:GH").await, 2);
  }
}
