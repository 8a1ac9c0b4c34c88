//! Network reachability: point queries and edge-triggered change callbacks.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::config::ConnectivityConfig;

/// Something that can tell whether the network is reachable right now.
pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> BoxFuture<'_, bool>;
}

/// Probe that dials a TCP address and reports online if the handshake
/// completes within the timeout.
#[derive(Debug, Clone)]
pub struct TcpProbe {
  addr: String,
  timeout: Duration,
}

impl TcpProbe {
  pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
    Self {
      addr: addr.into(),
      timeout,
    }
  }
}

impl Connectivity for TcpProbe {
  fn is_online(&self) -> BoxFuture<'_, bool> {
    Box::pin(async move {
      matches!(
        tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await,
        Ok(Ok(_))
      )
    })
  }
}

/// Connectivity set by hand, e.g. to force offline mode.
#[derive(Debug, Default)]
pub struct ManualConnectivity {
  online: AtomicBool,
}

impl ManualConnectivity {
  pub fn new(online: bool) -> Self {
    Self {
      online: AtomicBool::new(online),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

impl Connectivity for ManualConnectivity {
  fn is_online(&self) -> BoxFuture<'_, bool> {
    let online = self.online.load(Ordering::SeqCst);
    Box::pin(async move { online })
  }
}

/// Turns a stream of samples into transitions.
///
/// The previous state starts unknown, so the first sample is always reported
/// and serves as the baseline.
#[derive(Debug, Default)]
pub struct EdgeDetector {
  last: Option<bool>,
}

impl EdgeDetector {
  /// Returns the new state if it differs from the last observed one.
  pub fn observe(&mut self, sample: bool) -> Option<bool> {
    if self.last == Some(sample) {
      return None;
    }
    self.last = Some(sample);
    Some(sample)
  }
}

/// Answers "are we online" and notifies subscribers on change.
#[derive(Clone)]
pub struct ConnectivityMonitor {
  probe: Arc<dyn Connectivity>,
  interval: Duration,
}

impl ConnectivityMonitor {
  pub fn new(probe: Arc<dyn Connectivity>, interval: Duration) -> Self {
    Self { probe, interval }
  }

  /// Monitor backed by a [`TcpProbe`] built from config.
  pub fn from_config(config: &ConnectivityConfig) -> Self {
    let probe = TcpProbe::new(config.probe_addr.clone(), config.probe_timeout());
    Self::new(Arc::new(probe), config.interval())
  }

  pub async fn is_online(&self) -> bool {
    self.probe.is_online().await
  }

  /// Sample every `interval` and call `callback` on each transition.
  ///
  /// The first sample is taken immediately and always dispatched. Every
  /// subscription runs its own task; dropping the handle stops it.
  pub fn subscribe<F>(&self, mut callback: F) -> Subscription
  where
    F: FnMut(bool) + Send + 'static,
  {
    let probe = Arc::clone(&self.probe);
    let period = self.interval;

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      let mut edges = EdgeDetector::default();

      loop {
        ticker.tick().await;
        let sample = probe.is_online().await;
        if let Some(online) = edges.observe(sample) {
          debug!(online, "connectivity changed");
          callback(online);
        }
      }
    });

    Subscription { handle }
  }
}

/// Handle to a running subscription. Stops the probe task when dropped.
#[must_use = "dropping a Subscription stops it immediately"]
pub struct Subscription {
  handle: JoinHandle<()>,
}

impl Subscription {
  pub fn unsubscribe(self) {
    self.handle.abort();
  }

  pub fn is_active(&self) -> bool {
    !self.handle.is_finished()
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::collections::VecDeque;
  use std::sync::Mutex;
  use tokio::sync::mpsc;

  /// Plays back a fixed sequence of samples, then repeats the last one.
  pub(crate) struct ScriptedProbe {
    samples: Mutex<VecDeque<bool>>,
    last: AtomicBool,
  }

  impl ScriptedProbe {
    pub(crate) fn new(samples: &[bool]) -> Self {
      Self {
        samples: Mutex::new(samples.iter().copied().collect()),
        last: AtomicBool::new(samples.last().copied().unwrap_or(false)),
      }
    }
  }

  impl Connectivity for ScriptedProbe {
    fn is_online(&self) -> BoxFuture<'_, bool> {
      let next = self.samples.lock().unwrap().pop_front();
      let sample = next.unwrap_or_else(|| self.last.load(Ordering::SeqCst));
      Box::pin(async move { sample })
    }
  }

  fn collect(rx: &mut mpsc::UnboundedReceiver<bool>) -> Vec<bool> {
    let mut seen = Vec::new();
    while let Ok(v) = rx.try_recv() {
      seen.push(v);
    }
    seen
  }

  #[test]
  fn test_edge_detector_sequence() {
    let mut edges = EdgeDetector::default();
    let fired: Vec<bool> = [true, true, false, false, true]
      .into_iter()
      .filter_map(|s| edges.observe(s))
      .collect();
    assert_eq!(fired, vec![true, false, true]);
  }

  #[test]
  fn test_edge_detector_first_offline_sample_is_baseline() {
    let mut edges = EdgeDetector::default();
    assert_eq!(edges.observe(false), Some(false));
    assert_eq!(edges.observe(false), None);
  }

  #[tokio::test]
  async fn test_subscribe_dispatches_transitions_only() {
    let probe = Arc::new(ScriptedProbe::new(&[true, true, false, false, true]));
    let monitor = ConnectivityMonitor::new(probe, Duration::from_millis(5));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = monitor.subscribe(move |online| {
      let _ = tx.send(online);
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    sub.unsubscribe();

    assert_eq!(collect(&mut rx), vec![true, false, true]);
  }

  #[tokio::test]
  async fn test_unsubscribe_stops_callbacks() {
    let probe = Arc::new(ManualConnectivity::new(true));
    let monitor = ConnectivityMonitor::new(probe.clone(), Duration::from_millis(5));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = monitor.subscribe(move |online| {
      let _ = tx.send(online);
    });
    tokio::time::sleep(Duration::from_millis(40)).await;
    sub.unsubscribe();

    probe.set_online(false);
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(collect(&mut rx), vec![true]);
  }

  #[tokio::test]
  async fn test_subscriptions_are_independent() {
    let probe = Arc::new(ManualConnectivity::new(true));
    let monitor = ConnectivityMonitor::new(probe.clone(), Duration::from_millis(5));

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let sub_a = monitor.subscribe(move |online| {
      let _ = tx_a.send(online);
    });
    let sub_b = monitor.subscribe(move |online| {
      let _ = tx_b.send(online);
    });
    tokio::time::sleep(Duration::from_millis(40)).await;

    drop(sub_a);
    probe.set_online(false);
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert!(sub_b.is_active());
    assert_eq!(collect(&mut rx_a), vec![true]);
    assert_eq!(collect(&mut rx_b), vec![true, false]);
  }

  #[tokio::test]
  async fn test_tcp_probe_reports_unreachable() {
    // Bind and release an ephemeral port so nothing listens on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = TcpProbe::new(addr.to_string(), Duration::from_millis(200));
    assert!(!probe.is_online().await);
  }

  #[tokio::test]
  async fn test_tcp_probe_reports_reachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let probe = TcpProbe::new(addr.to_string(), Duration::from_millis(500));
    assert!(probe.is_online().await);
  }
}
