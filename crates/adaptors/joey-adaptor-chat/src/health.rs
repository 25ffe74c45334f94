//! Health monitor: periodic backend probing and send gating
//!
//! Publishes [`HealthState`] through a `watch` channel so the pipeline reads
//! the current value synchronously and UIs can subscribe to changes.

use joey_core::{derive_connectivity, Connectivity, HealthProbe, HealthReport, HealthState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Tracks backend reachability and the outcome of the last send
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    state: watch::Sender<HealthState>,
    last_report: Mutex<Option<HealthReport>>,
    last_send_failed: AtomicBool,
    interval: Duration,
}

impl HealthMonitor {
    /// Create a monitor; the state stays offline until the first probe
    pub fn new(probe: Arc<dyn HealthProbe>, base: impl Into<String>, interval: Duration) -> Self {
        let (state, _) = watch::channel(HealthState::unprobed(base));
        Self {
            probe,
            state,
            last_report: Mutex::new(None),
            last_send_failed: AtomicBool::new(false),
            interval,
        }
    }

    /// Current state
    pub fn current(&self) -> HealthState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<HealthState> {
        self.state.subscribe()
    }

    /// Probe once and publish the derived state
    pub async fn probe_once(&self) -> HealthState {
        let report = self.probe.probe().await;
        debug!(ok = report.ok, base = %report.base, "Health probe");
        let next = HealthState::derive(&report, self.last_send_failed.load(Ordering::SeqCst));
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);
        self.publish(next.clone());
        next
    }

    /// Record how the last logical send ended and re-derive the state.
    ///
    /// A failed send turns a reachable backend `degraded`; only a later
    /// successful send brings it back `online`.
    pub fn record_send_outcome(&self, failed: bool) {
        self.last_send_failed.store(failed, Ordering::SeqCst);
        let probed = self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.ok);

        if let Some(probe_ok) = probed {
            let mut next = self.current();
            next.state = derive_connectivity(probe_ok, failed);
            self.publish(next);
        }
    }

    /// Whether the last completed send failed
    pub fn last_send_failed(&self) -> bool {
        self.last_send_failed.load(Ordering::SeqCst)
    }

    fn publish(&self, next: HealthState) {
        let previous = self.state.send_replace(next.clone());
        if previous.state != next.state {
            match next.state {
                Connectivity::Offline => warn!(base = %next.base, "Backend offline"),
                state => info!(base = %next.base, %state, "Backend {}", state),
            }
        }
    }

    /// Probe now, then keep probing on the configured interval
    pub async fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.probe_once().await;
        self.spawn()
    }

    /// Probe on the configured interval, first probe one interval from now
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let period = monitor.interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.probe_once().await;
            }
        })
    }
}
