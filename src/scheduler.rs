//! Periodic and manual refresh driven by the persisted settings

use crate::settings::Settings;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

/// Something a refresh sweep re-runs: a dataset re-fetch, the dashboard
/// aggregate, or a probe sweep.
#[async_trait]
pub trait RefreshTarget: Send + Sync {
    fn name(&self) -> &str {
        "refresh"
    }

    async fn refresh(&self);
}

/// Background task that fires a `RefreshTarget` every refresh interval while
/// auto refresh is on, and on demand via `trigger`.
///
/// Turning auto refresh off cancels the pending fire. Changing the interval
/// reschedules from the moment of the change, not from the last fire.
#[derive(Debug)]
pub struct RefreshScheduler {
    manual: Arc<Notify>,
    fires: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Spawn the scheduler. `settings` should come from an already loaded
    /// `SettingsStore` so the first deadline uses the operator's interval.
    pub fn spawn(target: Arc<dyn RefreshTarget>, settings: watch::Receiver<Settings>) -> Self {
        let manual = Arc::new(Notify::new());
        let fires = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(run(
            target,
            settings,
            Arc::clone(&manual),
            Arc::clone(&fires),
        ));

        Self {
            manual,
            fires,
            handle,
        }
    }

    /// Refresh now. The pending auto-refresh deadline is left where it is.
    pub fn trigger(&self) {
        self.manual.notify_one();
    }

    /// Completed refreshes, automatic and manual.
    pub fn fire_count(&self) -> u64 {
        self.fires.load(Ordering::SeqCst)
    }

    pub async fn shutdown(mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Cap for intervals too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn next_deadline(settings: &Settings, now: Instant) -> Option<Instant> {
    settings
        .auto_refresh
        .then(|| now + settings.refresh_interval().min(FAR_FUTURE))
}

async fn run(
    target: Arc<dyn RefreshTarget>,
    mut settings: watch::Receiver<Settings>,
    manual: Arc<Notify>,
    fires: Arc<AtomicU64>,
) {
    let mut deadline = next_deadline(&settings.borrow_and_update(), Instant::now());
    info!(
        "Refresh scheduler for {} started (auto refresh {})",
        target.name(),
        deadline.is_some()
    );

    loop {
        tokio::select! {
            changed = settings.changed() => {
                if changed.is_err() {
                    debug!("Settings channel closed, stopping {} scheduler", target.name());
                    break;
                }
                deadline = next_deadline(&settings.borrow_and_update(), Instant::now());
                debug!("Rescheduled {} refresh: {:?}", target.name(), deadline);
            }
            _ = manual.notified() => {
                debug!("Manual refresh of {}", target.name());
                target.refresh().await;
                fires.fetch_add(1, Ordering::SeqCst);
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                debug!("Auto refresh of {}", target.name());
                target.refresh().await;
                fires.fetch_add(1, Ordering::SeqCst);
                deadline = next_deadline(&settings.borrow(), Instant::now());
            }
        }
    }
}
