//! Arrival alert monitoring against live departure boards.
//!
//! This module provides the [`ArrivalAlertMonitor`] which polls the live
//! departures API while arrival alerts exist and dispatches a notification
//! the first time a watched service is due within an alert's trigger window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::alerts::alert::ArrivalAlert;
use crate::alerts::store::AlertStore;
use crate::livetimes::{LiveDeparture, LiveTimesClient};
use crate::notify::NotificationDispatcher;

/// Departures requested per service on each poll.
///
/// Only the earliest departure of a service decides whether an alert
/// fires, but a few extra entries keep the debug logs useful.
const DEPARTURES_PER_SERVICE: u8 = 4;

/// Polls live departures and fires arrival alerts.
///
/// The monitor runs as a single task. It sleeps while the store holds no
/// arrival alerts, polls on a fixed cadence while at least one exists, and
/// stops on its own once the last alert is consumed or expires. Every
/// cycle issues exactly one batched request covering all watched stops.
pub struct ArrivalAlertMonitor<S: AlertStore, L: LiveTimesClient, D: NotificationDispatcher> {
    /// Store holding the alerts to evaluate
    store: Arc<S>,
    /// Client for the live departures API
    live_times: Arc<L>,
    /// Dispatcher receiving fired alerts
    dispatcher: Arc<D>,
    /// Time between two poll cycles
    poll_interval: Duration,
    /// Handle of the running polling task, if any
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, L, D> ArrivalAlertMonitor<S, L, D>
where
    S: AlertStore + 'static,
    L: LiveTimesClient + 'static,
    D: NotificationDispatcher + 'static,
{
    /// Create a new [ArrivalAlertMonitor] polling every `poll_interval`.
    /// Nothing runs until [`Self::start`] is called.
    pub fn new(store: Arc<S>, live_times: Arc<L>, dispatcher: Arc<D>, poll_interval: Duration) -> Self {
        ArrivalAlertMonitor {
            store,
            live_times,
            dispatcher,
            poll_interval,
            task: Mutex::new(None),
        }
    }

    /// Starts the monitor task if it is not already running.
    ///
    /// A handle of a task that stopped on its own counts as not running,
    /// so calling this again later restarts monitoring.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("arrival alert monitor already running");
            return;
        }

        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move { monitor.run().await }));
    }

    /// Stops the monitor task. Calling this when nothing runs is a no-op.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            info!("stopped arrival alert monitor");
        }
    }

    /// Whether the monitor task is currently running.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Runs the monitor until no arrival alerts remain.
    ///
    /// Waits for the first alert before polling at all, then evaluates the
    /// alerts every [`Self::new`] `poll_interval`, starting immediately.
    /// Stops when the published alert count drops to zero, whether through
    /// fired alerts, user removals or expiry.
    async fn run(&self) {
        let mut count = self.store.arrival_alert_count_changes();

        while *count.borrow_and_update() == 0 {
            if count.changed().await.is_err() {
                debug!("arrival count stream closed before any alert existed");
                return;
            }
        }

        info!(
            "arrival alert monitor started, polling every {:?}",
            self.poll_interval
        );
        let mut ticker = time::interval(self.poll_interval);

        loop {
            // Checked before the ticker so a count that dropped to zero
            // wins against a tick that became due at the same time.
            tokio::select! {
                biased;
                changed = count.changed() => {
                    if changed.is_err() {
                        debug!("arrival count stream closed, stopping monitor");
                        return;
                    }
                    if *count.borrow_and_update() == 0 && self.try_finish(&mut count).await {
                        return;
                    }
                }
                _ = ticker.tick() => self.poll_once().await,
            }
        }
    }

    /// Decides under the task guard whether the monitor may stop.
    ///
    /// An alert can be added between the loop observing a count of zero
    /// and the task actually returning, with [`Self::start`] still seeing
    /// an unfinished handle and not spawning a replacement. Re-checking
    /// the count while holding the guard closes that window: either the
    /// late alert is visible here and the loop keeps polling, or it is
    /// added afterwards and finds the handle already cleared.
    async fn try_finish(&self, count: &mut watch::Receiver<usize>) -> bool {
        let mut task = self.task.lock().await;

        if *count.borrow_and_update() > 0 {
            debug!("arrival alert added while stopping, monitor keeps polling");
            return false;
        }

        info!("no arrival alerts remain, stopping monitor");
        *task = None;
        true
    }

    /// Runs one poll cycle: fetch departures, fire satisfied alerts.
    async fn poll_once(&self) {
        let stops: Vec<String> = self.store.arrival_alert_stops().await.into_iter().collect();
        if stops.is_empty() {
            debug!("no stops to poll this cycle");
            return;
        }

        debug!("polling departures for {} stop(s)", stops.len());
        let departures = match self
            .live_times
            .departures(&stops, DEPARTURES_PER_SERVICE)
            .await
        {
            Ok(departures) => departures,
            Err(e) => {
                error!("failed to fetch live departures, retrying next cycle: {}", e);
                return;
            }
        };

        // Re-read the alerts after the fetch. An alert removed while the
        // request was in flight must not fire from stale data.
        for alert in self.store.arrival_alerts().await {
            let Some(board) = departures.get(&alert.stop_code) else {
                debug!("no departures returned for stop {}", alert.stop_code);
                continue;
            };

            let qualifying = qualifying_services(&alert, board);
            if qualifying.is_empty() {
                continue;
            }

            info!(
                "arrival alert {} satisfied at stop {} by service(s) {:?}",
                alert.id, alert.stop_code, qualifying
            );
            self.dispatcher.dispatch_time_alert(&alert, &qualifying).await;
            self.store.remove_arrival_alert(alert.id).await;
        }
    }
}

impl<S: AlertStore, L: LiveTimesClient, D: NotificationDispatcher> Drop
    for ArrivalAlertMonitor<S, L, D>
{
    fn drop(&mut self) {
        // Test runtimes drop the monitor without calling stop().
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

/// Returns the watched services whose earliest departure is within the
/// alert's trigger window.
///
/// Later departures of the same service are ignored. A service showing 43
/// and 4 minutes is judged on the 4. The result is sorted so notification
/// text is stable.
fn qualifying_services(alert: &ArrivalAlert, board: &[LiveDeparture]) -> Vec<String> {
    let mut earliest: HashMap<&str, u32> = HashMap::new();
    for departure in board {
        earliest
            .entry(departure.service.as_str())
            .and_modify(|minutes| *minutes = (*minutes).min(departure.minutes))
            .or_insert(departure.minutes);
    }

    let mut qualifying: Vec<String> = alert
        .services
        .iter()
        .filter(|service| {
            earliest
                .get(service.as_str())
                .is_some_and(|minutes| *minutes <= alert.time_trigger)
        })
        .cloned()
        .collect();
    qualifying.sort();
    qualifying
}
