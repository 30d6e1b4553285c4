//! The live reserve countdown: a one-second ticker that republishes the
//! depletion projection over a watch channel. One task at a time; starting
//! a new render aborts the previous one, and `stop` is idempotent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use crate::metrics::DepletionProjection;

/// One published frame of the countdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountdownState {
    pub remaining_volume: f64,
    pub seconds_to_empty: Option<f64>,
    pub running: bool,
}

impl CountdownState {
    const fn idle() -> Self {
        Self {
            remaining_volume: 0.0,
            seconds_to_empty: None,
            running: false,
        }
    }

    fn frame(projection: &DepletionProjection, elapsed: Duration) -> Self {
        let remaining_volume = projection.remaining_at(elapsed);
        let seconds_to_empty = projection
            .seconds_to_empty()
            .map(|total| (total - elapsed.as_secs_f64()).max(0.0));
        Self {
            remaining_volume,
            seconds_to_empty,
            running: true,
        }
    }

    pub fn is_depleted(&self) -> bool {
        self.running && self.remaining_volume <= 0.0
    }
}

pub struct CountdownTicker {
    sender: watch::Sender<CountdownState>,
    /// Generation of the run currently allowed to publish. `render` and
    /// `stop` bump it, which retires any frame a superseded run still has
    /// in flight (abort alone only lands at the task's next await).
    live_generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CountdownTicker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(CountdownState::idle());
        Self {
            sender,
            live_generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CountdownState> {
        self.sender.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Anchors a fresh projection and starts ticking once per second. Any
    /// previous run is aborted first, so at most one task publishes.
    pub fn render(&self, projection: DepletionProjection) {
        self.abort_current();
        let generation = self.live_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let sender = self.sender.clone();
        let live = Arc::clone(&self.live_generation);
        let anchored_at = Instant::now();
        publish_frame(
            &sender,
            &live,
            generation,
            CountdownState::frame(&projection, Duration::ZERO),
        );

        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately and the anchor frame is
            // already published, so skip it.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let state = CountdownState::frame(&projection, anchored_at.elapsed());
                if !publish_frame(&sender, &live, generation, state) || sender.is_closed() {
                    break;
                }
                if state.is_depleted() {
                    debug!("reserve projection ran dry; countdown stops");
                    break;
                }
            }
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    /// Stops ticking and publishes the idle frame. Safe to call twice or
    /// without a running countdown. The generation bump happens first, so
    /// no frame from the stopped run can land after the idle frame.
    pub fn stop(&self) {
        self.live_generation.fetch_add(1, Ordering::SeqCst);
        self.abort_current();
        let _ = self.sender.send(CountdownState::idle());
    }

    fn abort_current(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

/// Writes `state` into the channel only while `generation` is still live.
/// The check runs inside the channel's own send lock, so it decides the
/// same race that a `stop` or newer `render` frame is competing in: once
/// the generation has moved on, the stale frame loses and nothing is
/// published. Returns false when the run is retired.
fn publish_frame(
    sender: &watch::Sender<CountdownState>,
    live: &AtomicU64,
    generation: u64,
    state: CountdownState,
) -> bool {
    sender.send_if_modified(|slot| {
        if live.load(Ordering::SeqCst) != generation {
            return false;
        }
        *slot = state;
        true
    })
}

impl Default for CountdownTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.abort_current();
    }
}
