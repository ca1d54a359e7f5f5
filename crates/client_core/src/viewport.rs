use std::sync::Arc;

use shared::domain::OrderId;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{list_sync::ListSynchronizer, FetchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearEndSignal {
    pub anchor: OrderId,
    /// `true` when the anchor enters the near-end zone, `false` when it leaves.
    pub visible: bool,
}

pub type NearEndCallback = Arc<dyn Fn(NearEndSignal) + Send + Sync>;

pub trait NearEndSensor: Send + Sync {
    fn on_near_end(&self, callback: NearEndCallback);
    fn start(&self, anchor: OrderId);
    fn stop(&self);
}

/// Sensor for surfaces without a scrolling viewport. Never fires.
pub struct DetachedSensor;

impl NearEndSensor for DetachedSensor {
    fn on_near_end(&self, _callback: NearEndCallback) {}

    fn start(&self, _anchor: OrderId) {}

    fn stop(&self) {}
}

struct TriggerState {
    anchor: Option<OrderId>,
    armed: bool,
    stopped: bool,
}

pub struct ViewportTrigger {
    sensor: Arc<dyn NearEndSensor>,
    state: Arc<Mutex<TriggerState>>,
    task: JoinHandle<()>,
}

impl ViewportTrigger {
    pub fn new(sensor: Arc<dyn NearEndSensor>, list: Arc<ListSynchronizer>) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        sensor.on_near_end(Arc::new(move |signal| {
            let _ = signals_tx.send(signal);
        }));
        let state = Arc::new(Mutex::new(TriggerState {
            anchor: None,
            armed: false,
            stopped: false,
        }));
        let task = tokio::spawn(run_trigger(list, Arc::clone(&state), signals_rx));
        Self {
            sensor,
            state,
            task,
        }
    }

    /// Points the sensor at a new last element and re-arms. Returns `false`
    /// when `anchor` is already bound, which leaves the trigger untouched.
    pub async fn bind(&self, anchor: Option<OrderId>) -> bool {
        let mut state = self.state.lock().await;
        if state.stopped || state.anchor == anchor {
            return false;
        }
        self.sensor.stop();
        if let Some(anchor) = anchor {
            self.sensor.start(anchor);
        }
        debug!(previous = ?state.anchor, anchor = ?anchor, "viewport: rebound");
        state.anchor = anchor;
        state.armed = anchor.is_some();
        true
    }

    /// Restarts the sensor on the current anchor so it reports afresh.
    pub async fn rearm(&self) {
        let mut state = self.state.lock().await;
        if state.stopped {
            return;
        }
        let Some(anchor) = state.anchor else {
            return;
        };
        self.sensor.stop();
        self.sensor.start(anchor);
        state.armed = true;
        debug!(anchor = %anchor, "viewport: re-armed");
    }

    pub async fn bound_anchor(&self) -> Option<OrderId> {
        self.state.lock().await.anchor
    }

    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        state.stopped = true;
        state.anchor = None;
        self.sensor.stop();
        self.task.abort();
    }
}

impl Drop for ViewportTrigger {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_trigger(
    list: Arc<ListSynchronizer>,
    state: Arc<Mutex<TriggerState>>,
    mut signals: mpsc::UnboundedReceiver<NearEndSignal>,
) {
    while let Some(signal) = signals.recv().await {
        {
            let mut state = state.lock().await;
            if state.stopped {
                break;
            }
            if state.anchor != Some(signal.anchor) {
                debug!(anchor = %signal.anchor, "viewport: signal for unbound anchor ignored");
                continue;
            }
            if !signal.visible {
                state.armed = true;
                continue;
            }
            if !state.armed {
                continue;
            }
            state.armed = false;
        }

        match list.load_next().await {
            Ok(FetchOutcome::Skipped) => {
                debug!(anchor = %signal.anchor, "viewport: crossing ignored, staying armed");
                let mut state = state.lock().await;
                if state.anchor == Some(signal.anchor) {
                    state.armed = true;
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(anchor = %signal.anchor, error = %err, "viewport: next page failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/viewport_tests.rs"]
mod tests;
