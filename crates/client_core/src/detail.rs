use std::sync::Arc;

use shared::{
    domain::OrderId,
    protocol::{OrderDetail, OrderRequest, OrderResponse},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::SyncError,
    resident::{ResidentSlot, ResidentSnapshot},
    FetchOutcome, Notice, OrderGateway, SyncEvent,
};

pub type DetailSnapshot = ResidentSnapshot<OrderDetail>;

pub struct DetailLoader {
    gateway: Arc<dyn OrderGateway>,
    inner: Mutex<ResidentSlot<OrderDetail>>,
    events: broadcast::Sender<SyncEvent>,
}

impl DetailLoader {
    pub fn new(gateway: Arc<dyn OrderGateway>, events: broadcast::Sender<SyncEvent>) -> Self {
        Self {
            gateway,
            inner: Mutex::new(ResidentSlot::new()),
            events,
        }
    }

    pub async fn load(&self, id: OrderId) -> Result<FetchOutcome, SyncError> {
        let (token, snapshot) = {
            let mut slot = self.inner.lock().await;
            let token = slot.begin(id);
            (token, slot.snapshot())
        };
        self.publish(snapshot);

        let result = self.fetch(id).await;

        let mut slot = self.inner.lock().await;
        let Some(outcome) = slot.commit(token, result) else {
            debug!(order_id = %id, token = %token, "detail: discarding superseded response");
            return Ok(FetchOutcome::Discarded);
        };
        let snapshot = slot.snapshot();
        drop(slot);

        self.publish(snapshot);
        match &outcome {
            Ok(_) => info!(order_id = %id, token = %token, "detail: order applied"),
            Err(err) => {
                warn!(order_id = %id, error = %err, "detail: load failed, cleared resident order");
                let _ = self.events.send(SyncEvent::Notice(Notice::error(format!(
                    "Failed to fetch order details: {err}"
                ))));
            }
        }
        outcome
    }

    /// Reloads `id` only while it is still the selected order.
    pub async fn refresh_if_selected(&self, id: OrderId) -> Result<FetchOutcome, SyncError> {
        if self.selected().await != Some(id) {
            debug!(order_id = %id, "detail: refresh skipped, order no longer selected");
            return Ok(FetchOutcome::Skipped);
        }
        self.load(id).await
    }

    pub async fn clear(&self) {
        let snapshot = {
            let mut slot = self.inner.lock().await;
            slot.clear();
            slot.snapshot()
        };
        self.publish(snapshot);
    }

    pub async fn selected(&self) -> Option<OrderId> {
        self.inner.lock().await.requested()
    }

    /// The resident detail, if it belongs to `id`.
    pub async fn resident_for(&self, id: OrderId) -> Option<OrderDetail> {
        self.inner.lock().await.resident_for(id).cloned()
    }

    pub async fn snapshot(&self) -> DetailSnapshot {
        self.inner.lock().await.snapshot()
    }

    async fn fetch(&self, id: OrderId) -> Result<OrderDetail, SyncError> {
        let request = OrderRequest::OrderById { id };
        let operation = request.operation_name();
        match self.gateway.execute(request).await? {
            OrderResponse::Order(Some(detail)) if detail.id == id => Ok(detail),
            OrderResponse::Order(Some(detail)) => {
                warn!(requested = %id, received = %detail.id, "detail: response for a different order");
                Err(SyncError::UnexpectedResponse { operation })
            }
            OrderResponse::Order(None) => Err(SyncError::NotFound(id)),
            _ => Err(SyncError::UnexpectedResponse { operation }),
        }
    }

    fn publish(&self, snapshot: DetailSnapshot) {
        let _ = self.events.send(SyncEvent::DetailUpdated(snapshot));
    }
}

#[cfg(test)]
#[path = "tests/detail_tests.rs"]
mod tests;
