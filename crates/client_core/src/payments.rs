use std::sync::Arc;

use shared::{
    domain::OrderId,
    protocol::{OrderRequest, OrderResponse, Page, PaymentMode, PaymentRecord},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::{
    error::SyncError,
    resident::{ResidentSlot, ResidentSnapshot},
    FetchOutcome, Notice, OrderGateway, SyncEvent,
};

pub type PaymentSnapshot = ResidentSnapshot<Page<PaymentRecord>>;

pub struct PaymentHistoryLoader {
    gateway: Arc<dyn OrderGateway>,
    page_size: u32,
    inner: Mutex<ResidentSlot<Page<PaymentRecord>>>,
    events: broadcast::Sender<SyncEvent>,
}

impl PaymentHistoryLoader {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        page_size: u32,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            gateway,
            page_size: page_size.max(1),
            inner: Mutex::new(ResidentSlot::new()),
            events,
        }
    }

    pub async fn load(&self, order_id: OrderId) -> Result<FetchOutcome, SyncError> {
        let (token, snapshot) = {
            let mut slot = self.inner.lock().await;
            let token = slot.begin(order_id);
            (token, slot.snapshot())
        };
        self.publish(snapshot);

        let request = OrderRequest::PaymentHistory {
            order_id,
            page: 1,
            per_page: self.page_size,
        };
        let operation = request.operation_name();
        let result = match self.gateway.execute(request).await {
            Ok(OrderResponse::PaymentPage(page)) => Ok(page),
            Ok(_) => Err(SyncError::UnexpectedResponse { operation }),
            Err(err) => Err(err.into()),
        };

        let mut slot = self.inner.lock().await;
        let Some(outcome) = slot.commit(token, result) else {
            debug!(order_id = %order_id, token = %token, "payments: discarding superseded response");
            return Ok(FetchOutcome::Discarded);
        };
        let snapshot = slot.snapshot();
        drop(slot);

        self.publish(snapshot);
        if let Err(err) = &outcome {
            warn!(order_id = %order_id, error = %err, "payments: history load failed");
            let _ = self.events.send(SyncEvent::Notice(Notice::error(format!(
                "Failed to load payment history: {err}"
            ))));
        }
        outcome
    }

    pub async fn refresh_if_selected(&self, order_id: OrderId) -> Result<FetchOutcome, SyncError> {
        if self.inner.lock().await.requested() != Some(order_id) {
            return Ok(FetchOutcome::Skipped);
        }
        self.load(order_id).await
    }

    pub async fn clear(&self) {
        let snapshot = {
            let mut slot = self.inner.lock().await;
            slot.clear();
            slot.snapshot()
        };
        self.publish(snapshot);
    }

    pub async fn snapshot(&self) -> PaymentSnapshot {
        self.inner.lock().await.snapshot()
    }

    fn publish(&self, snapshot: PaymentSnapshot) {
        let _ = self.events.send(SyncEvent::PaymentsUpdated(snapshot));
    }
}

pub async fn fetch_payment_modes(gateway: &dyn OrderGateway) -> Result<Vec<PaymentMode>, SyncError> {
    let request = OrderRequest::PaymentModes;
    let operation = request.operation_name();
    match gateway.execute(request).await? {
        OrderResponse::PaymentModes(modes) => Ok(modes),
        _ => Err(SyncError::UnexpectedResponse { operation }),
    }
}

#[cfg(test)]
#[path = "tests/payments_tests.rs"]
mod tests;
