use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::Serialize;
use shared::{
    domain::{LineItemId, LineItemStatus, OrderId, StatusId},
    protocol::{LineItemUpdate, OrderRequest, OrderResponse, PaymentInput, QuantityInput, StatusUpdate},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    detail::DetailLoader,
    error::{SyncError, ValidationError},
    list_sync::ListSynchronizer,
    payments::PaymentHistoryLoader,
    FetchOutcome, Notice, OrderGateway, SyncEvent,
};

/// Tolerance for comparing currency amounts.
const AMOUNT_EPSILON: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    LineItemEdit,
    StatusChange,
    PaymentCapture,
    MarkDelivered,
    MarkCancelled,
}

impl MutationKind {
    fn success_message(self) -> &'static str {
        match self {
            MutationKind::LineItemEdit => "Order details updated successfully",
            MutationKind::StatusChange => "Item status updated",
            MutationKind::PaymentCapture => "Payment recorded",
            MutationKind::MarkDelivered => "Delivery recorded",
            MutationKind::MarkCancelled => "Cancellation recorded",
        }
    }

    fn failure_context(self) -> &'static str {
        match self {
            MutationKind::LineItemEdit => "Failed to update order details",
            MutationKind::StatusChange => "Failed to update item status",
            MutationKind::PaymentCapture => "Failed to record payment",
            MutationKind::MarkDelivered => "Failed to record delivery",
            MutationKind::MarkCancelled => "Failed to record cancellation",
        }
    }
}

/// Outcome of a confirmed mutation and of each refresh it triggered.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationReport {
    pub kind: MutationKind,
    pub order_id: OrderId,
    pub acknowledged_id: String,
    pub detail_refresh: Result<FetchOutcome, SyncError>,
    pub list_refresh: Result<FetchOutcome, SyncError>,
    pub payments_refresh: Option<Result<FetchOutcome, SyncError>>,
}

impl MutationReport {
    pub fn fully_refreshed(&self) -> bool {
        self.detail_refresh.is_ok()
            && self.list_refresh.is_ok()
            && self.payments_refresh.as_ref().map_or(true, Result::is_ok)
    }
}

pub struct MutationCoordinator {
    gateway: Arc<dyn OrderGateway>,
    list: Arc<ListSynchronizer>,
    detail: Arc<DetailLoader>,
    payments: Arc<PaymentHistoryLoader>,
    saving: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

struct SavingGuard<'a> {
    saving: &'a AtomicBool,
    events: &'a broadcast::Sender<SyncEvent>,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.saving.store(false, Ordering::Release);
        let _ = self.events.send(SyncEvent::SavingChanged(false));
    }
}

impl MutationCoordinator {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        list: Arc<ListSynchronizer>,
        detail: Arc<DetailLoader>,
        payments: Arc<PaymentHistoryLoader>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            gateway,
            list,
            detail,
            payments,
            saving: AtomicBool::new(false),
            events,
        }
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    pub async fn edit_line_item(
        &self,
        order_id: OrderId,
        line_item_id: LineItemId,
        update: LineItemUpdate,
    ) -> Result<MutationReport, SyncError> {
        let kind = MutationKind::LineItemEdit;
        self.reject_invalid(kind, self.check_edit(order_id, line_item_id, &update).await)?;

        self.commit(
            order_id,
            kind,
            OrderRequest::UpdateLineItem {
                id: line_item_id,
                input: update,
            },
        )
        .await
    }

    pub async fn update_line_item_status(
        &self,
        order_id: OrderId,
        line_item_id: LineItemId,
        status_id: StatusId,
    ) -> Result<MutationReport, SyncError> {
        let kind = MutationKind::StatusChange;
        let status =
            self.reject_invalid(kind, self.check_status(order_id, line_item_id, status_id).await)?;

        self.commit(
            order_id,
            kind,
            OrderRequest::UpdateLineItemStatus {
                id: line_item_id,
                input: StatusUpdate {
                    status_id: status.status_id(),
                },
            },
        )
        .await
    }

    pub async fn capture_payment(
        &self,
        order_id: OrderId,
        payment: PaymentInput,
    ) -> Result<MutationReport, SyncError> {
        let kind = MutationKind::PaymentCapture;
        self.reject_invalid(kind, self.check_payment(order_id, &payment).await)?;

        self.commit(
            order_id,
            kind,
            OrderRequest::CapturePayment {
                id: order_id,
                input: payment,
            },
        )
        .await
    }

    pub async fn mark_delivered(&self, order_id: OrderId, qty: i64) -> Result<MutationReport, SyncError> {
        self.adjust_quantity(order_id, qty, MutationKind::MarkDelivered).await
    }

    pub async fn mark_cancelled(&self, order_id: OrderId, qty: i64) -> Result<MutationReport, SyncError> {
        self.adjust_quantity(order_id, qty, MutationKind::MarkCancelled).await
    }

    async fn adjust_quantity(
        &self,
        order_id: OrderId,
        qty: i64,
        kind: MutationKind,
    ) -> Result<MutationReport, SyncError> {
        self.reject_invalid(kind, self.check_quantity(order_id, qty).await)?;

        let input = QuantityInput { qty };
        let request = match kind {
            MutationKind::MarkCancelled => OrderRequest::MarkCancelled { id: order_id, input },
            _ => OrderRequest::MarkDelivered { id: order_id, input },
        };
        self.commit(order_id, kind, request).await
    }

    async fn check_edit(
        &self,
        order_id: OrderId,
        line_item_id: LineItemId,
        update: &LineItemUpdate,
    ) -> Result<(), ValidationError> {
        validate_line_item_update(order_id, line_item_id, update)?;
        self.ensure_line_item_of(order_id, line_item_id).await
    }

    async fn check_status(
        &self,
        order_id: OrderId,
        line_item_id: LineItemId,
        status_id: StatusId,
    ) -> Result<LineItemStatus, ValidationError> {
        let status = LineItemStatus::from_status_id(status_id)
            .ok_or(ValidationError::UnknownStatus(status_id.0))?;
        self.ensure_line_item_of(order_id, line_item_id).await?;
        Ok(status)
    }

    async fn check_payment(
        &self,
        order_id: OrderId,
        payment: &PaymentInput,
    ) -> Result<(), ValidationError> {
        validate_payment(payment)?;
        if let Some(detail) = self.detail.resident_for(order_id).await {
            if payment.amount > detail.due_amount + AMOUNT_EPSILON {
                return Err(ValidationError::ExceedsAmountDue {
                    amount: payment.amount,
                    due: detail.due_amount,
                });
            }
        }
        Ok(())
    }

    async fn check_quantity(&self, order_id: OrderId, qty: i64) -> Result<(), ValidationError> {
        if qty <= 0 {
            return Err(ValidationError::NotPositive { field: "quantity" });
        }
        if let Some(detail) = self.detail.resident_for(order_id).await {
            let open = detail.open_qty();
            if qty > open {
                return Err(ValidationError::ExceedsOpenQuantity {
                    requested: qty,
                    open,
                });
            }
        }
        Ok(())
    }

    /// Line items can only be checked against a resident detail of the same order.
    async fn ensure_line_item_of(
        &self,
        order_id: OrderId,
        line_item_id: LineItemId,
    ) -> Result<(), ValidationError> {
        match self.detail.resident_for(order_id).await {
            Some(detail) if detail.line_item(line_item_id).is_none() => {
                Err(ValidationError::ForeignLineItem {
                    order_id: order_id.0,
                    line_item_id: line_item_id.0,
                })
            }
            _ => Ok(()),
        }
    }

    fn reject_invalid<T>(
        &self,
        kind: MutationKind,
        checked: Result<T, ValidationError>,
    ) -> Result<T, SyncError> {
        checked.map_err(|err| {
            let err = SyncError::from(err);
            debug!(kind = ?kind, error = %err, "mutation: rejected before sending");
            self.notify_failure(kind, &err);
            err
        })
    }

    async fn commit(
        &self,
        order_id: OrderId,
        kind: MutationKind,
        request: OrderRequest,
    ) -> Result<MutationReport, SyncError> {
        let _saving = self.reject_invalid(kind, self.claim_saving())?;
        let operation = request.operation_name();

        let acknowledged_id = match self.gateway.execute(request).await {
            Ok(OrderResponse::MutationAck { id }) => id,
            Ok(_) => {
                let err = SyncError::UnexpectedResponse { operation };
                warn!(operation, order_id = %order_id, "mutation: unexpected response");
                self.notify_failure(kind, &err);
                return Err(err);
            }
            Err(err) => {
                let err = SyncError::from(err);
                warn!(operation, order_id = %order_id, error = %err, "mutation: rejected by backend");
                self.notify_failure(kind, &err);
                return Err(err);
            }
        };
        info!(
            operation,
            order_id = %order_id,
            acknowledged_id = %acknowledged_id,
            "mutation: confirmed, refreshing views"
        );
        let _ = self
            .events
            .send(SyncEvent::Notice(Notice::info(kind.success_message())));

        let (detail_refresh, list_refresh, payments_refresh) = tokio::join!(
            self.detail.refresh_if_selected(order_id),
            self.list.refresh(),
            async {
                match kind {
                    MutationKind::PaymentCapture => {
                        Some(self.payments.refresh_if_selected(order_id).await)
                    }
                    _ => None,
                }
            },
        );

        let report = MutationReport {
            kind,
            order_id,
            acknowledged_id,
            detail_refresh,
            list_refresh,
            payments_refresh,
        };
        if !report.fully_refreshed() {
            warn!(order_id = %order_id, kind = ?kind, "mutation: confirmed but a refresh failed");
        }
        Ok(report)
    }

    fn claim_saving(&self) -> Result<SavingGuard<'_>, ValidationError> {
        self.saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ValidationError::SaveInProgress)?;
        let _ = self.events.send(SyncEvent::SavingChanged(true));
        Ok(SavingGuard {
            saving: &self.saving,
            events: &self.events,
        })
    }

    fn notify_failure(&self, kind: MutationKind, err: &SyncError) {
        let _ = self.events.send(SyncEvent::Notice(Notice::error(format!(
            "{}: {err}",
            kind.failure_context()
        ))));
    }
}

fn validate_line_item_update(
    order_id: OrderId,
    line_item_id: LineItemId,
    update: &LineItemUpdate,
) -> Result<(), ValidationError> {
    if update.order_id != order_id {
        return Err(ValidationError::ForeignLineItem {
            order_id: order_id.0,
            line_item_id: line_item_id.0,
        });
    }
    if update.item_amount.is_nan() || update.item_amount < 0.0 {
        return Err(ValidationError::Negative {
            field: "item amount",
        });
    }
    if update.ordered_qty <= 0 {
        return Err(ValidationError::NotPositive {
            field: "ordered quantity",
        });
    }
    if update.material_id.is_none() {
        return Err(ValidationError::Missing { field: "material" });
    }
    Ok(())
}

fn validate_payment(payment: &PaymentInput) -> Result<(), ValidationError> {
    if payment.amount.is_nan() || payment.amount <= 0.0 {
        return Err(ValidationError::NotPositive {
            field: "payment amount",
        });
    }
    if payment.payment_mode_id.is_none() {
        return Err(ValidationError::Missing {
            field: "payment mode",
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
