use shared::{domain::OrderId, error::TransportError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must not be negative")]
    Negative { field: &'static str },
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("unknown line item status id {0}")]
    UnknownStatus(i64),
    #[error("line item {line_item_id} does not belong to order {order_id}")]
    ForeignLineItem { order_id: i64, line_item_id: i64 },
    #[error("payment of {amount} exceeds the amount due ({due})")]
    ExceedsAmountDue { amount: f64, due: f64 },
    #[error("quantity {requested} exceeds the {open} units still open")]
    ExceedsOpenQuantity { requested: i64, open: i64 },
    #[error("another change is still being saved")]
    SaveInProgress,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("order {0} was not found")]
    NotFound(OrderId),
    #[error("unexpected response for {operation}")]
    UnexpectedResponse { operation: &'static str },
}

impl SyncError {
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }
}
