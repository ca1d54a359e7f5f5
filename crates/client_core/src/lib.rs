use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use shared::{
    error::TransportError,
    protocol::{OrderRequest, OrderResponse},
};

pub mod debounce;
pub mod detail;
pub mod error;
pub mod list_sync;
pub mod mutation;
pub mod payments;
mod resident;
mod screen;
mod token;
pub mod viewport;

pub use detail::{DetailLoader, DetailSnapshot};
pub use error::{SyncError, ValidationError};
pub use list_sync::{ListPhase, ListSnapshot, ListSynchronizer, PaginationState};
pub use mutation::{MutationCoordinator, MutationKind, MutationReport};
pub use payments::{PaymentHistoryLoader, PaymentSnapshot};
pub use resident::{ResidentPhase, ResidentSnapshot};
pub use screen::OrderScreen;
pub use token::FetchToken;
pub use viewport::{DetachedSensor, NearEndCallback, NearEndSensor, NearEndSignal, ViewportTrigger};

#[cfg(test)]
mod testing;

const DEFAULT_PAGE_SIZE: u32 = 20;
const DEFAULT_SEARCH_QUIET_PERIOD: Duration = Duration::from_millis(1000);
const DEFAULT_PAYMENT_HISTORY_PAGE_SIZE: u32 = 20;

/// Executes one operation against the order backend.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn execute(&self, request: OrderRequest) -> Result<OrderResponse, TransportError>;
}

pub struct UnavailableGateway;

#[async_trait]
impl OrderGateway for UnavailableGateway {
    async fn execute(&self, request: OrderRequest) -> Result<OrderResponse, TransportError> {
        Err(TransportError::unavailable(format!(
            "order gateway is unavailable for {}",
            request.operation_name()
        )))
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: u32,
    pub search_quiet_period: Duration,
    pub payment_history_page_size: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            search_quiet_period: DEFAULT_SEARCH_QUIET_PERIOD,
            payment_history_page_size: DEFAULT_PAYMENT_HISTORY_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Applied,
    /// Nothing was requested (guard declined the trigger).
    Skipped,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    ListUpdated(ListSnapshot),
    DetailUpdated(DetailSnapshot),
    PaymentsUpdated(PaymentSnapshot),
    SavingChanged(bool),
    Notice(Notice),
}
