use std::{collections::HashSet, sync::Arc};

use serde::Serialize;
use shared::{
    domain::OrderId,
    protocol::{OrderRequest, OrderResponse, OrderSummary, Page},
};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::SyncError,
    token::{FetchToken, TokenSource},
    FetchOutcome, Notice, OrderGateway, SyncEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPhase {
    Idle,
    Loading,
    Loaded,
    LoadingMore,
    Error,
}

impl ListPhase {
    pub fn is_fetching(self) -> bool {
        matches!(self, ListPhase::Loading | ListPhase::LoadingMore)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    /// 1-based; zero until the first page has been applied.
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSnapshot {
    pub phase: ListPhase,
    pub items: Vec<OrderSummary>,
    pub pagination: PaginationState,
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct ListState {
    phase: ListPhase,
    items: Vec<OrderSummary>,
    pagination: PaginationState,
    committed_term: String,
    /// Term the resident items were fetched with; appends keep using it.
    resident_term: String,
    pending_reset: Option<String>,
    tokens: TokenSource,
    last_error: Option<SyncError>,
    closed: bool,
}

impl ListState {
    fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            phase: self.phase,
            items: self.items.clone(),
            pagination: self.pagination,
            term: self.committed_term.clone(),
            error: self.last_error.as_ref().map(ToString::to_string),
        }
    }

    fn append_blocker(&self) -> Option<&'static str> {
        if self.closed {
            Some("list closed")
        } else if self.phase.is_fetching() {
            Some("fetch in flight")
        } else if self.pagination.current_page == 0 {
            Some("no page loaded yet")
        } else if !self.pagination.has_more {
            Some("no more pages")
        } else {
            None
        }
    }
}

pub struct ListSynchronizer {
    gateway: Arc<dyn OrderGateway>,
    page_size: u32,
    inner: Mutex<ListState>,
    settled: watch::Sender<FetchToken>,
    events: broadcast::Sender<SyncEvent>,
}

impl ListSynchronizer {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        page_size: u32,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        let page_size = page_size.max(1);
        let (settled, _) = watch::channel(FetchToken::default());
        Self {
            gateway,
            page_size,
            inner: Mutex::new(ListState {
                phase: ListPhase::Idle,
                items: Vec::new(),
                pagination: PaginationState {
                    current_page: 0,
                    per_page: page_size,
                    total: 0,
                    has_more: false,
                },
                committed_term: String::new(),
                resident_term: String::new(),
                pending_reset: None,
                tokens: TokenSource::default(),
                last_error: None,
                closed: false,
            }),
            settled,
            events,
        }
    }

    /// Replaces the list with page 1 of `term`. Resets issued while one is in
    /// flight coalesce onto a single follow-up fetch of the newest term.
    pub async fn reset_and_load(&self, term: impl Into<String>) -> Result<FetchOutcome, SyncError> {
        self.reset(Some(term.into())).await
    }

    /// Reloads page 1 of whatever term is committed when the reset starts.
    pub async fn refresh(&self) -> Result<FetchOutcome, SyncError> {
        self.reset(None).await
    }

    async fn reset(&self, term: Option<String>) -> Result<FetchOutcome, SyncError> {
        let (mut token, mut fetch_term, snapshot) = {
            let mut state = self.inner.lock().await;
            if state.closed {
                return Ok(FetchOutcome::Skipped);
            }
            let term = term.unwrap_or_else(|| state.committed_term.clone());
            let token = state.tokens.mint();
            state.committed_term = term.clone();
            if state.phase == ListPhase::Loading {
                debug!(token = %token, term = %term, "list: queued reset behind in-flight reset");
                state.pending_reset = Some(term);
                drop(state);
                return self.wait_for_settled(token).await;
            }
            state.phase = ListPhase::Loading;
            (token, term, state.snapshot())
        };
        self.publish(snapshot);

        loop {
            let result = self.fetch_page(1, &fetch_term).await;

            let mut state = self.inner.lock().await;
            if !state.tokens.is_current(token) {
                match state.pending_reset.take() {
                    Some(next_term) => {
                        debug!(
                            stale = %token,
                            token = %state.tokens.latest(),
                            term = %next_term,
                            "list: reset superseded, fetching newest term"
                        );
                        token = state.tokens.latest();
                        fetch_term = next_term;
                        continue;
                    }
                    None => {
                        debug!(token = %token, "list: discarding reset after close");
                        return Ok(FetchOutcome::Discarded);
                    }
                }
            }

            let outcome = match result {
                Ok(page) => {
                    state.items = page.items;
                    state.pagination = PaginationState {
                        current_page: 1,
                        per_page: self.per_page_or_default(page.page_info.per_page),
                        total: page.page_info.total,
                        has_more: page.page_info.has_more_pages,
                    };
                    state.resident_term = fetch_term.clone();
                    state.phase = ListPhase::Loaded;
                    state.last_error = None;
                    info!(
                        token = %token,
                        term = %fetch_term,
                        items = state.items.len(),
                        total = state.pagination.total,
                        has_more = state.pagination.has_more,
                        "list: first page applied"
                    );
                    Ok(FetchOutcome::Applied)
                }
                Err(err) => {
                    warn!(token = %token, term = %fetch_term, error = %err, "list: reset failed, keeping previous list");
                    state.phase = ListPhase::Error;
                    state.last_error = Some(err.clone());
                    Err(err)
                }
            };
            let snapshot = state.snapshot();
            drop(state);

            self.settled.send_replace(token);
            self.publish(snapshot);
            if let Err(err) = &outcome {
                self.notify_failure("Failed to load orders", err);
            }
            return outcome;
        }
    }

    pub async fn load_next(&self) -> Result<FetchOutcome, SyncError> {
        let (token, page, term, snapshot) = {
            let mut state = self.inner.lock().await;
            if let Some(reason) = state.append_blocker() {
                debug!(reason, "list: load_next skipped");
                return Ok(FetchOutcome::Skipped);
            }
            let token = state.tokens.mint();
            state.phase = ListPhase::LoadingMore;
            (
                token,
                state.pagination.current_page + 1,
                state.resident_term.clone(),
                state.snapshot(),
            )
        };
        self.publish(snapshot);

        let result = self.fetch_page(page, &term).await;

        let mut state = self.inner.lock().await;
        if !state.tokens.is_current(token) {
            debug!(token = %token, page, "list: discarding superseded page");
            return Ok(FetchOutcome::Discarded);
        }

        let outcome = match result {
            Ok(fetched) => {
                let received = fetched.items.len();
                let mut seen: HashSet<OrderId> = state.items.iter().map(|order| order.id).collect();
                let fresh: Vec<OrderSummary> = fetched
                    .items
                    .into_iter()
                    .filter(|order| seen.insert(order.id))
                    .collect();
                if fresh.len() < received {
                    debug!(
                        page,
                        dropped = received - fresh.len(),
                        "list: dropped orders already resident"
                    );
                }
                state.items.extend(fresh);
                state.pagination = PaginationState {
                    current_page: page,
                    per_page: self.per_page_or_default(fetched.page_info.per_page),
                    total: fetched.page_info.total,
                    has_more: fetched.page_info.has_more_pages,
                };
                state.phase = ListPhase::Loaded;
                state.last_error = None;
                info!(
                    token = %token,
                    page,
                    items = state.items.len(),
                    has_more = state.pagination.has_more,
                    "list: page appended"
                );
                Ok(FetchOutcome::Applied)
            }
            Err(err) => {
                warn!(token = %token, page, error = %err, "list: append failed");
                state.phase = ListPhase::Error;
                state.last_error = Some(err.clone());
                Err(err)
            }
        };
        let snapshot = state.snapshot();
        drop(state);

        self.publish(snapshot);
        if let Err(err) = &outcome {
            self.notify_failure("Failed to load more orders", err);
        }
        outcome
    }

    pub async fn can_load_more(&self) -> bool {
        self.inner.lock().await.append_blocker().is_none()
    }

    pub async fn committed_term(&self) -> String {
        self.inner.lock().await.committed_term.clone()
    }

    pub async fn snapshot(&self) -> ListSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Stops accepting triggers; responses still in flight are discarded.
    pub async fn close(&self) {
        let (token, snapshot) = {
            let mut state = self.inner.lock().await;
            state.closed = true;
            state.pending_reset = None;
            let abandoned = state.phase.is_fetching();
            if abandoned {
                state.phase = if state.pagination.current_page == 0 {
                    ListPhase::Idle
                } else {
                    ListPhase::Loaded
                };
            }
            (state.tokens.mint(), abandoned.then(|| state.snapshot()))
        };
        self.settled.send_replace(token);
        if let Some(snapshot) = snapshot {
            self.publish(snapshot);
        }
        debug!(token = %token, "list: closed");
    }

    async fn wait_for_settled(&self, token: FetchToken) -> Result<FetchOutcome, SyncError> {
        let mut settled = self.settled.subscribe();
        let reached = settled.wait_for(|latest| *latest >= token).await.is_ok();
        if !reached {
            return Ok(FetchOutcome::Discarded);
        }
        let state = self.inner.lock().await;
        if state.closed {
            return Ok(FetchOutcome::Discarded);
        }
        match (&state.phase, &state.last_error) {
            (ListPhase::Error, Some(err)) => Err(err.clone()),
            _ => Ok(FetchOutcome::Applied),
        }
    }

    async fn fetch_page(&self, page: u32, term: &str) -> Result<Page<OrderSummary>, SyncError> {
        let request = OrderRequest::ListOrders {
            page,
            per_page: self.page_size,
            search: (!term.is_empty()).then(|| term.to_string()),
        };
        let operation = request.operation_name();
        match self.gateway.execute(request).await? {
            OrderResponse::OrderPage(page) => Ok(page),
            _ => Err(SyncError::UnexpectedResponse { operation }),
        }
    }

    fn per_page_or_default(&self, per_page: u32) -> u32 {
        if per_page == 0 {
            self.page_size
        } else {
            per_page
        }
    }

    fn publish(&self, snapshot: ListSnapshot) {
        let _ = self.events.send(SyncEvent::ListUpdated(snapshot));
    }

    fn notify_failure(&self, context: &str, err: &SyncError) {
        let _ = self
            .events
            .send(SyncEvent::Notice(Notice::error(format!("{context}: {err}"))));
    }
}

#[cfg(test)]
#[path = "tests/list_sync_tests.rs"]
mod tests;
