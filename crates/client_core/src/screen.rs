use std::sync::Arc;

use shared::{domain::OrderId, protocol::PaymentMode};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    debounce::SearchDebouncer,
    detail::DetailLoader,
    error::SyncError,
    list_sync::ListSynchronizer,
    mutation::MutationCoordinator,
    payments::{fetch_payment_modes, PaymentHistoryLoader},
    viewport::{NearEndSensor, ViewportTrigger},
    FetchOutcome, OrderGateway, SyncEvent, SyncOptions,
};

const EVENT_CAPACITY: usize = 256;

/// Must be opened inside a tokio runtime.
pub struct OrderScreen {
    gateway: Arc<dyn OrderGateway>,
    list: Arc<ListSynchronizer>,
    detail: Arc<DetailLoader>,
    payments: Arc<PaymentHistoryLoader>,
    mutations: MutationCoordinator,
    search: SearchDebouncer,
    viewport: Arc<ViewportTrigger>,
    events: broadcast::Sender<SyncEvent>,
    pumps: Vec<JoinHandle<()>>,
}

impl OrderScreen {
    pub fn open(
        gateway: Arc<dyn OrderGateway>,
        sensor: Arc<dyn NearEndSensor>,
        options: SyncOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let list = Arc::new(ListSynchronizer::new(
            Arc::clone(&gateway),
            options.page_size,
            events.clone(),
        ));
        let detail = Arc::new(DetailLoader::new(Arc::clone(&gateway), events.clone()));
        let payments = Arc::new(PaymentHistoryLoader::new(
            Arc::clone(&gateway),
            options.payment_history_page_size,
            events.clone(),
        ));
        let mutations = MutationCoordinator::new(
            Arc::clone(&gateway),
            Arc::clone(&list),
            Arc::clone(&detail),
            Arc::clone(&payments),
            events.clone(),
        );
        let viewport = Arc::new(ViewportTrigger::new(sensor, Arc::clone(&list)));
        let (search, committed) = SearchDebouncer::spawn(options.search_quiet_period);

        let pumps = vec![
            tokio::spawn(reset_on_committed_terms(Arc::clone(&list), committed)),
            tokio::spawn(rebind_on_list_updates(
                Arc::clone(&viewport),
                events.subscribe(),
            )),
        ];

        Arc::new(Self {
            gateway,
            list,
            detail,
            payments,
            mutations,
            search,
            viewport,
            events,
            pumps,
        })
    }

    pub async fn start(&self) -> Result<FetchOutcome, SyncError> {
        self.list.refresh().await
    }

    pub fn type_search(&self, raw: &str) {
        self.search.input(raw);
    }

    pub async fn load_more(&self) -> Result<FetchOutcome, SyncError> {
        self.list.load_next().await
    }

    pub async fn select_order(&self, id: OrderId) -> Result<FetchOutcome, SyncError> {
        let (detail, _payments) = tokio::join!(self.detail.load(id), self.payments.load(id));
        detail
    }

    pub async fn close_detail(&self) {
        tokio::join!(self.detail.clear(), self.payments.clear());
    }

    pub async fn payment_modes(&self) -> Result<Vec<PaymentMode>, SyncError> {
        fetch_payment_modes(self.gateway.as_ref()).await
    }

    pub fn list(&self) -> &ListSynchronizer {
        &self.list
    }

    pub fn detail(&self) -> &DetailLoader {
        &self.detail
    }

    pub fn payments(&self) -> &PaymentHistoryLoader {
        &self.payments
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    pub fn viewport(&self) -> &ViewportTrigger {
        &self.viewport
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Stops every trigger source. Calls already in flight are not aborted;
    /// their responses are discarded when they land.
    pub async fn teardown(&self) {
        self.viewport.teardown().await;
        self.search.shutdown();
        for pump in &self.pumps {
            pump.abort();
        }
        self.list.close().await;
        self.close_detail().await;
        info!("orders: screen torn down");
    }
}

impl Drop for OrderScreen {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

async fn reset_on_committed_terms(
    list: Arc<ListSynchronizer>,
    mut committed: mpsc::UnboundedReceiver<String>,
) {
    while let Some(term) = committed.recv().await {
        debug!(term = %term, "search: committed");
        let list = Arc::clone(&list);
        tokio::spawn(async move {
            let _ = list.reset_and_load(term).await;
        });
    }
}

async fn rebind_on_list_updates(
    viewport: Arc<ViewportTrigger>,
    mut events: broadcast::Receiver<SyncEvent>,
) {
    let mut was_fetching = false;
    loop {
        match events.recv().await {
            Ok(SyncEvent::ListUpdated(snapshot)) => {
                let fetching = snapshot.phase.is_fetching();
                let rebound = viewport.bind(snapshot.items.last().map(|order| order.id)).await;
                if !rebound && was_fetching && !fetching {
                    viewport.rearm().await;
                }
                was_fetching = fetching;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "viewport: lagged behind list updates");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[path = "tests/screen_tests.rs"]
mod tests;
