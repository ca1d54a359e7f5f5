use std::{
    ops::Range,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    domain::{
        CustomerId, CustomerRef, LineItemId, MaterialId, MaterialRef, OrderId, PaymentId,
        PaymentModeId, StatusId, StatusRef,
    },
    error::TransportError,
    protocol::{
        LineItem, OrderDetail, OrderRequest, OrderResponse, OrderSummary, Page, PageInfo,
        PaymentMode, PaymentRecord,
    },
};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    viewport::{NearEndCallback, NearEndSensor, NearEndSignal},
    OrderGateway, SyncEvent,
};

pub(crate) type Reply = Result<OrderResponse, TransportError>;

pub(crate) struct PendingCall {
    pub(crate) request: OrderRequest,
    reply: oneshot::Sender<Reply>,
}

impl PendingCall {
    pub(crate) fn respond(self, reply: Reply) {
        let _ = self.reply.send(reply);
    }
}

/// Gateway whose calls are handed to the test, which answers them in any order.
pub(crate) struct ScriptedGateway {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> (Arc<Self>, CallQueue) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { calls }), CallQueue { rx })
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn execute(&self, request: OrderRequest) -> Result<OrderResponse, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(PendingCall { request, reply })
            .map_err(|_| TransportError::unavailable("script finished"))?;
        rx.await
            .unwrap_or_else(|_| Err(TransportError::unavailable("call dropped by script")))
    }
}

pub(crate) struct CallQueue {
    rx: mpsc::UnboundedReceiver<PendingCall>,
}

impl CallQueue {
    pub(crate) async fn next(&mut self) -> PendingCall {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a gateway call")
            .expect("gateway dropped")
    }

    /// Answers the next call and returns what was asked.
    pub(crate) async fn answer(&mut self, reply: Reply) -> OrderRequest {
        let call = self.next().await;
        let request = call.request.clone();
        call.respond(reply);
        request
    }

    /// Lets spawned tasks run, then checks nothing reached the gateway.
    pub(crate) async fn assert_idle(&mut self) {
        settle().await;
        if let Ok(call) = self.rx.try_recv() {
            panic!("unexpected gateway call: {:?}", call.request);
        }
    }
}

pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub(crate) fn event_bus() -> broadcast::Sender<SyncEvent> {
    broadcast::channel(256).0
}

pub(crate) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn customer(id: i64) -> CustomerRef {
    CustomerRef {
        id: CustomerId(id),
        name: format!("Customer {id}"),
        site_code: Some(101),
    }
}

pub(crate) fn status(id: i64, name: &str) -> StatusRef {
    StatusRef {
        id: StatusId(id),
        name: name.to_string(),
    }
}

pub(crate) fn summary(id: i64) -> OrderSummary {
    OrderSummary {
        id: OrderId(id),
        customer: customer(id),
        document_no: format!("SO-{id:04}"),
        order_date: date(2024, 4, 1),
        ordered_amount: 500.0,
        paid_amount: 0.0,
        due_amount: 500.0,
        ordered_qty: 2,
        delivered_qty: 0,
        cancelled_qty: 0,
        tentative_delivery_date: Some(date(2024, 4, 20)),
        delivery_date: None,
        note: None,
        status: Some(status(1, "Pending")),
    }
}

pub(crate) fn order_page(ids: Range<i64>, current_page: u32, total: u64, has_more: bool) -> Reply {
    page_of(ids.map(summary).collect(), current_page, total, has_more)
}

pub(crate) fn page_of(
    items: Vec<OrderSummary>,
    current_page: u32,
    total: u64,
    has_more: bool,
) -> Reply {
    Ok(OrderResponse::OrderPage(Page {
        items,
        page_info: PageInfo {
            current_page,
            per_page: 20,
            total,
            has_more_pages: has_more,
        },
    }))
}

pub(crate) fn line_item(order_id: i64, id: i64) -> LineItem {
    LineItem {
        id: LineItemId(id),
        order_id: OrderId(order_id),
        measurement_id: None,
        material: Some(MaterialRef {
            id: MaterialId(7),
            name: "Kurta".to_string(),
        }),
        image_urls: Vec::new(),
        trial_date: Some(date(2024, 4, 10)),
        delivery_date: Some(date(2024, 4, 20)),
        item_amount: 250.0,
        ordered_qty: 1,
        delivered_qty: 0,
        cancelled_qty: 0,
        note: None,
        item_ref: Some(format!("REF-{id}")),
        status: Some(status(1, "Pending")),
        assigned_sites: vec!["Main workshop".to_string()],
    }
}

pub(crate) fn detail(id: i64) -> OrderDetail {
    OrderDetail {
        id: OrderId(id),
        customer: customer(id),
        document_no: format!("SO-{id:04}"),
        order_date: date(2024, 4, 1),
        ordered_amount: 500.0,
        paid_amount: 0.0,
        due_amount: 500.0,
        ordered_qty: 2,
        delivered_qty: 0,
        cancelled_qty: 0,
        tentative_delivery_date: Some(date(2024, 4, 20)),
        delivery_date: None,
        note: None,
        status: Some(status(1, "Pending")),
        line_items: vec![line_item(id, id * 10 + 1), line_item(id, id * 10 + 2)],
    }
}

pub(crate) fn detail_reply(detail: OrderDetail) -> Reply {
    Ok(OrderResponse::Order(Some(detail)))
}

pub(crate) fn payment_page(order_id: i64, amounts: &[f64]) -> Reply {
    let items = amounts
        .iter()
        .enumerate()
        .map(|(index, amount)| PaymentRecord {
            id: PaymentId(order_id * 100 + index as i64),
            document_no: format!("RCPT-{order_id}-{index}"),
            payment_date: date(2024, 4, 5),
            amount: *amount,
            reference: None,
            mode: Some(PaymentMode {
                id: PaymentModeId(1),
                name: "Cash".to_string(),
            }),
        })
        .collect::<Vec<_>>();
    let total = items.len() as u64;
    Ok(OrderResponse::PaymentPage(Page {
        items,
        page_info: PageInfo {
            current_page: 1,
            per_page: 20,
            total,
            has_more_pages: false,
        },
    }))
}

pub(crate) fn ack(id: impl Into<String>) -> Reply {
    Ok(OrderResponse::MutationAck { id: id.into() })
}

pub(crate) fn transport_failure(message: &str) -> Reply {
    Err(TransportError::internal(message))
}

/// Sensor the test drives by hand.
#[derive(Default)]
pub(crate) struct FakeSensor {
    callback: std::sync::Mutex<Option<NearEndCallback>>,
    started: std::sync::Mutex<Vec<OrderId>>,
    stops: AtomicUsize,
}

impl FakeSensor {
    pub(crate) fn fire(&self, anchor: i64, visible: bool) {
        let callback = self.callback.lock().expect("sensor lock").clone();
        if let Some(callback) = callback {
            callback(NearEndSignal {
                anchor: OrderId(anchor),
                visible,
            });
        }
    }

    pub(crate) fn started(&self) -> Vec<OrderId> {
        self.started.lock().expect("sensor lock").clone()
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl NearEndSensor for FakeSensor {
    fn on_near_end(&self, callback: NearEndCallback) {
        *self.callback.lock().expect("sensor lock") = Some(callback);
    }

    fn start(&self, anchor: OrderId) {
        self.started.lock().expect("sensor lock").push(anchor);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
