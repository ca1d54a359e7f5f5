//! `OrderGateway` over the backend's GraphQL endpoint. Ids, amounts and
//! dates arrive loosely typed and are normalized by the wire structs.

use async_trait::async_trait;
use chrono::NaiveDate;
use client_core::OrderGateway;
use reqwest::{Client, StatusCode};
use serde::{
    de::{self, DeserializeOwned},
    Deserialize, Deserializer, Serialize,
};
use serde_json::{json, Value};
use shared::{
    domain::{
        CustomerId, CustomerRef, LineItemId, MaterialId, MaterialRef, MeasurementId, OrderId,
        PaymentId, PaymentModeId, StatusId, StatusRef,
    },
    error::{ErrorCode, TransportError},
    protocol::{
        LineItem, OrderDetail, OrderRequest, OrderResponse, OrderSummary, Page, PageInfo,
        PaymentMode, PaymentRecord,
    },
};
use tracing::{debug, warn};

const LIST_ORDERS: &str = r#"
query OrderMains($first: Int!, $page: Int!, $search: String) {
  orderMains(first: $first, page: $page, search: $search) {
    paginatorInfo { currentPage perPage total hasMorePages }
    data {
      id user_id docno order_date ord_amt amt_paid amt_due ord_qty
      delivered_qty cancelled_qty tentitive_delivery_date delivery_date desc1
      user { id fname admsite_code }
      orderStatus { id status_name }
    }
  }
}"#;

const ORDER_BY_ID: &str = r#"
query OrderMain($id: ID!) {
  orderMain(id: $id) {
    id user_id docno order_date ord_amt amt_paid amt_due ord_qty
    delivered_qty cancelled_qty tentitive_delivery_date delivery_date desc1
    user { id fname admsite_code }
    orderStatus { id status_name }
    orderDetails {
      id order_id measurement_main_id image_url material_master_id
      trial_date delivery_date item_amt ord_qty delivered_qty cancelled_qty
      desc1 item_ref
      orderStatus { id status_name }
      material { id name }
      jobOrderDetails { adminSite { sitename } }
    }
  }
}"#;

const UPDATE_LINE_ITEM: &str = r#"
mutation UpdateOrderDetail($id: ID!, $input: UpdateOrderDetailInput!) {
  updateOrderDetail(id: $id, input: $input) { id }
}"#;

const UPDATE_LINE_ITEM_STATUS: &str = r#"
mutation UpdateSalesOrderStatus($id: ID!, $input: OrderStatusInput!) {
  updateSalesOrderStatus(id: $id, input: $input) { id }
}"#;

const CAPTURE_PAYMENT: &str = r#"
mutation ReceiveOrderPayment($id: ID!, $input: ReceiveOrderPaymentInput!) {
  receiveOrderPayment(id: $id, input: $input) { id }
}"#;

const MARK_DELIVERED: &str = r#"
mutation MarkOrderDelivered($input: MarkOrderDeliveredInput!, $id: ID!) {
  markOrderDelivered(input: $input, id: $id) { id }
}"#;

const MARK_CANCELLED: &str = r#"
mutation MarkOrderCancelled($input: MarkOrderCancelledInput!, $id: ID!) {
  markOrderCancelled(input: $input, id: $id) { id }
}"#;

const PAYMENT_HISTORY: &str = r#"
query GetOrderInfoByOrderId($order_id: ID!, $first: Int!, $page: Int!) {
  getOrderInfoByOrderId(order_id: $order_id, first: $first, page: $page) {
    paginatorInfo { currentPage perPage total hasMorePages }
    data {
      id docno payment_date payment_ref payment_amt
      paymentMode { id mode_name }
    }
  }
}"#;

const PAYMENT_MODES: &str = r#"
query PaymentModes {
  paymentModes { id mode_name }
}"#;

pub struct GraphqlGateway {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
}

impl GraphqlGateway {
    pub fn new(endpoint: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            api_token,
        }
    }

    /// Posts one document and decodes `data.<operation>`.
    async fn run<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: Value,
    ) -> Result<T, TransportError> {
        debug!(operation, endpoint = %self.endpoint, "graphql: request");
        let mut request = self.http.post(&self.endpoint).json(&GraphqlRequest { query, variables });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|err| {
            warn!(operation, error = %err, "graphql: backend unreachable");
            TransportError::unavailable(format!("order backend unreachable: {err}"))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::new(
                ErrorCode::Unauthorized,
                format!("order backend refused credentials ({status})"),
            ));
        }
        let envelope: GraphqlEnvelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TransportError::unavailable(format!(
                    "order backend returned {status}"
                )));
            }
            Err(err) => {
                return Err(TransportError::internal(format!(
                    "undecodable {operation} response: {err}"
                )));
            }
        };

        if let Some(first) = envelope.errors.into_iter().next() {
            warn!(operation, message = %first.message, "graphql: operation failed");
            return Err(first.into_transport_error());
        }
        let mut data = envelope
            .data
            .ok_or_else(|| TransportError::internal(format!("{operation} response carried no data")))?;
        let field = data.get_mut(operation).map(Value::take).unwrap_or(Value::Null);
        serde_json::from_value(field).map_err(|err| {
            TransportError::internal(format!("malformed {operation} response: {err}"))
        })
    }

    async fn acknowledge(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: Value,
    ) -> Result<OrderResponse, TransportError> {
        let ack: WireAck = self.run(operation, query, variables).await?;
        Ok(OrderResponse::MutationAck { id: ack.id })
    }
}

#[async_trait]
impl OrderGateway for GraphqlGateway {
    async fn execute(&self, request: OrderRequest) -> Result<OrderResponse, TransportError> {
        let operation = request.operation_name();
        match request {
            OrderRequest::ListOrders {
                page,
                per_page,
                search,
            } => {
                let page: Paginated<WireOrder> = self
                    .run(
                        operation,
                        LIST_ORDERS,
                        json!({ "first": per_page, "page": page, "search": search }),
                    )
                    .await?;
                Ok(OrderResponse::OrderPage(page.convert(WireOrder::into_summary)))
            }
            OrderRequest::OrderById { id } => {
                let order: Option<WireOrder> = self
                    .run(operation, ORDER_BY_ID, json!({ "id": id.to_string() }))
                    .await?;
                Ok(OrderResponse::Order(order.map(WireOrder::into_detail)))
            }
            OrderRequest::UpdateLineItem { id, input } => {
                let variables = json!({
                    "id": id.to_string(),
                    "input": {
                        "order_id": input.order_id.0,
                        "measurement_main_id": input.measurement_id.map(|m| m.0),
                        "material_master_id": input.material_id.map(|m| m.0),
                        "trial_date": input.trial_date,
                        "delivery_date": input.delivery_date,
                        "item_amt": input.item_amount,
                        "ord_qty": input.ordered_qty,
                        "desc1": input.note,
                        "admsite_code": input.site_code.map(|code| code.to_string()),
                    },
                });
                self.acknowledge(operation, UPDATE_LINE_ITEM, variables).await
            }
            OrderRequest::UpdateLineItemStatus { id, input } => {
                let variables = json!({
                    "id": id.to_string(),
                    "input": { "status_id": input.status_id.0 },
                });
                self.acknowledge(operation, UPDATE_LINE_ITEM_STATUS, variables).await
            }
            OrderRequest::CapturePayment { id, input } => {
                let variables = json!({
                    "id": id.to_string(),
                    "input": {
                        "payment_amt": input.amount,
                        "payment_date": input.payment_date,
                        "payment_mode_id": input.payment_mode_id.map(|m| m.0),
                        "payment_ref": input.reference,
                    },
                });
                self.acknowledge(operation, CAPTURE_PAYMENT, variables).await
            }
            OrderRequest::MarkDelivered { id, input } => {
                let variables = json!({
                    "id": id.to_string(),
                    "input": { "delivered_qty": input.qty },
                });
                self.acknowledge(operation, MARK_DELIVERED, variables).await
            }
            OrderRequest::MarkCancelled { id, input } => {
                let variables = json!({
                    "id": id.to_string(),
                    "input": { "cancelled_qty": input.qty },
                });
                self.acknowledge(operation, MARK_CANCELLED, variables).await
            }
            OrderRequest::PaymentHistory {
                order_id,
                page,
                per_page,
            } => {
                let page: Paginated<WirePayment> = self
                    .run(
                        operation,
                        PAYMENT_HISTORY,
                        json!({ "order_id": order_id.to_string(), "first": per_page, "page": page }),
                    )
                    .await?;
                Ok(OrderResponse::PaymentPage(page.convert(WirePayment::into_record)))
            }
            OrderRequest::PaymentModes => {
                let modes: Option<Vec<WireMode>> =
                    self.run(operation, PAYMENT_MODES, json!({})).await?;
                Ok(OrderResponse::PaymentModes(
                    modes
                        .unwrap_or_default()
                        .into_iter()
                        .map(WireMode::into_mode)
                        .collect(),
                ))
            }
        }
    }
}

#[derive(Serialize)]
struct GraphqlRequest {
    query: &'static str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphqlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl GraphqlError {
    fn into_transport_error(self) -> TransportError {
        let category = self
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.get("category"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let code = match category {
            "authentication" | "authorization" => ErrorCode::Unauthorized,
            "validation" => ErrorCode::Validation,
            "not_found" => ErrorCode::NotFound,
            _ => ErrorCode::Internal,
        };
        TransportError::new(code, self.message)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct Paginated<T> {
    paginator_info: PaginatorInfo,
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginatorInfo {
    current_page: u32,
    per_page: u32,
    total: u64,
    has_more_pages: bool,
}

impl<W> Paginated<W> {
    fn convert<T>(self, item: impl Fn(W) -> T) -> Page<T> {
        Page {
            items: self.data.into_iter().map(item).collect(),
            page_info: PageInfo {
                current_page: self.paginator_info.current_page,
                per_page: self.paginator_info.per_page,
                total: self.paginator_info.total,
                has_more_pages: self.paginator_info.has_more_pages,
            },
        }
    }
}

#[derive(Deserialize)]
struct WireUser {
    #[serde(deserialize_with = "id")]
    id: i64,
    #[serde(default)]
    fname: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    admsite_code: Option<i64>,
}

#[derive(Deserialize)]
struct WireStatus {
    #[serde(deserialize_with = "id")]
    id: i64,
    status_name: String,
}

impl WireStatus {
    fn into_ref(self) -> StatusRef {
        StatusRef {
            id: StatusId(self.id),
            name: self.status_name,
        }
    }
}

#[derive(Deserialize)]
struct WireOrder {
    #[serde(deserialize_with = "id")]
    id: i64,
    #[serde(default, deserialize_with = "opt_id")]
    user_id: Option<i64>,
    #[serde(default)]
    docno: Option<String>,
    #[serde(deserialize_with = "date")]
    order_date: NaiveDate,
    #[serde(default, deserialize_with = "amount")]
    ord_amt: f64,
    #[serde(default, deserialize_with = "amount")]
    amt_paid: f64,
    #[serde(default, deserialize_with = "amount")]
    amt_due: f64,
    #[serde(default, deserialize_with = "qty")]
    ord_qty: i64,
    #[serde(default, deserialize_with = "qty")]
    delivered_qty: i64,
    #[serde(default, deserialize_with = "qty")]
    cancelled_qty: i64,
    #[serde(default, deserialize_with = "opt_date")]
    tentitive_delivery_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "opt_date")]
    delivery_date: Option<NaiveDate>,
    #[serde(default)]
    desc1: Option<String>,
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default, rename = "orderStatus")]
    order_status: Option<WireStatus>,
    #[serde(default, rename = "orderDetails")]
    order_details: Vec<WireLineItem>,
}

impl WireOrder {
    fn customer(&mut self) -> CustomerRef {
        match self.user.take() {
            Some(user) => CustomerRef {
                id: CustomerId(user.id),
                name: user.fname.unwrap_or_default(),
                site_code: user.admsite_code,
            },
            None => CustomerRef {
                id: CustomerId(self.user_id.unwrap_or_default()),
                name: String::new(),
                site_code: None,
            },
        }
    }

    fn into_summary(mut self) -> OrderSummary {
        let customer = self.customer();
        OrderSummary {
            id: OrderId(self.id),
            customer,
            document_no: self.docno.unwrap_or_default(),
            order_date: self.order_date,
            ordered_amount: self.ord_amt,
            paid_amount: self.amt_paid,
            due_amount: self.amt_due,
            ordered_qty: self.ord_qty,
            delivered_qty: self.delivered_qty,
            cancelled_qty: self.cancelled_qty,
            tentative_delivery_date: self.tentitive_delivery_date,
            delivery_date: self.delivery_date,
            note: self.desc1,
            status: self.order_status.map(WireStatus::into_ref),
        }
    }

    fn into_detail(mut self) -> OrderDetail {
        let customer = self.customer();
        OrderDetail {
            id: OrderId(self.id),
            customer,
            document_no: self.docno.unwrap_or_default(),
            order_date: self.order_date,
            ordered_amount: self.ord_amt,
            paid_amount: self.amt_paid,
            due_amount: self.amt_due,
            ordered_qty: self.ord_qty,
            delivered_qty: self.delivered_qty,
            cancelled_qty: self.cancelled_qty,
            tentative_delivery_date: self.tentitive_delivery_date,
            delivery_date: self.delivery_date,
            note: self.desc1,
            status: self.order_status.map(WireStatus::into_ref),
            line_items: self
                .order_details
                .into_iter()
                .map(WireLineItem::into_line_item)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireLineItem {
    #[serde(deserialize_with = "id")]
    id: i64,
    #[serde(deserialize_with = "id")]
    order_id: i64,
    #[serde(default, deserialize_with = "opt_id")]
    measurement_main_id: Option<i64>,
    #[serde(default, deserialize_with = "image_urls")]
    image_url: Vec<String>,
    #[serde(default, deserialize_with = "opt_id")]
    material_master_id: Option<i64>,
    #[serde(default, deserialize_with = "opt_date")]
    trial_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "opt_date")]
    delivery_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "amount")]
    item_amt: f64,
    #[serde(default, deserialize_with = "qty")]
    ord_qty: i64,
    #[serde(default, deserialize_with = "qty")]
    delivered_qty: i64,
    #[serde(default, deserialize_with = "qty")]
    cancelled_qty: i64,
    #[serde(default)]
    desc1: Option<String>,
    #[serde(default)]
    item_ref: Option<String>,
    #[serde(default, rename = "orderStatus")]
    order_status: Option<WireStatus>,
    #[serde(default)]
    material: Option<WireMaterial>,
    #[serde(default, rename = "jobOrderDetails")]
    job_order_details: Vec<WireJobOrderDetail>,
}

#[derive(Deserialize)]
struct WireMaterial {
    #[serde(deserialize_with = "id")]
    id: i64,
    name: String,
}

#[derive(Deserialize)]
struct WireJobOrderDetail {
    #[serde(default, rename = "adminSite")]
    admin_site: Option<WireSite>,
}

#[derive(Deserialize)]
struct WireSite {
    sitename: String,
}

impl WireLineItem {
    fn into_line_item(self) -> LineItem {
        let material = match (self.material, self.material_master_id) {
            (Some(material), _) => Some(MaterialRef {
                id: MaterialId(material.id),
                name: material.name,
            }),
            (None, Some(id)) => Some(MaterialRef {
                id: MaterialId(id),
                name: String::new(),
            }),
            (None, None) => None,
        };
        let mut assigned_sites: Vec<String> = Vec::new();
        for site in self.job_order_details.into_iter().filter_map(|job| job.admin_site) {
            if !assigned_sites.contains(&site.sitename) {
                assigned_sites.push(site.sitename);
            }
        }
        LineItem {
            id: LineItemId(self.id),
            order_id: OrderId(self.order_id),
            measurement_id: self.measurement_main_id.map(MeasurementId),
            material,
            image_urls: self.image_url,
            trial_date: self.trial_date,
            delivery_date: self.delivery_date,
            item_amount: self.item_amt,
            ordered_qty: self.ord_qty,
            delivered_qty: self.delivered_qty,
            cancelled_qty: self.cancelled_qty,
            note: self.desc1,
            item_ref: self.item_ref,
            status: self.order_status.map(WireStatus::into_ref),
            assigned_sites,
        }
    }
}

#[derive(Deserialize)]
struct WirePayment {
    #[serde(deserialize_with = "id")]
    id: i64,
    #[serde(default)]
    docno: Option<String>,
    #[serde(deserialize_with = "date")]
    payment_date: NaiveDate,
    #[serde(default)]
    payment_ref: Option<String>,
    #[serde(default, deserialize_with = "amount")]
    payment_amt: f64,
    #[serde(default, rename = "paymentMode")]
    payment_mode: Option<WireMode>,
}

impl WirePayment {
    fn into_record(self) -> PaymentRecord {
        PaymentRecord {
            id: PaymentId(self.id),
            document_no: self.docno.unwrap_or_default(),
            payment_date: self.payment_date,
            amount: self.payment_amt,
            reference: self.payment_ref,
            mode: self.payment_mode.map(WireMode::into_mode),
        }
    }
}

#[derive(Deserialize)]
struct WireMode {
    #[serde(deserialize_with = "id")]
    id: i64,
    mode_name: String,
}

impl WireMode {
    fn into_mode(self) -> PaymentMode {
        PaymentMode {
            id: PaymentModeId(self.id),
            name: self.mode_name,
        }
    }
}

#[derive(Deserialize)]
struct WireAck {
    #[serde(deserialize_with = "text_id")]
    id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(value) => Some(*value),
            Scalar::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            Scalar::Float(_) => None,
            Scalar::Text(text) => text.trim().parse().ok(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(value) => Some(*value as f64),
            Scalar::Float(value) => Some(*value),
            Scalar::Text(text) => text.trim().parse().ok(),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Scalar::Text(text) if text.trim().is_empty())
    }
}

fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Scalar::deserialize(deserializer)?
        .as_i64()
        .ok_or_else(|| de::Error::custom("expected a numeric id"))
}

fn opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.is_blank() => Ok(None),
        Some(raw) => raw
            .as_i64()
            .map(Some)
            .ok_or_else(|| de::Error::custom("expected a numeric id")),
    }
}

fn text_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Int(value) => value.to_string(),
        Scalar::Float(value) => value.to_string(),
        Scalar::Text(text) => text,
    })
}

fn amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(raw) if raw.is_blank() => Ok(0.0),
        Some(raw) => raw
            .as_f64()
            .ok_or_else(|| de::Error::custom("expected a decimal amount")),
    }
}

fn qty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(0),
        Some(raw) if raw.is_blank() => Ok(0),
        Some(raw) => raw
            .as_i64()
            .ok_or_else(|| de::Error::custom("expected a whole quantity")),
    }
}

/// Accepts `YYYY-MM-DD` with an optional time suffix.
fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d")
}

fn date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(de::Error::custom)
}

fn opt_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => parse_date(&raw).map(Some).map_err(de::Error::custom),
        _ => Ok(None),
    }
}

/// `image_url` is a JSON array, a JSON-encoded array in a string, or a bare URL.
fn image_urls<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let urls = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(text)) => match serde_json::from_str::<Vec<String>>(&text) {
            Ok(urls) => urls,
            Err(_) if text.trim().is_empty() => Vec::new(),
            Err(_) => vec![text],
        },
        _ => Vec::new(),
    };
    Ok(urls)
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
