use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{
    CustomerRef, LineItemId, MaterialId, MaterialRef, MeasurementId, OrderId, PaymentId,
    PaymentModeId, StatusId, StatusRef,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub customer: CustomerRef,
    pub document_no: String,
    pub order_date: NaiveDate,
    pub ordered_amount: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    #[serde(default)]
    pub ordered_qty: i64,
    #[serde(default)]
    pub delivered_qty: i64,
    #[serde(default)]
    pub cancelled_qty: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tentative_delivery_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<MeasurementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<MaterialRef>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
    pub item_amount: f64,
    pub ordered_qty: i64,
    #[serde(default)]
    pub delivered_qty: i64,
    #[serde(default)]
    pub cancelled_qty: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusRef>,
    /// Production sites the item's job orders are assigned to.
    #[serde(default)]
    pub assigned_sites: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub id: OrderId,
    pub customer: CustomerRef,
    pub document_no: String,
    pub order_date: NaiveDate,
    pub ordered_amount: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    pub ordered_qty: i64,
    pub delivered_qty: i64,
    pub cancelled_qty: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tentative_delivery_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusRef>,
    pub line_items: Vec<LineItem>,
}

impl OrderDetail {
    /// Units neither delivered nor cancelled yet.
    pub fn open_qty(&self) -> i64 {
        (self.ordered_qty - self.delivered_qty - self.cancelled_qty).max(0)
    }

    pub fn line_item(&self, id: LineItemId) -> Option<&LineItem> {
        self.line_items.iter().find(|item| item.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub document_no: String,
    pub payment_date: NaiveDate,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PaymentMode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMode {
    pub id: PaymentModeId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageInfo {
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub has_more_pages: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemUpdate {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<MeasurementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_id: Option<MaterialId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
    pub item_amount: f64,
    pub ordered_qty: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_code: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status_id: StatusId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInput {
    pub amount: f64,
    pub payment_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_mode_id: Option<PaymentModeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityInput {
    pub qty: i64,
}

/// A single remote operation against the order backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OrderRequest {
    ListOrders {
        page: u32,
        per_page: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search: Option<String>,
    },
    OrderById {
        id: OrderId,
    },
    UpdateLineItem {
        id: LineItemId,
        input: LineItemUpdate,
    },
    UpdateLineItemStatus {
        id: LineItemId,
        input: StatusUpdate,
    },
    CapturePayment {
        id: OrderId,
        input: PaymentInput,
    },
    MarkDelivered {
        id: OrderId,
        input: QuantityInput,
    },
    MarkCancelled {
        id: OrderId,
        input: QuantityInput,
    },
    PaymentHistory {
        order_id: OrderId,
        page: u32,
        per_page: u32,
    },
    PaymentModes,
}

impl OrderRequest {
    /// Name of the backend operation this request maps to.
    pub fn operation_name(&self) -> &'static str {
        match self {
            OrderRequest::ListOrders { .. } => "orderMains",
            OrderRequest::OrderById { .. } => "orderMain",
            OrderRequest::UpdateLineItem { .. } => "updateOrderDetail",
            OrderRequest::UpdateLineItemStatus { .. } => "updateSalesOrderStatus",
            OrderRequest::CapturePayment { .. } => "receiveOrderPayment",
            OrderRequest::MarkDelivered { .. } => "markOrderDelivered",
            OrderRequest::MarkCancelled { .. } => "markOrderCancelled",
            OrderRequest::PaymentHistory { .. } => "getOrderInfoByOrderId",
            OrderRequest::PaymentModes => "paymentModes",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            OrderRequest::UpdateLineItem { .. }
                | OrderRequest::UpdateLineItemStatus { .. }
                | OrderRequest::CapturePayment { .. }
                | OrderRequest::MarkDelivered { .. }
                | OrderRequest::MarkCancelled { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OrderResponse {
    OrderPage(Page<OrderSummary>),
    Order(Option<OrderDetail>),
    MutationAck { id: String },
    PaymentPage(Page<PaymentRecord>),
    PaymentModes(Vec<PaymentMode>),
}
