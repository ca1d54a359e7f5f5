use std::sync::Arc;

use super::*;
use axum::{extract::State, http::header::AUTHORIZATION, http::HeaderMap, routing::post, Json, Router};
use shared::protocol::{QuantityInput, StatusUpdate};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone)]
struct Backend {
    reply: Value,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

#[derive(Debug, Clone)]
struct SeenRequest {
    authorization: Option<String>,
    body: Value,
}

async fn handle_graphql(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    backend.seen.lock().await.push(SeenRequest {
        authorization,
        body,
    });
    Json(backend.reply.clone())
}

async fn spawn_backend(reply: Value) -> (String, Arc<Mutex<Vec<SeenRequest>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/graphql", post(handle_graphql))
        .with_state(Backend {
            reply,
            seen: Arc::clone(&seen),
        });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/graphql"), seen)
}

async fn last_request(seen: &Arc<Mutex<Vec<SeenRequest>>>) -> SeenRequest {
    seen.lock().await.last().cloned().expect("backend saw a request")
}

#[tokio::test]
async fn list_maps_paginator_and_loose_scalars() {
    let (url, seen) = spawn_backend(json!({
        "data": {
            "orderMains": {
                "paginatorInfo": { "currentPage": 2, "perPage": 20, "total": 57, "hasMorePages": true },
                "data": [{
                    "id": "21",
                    "user_id": "8",
                    "docno": "SO-0021",
                    "order_date": "2024-04-01 10:15:00",
                    "ord_amt": "1200.50",
                    "amt_paid": 200,
                    "amt_due": "1000.50",
                    "ord_qty": 3,
                    "delivered_qty": "1",
                    "cancelled_qty": null,
                    "tentitive_delivery_date": "2024-04-20",
                    "delivery_date": null,
                    "desc1": "rush",
                    "user": { "id": "8", "fname": "Asha", "admsite_code": "101" },
                    "orderStatus": { "id": "2", "status_name": "In Progress" }
                }]
            }
        }
    }))
    .await;
    let gateway = GraphqlGateway::new(url, None);

    let response = gateway
        .execute(OrderRequest::ListOrders {
            page: 2,
            per_page: 20,
            search: Some("asha".to_string()),
        })
        .await
        .expect("list");

    let OrderResponse::OrderPage(page) = response else {
        panic!("expected an order page");
    };
    assert_eq!(
        page.page_info,
        PageInfo {
            current_page: 2,
            per_page: 20,
            total: 57,
            has_more_pages: true,
        }
    );
    let order = &page.items[0];
    assert_eq!(order.id, OrderId(21));
    assert_eq!(order.customer.name, "Asha");
    assert_eq!(order.customer.site_code, Some(101));
    assert_eq!(order.order_date, NaiveDate::from_ymd_opt(2024, 4, 1).expect("date"));
    assert_eq!(order.ordered_amount, 1200.5);
    assert_eq!(order.due_amount, 1000.5);
    assert_eq!(order.delivered_qty, 1);
    assert_eq!(order.cancelled_qty, 0);
    assert_eq!(order.delivery_date, None);
    assert_eq!(order.status.as_ref().map(|s| s.id), Some(StatusId(2)));

    let request = last_request(&seen).await;
    assert!(request.body["query"]
        .as_str()
        .expect("query")
        .contains("orderMains("));
    assert_eq!(
        request.body["variables"],
        json!({ "first": 20, "page": 2, "search": "asha" })
    );
    assert_eq!(request.authorization, None);
}

#[tokio::test]
async fn detail_maps_line_items_and_sites() {
    let (url, _seen) = spawn_backend(json!({
        "data": {
            "orderMain": {
                "id": 5,
                "docno": "SO-0005",
                "order_date": "2024-03-02",
                "ord_amt": 800,
                "amt_paid": 300,
                "amt_due": 500,
                "ord_qty": 2,
                "delivered_qty": 0,
                "cancelled_qty": 0,
                "user": { "id": 3, "fname": "Ravi" },
                "orderDetails": [{
                    "id": "51",
                    "order_id": "5",
                    "measurement_main_id": "",
                    "image_url": "[\"https://img/1.png\",\"https://img/2.png\"]",
                    "material_master_id": 7,
                    "trial_date": "2024-03-10",
                    "delivery_date": "2024-03-20 00:00:00",
                    "item_amt": "400.00",
                    "ord_qty": 1,
                    "item_ref": "REF-51",
                    "orderStatus": { "id": 5, "status_name": "Ready for Trial" },
                    "material": { "id": "7", "name": "Sherwani" },
                    "jobOrderDetails": [
                        { "adminSite": { "sitename": "Cutting" } },
                        { "adminSite": { "sitename": "Cutting" } },
                        { "adminSite": null }
                    ]
                }]
            }
        }
    }))
    .await;
    let gateway = GraphqlGateway::new(url, None);

    let response = gateway
        .execute(OrderRequest::OrderById { id: OrderId(5) })
        .await
        .expect("detail");
    let OrderResponse::Order(Some(order)) = response else {
        panic!("expected an order");
    };
    assert_eq!(order.open_qty(), 2);
    assert_eq!(order.customer.id, CustomerId(3));
    let item = &order.line_items[0];
    assert_eq!(item.id, LineItemId(51));
    assert_eq!(item.measurement_id, None);
    assert_eq!(item.image_urls, vec!["https://img/1.png", "https://img/2.png"]);
    assert_eq!(item.material.as_ref().map(|m| m.name.as_str()), Some("Sherwani"));
    assert_eq!(item.item_amount, 400.0);
    assert_eq!(item.delivery_date, NaiveDate::from_ymd_opt(2024, 3, 20));
    assert_eq!(item.assigned_sites, vec!["Cutting".to_string()]);
    assert_eq!(item.status.as_ref().map(|s| s.name.as_str()), Some("Ready for Trial"));
}

#[tokio::test]
async fn missing_order_maps_to_none() {
    let (url, _seen) = spawn_backend(json!({ "data": { "orderMain": null } })).await;
    let gateway = GraphqlGateway::new(url, None);

    let response = gateway
        .execute(OrderRequest::OrderById { id: OrderId(404) })
        .await
        .expect("detail");
    assert_eq!(response, OrderResponse::Order(None));
}

#[tokio::test]
async fn mutations_send_inputs_and_bearer_token() {
    let (url, seen) = spawn_backend(json!({
        "data": { "markOrderDelivered": { "id": 5 } }
    }))
    .await;
    let gateway = GraphqlGateway::new(url, Some("secret-token".to_string()));

    let response = gateway
        .execute(OrderRequest::MarkDelivered {
            id: OrderId(5),
            input: QuantityInput { qty: 2 },
        })
        .await
        .expect("ack");
    assert_eq!(response, OrderResponse::MutationAck { id: "5".to_string() });

    let request = last_request(&seen).await;
    assert_eq!(request.authorization.as_deref(), Some("Bearer secret-token"));
    assert_eq!(
        request.body["variables"],
        json!({ "id": "5", "input": { "delivered_qty": 2 } })
    );
}

#[tokio::test]
async fn status_update_posts_status_id() {
    let (url, seen) = spawn_backend(json!({
        "data": { "updateSalesOrderStatus": { "id": "51" } }
    }))
    .await;
    let gateway = GraphqlGateway::new(url, None);

    gateway
        .execute(OrderRequest::UpdateLineItemStatus {
            id: LineItemId(51),
            input: StatusUpdate {
                status_id: StatusId(3),
            },
        })
        .await
        .expect("ack");

    let request = last_request(&seen).await;
    assert_eq!(
        request.body["variables"],
        json!({ "id": "51", "input": { "status_id": 3 } })
    );
}

#[tokio::test]
async fn graphql_errors_become_transport_errors() {
    let (url, _seen) = spawn_backend(json!({
        "errors": [
            { "message": "Unauthenticated.", "extensions": { "category": "authentication" } },
            { "message": "ignored" }
        ],
        "data": null
    }))
    .await;
    let gateway = GraphqlGateway::new(url, None);

    let err = gateway
        .execute(OrderRequest::PaymentModes)
        .await
        .expect_err("should fail");
    assert_eq!(err, TransportError::new(ErrorCode::Unauthorized, "Unauthenticated."));
}

#[tokio::test]
async fn payment_history_and_modes_are_mapped() {
    let (url, seen) = spawn_backend(json!({
        "data": {
            "getOrderInfoByOrderId": {
                "paginatorInfo": { "currentPage": 1, "perPage": 20, "total": 1, "hasMorePages": false },
                "data": [{
                    "id": "900",
                    "docno": "RCPT-1",
                    "payment_date": "2024-04-05",
                    "payment_ref": "UPI-77",
                    "payment_amt": "250.00",
                    "paymentMode": { "id": "2", "mode_name": "UPI" }
                }]
            }
        }
    }))
    .await;
    let gateway = GraphqlGateway::new(url, None);

    let response = gateway
        .execute(OrderRequest::PaymentHistory {
            order_id: OrderId(5),
            page: 1,
            per_page: 20,
        })
        .await
        .expect("history");
    let OrderResponse::PaymentPage(page) = response else {
        panic!("expected a payment page");
    };
    let payment = &page.items[0];
    assert_eq!(payment.amount, 250.0);
    assert_eq!(payment.reference.as_deref(), Some("UPI-77"));
    assert_eq!(payment.mode.as_ref().map(|m| m.id), Some(PaymentModeId(2)));

    let request = last_request(&seen).await;
    assert_eq!(
        request.body["variables"],
        json!({ "order_id": "5", "first": 20, "page": 1 })
    );
}

#[tokio::test]
async fn unreachable_backend_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");

    let gateway = GraphqlGateway::new(format!("http://{addr}/graphql"), None);
    let err = gateway
        .execute(OrderRequest::PaymentModes)
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Unavailable);
}

#[test]
fn dates_accept_a_time_suffix() {
    assert_eq!(
        parse_date("2024-04-01 09:30:00").expect("date"),
        NaiveDate::from_ymd_opt(2024, 4, 1).expect("date")
    );
    assert!(parse_date("01/04/2024").is_err());
}
