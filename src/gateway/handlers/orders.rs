//! Order resource routes (spec §6: `POST/GET/PUT /orders...`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{
    DeliveryLocation, LineItem, Money, NewOutboxEvent, Order, OrderPriority, OutboxEventType,
};
use crate::error::Result;
use crate::gateway::{AppState, RequestMeta};
use crate::storage::TransactionalStorage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub restaurant_id: String,
    pub items: Vec<LineItemRequest>,
    pub delivery_location: DeliveryLocation,
    #[serde(default)]
    pub priority: Option<OrderPriority>,
}

/// `POST /orders` (spec §8 scenario 1): create the order, its `ORDER_CREATED`
/// outbox event, and its saga record in one transaction, then kick off saga
/// execution in the background — the response does not wait on it.
pub async fn create_order<T: TransactionalStorage + 'static>(
    State(state): State<AppState<T>>,
    meta: RequestMeta,
    Json(body): Json<CreateOrderRequest>,
) -> Response {
    match create_order_inner(&state, body).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => meta.error_response(&e),
    }
}

async fn create_order_inner<T: TransactionalStorage + 'static>(state: &AppState<T>, body: CreateOrderRequest) -> Result<Order> {
    let items: Vec<LineItem> = body
        .items
        .into_iter()
        .map(|i| {
            let mut item = LineItem::new(i.item_id, i.name, i.quantity, Money::from_dollars(i.unit_price));
            item.notes = i.notes;
            item
        })
        .collect();

    let order = Order::new(body.customer_id, body.restaurant_id, items, body.delivery_location, body.priority.unwrap_or_default())?;
    let saga = state.coordinator.start_saga(&order).await?;

    let coordinator = state.coordinator.clone();
    let saga_id = saga.id;
    tokio::spawn(async move {
        if let Err(e) = coordinator.execute(saga_id).await {
            tracing::error!(saga_id = %saga_id, error = %e, "saga execution failed");
        }
    });

    Ok(order)
}

/// `GET /orders/{id}`.
pub async fn get_order<T: TransactionalStorage + 'static>(
    State(state): State<AppState<T>>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Response {
    match state.storage.get_order(id).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => meta.error_response(&e.into()),
    }
}

/// `GET /orders/{id}/status` — a smaller projection of the order for
/// clients polling delivery progress.
pub async fn get_status<T: TransactionalStorage + 'static>(
    State(state): State<AppState<T>>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Response {
    match state.storage.get_order(id).await {
        Ok(order) => Json(serde_json::json!({
            "id": order.id,
            "status": order.status,
            "trackingCode": order.tracking_code,
            "estimatedDeliveryTime": order.estimated_delivery_time,
            "version": order.version,
        }))
        .into_response(),
        Err(e) => meta.error_response(&e.into()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    #[serde(default)]
    pub delivery_location: Option<DeliveryLocation>,
    #[serde(default)]
    pub priority: Option<OrderPriority>,
}

/// `PUT /orders/{id}` — edits fields outside the status graph (delivery
/// location, priority); gated by the same optimistic-concurrency version as
/// every other order write.
pub async fn update_order<T: TransactionalStorage + 'static>(
    State(state): State<AppState<T>>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateOrderRequest>,
) -> Response {
    match update_order_inner(&state, id, body).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => meta.error_response(&e),
    }
}

async fn update_order_inner<T: TransactionalStorage + 'static>(state: &AppState<T>, id: Uuid, body: UpdateOrderRequest) -> Result<Order> {
    let mut order = state.storage.get_order(id).await?;
    order.apply_update(body.delivery_location, body.priority);
    state.storage.update_order(&order).await?;
    Ok(order)
}

/// `POST /orders/{id}/cancel` (spec §8 round-trip test: cancelling an
/// already-cancelled order is a Conflict and makes no further state change).
pub async fn cancel_order<T: TransactionalStorage + 'static>(
    State(state): State<AppState<T>>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Response {
    match cancel_order_inner(&state, id).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => meta.error_response(&e),
    }
}

async fn cancel_order_inner<T: TransactionalStorage + 'static>(state: &AppState<T>, id: Uuid) -> Result<Order> {
    let mut order = state.storage.get_order(id).await?;
    order.cancel()?;
    let event = NewOutboxEvent::new(
        OutboxEventType::OrderCancelled,
        order.id,
        "Order",
        serde_json::json!({ "reason": "customer_requested" }),
    );
    state.storage.update_order_with_event(&order, &event).await?;
    Ok(order)
}

/// `GET /orders/{id}/events` — the outbox history for one aggregate, for
/// debugging and support tooling.
pub async fn list_events<T: TransactionalStorage + 'static>(
    State(state): State<AppState<T>>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Response {
    match state.storage.list_outbox_for_aggregate(id).await {
        Ok(events) => Json(events).into_response(),
        Err(e) => meta.error_response(&e.into()),
    }
}
