use crate::handlers::common::{created_response, map_service_error, success_response};
use crate::{errors::ApiError, services::CheckoutInput, AppState};
use axum::{
    extract::{Json, Path, State},
    routing::{get, patch, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(order_stats))
        .route("/user/:user_id", get(list_user_orders))
        .route("/:order_number", get(get_order))
        .route("/:order_number/status", patch(update_status))
        .route("/:order_number/payment-status", patch(update_payment_status))
        .route("/:order_number/payment", post(record_payment))
}

/// Creates the router for checkout
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(checkout))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub cart_id: Uuid,
    pub user_id: i64,
    pub shipping_address: String,
    pub billing_address: Option<String>,
    pub payment_method: String,
    pub notes: Option<String>,
}

/// Convert a cart into an order
async fn checkout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .checkout(CheckoutInput {
            cart_id: payload.cart_id,
            user_id: payload.user_id,
            shipping_address: payload.shipping_address,
            billing_address: payload.billing_address,
            payment_method: payload.payment_method,
            notes: payload.notes,
        })
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

/// Get an order with its lines by order number
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let detail = state
        .services
        .order
        .get_order_by_number(&order_number)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(detail))
}

/// List a user's orders, newest first
async fn list_user_orders(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let orders = state
        .services
        .order
        .list_orders_for_user(user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

/// Update order status (applies the payment side effect)
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .update_order_status(&order_number, &payload.status, payload.notes)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: String,
}

/// Update payment status directly
async fn update_payment_status(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
    Json(payload): Json<UpdatePaymentStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .update_payment_status(&order_number, &payload.payment_status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentRequest {
    pub amount: Decimal,
}

/// Record a payment against an order (mock gateway)
async fn record_payment(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
    Json(payload): Json<PaymentRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .record_payment(&order_number, payload.amount)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Back-office order aggregates
async fn order_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let stats = state
        .services
        .order
        .order_stats()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(stats))
}
