use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::validate_id;
use crate::db::{
    self, CheckoutRequest, CheckoutResponse, OrderListResponse, OrderStatus, PaymentMethod,
    StatusUpdate, UpdateOrderStatusRequest, UpdateOrderStatusResponse, User,
};
use crate::AppState;

/// Turn the caller's cart into a pending order
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let address = req.address.as_deref().map(str::trim).unwrap_or_default();
    let method = req.payment_method.as_deref().map(str::trim).unwrap_or_default();
    if address.is_empty() || method.is_empty() {
        return Err(ApiError::bad_request("Address and payment method required"));
    }
    if address.chars().count() > 500 {
        return Err(ApiError::validation_field(
            "address",
            "Address is too long (max 500 characters)",
        ));
    }

    let payment_method = PaymentMethod::parse(method).ok_or_else(|| {
        ApiError::validation_field("paymentMethod", "Payment method must be COD or Online")
    })?;

    let order = db::checkout(&state.db, &user.id, &user.email, address, payment_method)
        .await?
        .ok_or_else(|| ApiError::bad_request("Cart is empty"))?;

    tracing::info!(
        order_id = %order.id,
        user_id = %user.id,
        total = order.total_amount,
        payment_method = %order.payment_method,
        "Order placed"
    );

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            success: true,
            order_id: order.id,
            total_amount: order.total_amount,
        }),
    ))
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<OrderListResponse>, ApiError> {
    let orders = db::list_orders(&state.db, &user.id).await?;
    Ok(Json(OrderListResponse { orders }))
}

/// Change the status of one of the caller's orders
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<UpdateOrderStatusResponse>, ApiError> {
    validate_id(&id, "order ID").map_err(ApiError::bad_request)?;

    let status = req.status.as_deref().map(str::trim).unwrap_or_default();
    if status.is_empty() {
        return Err(ApiError::bad_request("Status required"));
    }
    let next = OrderStatus::parse(status)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown order status: {}", status)))?;

    match db::update_order_status(&state.db, &id, &user.id, next).await? {
        StatusUpdate::Updated(order) => {
            tracing::info!(order_id = %order.id, status = %next, "Order status changed");
            Ok(Json(UpdateOrderStatusResponse {
                success: true,
                order,
            }))
        }
        StatusUpdate::NotFound => Err(ApiError::not_found("Order not found")),
        StatusUpdate::Rejected { current } => Err(ApiError::conflict(format!(
            "Cannot change order status from {} to {}",
            current, next
        ))),
    }
}
