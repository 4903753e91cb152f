use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use super::auth::MaybeUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_id, validate_quantity, validate_rental_window};
use crate::db::{
    self, AddToCartRequest, CartAddition, CartMutationResponse, CartResponse, NewCartLine,
    RemoveFromCartRequest, UpdateCartRequest, User,
};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CartCountResponse {
    pub count: i64,
}

/// Validate a product id from a request body, returning it trimmed
fn required_product_id(product_id: Option<&str>) -> Result<String, ApiError> {
    let product_id = product_id.unwrap_or_default().trim();
    validate_id(product_id, "Product ID").map_err(ApiError::bad_request)?;
    Ok(product_id.to_string())
}

/// Items in the caller's cart; anonymous callers see an empty cart
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
) -> Result<Json<CartResponse>, ApiError> {
    let items = match user {
        Some(user) => db::list_cart(&state.db, &user.id).await?,
        None => Vec::new(),
    };
    Ok(Json(CartResponse { items }))
}

pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartMutationResponse>), ApiError> {
    let product_id = required_product_id(req.product_id.as_deref())?;
    let quantity = req.quantity.unwrap_or(1);

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_quantity(quantity) {
        errors.add("quantity", e);
    }
    if let Err(e) = validate_rental_window(req.start_date.as_deref(), req.end_date.as_deref()) {
        errors.add("dates", e);
    }
    errors.finish()?;

    if !db::product_exists(&state.db, &product_id).await? {
        return Err(ApiError::not_found("Product not found"));
    }

    let addition = db::add_to_cart(
        &state.db,
        &user.id,
        &NewCartLine {
            product_id,
            quantity,
            start_date: req.start_date.map(|d| d.trim().to_string()),
            end_date: req.end_date.map(|d| d.trim().to_string()),
        },
    )
    .await?;

    let (status, message) = match &addition {
        CartAddition::Added(_) => (StatusCode::CREATED, "Item added to cart"),
        CartAddition::Incremented(_) => (StatusCode::OK, "Cart quantity updated"),
    };
    tracing::debug!(user_id = %user.id, product_id = %addition.line().product_id, "{}", message);

    Ok((
        status,
        Json(CartMutationResponse {
            message: message.to_string(),
            item: Some(addition.line().clone()),
        }),
    ))
}

pub async fn update_cart(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<UpdateCartRequest>,
) -> Result<Json<CartMutationResponse>, ApiError> {
    let product_id = required_product_id(req.product_id.as_deref())?;
    let quantity = req
        .quantity
        .ok_or_else(|| ApiError::bad_request("Quantity is required"))?;
    validate_quantity(quantity).map_err(ApiError::bad_request)?;

    let line = db::update_cart_quantity(&state.db, &user.id, &product_id, quantity)
        .await?
        .ok_or_else(|| ApiError::not_found("Item not found in cart"))?;

    Ok(Json(CartMutationResponse {
        message: "Cart updated".to_string(),
        item: Some(line),
    }))
}

pub async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<RemoveFromCartRequest>,
) -> Result<Json<CartMutationResponse>, ApiError> {
    let product_id = required_product_id(req.product_id.as_deref())?;
    db::remove_from_cart(&state.db, &user.id, &product_id).await?;

    Ok(Json(CartMutationResponse {
        message: "Item removed from cart".to_string(),
        item: None,
    }))
}

pub async fn cart_count(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<CartCountResponse>, ApiError> {
    let count = db::cart_count(&state.db, &user.id).await?;
    Ok(Json(CartCountResponse { count }))
}
