use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::auth::MaybeUser;
use super::error::ApiError;
use super::validation::{is_valid_id, validate_id};
use crate::db::{
    self, wishlist, BulkCheckRequest, BulkCheckResponse, CheckResponse, MessageResponse,
    ToggleResponse, User, WishlistProductRequest, WishlistResponse,
};
use crate::AppState;

/// Largest id list accepted by a bulk check
const MAX_BULK_CHECK: usize = 200;

pub async fn list_wishlist(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<WishlistResponse>, ApiError> {
    let items = wishlist::list(&state.db, &user.id).await?;
    Ok(Json(WishlistResponse {
        count: items.len(),
        items,
    }))
}

/// Add the product if absent, remove it if present
pub async fn toggle_wishlist(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<WishlistProductRequest>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let product_id = req.product_id.as_deref().unwrap_or_default().trim();
    validate_id(product_id, "product ID").map_err(ApiError::bad_request)?;

    if !db::product_exists(&state.db, product_id).await? {
        return Err(ApiError::not_found("Product not found"));
    }

    let outcome = wishlist::toggle(&state.db, &user.id, product_id).await?;
    tracing::debug!(user_id = %user.id, product_id, ?outcome, "Wishlist toggled");

    Ok(Json(outcome.into()))
}

pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(product_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_id(&product_id, "product ID").map_err(ApiError::bad_request)?;
    wishlist::remove(&state.db, &user.id, &product_id).await?;
    Ok(Json(MessageResponse::new("Removed from wishlist")))
}

/// Whether one product is wishlisted; `false` for anonymous callers
pub async fn check_wishlist(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Json(req): Json<WishlistProductRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let product_id = req.product_id.as_deref().unwrap_or_default().trim();
    let exists = match user {
        Some(user) if is_valid_id(product_id) => {
            wishlist::contains(&state.db, &user.id, product_id).await?
        }
        _ => false,
    };
    Ok(Json(CheckResponse { exists }))
}

/// Map every requested id to whether the caller has it wishlisted
pub async fn bulk_check_wishlist(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Json(req): Json<BulkCheckRequest>,
) -> Result<Json<BulkCheckResponse>, ApiError> {
    let Some(user) = user else {
        return Ok(Json(BulkCheckResponse {
            wishlist_status: HashMap::new(),
        }));
    };

    if req.product_ids.len() > MAX_BULK_CHECK {
        return Err(ApiError::validation_field(
            "productIds",
            format!("At most {} product IDs can be checked at once", MAX_BULK_CHECK),
        ));
    }

    let valid: Vec<String> = req
        .product_ids
        .iter()
        .filter(|id| is_valid_id(id))
        .cloned()
        .collect();
    let found = wishlist::wishlisted_among(&state.db, &user.id, &valid).await?;

    let wishlist_status = req
        .product_ids
        .into_iter()
        .map(|id| {
            let present = found.contains(&id);
            (id, present)
        })
        .collect();

    Ok(Json(BulkCheckResponse { wishlist_status }))
}
