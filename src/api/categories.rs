use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::AdminUser;
use super::error::{is_unique_violation, ApiError};
use super::validation::{validate_id, validate_required_text};
use crate::db::{
    self, slugify, Category, CreateCategoryRequest, ListingType, UpdateCategoryRequest,
};
use crate::AppState;

const MAX_NAME_LENGTH: usize = 100;

fn duplicate_or(err: sqlx::Error) -> ApiError {
    if is_unique_violation(&err) {
        ApiError::conflict("Category with this slug and type already exists")
    } else {
        ApiError::from(err)
    }
}

/// Checked name plus derived slug
fn checked_name(name: Option<&str>) -> Result<String, ApiError> {
    let name = name.unwrap_or_default().trim();
    validate_required_text("Name", name, MAX_NAME_LENGTH).map_err(ApiError::bad_request)?;
    if slugify(name).is_empty() {
        return Err(ApiError::bad_request(
            "Name must contain at least one letter or digit",
        ));
    }
    Ok(name.to_string())
}

fn parse_type(value: &str) -> Result<ListingType, ApiError> {
    ListingType::parse(value).ok_or_else(|| ApiError::bad_request("Type must be buy or rent"))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(db::list_categories(&state.db).await?))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let name = checked_name(req.name.as_deref())?;
    let listing_type = match req.listing_type.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => parse_type(t)?,
        _ => return Err(ApiError::bad_request("Type is required")),
    };

    let category = db::create_category(&state.db, &name, listing_type)
        .await
        .map_err(duplicate_or)?;

    tracing::info!(
        category_id = %category.id,
        slug = %category.slug,
        admin_id = %admin.id,
        "Category created"
    );
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    validate_id(&id, "category ID").map_err(ApiError::bad_request)?;
    let name = checked_name(req.name.as_deref())?;
    let listing_type = match req.listing_type.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => Some(parse_type(t)?),
        _ => None,
    };

    let category = db::update_category(&state.db, &id, &name, listing_type)
        .await
        .map_err(duplicate_or)?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    tracing::info!(category_id = %category.id, admin_id = %admin.id, "Category updated");
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    validate_id(&id, "category ID").map_err(ApiError::bad_request)?;

    if !db::delete_category(&state.db, &id).await? {
        return Err(ApiError::not_found("Category not found"));
    }

    tracing::info!(category_id = %id, admin_id = %admin.id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}
