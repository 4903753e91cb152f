use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AdminUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    is_valid_id, validate_id, validate_price, validate_rating, validate_required_text,
};
use crate::db::{
    self, CatalogFilter, ListingType, PageRequest, Product, ProductFields, ProductPage,
    ProductPatch, ProductRequest, SortKey, Suggestion,
};
use crate::AppState;

const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 5000;
const MIN_SUGGESTION_QUERY: usize = 2;

/// Raw catalog query string. Numbers arrive as text so that malformed values
/// become validation errors instead of extractor rejections.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionResponse {
    pub suggestions: Vec<Suggestion>,
    pub query: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(
    errors: &mut ValidationErrorBuilder,
    field: &str,
    value: Option<&str>,
) -> Option<T> {
    let value = non_empty(value)?;
    match value.parse::<T>() {
        Ok(n) => Some(n),
        Err(_) => {
            errors.add(field, format!("{} must be a number", field));
            None
        }
    }
}

impl CatalogQuery {
    fn into_filter(self) -> Result<(CatalogFilter, PageRequest), ApiError> {
        let mut errors = ValidationErrorBuilder::new();

        let min_price: Option<f64> = parse_number(&mut errors, "minPrice", self.min_price.as_deref());
        let max_price: Option<f64> = parse_number(&mut errors, "maxPrice", self.max_price.as_deref());
        let page: Option<i64> = parse_number(&mut errors, "page", self.page.as_deref());
        let limit: Option<i64> = parse_number(&mut errors, "limit", self.limit.as_deref());

        for (field, value) in [("minPrice", min_price), ("maxPrice", max_price)] {
            if let Some(v) = value {
                if let Err(e) = validate_price(field, v) {
                    errors.add(field, e);
                }
            }
        }
        errors.finish()?;

        let filter = CatalogFilter {
            // Only buy/rent narrow the listing; anything else shows both
            listing_type: non_empty(self.listing_type.as_deref()).and_then(ListingType::parse),
            category_slug: non_empty(self.category.as_deref()).map(str::to_string),
            min_price,
            max_price,
            search: non_empty(self.search.as_deref()).map(str::to_string),
            sort: non_empty(self.sort.as_deref())
                .map(SortKey::parse)
                .unwrap_or_default(),
        };
        Ok((filter, PageRequest::new(page, limit)))
    }
}

/// Public catalog listing
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<ProductPage>, ApiError> {
    let (filter, page) = query.into_filter()?;
    let page = db::list_products(&state.db, &filter, page).await?;
    Ok(Json(page))
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    validate_id(&id, "product ID").map_err(ApiError::bad_request)?;
    db::get_product(&state.db, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

pub async fn search_suggestions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SuggestionQuery>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    let term = query.q.unwrap_or_default().trim().to_string();
    if term.chars().count() < MIN_SUGGESTION_QUERY {
        return Ok(Json(SuggestionResponse {
            suggestions: Vec::new(),
            query: term,
        }));
    }

    let suggestions = db::search_suggestions(&state.db, &term).await?;
    Ok(Json(SuggestionResponse {
        suggestions,
        query: term,
    }))
}

/// Every field present in `req` is checked; required ones are enforced only when `creating`.
fn validate_product_request(req: &ProductRequest, creating: bool) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    match (&req.title, creating) {
        (Some(title), _) => {
            if let Err(e) = validate_required_text("Title", title, MAX_TITLE_LENGTH) {
                errors.add("title", e);
            }
        }
        (None, true) => {
            errors.add("title", "Title is required");
        }
        (None, false) => {}
    }

    match (&req.description, creating) {
        (Some(description), _) => {
            if let Err(e) =
                validate_required_text("Description", description, MAX_DESCRIPTION_LENGTH)
            {
                errors.add("description", e);
            }
        }
        (None, true) => {
            errors.add("description", "Description is required");
        }
        (None, false) => {}
    }

    match (req.price, creating) {
        (Some(price), _) => {
            if let Err(e) = validate_price("Price", price) {
                errors.add("price", e);
            }
        }
        (None, true) => {
            errors.add("price", "Price is required");
        }
        (None, false) => {}
    }

    if let Some(Some(rental_price)) = req.rental_price {
        if let Err(e) = validate_price("Rental price", rental_price) {
            errors.add("rentalPrice", e);
        }
    }

    if let Some(stock) = req.stock {
        if stock < 0 {
            errors.add("stock", "Stock must be a non-negative integer");
        }
    }

    match (req.listing_type.as_deref(), creating) {
        (Some(t), _) => {
            if ListingType::parse(t).is_none() {
                errors.add("type", "Type must be buy or rent");
            }
        }
        (None, true) => {
            errors.add("type", "Type is required");
        }
        (None, false) => {}
    }

    if let Some(rating) = req.rating {
        if let Err(e) = validate_rating(rating) {
            errors.add("rating", e);
        }
    }

    if let Some(images) = &req.images {
        if images.iter().any(|img| img.url.trim().is_empty()) {
            errors.add("images", "Every image needs a URL");
        }
    }

    if let Some(categories) = &req.categories {
        if categories.iter().any(|id| !is_valid_id(id.trim())) {
            errors.add("categories", "Invalid category ID");
        }
    }

    errors.finish()
}

/// Trimmed, de-duplicated category ids, all of which must exist
async fn checked_category_ids(
    state: &AppState,
    categories: &[String],
) -> Result<Vec<String>, ApiError> {
    let mut ids: Vec<String> = Vec::with_capacity(categories.len());
    for id in categories {
        let id = id.trim().to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let existing = db::count_existing_categories(&state.db, &ids).await?;
    if existing != ids.len() as i64 {
        return Err(ApiError::bad_request("One or more categories do not exist"));
    }
    Ok(ids)
}

fn trimmed_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<ProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    validate_product_request(&req, true)?;

    let category_ids = checked_category_ids(&state, req.categories.as_deref().unwrap_or_default()).await?;
    let listing_type = req
        .listing_type
        .as_deref()
        .and_then(ListingType::parse)
        .ok_or_else(|| ApiError::validation_field("type", "Type must be buy or rent"))?;

    let fields = ProductFields {
        title: req.title.unwrap_or_default().trim().to_string(),
        description: req.description.unwrap_or_default().trim().to_string(),
        price: req.price.unwrap_or_default(),
        rental_price: req.rental_price.flatten(),
        stock: req.stock.unwrap_or(0),
        listing_type,
        images: req.images.unwrap_or_default(),
        category_ids,
        tags: trimmed_tags(req.tags.unwrap_or_default()),
        rating: req.rating.unwrap_or(0.0),
        reviews: req.reviews.unwrap_or_default(),
        is_featured: req.is_featured.unwrap_or(false),
    };

    let product = db::create_product(&state.db, &fields).await?;
    tracing::info!(product_id = %product.id, admin_id = %admin.id, "Product created");

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<ProductRequest>,
) -> Result<Json<Product>, ApiError> {
    validate_id(&id, "product ID").map_err(ApiError::bad_request)?;
    validate_product_request(&req, false)?;

    let category_ids = match req.categories.as_deref() {
        Some(categories) => Some(checked_category_ids(&state, categories).await?),
        None => None,
    };

    let patch = ProductPatch {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description.map(|d| d.trim().to_string()),
        price: req.price,
        rental_price: req.rental_price,
        stock: req.stock,
        listing_type: req.listing_type.as_deref().and_then(ListingType::parse),
        images: req.images,
        category_ids,
        tags: req.tags.map(trimmed_tags),
        rating: req.rating,
        reviews: req.reviews,
        is_featured: req.is_featured,
    };

    let product = db::update_product(&state.db, &id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    tracing::info!(product_id = %product.id, admin_id = %admin.id, "Product updated");
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    validate_id(&id, "product ID").map_err(ApiError::bad_request)?;

    if !db::delete_product(&state.db, &id).await? {
        return Err(ApiError::not_found("Product not found"));
    }

    tracing::info!(product_id = %id, admin_id = %admin.id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}
