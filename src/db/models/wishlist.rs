//! Wishlist models. An entry is a bare (user, product) pair, unique per pair.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, SqlitePool};
use std::collections::{HashMap, HashSet};

use super::product::{self, Product};

#[derive(Debug, Clone, FromRow)]
pub struct WishlistEntry {
    pub user_id: String,
    pub product_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub product_id: String,
    pub created_at: String,
    pub product: Product,
}

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub items: Vec<WishlistItem>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistProductRequest {
    pub product_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCheckRequest {
    #[serde(default)]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCheckResponse {
    pub wishlist_status: HashMap<String, bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub in_wishlist: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub exists: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// The insert lost a race with a concurrent toggle that added the same pair
    AlreadyInWishlist,
}

impl ToggleOutcome {
    pub fn in_wishlist(&self) -> bool {
        !matches!(self, ToggleOutcome::Removed)
    }

    pub fn message(&self) -> &'static str {
        match self {
            ToggleOutcome::Added => "Added to wishlist",
            ToggleOutcome::Removed => "Removed from wishlist",
            ToggleOutcome::AlreadyInWishlist => "Already in wishlist",
        }
    }
}

impl From<ToggleOutcome> for ToggleResponse {
    fn from(outcome: ToggleOutcome) -> Self {
        Self {
            in_wishlist: outcome.in_wishlist(),
            message: outcome.message().to_string(),
        }
    }
}

/// Remove the pair if present, otherwise add it. The insert ignores a duplicate,
/// so two concurrent toggles never produce a second entry or an error.
pub async fn toggle(
    db: &SqlitePool,
    user_id: &str,
    product_id: &str,
) -> Result<ToggleOutcome, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM wishlist WHERE user_id = ? AND product_id = ?")
        .bind(user_id)
        .bind(product_id)
        .execute(db)
        .await?;
    if deleted.rows_affected() > 0 {
        return Ok(ToggleOutcome::Removed);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO wishlist (user_id, product_id, created_at) VALUES (?, ?, ?)
        ON CONFLICT(user_id, product_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(crate::db::now())
    .execute(db)
    .await?;

    if inserted.rows_affected() > 0 {
        Ok(ToggleOutcome::Added)
    } else {
        Ok(ToggleOutcome::AlreadyInWishlist)
    }
}

pub async fn remove(db: &SqlitePool, user_id: &str, product_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM wishlist WHERE user_id = ? AND product_id = ?")
        .bind(user_id)
        .bind(product_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn contains(db: &SqlitePool, user_id: &str, product_id: &str) -> Result<bool, sqlx::Error> {
    let found: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM wishlist WHERE user_id = ? AND product_id = ?")
            .bind(user_id)
            .bind(product_id)
            .fetch_optional(db)
            .await?;
    Ok(found.is_some())
}

/// Which of `product_ids` the user has wishlisted, in one query
pub async fn wishlisted_among(
    db: &SqlitePool,
    user_id: &str,
    product_ids: &[String],
) -> Result<HashSet<String>, sqlx::Error> {
    if product_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut qb = QueryBuilder::new("SELECT product_id FROM wishlist WHERE user_id = ");
    qb.push_bind(user_id.to_string()).push(" AND product_id IN (");
    let mut separated = qb.separated(", ");
    for id in product_ids {
        separated.push_bind(id.clone());
    }
    qb.push(")");

    let rows: Vec<(String,)> = qb.build_query_as().fetch_all(db).await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn list(db: &SqlitePool, user_id: &str) -> Result<Vec<WishlistItem>, sqlx::Error> {
    let entries: Vec<WishlistEntry> = sqlx::query_as(
        "SELECT * FROM wishlist WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let ids: Vec<String> = entries.iter().map(|e| e.product_id.clone()).collect();
    let mut products = product::load_products(db, &ids).await?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            products.remove(&entry.product_id).map(|product| WishlistItem {
                product_id: entry.product_id,
                created_at: entry.created_at,
                product,
            })
        })
        .collect())
}
