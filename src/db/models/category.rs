//! Category models. A slug may exist once per listing type.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::ListingType;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-z0-9-]").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub listing_type: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
}

/// Derive the URL-safe slug for a category name: lowercase, whitespace runs become
/// `-`, anything outside `[a-z0-9-]` is dropped.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let dashed = WHITESPACE_RUN.replace_all(&lowered, "-");
    NON_SLUG_CHARS.replace_all(&dashed, "").into_owned()
}

pub async fn list_categories(db: &SqlitePool) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM categories ORDER BY name COLLATE NOCASE, type")
        .fetch_all(db)
        .await
}

pub async fn find_category(db: &SqlitePool, id: &str) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Category ids matching a slug, restricted to one listing type when given
pub async fn resolve_category_slug(
    db: &SqlitePool,
    slug: &str,
    listing_type: Option<ListingType>,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = match listing_type {
        Some(t) => {
            sqlx::query_as("SELECT id FROM categories WHERE slug = ? AND type = ?")
                .bind(slug)
                .bind(t.as_str())
                .fetch_all(db)
                .await?
        }
        None => {
            sqlx::query_as("SELECT id FROM categories WHERE slug = ?")
                .bind(slug)
                .fetch_all(db)
                .await?
        }
    };
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Insert a category. A duplicate (slug, type) surfaces as a UNIQUE constraint error.
pub async fn create_category(
    db: &SqlitePool,
    name: &str,
    listing_type: ListingType,
) -> Result<Category, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = crate::db::now();

    sqlx::query(
        "INSERT INTO categories (id, name, slug, type, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name.trim())
    .bind(slugify(name))
    .bind(listing_type.as_str())
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
}

/// Rename a category (recomputing its slug) and optionally move it to another type.
/// Returns `None` when no such category exists.
pub async fn update_category(
    db: &SqlitePool,
    id: &str,
    name: &str,
    listing_type: Option<ListingType>,
) -> Result<Option<Category>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE categories SET name = ?, slug = ?, type = COALESCE(?, type), updated_at = ? WHERE id = ?",
    )
    .bind(name.trim())
    .bind(slugify(name))
    .bind(listing_type.map(|t| t.as_str()))
    .bind(crate::db::now())
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_category(db, id).await
}

pub async fn delete_category(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// How many of `ids` name existing categories
pub async fn count_existing_categories(
    db: &SqlitePool,
    ids: &[String],
) -> Result<i64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM categories WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    qb.push(")");
    qb.build_query_scalar().fetch_one(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Gold Necklaces"), "gold-necklaces");
        assert_eq!(slugify("  Rings &  Bands "), "rings--bands");
        assert_eq!(slugify("Kundan™ Sets"), "kundan-sets");
        assert_eq!(slugify("!!!"), "");
    }

    #[tokio::test]
    async fn test_same_slug_allowed_once_per_type() {
        let db = init_in_memory().await.unwrap();

        let buy = create_category(&db, "Necklaces", ListingType::Buy).await.unwrap();
        assert_eq!(buy.slug, "necklaces");

        let dup = create_category(&db, "necklaces", ListingType::Buy).await;
        assert!(dup.unwrap_err().to_string().contains("UNIQUE"));

        let rent = create_category(&db, "Necklaces", ListingType::Rent).await.unwrap();
        assert_eq!(rent.listing_type, "rent");

        let both = resolve_category_slug(&db, "necklaces", None).await.unwrap();
        assert_eq!(both.len(), 2);
        let only_rent = resolve_category_slug(&db, "necklaces", Some(ListingType::Rent))
            .await
            .unwrap();
        assert_eq!(only_rent, vec![rent.id]);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = init_in_memory().await.unwrap();
        let cat = create_category(&db, "Rings", ListingType::Buy).await.unwrap();

        let updated = update_category(&db, &cat.id, "Wedding Rings", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.slug, "wedding-rings");
        assert_eq!(updated.listing_type, "buy");

        assert!(update_category(&db, "missing", "X", None).await.unwrap().is_none());

        assert!(delete_category(&db, &cat.id).await.unwrap());
        assert!(!delete_category(&db, &cat.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_count_existing_categories() {
        let db = init_in_memory().await.unwrap();
        let cat = create_category(&db, "Anklets", ListingType::Buy).await.unwrap();
        let ids = vec![cat.id.clone(), "nope".to_string()];
        assert_eq!(count_existing_categories(&db, &ids).await.unwrap(), 1);
    }
}
