//! Cart models. Each user owns at most one cart, holding at most one line per product.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::product::{self, Product};

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub position: i64,
    pub added_at: String,
}

/// Cart line with its product joined in
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(flatten)]
    pub line: CartLine,
    pub product: Product,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Option<String>,
    pub quantity: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartRequest {
    pub product_id: Option<String>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFromCartRequest {
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CartMutationResponse {
    pub message: String,
    pub item: Option<CartLine>,
}

/// A validated line to add
#[derive(Debug, Clone)]
pub struct NewCartLine {
    pub product_id: String,
    pub quantity: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Result of adding to a cart: whether a fresh line was appended or an existing
/// line had its quantity raised
#[derive(Debug, Clone, PartialEq)]
pub enum CartAddition {
    Added(CartLine),
    Incremented(CartLine),
}

impl CartAddition {
    pub fn line(&self) -> &CartLine {
        match self {
            CartAddition::Added(line) | CartAddition::Incremented(line) => line,
        }
    }
}

const LINE_COLUMNS: &str = "product_id, quantity, start_date, end_date, position, added_at";

pub async fn list_cart(db: &SqlitePool, user_id: &str) -> Result<Vec<CartItem>, sqlx::Error> {
    let lines: Vec<CartLine> = sqlx::query_as(&format!(
        "SELECT {} FROM cart_items WHERE cart_id = (SELECT id FROM carts WHERE user_id = ?) ORDER BY position",
        LINE_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let ids: Vec<String> = lines.iter().map(|l| l.product_id.clone()).collect();
    let mut products = product::load_products(db, &ids).await?;

    Ok(lines
        .into_iter()
        .filter_map(|line| {
            products
                .remove(&line.product_id)
                .map(|product| CartItem { line, product })
        })
        .collect())
}

/// Add `quantity` units of a product, creating the cart on first use. An existing
/// line for the product is incremented in place; supplied rental dates replace
/// the stored ones.
pub async fn add_to_cart(
    db: &SqlitePool,
    user_id: &str,
    new: &NewCartLine,
) -> Result<CartAddition, sqlx::Error> {
    let now = crate::db::now();
    let mut tx = db.begin().await?;

    let (cart_id,): (String,) = sqlx::query_as(
        r#"
        INSERT INTO carts (id, user_id, created_at, updated_at) VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await?;

    let line: CartLine = sqlx::query_as(&format!(
        r#"
        INSERT INTO cart_items (cart_id, product_id, quantity, start_date, end_date, position, added_at)
        VALUES (?1, ?2, ?3, ?4, ?5,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM cart_items WHERE cart_id = ?1), ?6)
        ON CONFLICT(cart_id, product_id) DO UPDATE SET
            quantity = cart_items.quantity + excluded.quantity,
            start_date = COALESCE(excluded.start_date, cart_items.start_date),
            end_date = COALESCE(excluded.end_date, cart_items.end_date)
        RETURNING {}
        "#,
        LINE_COLUMNS
    ))
    .bind(&cart_id)
    .bind(&new.product_id)
    .bind(new.quantity)
    .bind(&new.start_date)
    .bind(&new.end_date)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    // Stored quantities are at least 1, so a line that already existed now exceeds
    // the requested amount.
    if line.quantity > new.quantity {
        Ok(CartAddition::Incremented(line))
    } else {
        Ok(CartAddition::Added(line))
    }
}

/// Overwrite a line's quantity. Returns `None` when the user has no cart or no
/// line for the product.
pub async fn update_cart_quantity(
    db: &SqlitePool,
    user_id: &str,
    product_id: &str,
    quantity: i64,
) -> Result<Option<CartLine>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        UPDATE cart_items SET quantity = ?
        WHERE product_id = ? AND cart_id = (SELECT id FROM carts WHERE user_id = ?)
        RETURNING {}
        "#,
        LINE_COLUMNS
    ))
    .bind(quantity)
    .bind(product_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
}

/// Remove a line. Returns whether anything was deleted; absence is not an error.
pub async fn remove_from_cart(
    db: &SqlitePool,
    user_id: &str,
    product_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM cart_items WHERE product_id = ? AND cart_id = (SELECT id FROM carts WHERE user_id = ?)",
    )
    .bind(product_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Total units across all lines of the user's cart
pub async fn cart_count(db: &SqlitePool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(ci.quantity), 0) FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        WHERE c.user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::common::ListingType;
    use crate::db::product::{create_product, ProductFields};
    use crate::db::test_support::{seed_product, seed_user};
    use crate::db::init_in_memory;

    fn line(product_id: &str, quantity: i64) -> NewCartLine {
        NewCartLine {
            product_id: product_id.to_string(),
            quantity,
            start_date: None,
            end_date: None,
        }
    }

    #[tokio::test]
    async fn test_adding_twice_increments_single_line() {
        let db = init_in_memory().await.unwrap();
        let user = seed_user(&db, "cart@example.com").await;
        let product = seed_product(&db, "Ring", 100.0, None, ListingType::Buy).await;

        let first = add_to_cart(&db, &user.id, &line(&product.id, 2)).await.unwrap();
        assert!(matches!(first, CartAddition::Added(_)));

        let second = add_to_cart(&db, &user.id, &line(&product.id, 3)).await.unwrap();
        assert!(matches!(second, CartAddition::Incremented(_)));
        assert_eq!(second.line().quantity, 5);

        let items = list_cart(&db, &user.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line.quantity, 5);
        assert_eq!(items[0].product.title, "Ring");
        assert_eq!(cart_count(&db, &user.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_lines_keep_insertion_order_and_dates() {
        let db = init_in_memory().await.unwrap();
        let user = seed_user(&db, "order@example.com").await;
        let a = seed_product(&db, "A", 1.0, None, ListingType::Buy).await;
        let b = seed_product(&db, "B", 1.0, Some(0.5), ListingType::Rent).await;

        add_to_cart(&db, &user.id, &line(&b.id, 1)).await.unwrap();
        add_to_cart(&db, &user.id, &line(&a.id, 1)).await.unwrap();
        let dated = NewCartLine {
            start_date: Some("2026-01-01".into()),
            end_date: Some("2026-01-03".into()),
            ..line(&b.id, 1)
        };
        add_to_cart(&db, &user.id, &dated).await.unwrap();

        let items = list_cart(&db, &user.id).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.line.product_id.clone()).collect();
        assert_eq!(ids, vec![b.id.clone(), a.id.clone()]);
        assert_eq!(items[0].line.start_date.as_deref(), Some("2026-01-01"));
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let db = init_in_memory().await.unwrap();
        let user = seed_user(&db, "u@example.com").await;
        let product = create_product(
            &db,
            &ProductFields {
                title: "Locket".into(),
                description: "Silver".into(),
                price: 10.0,
                rental_price: None,
                stock: 1,
                listing_type: ListingType::Buy,
                images: vec![],
                category_ids: vec![],
                tags: vec![],
                rating: 0.0,
                reviews: vec![],
                is_featured: false,
            },
        )
        .await
        .unwrap();

        assert!(update_cart_quantity(&db, &user.id, &product.id, 4).await.unwrap().is_none());

        add_to_cart(&db, &user.id, &line(&product.id, 1)).await.unwrap();
        let updated = update_cart_quantity(&db, &user.id, &product.id, 4).await.unwrap();
        assert_eq!(updated.unwrap().quantity, 4);

        assert!(remove_from_cart(&db, &user.id, &product.id).await.unwrap());
        assert!(!remove_from_cart(&db, &user.id, &product.id).await.unwrap());
        assert!(list_cart(&db, &user.id).await.unwrap().is_empty());
        assert_eq!(cart_count(&db, &user.id).await.unwrap(), 0);
    }
}
