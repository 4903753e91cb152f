//! Order models. An order is an immutable snapshot of a cart taken at checkout;
//! only its status changes afterwards, and only at the owner's request.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;

use super::common::round_amount;
use super::product::{self, unit_price, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PaymentMethod {
    #[serde(rename = "COD")]
    Cod,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::Online => "Online",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "COD" => Some(PaymentMethod::Cod),
            "Online" => Some(PaymentMethod::Online),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "cancelled" | "canceled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// A pending order may be cancelled; rewriting the current status is a no-op.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        *self == next || matches!((self, next), (OrderStatus::Pending, OrderStatus::Cancelled))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderRow {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub total_amount: f64,
    pub address: String,
    pub payment_method: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(skip)]
    pub order_id: String,
    pub position: i64,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(flatten)]
    pub line: OrderLine,
    /// Current product details; `None` once the product has been deleted
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(flatten)]
    pub order: OrderRow,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub address: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: String,
    pub total_amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateOrderStatusResponse {
    pub success: bool,
    pub order: OrderRow,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
}

/// Outcome of a status change requested by an order's owner
#[derive(Debug)]
pub enum StatusUpdate {
    Updated(OrderRow),
    NotFound,
    Rejected { current: String },
}

#[derive(FromRow)]
struct PricedCartLine {
    product_id: String,
    quantity: i64,
    start_date: Option<String>,
    end_date: Option<String>,
    #[sqlx(rename = "type")]
    listing_type: String,
    price: f64,
    rental_price: Option<f64>,
}

/// Turn the user's cart into a pending order and empty the cart, atomically.
/// Returns `None` when the cart is empty, in which case nothing is written.
pub async fn checkout(
    db: &SqlitePool,
    user_id: &str,
    user_email: &str,
    address: &str,
    payment_method: PaymentMethod,
) -> Result<Option<OrderRow>, sqlx::Error> {
    let mut tx = db.begin().await?;

    let lines: Vec<PricedCartLine> = sqlx::query_as(
        r#"
        SELECT ci.product_id, ci.quantity, ci.start_date, ci.end_date,
               p.type, p.price, p.rental_price
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        JOIN products p ON p.id = ci.product_id
        WHERE c.user_id = ?
        ORDER BY ci.position
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
        return Ok(None);
    }

    let total = round_amount(
        lines
            .iter()
            .map(|l| unit_price(&l.listing_type, l.price, l.rental_price) * l.quantity as f64)
            .sum(),
    );

    let order_id = uuid::Uuid::new_v4().to_string();
    let now = crate::db::now();

    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, user_email, total_amount, address, payment_method,
                            status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&order_id)
    .bind(user_id)
    .bind(user_email)
    .bind(total)
    .bind(address.trim())
    .bind(payment_method.as_str())
    .bind(OrderStatus::Pending.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, position, product_id, quantity, unit_price,
                                     start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order_id)
        .bind(position as i64)
        .bind(&line.product_id)
        .bind(line.quantity)
        .bind(unit_price(&line.listing_type, line.price, line.rental_price))
        .bind(&line.start_date)
        .bind(&line.end_date)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM cart_items WHERE cart_id = (SELECT id FROM carts WHERE user_id = ?)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let order: OrderRow = sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(&order_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(order))
}

/// The user's orders, newest first, with line items and current product details
pub async fn list_orders(db: &SqlitePool, user_id: &str) -> Result<Vec<Order>, sqlx::Error> {
    let orders: Vec<OrderRow> =
        sqlx::query_as("SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC, rowid DESC")
            .bind(user_id)
            .fetch_all(db)
            .await?;

    let lines: Vec<OrderLine> = sqlx::query_as(
        r#"
        SELECT oi.* FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        WHERE o.user_id = ?
        ORDER BY oi.order_id, oi.position
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let mut product_ids: Vec<String> = lines.iter().map(|l| l.product_id.clone()).collect();
    product_ids.sort();
    product_ids.dedup();
    let products = product::load_products(db, &product_ids).await?;

    let mut by_order: std::collections::HashMap<String, Vec<OrderItem>> =
        std::collections::HashMap::new();
    for line in lines {
        let product = products.get(&line.product_id).cloned();
        by_order
            .entry(line.order_id.clone())
            .or_default()
            .push(OrderItem { line, product });
    }

    Ok(orders
        .into_iter()
        .map(|order| Order {
            items: by_order.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect())
}

pub async fn find_user_order(
    db: &SqlitePool,
    order_id: &str,
    user_id: &str,
) -> Result<Option<OrderRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = ? AND user_id = ?")
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
}

/// Change the status of one of the user's own orders, enforcing the allowed transitions.
pub async fn update_order_status(
    db: &SqlitePool,
    order_id: &str,
    user_id: &str,
    next: OrderStatus,
) -> Result<StatusUpdate, sqlx::Error> {
    let Some(order) = find_user_order(db, order_id, user_id).await? else {
        return Ok(StatusUpdate::NotFound);
    };

    let allowed = OrderStatus::parse(&order.status)
        .map(|current| current.can_transition_to(next))
        .unwrap_or(false);
    if !allowed {
        return Ok(StatusUpdate::Rejected {
            current: order.status,
        });
    }

    // The WHERE on the previous status keeps a concurrent change from being overwritten.
    let updated: Option<OrderRow> = sqlx::query_as(
        r#"
        UPDATE orders SET status = ?, updated_at = ?
        WHERE id = ? AND user_id = ? AND status = ?
        RETURNING *
        "#,
    )
    .bind(next.as_str())
    .bind(crate::db::now())
    .bind(order_id)
    .bind(user_id)
    .bind(&order.status)
    .fetch_optional(db)
    .await?;

    match updated {
        Some(order) => Ok(StatusUpdate::Updated(order)),
        None => {
            let current = find_user_order(db, order_id, user_id)
                .await?
                .map(|o| o.status)
                .unwrap_or_default();
            Ok(StatusUpdate::Rejected { current })
        }
    }
}
