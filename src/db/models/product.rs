//! Product catalog models and queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

use super::category::{self, Category};
use super::common::{
    nullable_field, parse_json_list, serialize_json_list, ListingType, PageRequest,
};

/// Product as stored; list columns hold JSON arrays
#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub rental_price: Option<f64>,
    pub stock: i64,
    #[sqlx(rename = "type")]
    pub listing_type: String,
    pub images: String,
    pub tags: String,
    pub rating: f64,
    pub reviews: String,
    pub is_featured: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub rental_price: Option<f64>,
    pub stock: i64,
    #[serde(rename = "type")]
    pub listing_type: String,
    pub images: Vec<ProductImage>,
    pub categories: Vec<Category>,
    pub tags: Vec<String>,
    pub rating: f64,
    pub reviews: Vec<serde_json::Value>,
    pub is_featured: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ProductRow {
    pub fn into_product(self, categories: Vec<Category>) -> Product {
        Product {
            images: parse_json_list(&self.images),
            tags: parse_json_list(&self.tags),
            reviews: parse_json_list(&self.reviews),
            id: self.id,
            title: self.title,
            description: self.description,
            price: self.price,
            rental_price: self.rental_price,
            stock: self.stock,
            listing_type: self.listing_type,
            categories,
            rating: self.rating,
            is_featured: self.is_featured,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Product {
    /// Price charged per unit at checkout: the rental price for rent listings
    /// (list price when none is set), the list price otherwise.
    pub fn unit_price(&self) -> f64 {
        unit_price(&self.listing_type, self.price, self.rental_price)
    }
}

pub fn unit_price(listing_type: &str, price: f64, rental_price: Option<f64>) -> f64 {
    if listing_type == ListingType::Rent.as_str() {
        rental_price.unwrap_or(price)
    } else {
        price
    }
}

/// Admin create/update payload. Every field is optional so that the same body
/// serves partial updates; create-time requirements are checked by the handler.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    /// `null` clears the rental price on update
    #[serde(default, deserialize_with = "nullable_field")]
    pub rental_price: Option<Option<f64>>,
    pub stock: Option<i64>,
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
    pub images: Option<Vec<ProductImage>>,
    pub categories: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub rating: Option<f64>,
    pub reviews: Option<Vec<serde_json::Value>>,
    pub is_featured: Option<bool>,
}

/// Fully validated product fields
#[derive(Debug, Clone)]
pub struct ProductFields {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub rental_price: Option<f64>,
    pub stock: i64,
    pub listing_type: ListingType,
    pub images: Vec<ProductImage>,
    pub category_ids: Vec<String>,
    pub tags: Vec<String>,
    pub rating: f64,
    pub reviews: Vec<serde_json::Value>,
    pub is_featured: bool,
}

/// Validated partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    /// `Some(None)` clears the rental price
    pub rental_price: Option<Option<f64>>,
    pub stock: Option<i64>,
    pub listing_type: Option<ListingType>,
    pub images: Option<Vec<ProductImage>>,
    pub category_ids: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub rating: Option<f64>,
    pub reviews: Option<Vec<serde_json::Value>>,
    pub is_featured: Option<bool>,
}

// -------------------------------------------------------------------------
// Catalog listing
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    PriceLow,
    PriceHigh,
    Rating,
    Name,
    #[default]
    Newest,
}

impl SortKey {
    /// Unknown keys fall back to newest-first
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "price-low" => SortKey::PriceLow,
            "price-high" => SortKey::PriceHigh,
            "rating" => SortKey::Rating,
            "name" => SortKey::Name,
            _ => SortKey::Newest,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            SortKey::PriceLow => "p.price ASC, p.rowid DESC",
            SortKey::PriceHigh => "p.price DESC, p.rowid DESC",
            SortKey::Rating => "p.rating DESC, p.rowid DESC",
            SortKey::Name => "p.title COLLATE NOCASE ASC, p.rowid DESC",
            SortKey::Newest => "p.created_at DESC, p.rowid DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub listing_type: Option<ListingType>,
    pub category_slug: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search: Option<String>,
    pub sort: SortKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total_products: i64,
    pub total_pages: i64,
    pub current_page: i64,
}

impl ProductPage {
    fn empty(page: &PageRequest) -> Self {
        Self {
            products: Vec::new(),
            total_products: 0,
            total_pages: 0,
            current_page: page.page,
        }
    }
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Lowercased title, description and tags, one per line, as stored in
/// `products.search_text`
pub fn search_text(title: &str, description: &str, tags: &[String]) -> String {
    let mut lines: Vec<&str> = Vec::with_capacity(tags.len() + 2);
    lines.push(title);
    lines.push(description);
    lines.extend(tags.iter().map(String::as_str));
    lines.join("\n").to_lowercase()
}

/// Fill `search_text` for rows written before the column existed
pub async fn backfill_search_text(db: &SqlitePool) -> Result<usize, sqlx::Error> {
    let rows: Vec<(String, String, String, String)> = sqlx::query_as(
        "SELECT id, title, description, tags FROM products WHERE search_text = ''",
    )
    .fetch_all(db)
    .await?;

    for (id, title, description, tags) in &rows {
        let tags: Vec<String> = parse_json_list(tags);
        sqlx::query("UPDATE products SET search_text = ? WHERE id = ?")
            .bind(search_text(title, description, &tags))
            .bind(id)
            .execute(db)
            .await?;
    }
    Ok(rows.len())
}

fn push_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    filter: &CatalogFilter,
    category_ids: Option<&[String]>,
) {
    qb.push(" WHERE 1 = 1");

    if let Some(t) = filter.listing_type {
        qb.push(" AND p.type = ").push_bind(t.as_str());
    }

    if let Some(ids) = category_ids {
        qb.push(
            " AND EXISTS (SELECT 1 FROM product_categories pc \
             WHERE pc.product_id = p.id AND pc.category_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        qb.push("))");
    }

    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ").push_bind(max);
    }

    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = like_pattern(term);
        qb.push(" AND p.search_text LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\'");
    }
}

/// Filter, sort and paginate the catalog. A category slug that names no category
/// yields an empty page rather than an error.
pub async fn list_products(
    db: &SqlitePool,
    filter: &CatalogFilter,
    page: PageRequest,
) -> Result<ProductPage, sqlx::Error> {
    let category_ids = match filter.category_slug.as_deref().map(str::trim) {
        Some(slug) if !slug.is_empty() => {
            let ids = category::resolve_category_slug(db, slug, filter.listing_type).await?;
            if ids.is_empty() {
                return Ok(ProductPage::empty(&page));
            }
            Some(ids)
        }
        _ => None,
    };

    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM products p");
    push_filters(&mut count_qb, filter, category_ids.as_deref());
    let total: i64 = count_qb.build_query_scalar().fetch_one(db).await?;

    let mut qb = QueryBuilder::new("SELECT p.* FROM products p");
    push_filters(&mut qb, filter, category_ids.as_deref());
    qb.push(" ORDER BY ")
        .push(filter.sort.order_by())
        .push(" LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(db).await?;

    Ok(ProductPage {
        products: attach_categories(db, rows).await?,
        total_products: total,
        total_pages: page.total_pages(total),
        current_page: page.page,
    })
}

#[derive(FromRow)]
struct ProductCategoryRow {
    product_id: String,
    #[sqlx(flatten)]
    category: Category,
}

async fn categories_for(
    db: &SqlitePool,
    product_ids: &[String],
) -> Result<HashMap<String, Vec<Category>>, sqlx::Error> {
    let mut map: HashMap<String, Vec<Category>> = HashMap::new();
    if product_ids.is_empty() {
        return Ok(map);
    }

    let mut qb = QueryBuilder::new(
        "SELECT pc.product_id, c.* FROM product_categories pc \
         JOIN categories c ON c.id = pc.category_id WHERE pc.product_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in product_ids {
        separated.push_bind(id.clone());
    }
    qb.push(") ORDER BY c.name COLLATE NOCASE");

    let rows: Vec<ProductCategoryRow> = qb.build_query_as().fetch_all(db).await?;
    for row in rows {
        map.entry(row.product_id).or_default().push(row.category);
    }
    Ok(map)
}

async fn attach_categories(
    db: &SqlitePool,
    rows: Vec<ProductRow>,
) -> Result<Vec<Product>, sqlx::Error> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let mut categories = categories_for(db, &ids).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let cats = categories.remove(&row.id).unwrap_or_default();
            row.into_product(cats)
        })
        .collect())
}

// -------------------------------------------------------------------------
// Single product access
// -------------------------------------------------------------------------

pub async fn get_product(db: &SqlitePool, id: &str) -> Result<Option<Product>, sqlx::Error> {
    let row: Option<ProductRow> = sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;

    match row {
        Some(row) => Ok(attach_categories(db, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

pub async fn product_exists(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

/// Load several products at once, keyed by id. Missing ids are simply absent.
pub async fn load_products(
    db: &SqlitePool,
    ids: &[String],
) -> Result<HashMap<String, Product>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb = QueryBuilder::new("SELECT * FROM products WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    qb.push(")");

    let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(db).await?;
    Ok(attach_categories(db, rows)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect())
}

async fn replace_category_links(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    product_id: &str,
    category_ids: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM product_categories WHERE product_id = ?")
        .bind(product_id)
        .execute(&mut **tx)
        .await?;

    for category_id in category_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO product_categories (product_id, category_id) VALUES (?, ?)",
        )
        .bind(product_id)
        .bind(category_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn create_product(db: &SqlitePool, fields: &ProductFields) -> Result<Product, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = crate::db::now();

    let mut tx = db.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO products (id, title, description, price, rental_price, stock, type, images,
                              tags, rating, reviews, is_featured, search_text, created_at,
                              updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.price)
    .bind(fields.rental_price)
    .bind(fields.stock)
    .bind(fields.listing_type.as_str())
    .bind(serialize_json_list(&fields.images))
    .bind(serialize_json_list(&fields.tags))
    .bind(fields.rating)
    .bind(serialize_json_list(&fields.reviews))
    .bind(fields.is_featured)
    .bind(search_text(&fields.title, &fields.description, &fields.tags))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    replace_category_links(&mut tx, &id, &fields.category_ids).await?;
    tx.commit().await?;

    get_product(db, &id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Apply a partial update. Returns `None` when the product does not exist.
pub async fn update_product(
    db: &SqlitePool,
    id: &str,
    patch: &ProductPatch,
) -> Result<Option<Product>, sqlx::Error> {
    let mut tx = db.begin().await?;

    let existing: Option<ProductRow> = sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(existing) = existing else {
        return Ok(None);
    };

    let title = patch.title.as_deref().unwrap_or(&existing.title);
    let description = patch.description.as_deref().unwrap_or(&existing.description);
    let tags: Vec<String> = match &patch.tags {
        Some(tags) => tags.clone(),
        None => parse_json_list(&existing.tags),
    };
    let images = match &patch.images {
        Some(images) => serialize_json_list(images),
        None => existing.images.clone(),
    };
    let reviews = match &patch.reviews {
        Some(reviews) => serialize_json_list(reviews),
        None => existing.reviews.clone(),
    };

    sqlx::query(
        r#"
        UPDATE products SET
            title = ?, description = ?, price = ?, rental_price = ?, stock = ?, type = ?,
            images = ?, tags = ?, rating = ?, reviews = ?, is_featured = ?, search_text = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(patch.price.unwrap_or(existing.price))
    .bind(patch.rental_price.unwrap_or(existing.rental_price))
    .bind(patch.stock.unwrap_or(existing.stock))
    .bind(
        patch
            .listing_type
            .map(|t| t.as_str())
            .unwrap_or(existing.listing_type.as_str()),
    )
    .bind(images)
    .bind(serialize_json_list(&tags))
    .bind(patch.rating.unwrap_or(existing.rating))
    .bind(reviews)
    .bind(patch.is_featured.unwrap_or(existing.is_featured))
    .bind(search_text(title, description, &tags))
    .bind(crate::db::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if let Some(category_ids) = &patch.category_ids {
        replace_category_links(&mut tx, id, category_ids).await?;
    }
    tx.commit().await?;

    get_product(db, id).await
}

pub async fn delete_product(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

// -------------------------------------------------------------------------
// Search suggestions
// -------------------------------------------------------------------------

pub const MAX_SUGGESTIONS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Product,
    Category,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Up to five suggestions for a search box: matching products first, with the
/// remaining slots filled by matching category names.
pub async fn search_suggestions(db: &SqlitePool, term: &str) -> Result<Vec<Suggestion>, sqlx::Error> {
    let pattern = like_pattern(term.trim());

    let rows: Vec<ProductRow> = sqlx::query_as(
        r#"
        SELECT * FROM products
        WHERE search_text LIKE ?1 ESCAPE '\'
        ORDER BY is_featured DESC, rating DESC, rowid DESC
        LIMIT ?2
        "#,
    )
    .bind(&pattern)
    .bind(MAX_SUGGESTIONS)
    .fetch_all(db)
    .await?;

    let mut suggestions: Vec<Suggestion> = rows
        .into_iter()
        .map(|row| {
            let image = parse_json_list::<ProductImage>(&row.images)
                .into_iter()
                .next()
                .map(|img| img.url);
            Suggestion {
                id: row.id,
                title: row.title,
                kind: SuggestionKind::Product,
                slug: None,
                price: Some(row.price),
                rating: Some(row.rating),
                image,
            }
        })
        .collect();

    let remaining = MAX_SUGGESTIONS - suggestions.len() as i64;
    if remaining > 0 {
        let needle = term.trim().to_lowercase();
        let categories: Vec<Category> = category::list_categories(db)
            .await?
            .into_iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .take(remaining as usize)
            .collect();

        suggestions.extend(categories.into_iter().map(|c| Suggestion {
            id: c.id,
            title: c.name,
            kind: SuggestionKind::Category,
            slug: Some(c.slug),
            price: None,
            rating: None,
            image: None,
        }));
    }

    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::category::create_category;
    use crate::db::init_in_memory;

    fn fields(title: &str, price: f64, listing_type: ListingType) -> ProductFields {
        ProductFields {
            title: title.to_string(),
            description: format!("{} description", title),
            price,
            rental_price: None,
            stock: 3,
            listing_type,
            images: vec![ProductImage {
                url: format!("https://img.example/{}.jpg", title),
                public_id: title.to_string(),
            }],
            category_ids: Vec::new(),
            tags: Vec::new(),
            rating: 0.0,
            reviews: Vec::new(),
            is_featured: false,
        }
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse("price-low"), SortKey::PriceLow);
        assert_eq!(SortKey::parse("price-high"), SortKey::PriceHigh);
        assert_eq!(SortKey::parse("rating"), SortKey::Rating);
        assert_eq!(SortKey::parse("name"), SortKey::Name);
        assert_eq!(SortKey::parse("newest"), SortKey::Newest);
        assert_eq!(SortKey::parse("relevance"), SortKey::Newest);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Gold"), "%gold%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("ÉCLAT"), "%éclat%");
    }

    #[test]
    fn test_search_text_lines() {
        let tags = vec!["Rose Gold".to_string(), "ÉTÉ".to_string()];
        assert_eq!(
            search_text("Ring", "Ombré band", &tags),
            "ring\nombré band\nrose gold\nété"
        );
    }

    #[test]
    fn test_unit_price() {
        assert_eq!(unit_price("buy", 100.0, Some(10.0)), 100.0);
        assert_eq!(unit_price("rent", 100.0, Some(10.0)), 10.0);
        assert_eq!(unit_price("rent", 100.0, None), 100.0);
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let db = init_in_memory().await.unwrap();
        create_product(&db, &fields("Ruby Ring", 300.0, ListingType::Buy)).await.unwrap();
        create_product(&db, &fields("Pearl Necklace", 100.0, ListingType::Buy)).await.unwrap();
        create_product(&db, &fields("Bridal Set", 200.0, ListingType::Rent)).await.unwrap();

        let filter = CatalogFilter {
            listing_type: Some(ListingType::Buy),
            sort: SortKey::PriceLow,
            ..Default::default()
        };
        let page = list_products(&db, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total_products, 2);
        assert_eq!(page.products[0].title, "Pearl Necklace");

        let filter = CatalogFilter {
            min_price: Some(150.0),
            max_price: Some(300.0),
            sort: SortKey::PriceHigh,
            ..Default::default()
        };
        let page = list_products(&db, &filter, PageRequest::default()).await.unwrap();
        let titles: Vec<_> = page.products.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Ruby Ring", "Bridal Set"]);

        let filter = CatalogFilter {
            search: Some("NECK".to_string()),
            ..Default::default()
        };
        let page = list_products(&db, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total_products, 1);
    }

    fn search(term: &str) -> CatalogFilter {
        CatalogFilter {
            search: Some(term.to_string()),
            ..Default::default()
        }
    }

    async fn search_total(db: &SqlitePool, term: &str) -> i64 {
        list_products(db, &search(term), PageRequest::default())
            .await
            .unwrap()
            .total_products
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let db = init_in_memory().await.unwrap();
        create_product(&db, &fields("ÉCLAT Rosé Ring", 90.0, ListingType::Buy)).await.unwrap();
        create_product(&db, &fields("Plain Band", 20.0, ListingType::Buy)).await.unwrap();

        assert_eq!(search_total(&db, "ÉCLAT").await, 1);
        assert_eq!(search_total(&db, "éclat").await, 1);
        assert_eq!(search_total(&db, "ROSÉ").await, 1);
        assert_eq!(search_total(&db, "Éclat Rosé Ring").await, 1);
    }

    #[tokio::test]
    async fn test_search_matches_tag_text_only() {
        let db = init_in_memory().await.unwrap();
        let mut tagged = fields("Solitaire", 500.0, ListingType::Buy);
        tagged.tags = vec!["gold".to_string(), "engagement".to_string()];
        create_product(&db, &tagged).await.unwrap();
        create_product(&db, &fields("Hoops", 40.0, ListingType::Buy)).await.unwrap();

        assert_eq!(search_total(&db, "ENGAGEMENT").await, 1);
        for term in ["[", "]", "\"", ",", "gold\",\"engagement", "gold engagement"] {
            assert_eq!(search_total(&db, term).await, 0, "term {:?}", term);
        }
    }

    #[tokio::test]
    async fn test_update_refreshes_search_text() {
        let db = init_in_memory().await.unwrap();
        let product = create_product(&db, &fields("Moon Pendant", 60.0, ListingType::Buy))
            .await
            .unwrap();

        let patch = ProductPatch {
            title: Some("Étoile Pendant".to_string()),
            tags: Some(vec!["Celestial".to_string()]),
            ..Default::default()
        };
        update_product(&db, &product.id, &patch).await.unwrap().unwrap();

        assert_eq!(search_total(&db, "ÉTOILE").await, 1);
        assert_eq!(search_total(&db, "celestial").await, 1);
        assert_eq!(search_total(&db, "moon").await, 0);
    }

    #[tokio::test]
    async fn test_backfill_search_text() {
        let db = init_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO products (id, title, description, price, type, tags, created_at, updated_at) \
             VALUES ('legacy-1', 'Ödön Brooch', 'Vintage', 15, 'buy', '[\"Art Deco\"]', ?1, ?1)",
        )
        .bind(crate::db::now())
        .execute(&db)
        .await
        .unwrap();
        assert_eq!(search_total(&db, "brooch").await, 0);

        assert_eq!(backfill_search_text(&db).await.unwrap(), 1);
        assert_eq!(search_total(&db, "ÖDÖN").await, 1);
        assert_eq!(search_total(&db, "art deco").await, 1);
        assert_eq!(backfill_search_text(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rental_price_can_be_cleared() {
        let db = init_in_memory().await.unwrap();
        let mut necklace = fields("Kundan Set", 900.0, ListingType::Rent);
        necklace.rental_price = Some(90.0);
        let necklace = create_product(&db, &necklace).await.unwrap();

        let keep = ProductPatch {
            stock: Some(1),
            ..Default::default()
        };
        let updated = update_product(&db, &necklace.id, &keep).await.unwrap().unwrap();
        assert_eq!(updated.rental_price, Some(90.0));

        let clear = ProductPatch {
            rental_price: Some(None),
            ..Default::default()
        };
        let updated = update_product(&db, &necklace.id, &clear).await.unwrap().unwrap();
        assert_eq!(updated.rental_price, None);
        assert_eq!(updated.unit_price(), 900.0);
    }

    #[tokio::test]
    async fn test_pagination_counts() {
        let db = init_in_memory().await.unwrap();
        for i in 0..5 {
            create_product(&db, &fields(&format!("Item {}", i), 10.0, ListingType::Buy))
                .await
                .unwrap();
        }

        let page = list_products(&db, &CatalogFilter::default(), PageRequest::new(Some(3), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total_products, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.products.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_category_slug_is_empty_page() {
        let db = init_in_memory().await.unwrap();
        create_product(&db, &fields("Anklet", 10.0, ListingType::Buy)).await.unwrap();

        let filter = CatalogFilter {
            category_slug: Some("does-not-exist".to_string()),
            ..Default::default()
        };
        let page = list_products(&db, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total_products, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.products.is_empty());
    }

    #[tokio::test]
    async fn test_category_filter_and_update() {
        let db = init_in_memory().await.unwrap();
        let rings = create_category(&db, "Rings", ListingType::Buy).await.unwrap();

        let mut ring = fields("Gold Band", 50.0, ListingType::Buy);
        ring.category_ids = vec![rings.id.clone()];
        let ring = create_product(&db, &ring).await.unwrap();
        let other = create_product(&db, &fields("Bangle", 20.0, ListingType::Buy)).await.unwrap();
        assert_eq!(ring.categories.len(), 1);

        let filter = CatalogFilter {
            category_slug: Some("rings".to_string()),
            ..Default::default()
        };
        let page = list_products(&db, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total_products, 1);
        assert_eq!(page.products[0].id, ring.id);

        let patch = ProductPatch {
            category_ids: Some(vec![rings.id.clone()]),
            price: Some(25.0),
            ..Default::default()
        };
        let updated = update_product(&db, &other.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.price, 25.0);
        assert_eq!(updated.title, "Bangle");
        assert_eq!(updated.categories[0].slug, "rings");

        assert!(update_product(&db, "missing", &patch).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_load() {
        let db = init_in_memory().await.unwrap();
        let a = create_product(&db, &fields("A", 1.0, ListingType::Buy)).await.unwrap();
        let b = create_product(&db, &fields("B", 2.0, ListingType::Rent)).await.unwrap();

        let loaded = load_products(&db, &[a.id.clone(), b.id.clone(), "x".into()]).await.unwrap();
        assert_eq!(loaded.len(), 2);

        assert!(delete_product(&db, &a.id).await.unwrap());
        assert!(!delete_product(&db, &a.id).await.unwrap());
        assert!(get_product(&db, &a.id).await.unwrap().is_none());
        assert!(product_exists(&db, &b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_suggestions_fill_with_categories() {
        let db = init_in_memory().await.unwrap();
        create_product(&db, &fields("Gold Chain", 10.0, ListingType::Buy)).await.unwrap();
        create_category(&db, "Gold Sets", ListingType::Rent).await.unwrap();

        let suggestions = search_suggestions(&db, "gold").await.unwrap();
        assert_eq!(suggestions.len(), 2);
        assert!(matches!(suggestions[0].kind, SuggestionKind::Product));
        assert_eq!(suggestions[0].image.as_deref(), Some("https://img.example/Gold Chain.jpg"));
        assert!(matches!(suggestions[1].kind, SuggestionKind::Category));
        assert_eq!(suggestions[1].slug.as_deref(), Some("gold-sets"));
    }

    #[tokio::test]
    async fn test_suggestions_fold_non_ascii_case() {
        let db = init_in_memory().await.unwrap();
        create_product(&db, &fields("ÉCLAT Studs", 30.0, ListingType::Buy)).await.unwrap();
        create_category(&db, "Émeraude", ListingType::Buy).await.unwrap();

        let suggestions = search_suggestions(&db, "éclat").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "ÉCLAT Studs");

        let suggestions = search_suggestions(&db, "ÉMER").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert!(matches!(suggestions[0].kind, SuggestionKind::Category));
    }
}
