//! Fixtures shared by the model tests.

use sqlx::SqlitePool;

use super::common::ListingType;
use super::product::{create_product, Product, ProductFields};
use super::user::{auth_providers, create_user, NewUser, Role, User};

pub async fn seed_user(db: &SqlitePool, email: &str) -> User {
    create_user(
        db,
        &NewUser {
            name: "Test User",
            email,
            password_hash: "",
            verified: true,
            otp_hash: None,
            otp_expires_at: None,
            role: Role::User,
            auth_provider: auth_providers::CREDENTIALS,
        },
    )
    .await
    .unwrap()
}

pub async fn seed_product(
    db: &SqlitePool,
    title: &str,
    price: f64,
    rental_price: Option<f64>,
    listing_type: ListingType,
) -> Product {
    create_product(
        db,
        &ProductFields {
            title: title.to_string(),
            description: format!("{} for testing", title),
            price,
            rental_price,
            stock: 10,
            listing_type,
            images: Vec::new(),
            category_ids: Vec::new(),
            tags: Vec::new(),
            rating: 0.0,
            reviews: Vec::new(),
            is_featured: false,
        },
    )
    .await
    .unwrap()
}
