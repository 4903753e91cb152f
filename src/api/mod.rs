pub mod auth;
mod cart;
mod categories;
pub mod error;
mod oauth;
mod orders;
mod products;
pub mod rate_limit;
mod upload;
pub mod validation;
mod wishlist;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::AppState;

/// Room for multipart framing around the largest accepted file
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential endpoints share the per-IP limiter
    let credential_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/verify", post(auth::verify))
        .route("/resend-otp", post(auth::resend_otp))
        .route("/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let auth_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/oauth/google", get(oauth::google_auth_url))
        .route("/oauth/google/callback", post(oauth::google_callback))
        .merge(credential_routes);

    let api_routes = Router::new()
        // Cart
        .route(
            "/cart",
            get(cart::get_cart)
                .post(cart::add_to_cart)
                .put(cart::update_cart)
                .delete(cart::remove_from_cart),
        )
        .route("/cart/count", get(cart::cart_count))
        // Orders
        .route("/orders", get(orders::list_orders).post(orders::checkout))
        .route("/orders/:id", put(orders::update_order_status))
        // Catalog
        .route("/products", get(products::list_products))
        .route("/products/:id", get(products::get_product))
        .route("/search/suggestions", get(products::search_suggestions))
        .route("/admin/products", post(products::create_product))
        .route(
            "/admin/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Categories
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/:id",
            put(categories::update_category).delete(categories::delete_category),
        )
        // Wishlist
        .route(
            "/wishlist",
            get(wishlist::list_wishlist).post(wishlist::toggle_wishlist),
        )
        .route("/wishlist/toggle", post(wishlist::toggle_wishlist))
        .route("/wishlist/check", post(wishlist::check_wishlist))
        .route("/wishlist/bulk-check", post(wishlist::bulk_check_wishlist))
        .route("/wishlist/:product_id", delete(wishlist::remove_from_wishlist))
        // Media
        .route(
            "/upload-image",
            post(upload::upload_image).layer(DefaultBodyLimit::max(
                state.config.media.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
            )),
        )
        .nest("/auth", auth_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin without credentials, or the configured origins with cookies allowed
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn health_check() -> &'static str {
    "OK"
}
