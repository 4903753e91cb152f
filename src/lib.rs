pub mod api;
pub mod config;
pub mod db;
pub mod media;
pub mod notifications;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::media::ImageHost;
use crate::notifications::Mailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub mailer: Arc<dyn Mailer>,
    pub image_host: Arc<dyn ImageHost>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State wired from configuration: SMTP mailer and image host when configured
    pub fn new(config: Config, db: DbPool) -> Self {
        let mailer = notifications::from_config(&config.email);
        let image_host = media::from_config(&config.media);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            mailer,
            image_host,
            rate_limiter,
        }
    }

    /// Replace the mailer
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Replace the image host
    pub fn with_image_host(mut self, image_host: Arc<dyn ImageHost>) -> Self {
        self.image_host = image_host;
        self
    }
}
