use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::TokenKeys;
use crate::cache::CatalogCache;
use crate::config::Config;
use crate::email::{self, Mailer};
use crate::images::{CloudinaryStore, ImageStore, LocalImageStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Best-effort lookup cache for catalog reads
    pub cache: CatalogCache,
    /// Cover image storage
    pub images: Arc<dyn ImageStore>,
    /// Outgoing email
    pub mailer: Arc<dyn Mailer>,
    /// JWT signing keys
    pub tokens: Arc<TokenKeys>,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state with the backends selected by `config`
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let images: Arc<dyn ImageStore> = if config.images.is_remote() {
            tracing::info!("Storing images on Cloudinary ({})", config.images.cloud_name);
            Arc::new(CloudinaryStore::new(&config.images))
        } else {
            tracing::info!("Storing images under {}", config.root_dir.display());
            Arc::new(LocalImageStore::new(config.root_dir.clone()))
        };

        Self {
            db: Arc::new(db),
            cache: CatalogCache::in_memory(&config.cache),
            images,
            mailer: email::from_config(&config.email),
            tokens: Arc::new(TokenKeys::new(&config.auth)),
            config: Arc::new(config),
        }
    }

    /// Replace the image store and mailer, keeping everything else
    pub fn with_backends(mut self, images: Arc<dyn ImageStore>, mailer: Arc<dyn Mailer>) -> Self {
        self.images = images;
        self.mailer = mailer;
        self
    }
}
