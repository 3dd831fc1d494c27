pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod models;
pub mod response;
pub mod rest;
pub mod store;
pub mod uploads;
pub mod validation;

use std::sync::Arc;

use config::Config;
use credentials::TokenKeys;
use store::UserStore;
use uploads::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub tokens: TokenKeys,
    pub uploads: UploadStore,
    pub public_base_url: Arc<str>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            tokens: TokenKeys::from_secret(config.jwt_secret.as_bytes(), config.token_ttl),
            uploads: UploadStore::new(
                &config.upload_dir,
                config.max_upload_bytes,
                &config.document_fields,
            ),
            public_base_url: config.public_base_url.as_str().into(),
        }
    }
}
