use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::service::AuthService;
use crate::auth::store::PgUserStore;
use crate::config::AppConfig;
use crate::email;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let store = Arc::new(PgUserStore::new(db.clone()));
        let mailer = Arc::from(email::from_config(&config.smtp)?);
        let auth = AuthService::new(store, mailer, &config.auth);

        Ok(Self { db, config, auth })
    }
}
