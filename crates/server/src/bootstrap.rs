use std::sync::Arc;

use fitsync_core::config::{AppConfig, ConfigError};
use fitsync_core::WebhookVerifier;
use fitsync_db::repositories::SqlCustomerRepository;
use fitsync_db::{connect_with_config, migrations, DbPool};
use fitsync_shopify::{
    register_customer_webhooks, MetafieldSync, NoopMetafieldSync, ShopifyClient,
    ShopifyMetafieldSync, SyncError,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg(test)]
pub async fn bootstrap(
    options: fitsync_core::config::LoadOptions,
) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let sync = metafield_sync(&config).await;
    let state = AppState::new(
        Arc::new(SqlCustomerRepository::new(db_pool.clone())),
        sync,
        WebhookVerifier::new(Some(config.webhook.shared_secret.clone())),
    );

    Ok(Application { config, db_pool, state })
}

/// Shopify-backed sync when credentials are present, otherwise a no-op.
async fn metafield_sync(config: &AppConfig) -> Arc<dyn MetafieldSync> {
    let client = match ShopifyClient::from_config(&config.shopify) {
        Ok(client) => client,
        Err(SyncError::NotConfigured) => {
            info!(
                event_name = "system.bootstrap.shopify_disabled",
                correlation_id = "bootstrap",
                "shopify credentials not configured; metafield sync disabled"
            );
            return Arc::new(NoopMetafieldSync);
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.shopify_unavailable",
                correlation_id = "bootstrap",
                error = %error,
                "shopify client could not be built; metafield sync disabled"
            );
            return Arc::new(NoopMetafieldSync);
        }
    };

    info!(
        event_name = "system.bootstrap.shopify_enabled",
        correlation_id = "bootstrap",
        admin_url = client.admin_url(),
        "shopify metafield sync enabled"
    );

    if let Some(public_base_url) = config.shopify.webhook_base_url.as_deref() {
        let registrations = register_customer_webhooks(&client, public_base_url).await;
        let failed =
            registrations.iter().filter(|registration| registration.outcome.is_err()).count();
        if failed > 0 {
            warn!(
                event_name = "system.bootstrap.webhooks_incomplete",
                correlation_id = "bootstrap",
                failed,
                "some shopify webhook subscriptions could not be registered"
            );
        }
    }

    Arc::new(ShopifyMetafieldSync::new(client))
}
