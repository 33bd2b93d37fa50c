use std::sync::Arc;

use service_core::error::AppError;

use super::{
    custom::CustomStrategy,
    dev::DevStrategy,
    federated::{FederatedStrategy, HttpIdentityProvider},
    AuthStrategy, SessionManager,
};
use crate::config::{AuthStrategyKind, SchoolConfig};
use crate::services::{ServiceError, Stores};

/// Build the strategy named by `AUTH_STRATEGY` and run its start-up
/// provisioning. Any failure here must stop the process before it serves.
pub async fn resolve_strategy(
    config: &SchoolConfig,
    stores: &Stores,
    sessions: SessionManager,
) -> Result<Arc<dyn AuthStrategy>, AppError> {
    let strategy: Arc<dyn AuthStrategy> = match config.auth.strategy {
        AuthStrategyKind::Dev => {
            if config.is_prod() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "The dev auth strategy cannot run in production"
                )));
            }
            let dev = DevStrategy::new(config, stores, sessions);
            dev.provision().await.map_err(startup_error)?;
            Arc::new(dev)
        }
        AuthStrategyKind::Custom => {
            let custom = CustomStrategy::new(config, stores, sessions).map_err(startup_error)?;
            custom.provision_admin().await.map_err(startup_error)?;
            Arc::new(custom)
        }
        AuthStrategyKind::Federated => {
            let provider_config = config.federated.as_ref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("Federated provider settings are missing"))
            })?;
            let provider = HttpIdentityProvider::new(provider_config).map_err(startup_error)?;
            let federated = FederatedStrategy::new(config, stores, sessions, Arc::new(provider))
                .map_err(startup_error)?;
            federated.provision().await.map_err(startup_error)?;
            Arc::new(federated)
        }
    };

    tracing::info!(strategy = strategy.kind().as_str(), "Auth strategy selected");
    Ok(strategy)
}

fn startup_error(err: ServiceError) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("Auth strategy start-up failed: {}", err))
}
