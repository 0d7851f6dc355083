pub mod disputes;
pub mod health;
pub mod matches;
pub mod payment_webhooks;
pub mod payments;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::services::{
    checksum::PayloadSigner, disputes::DisputeService, encryption::EncryptionService,
    match_resolution::MatchResolutionService, payments::PaymentService, webhooks::WebhookService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub payments: Arc<PaymentService>,
    pub webhooks: Arc<WebhookService>,
    pub disputes: Arc<DisputeService>,
    pub match_resolution: Arc<MatchResolutionService>,
}

impl AppServices {
    /// Builds every service from the shared pool. Fails only if the encryption key cannot be
    /// derived from the configured secret.
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig) -> Result<Self, ServiceError> {
        let encryption = Arc::new(EncryptionService::new(&config.encryption_secret)?);
        let signer = config
            .gateway_checksum_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(PayloadSigner::new);

        Ok(Self {
            payments: Arc::new(PaymentService::new(db.clone(), encryption, signer)),
            webhooks: Arc::new(WebhookService::new(
                db.clone(),
                config.payment_webhook_secret.clone(),
            )),
            disputes: Arc::new(DisputeService::new(db.clone())),
            match_resolution: Arc::new(MatchResolutionService::new(db)),
        })
    }
}
