use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod dispute_repository;
pub mod payment_repository;
pub mod webhook_log_repository;

pub use dispute_repository::{DisputeDetails, DisputeRepository, ParticipantWithUser};
pub use payment_repository::PaymentRepository;
pub use webhook_log_repository::{NewWebhookLog, WebhookLogRepository};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}
