use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::webhook_log::{self, WebhookLogStatus};
use crate::errors::AppError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Fields captured from a delivery before it is processed.
#[derive(Debug, Clone)]
pub struct NewWebhookLog {
    pub webhook_id: String,
    pub event_type: String,
    pub order_reference: Option<String>,
    pub raw_payload: String,
    pub signature_header: Option<String>,
}

impl NewWebhookLog {
    fn into_active_model(self, status: WebhookLogStatus) -> webhook_log::ActiveModel {
        webhook_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            webhook_id: Set(self.webhook_id),
            event_type: Set(self.event_type),
            order_reference: Set(self.order_reference),
            raw_payload: Set(self.raw_payload),
            signature_header: Set(self.signature_header),
            status: Set(status),
            result: Set(None),
            error_message: Set(None),
            received_at: Set(Utc::now()),
            processed_at: Set(None),
        }
    }
}

/// Repository for webhook delivery logs
#[derive(Debug, Clone)]
pub struct WebhookLogRepository {
    base: BaseRepository,
}

impl WebhookLogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn find_by_delivery<C: ConnectionTrait>(
        conn: &C,
        webhook_id: &str,
        event_type: &str,
    ) -> Result<Option<webhook_log::Model>, AppError> {
        webhook_log::Entity::find()
            .filter(webhook_log::Column::WebhookId.eq(webhook_id))
            .filter(webhook_log::Column::EventType.eq(event_type))
            .one(conn)
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Inserts the delivery as `processing`. Fails with a unique violation when the delivery
    /// was already claimed.
    pub async fn insert_processing<C: ConnectionTrait>(
        conn: &C,
        entry: NewWebhookLog,
    ) -> Result<webhook_log::Model, sea_orm::DbErr> {
        entry
            .into_active_model(WebhookLogStatus::Processing)
            .insert(conn)
            .await
    }

    /// Moves a `failed` delivery back to `processing`. Returns false if another worker got
    /// there first or the row is not in `failed`.
    pub async fn reclaim_failed<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<bool, AppError> {
        let result = webhook_log::Entity::update_many()
            .col_expr(
                webhook_log::Column::Status,
                Expr::value(WebhookLogStatus::Processing),
            )
            .col_expr(
                webhook_log::Column::ErrorMessage,
                Expr::value(Option::<String>::None),
            )
            .filter(webhook_log::Column::Id.eq(id))
            .filter(webhook_log::Column::Status.eq(WebhookLogStatus::Failed))
            .exec(conn)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(result.rows_affected == 1)
    }

    pub async fn mark_completed<C: ConnectionTrait>(
        conn: &C,
        log: webhook_log::Model,
        result: serde_json::Value,
    ) -> Result<webhook_log::Model, AppError> {
        let mut active: webhook_log::ActiveModel = log.into();
        active.status = Set(WebhookLogStatus::Completed);
        active.result = Set(Some(result));
        active.error_message = Set(None);
        active.processed_at = Set(Some(Utc::now()));
        active.update(conn).await.map_err(AppError::DatabaseError)
    }

    /// Records a failed attempt, creating the row if the claim was rolled back with it.
    pub async fn record_failure(
        &self,
        entry: NewWebhookLog,
        error_message: &str,
    ) -> Result<webhook_log::Model, AppError> {
        let db = self.base.get_db();
        match Self::find_by_delivery(db, &entry.webhook_id, &entry.event_type).await? {
            Some(existing) if existing.status == WebhookLogStatus::Completed => Ok(existing),
            Some(existing) => {
                let mut active: webhook_log::ActiveModel = existing.into();
                active.status = Set(WebhookLogStatus::Failed);
                active.error_message = Set(Some(error_message.to_string()));
                active.processed_at = Set(Some(Utc::now()));
                active.update(db).await.map_err(AppError::DatabaseError)
            }
            None => {
                let mut active = entry.into_active_model(WebhookLogStatus::Failed);
                active.error_message = Set(Some(error_message.to_string()));
                active.processed_at = Set(Some(Utc::now()));
                active.insert(db).await.map_err(AppError::DatabaseError)
            }
        }
    }
}
