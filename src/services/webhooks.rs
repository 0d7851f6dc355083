use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::entities::payment_record::{self, PaymentStatus};
use crate::entities::transaction::{self, TransactionStatus, TransactionType};
use crate::entities::user;
use crate::entities::webhook_log::{self, WebhookLogStatus};
use crate::errors::{classify::is_unique_violation, ServiceError};
use crate::repositories::{NewWebhookLog, PaymentRepository, WebhookLogRepository};
use crate::services::checksum::verify_webhook_signature;
use crate::services::payments::wallet_balance;

/// Gateway events grouped by the effect they have on a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    DepositReceived,
    PayoutCompleted,
    PayoutInitiated,
    PaymentFailed,
    PaymentRefunded,
    Unknown(String),
}

impl WebhookEvent {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "PAYMENT RECEIVED" | "PAYMENT_SUCCESSFUL" | "DEPOSIT RECEIVED" => Self::DepositReceived,
            "PAYOUT SUCCESSFUL" | "PAYOUT COMPLETED" => Self::PayoutCompleted,
            "PAYOUT INITIATED" => Self::PayoutInitiated,
            "PAYMENT FAILED" | "PAYMENT_EXPIRED" | "PAYMENT CANCELLED" => Self::PaymentFailed,
            "PAYOUT REFUNDED" | "PAYOUT REVERSED" | "PAYMENT_REFUNDED" | "REFUND_PROCESSED" => {
                Self::PaymentRefunded
            }
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A parsed delivery.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub event: String,
    pub data: Map<String, Value>,
    pub delivery_id: String,
    pub order_reference: Option<String>,
}

impl WebhookEnvelope {
    pub fn parse(raw_body: &[u8]) -> Result<Self, ServiceError> {
        let payload: Value = serde_json::from_slice(raw_body)
            .map_err(|_| ServiceError::BadRequest("Invalid JSON payload.".to_string()))?;

        let event = ["event", "eventType"]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ServiceError::BadRequest("Missing webhook event.".to_string()))?
            .to_string();

        let data = payload
            .get("data")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| ServiceError::BadRequest("Missing webhook data.".to_string()))?;

        let delivery_id = first_string(&data, &["id", "paymentId", "transactionId", "paymentReference"])
            .ok_or_else(|| {
                ServiceError::BadRequest("Webhook payload has no delivery id.".to_string())
            })?;
        let order_reference = first_string(&data, &["orderReference", "order_reference"]);

        Ok(Self {
            event,
            data,
            delivery_id,
            order_reference,
        })
    }
}

fn first_string(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Processed { event: String, result: Value },
    Replayed,
}

/// Applies gateway notifications to payments and wallets.
///
/// The delivery's log row is claimed inside the same database transaction as the wallet and
/// payment updates, so a delivery either commits with all of its effects or not at all.
#[derive(Debug, Clone)]
pub struct WebhookService {
    db: Arc<DatabaseConnection>,
    secret: Option<String>,
    logs: WebhookLogRepository,
}

impl WebhookService {
    pub fn new(db: Arc<DatabaseConnection>, secret: Option<String>) -> Self {
        Self {
            logs: WebhookLogRepository::new(db.clone()),
            db,
            secret,
        }
    }

    #[instrument(skip_all)]
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        self.verify(raw_body, signature)?;

        let envelope = WebhookEnvelope::parse(raw_body)?;
        let entry = NewWebhookLog {
            webhook_id: envelope.delivery_id.clone(),
            event_type: envelope.event.clone(),
            order_reference: envelope.order_reference.clone(),
            raw_payload: String::from_utf8_lossy(raw_body).into_owned(),
            signature_header: signature.map(str::to_string),
        };

        metrics::counter!("arena.webhooks.received", 1);

        let txn = self.db.begin().await?;
        match process(&txn, &envelope, entry.clone()).await {
            Ok(Some(result)) => {
                txn.commit().await?;
                metrics::counter!("arena.webhooks.processed", 1);
                info!(
                    event = %envelope.event,
                    delivery_id = %envelope.delivery_id,
                    "webhook processed"
                );
                Ok(WebhookOutcome::Processed {
                    event: envelope.event,
                    result,
                })
            }
            Ok(None) => {
                txn.rollback().await?;
                metrics::counter!("arena.webhooks.replayed", 1);
                info!(delivery_id = %envelope.delivery_id, "webhook already processed");
                Ok(WebhookOutcome::Replayed)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "webhook rollback failed");
                }
                error!(
                    event = %envelope.event,
                    delivery_id = %envelope.delivery_id,
                    error = %err,
                    "webhook processing failed"
                );
                metrics::counter!("arena.webhooks.failed", 1);
                if let Err(log_err) = self.logs.record_failure(entry, &err.to_string()).await {
                    error!(error = %log_err, "could not record webhook failure");
                }
                Err(ServiceError::WebhookProcessing(err.to_string()))
            }
        }
    }

    fn verify(&self, raw_body: &[u8], signature: Option<&str>) -> Result<(), ServiceError> {
        let Some(secret) = self.secret.as_deref() else {
            warn!("webhook secret not configured; skipping signature verification");
            return Ok(());
        };
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(ServiceError::MissingSignature)?;
        if verify_webhook_signature(secret.as_bytes(), raw_body, signature) {
            Ok(())
        } else {
            warn!("webhook signature mismatch");
            Err(ServiceError::InvalidSignature)
        }
    }
}

/// Claims the delivery and applies it. `None` means the delivery was already handled.
async fn process(
    txn: &DatabaseTransaction,
    envelope: &WebhookEnvelope,
    entry: NewWebhookLog,
) -> Result<Option<Value>, ServiceError> {
    let Some(log) = claim(txn, entry).await? else {
        return Ok(None);
    };

    let result = apply_event(txn, envelope).await?;
    WebhookLogRepository::mark_completed(txn, log, result.clone()).await?;
    Ok(Some(result))
}

async fn claim(
    txn: &DatabaseTransaction,
    entry: NewWebhookLog,
) -> Result<Option<webhook_log::Model>, ServiceError> {
    let webhook_id = entry.webhook_id.clone();
    let event_type = entry.event_type.clone();

    // Savepoint, so a unique violation leaves the outer transaction usable.
    let savepoint = txn.begin().await?;
    match WebhookLogRepository::insert_processing(&savepoint, entry).await {
        Ok(log) => {
            savepoint.commit().await?;
            Ok(Some(log))
        }
        Err(err) if is_unique_violation(&err) => {
            savepoint.rollback().await?;
            let Some(existing) =
                WebhookLogRepository::find_by_delivery(txn, &webhook_id, &event_type).await?
            else {
                return Err(ServiceError::DatabaseError(err));
            };
            if existing.status == WebhookLogStatus::Failed
                && WebhookLogRepository::reclaim_failed(txn, existing.id).await?
            {
                info!(webhook_id = %webhook_id, "retrying previously failed delivery");
                return Ok(Some(webhook_log::Model {
                    status: WebhookLogStatus::Processing,
                    error_message: None,
                    ..existing
                }));
            }
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

async fn apply_event(
    txn: &DatabaseTransaction,
    envelope: &WebhookEnvelope,
) -> Result<Value, ServiceError> {
    let event = WebhookEvent::from_name(&envelope.event);
    if let WebhookEvent::Unknown(name) = &event {
        info!(event = %name, "unhandled webhook event acknowledged");
        return Ok(json!({ "action": "ignored", "reason": "unhandled_event" }));
    }

    let order_reference = envelope.order_reference.as_deref().ok_or_else(|| {
        ServiceError::BadRequest("Webhook payload has no order reference.".to_string())
    })?;
    let (record, transaction) = PaymentRepository::find_by_order_reference(txn, order_reference)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("No payment with order reference {order_reference}."))
        })?;
    let transaction = transaction.ok_or_else(|| {
        ServiceError::InternalError(format!("payment {} has no transaction", record.id))
    })?;

    if record.status.is_final() && event != WebhookEvent::PaymentRefunded {
        return Ok(json!({
            "action": "noop",
            "order_reference": order_reference,
            "payment_status": record.status,
        }));
    }

    let data = Value::Object(envelope.data.clone());
    let is_withdrawal = transaction.transaction_type == TransactionType::Withdrawal;

    let (action, status) = match event {
        WebhookEvent::DepositReceived if !is_withdrawal => {
            settle_deposit(txn, &record, transaction, &data).await?;
            ("deposit_settled", PaymentStatus::Completed)
        }
        WebhookEvent::PayoutCompleted if is_withdrawal => {
            complete_transaction(txn, transaction).await?;
            update_record(txn, record, PaymentStatus::Completed, &data).await?;
            ("payout_completed", PaymentStatus::Completed)
        }
        WebhookEvent::PayoutInitiated if is_withdrawal => {
            update_record(txn, record, PaymentStatus::Processing, &data).await?;
            ("payout_processing", PaymentStatus::Processing)
        }
        WebhookEvent::PaymentFailed => {
            if is_withdrawal {
                refund_withdrawal(txn, &record, &envelope.event).await?;
            }
            fail_transaction(txn, transaction).await?;
            update_record(txn, record, PaymentStatus::Failed, &data).await?;
            ("payment_failed", PaymentStatus::Failed)
        }
        WebhookEvent::PaymentRefunded if is_withdrawal => {
            if matches!(
                record.status,
                PaymentStatus::Refunded | PaymentStatus::Failed | PaymentStatus::Cancelled
            ) {
                return Ok(json!({
                    "action": "noop",
                    "order_reference": order_reference,
                    "payment_status": record.status,
                }));
            }
            refund_withdrawal(txn, &record, &envelope.event).await?;
            update_record(txn, record, PaymentStatus::Refunded, &data).await?;
            ("payout_refunded", PaymentStatus::Refunded)
        }
        _ => {
            warn!(
                event = %envelope.event,
                order_reference,
                "event does not apply to this payment type"
            );
            return Ok(json!({
                "action": "ignored",
                "reason": "not_applicable",
                "order_reference": order_reference,
            }));
        }
    };

    Ok(json!({
        "action": action,
        "order_reference": order_reference,
        "payment_status": status,
    }))
}

async fn credit_wallet(
    txn: &DatabaseTransaction,
    user_id: i32,
    amount: rust_decimal::Decimal,
) -> Result<rust_decimal::Decimal, ServiceError> {
    user::Entity::update_many()
        .col_expr(
            user::Column::WalletBalance,
            Expr::col(user::Column::WalletBalance).add(amount),
        )
        .filter(user::Column::Id.eq(user_id))
        .exec(txn)
        .await?;
    wallet_balance(txn, user_id).await
}

async fn settle_deposit(
    txn: &DatabaseTransaction,
    record: &payment_record::Model,
    transaction: transaction::Model,
    data: &Value,
) -> Result<(), ServiceError> {
    let balance_after = credit_wallet(txn, record.user_id, record.amount).await?;

    let mut active: transaction::ActiveModel = transaction.into();
    active.status = Set(TransactionStatus::Completed);
    active.balance_before = Set(balance_after - record.amount);
    active.balance_after = Set(balance_after);
    active.update(txn).await?;

    update_record(txn, record.clone(), PaymentStatus::Completed, data).await?;
    Ok(())
}

/// Credits a debited withdrawal back through a `refund` transaction.
async fn refund_withdrawal(
    txn: &DatabaseTransaction,
    record: &payment_record::Model,
    event: &str,
) -> Result<(), ServiceError> {
    let balance_after = credit_wallet(txn, record.user_id, record.amount).await?;

    transaction::ActiveModel {
        user_id: Set(record.user_id),
        transaction_type: Set(TransactionType::Refund),
        amount: Set(record.amount),
        balance_before: Set(balance_after - record.amount),
        balance_after: Set(balance_after),
        status: Set(TransactionStatus::Completed),
        transaction_reference: Set(Some(format!("{}-REFUND", record.order_reference))),
        currency: Set(record.currency.clone()),
        description: Set(Some(format!(
            "Refund for withdrawal {}",
            record.order_reference
        ))),
        metadata: Set(Some(json!({
            "order_reference": record.order_reference,
            "event": event,
        }))),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    metrics::counter!("arena.payments.refunded", 1);
    Ok(())
}

async fn complete_transaction(
    txn: &DatabaseTransaction,
    transaction: transaction::Model,
) -> Result<(), ServiceError> {
    let mut active: transaction::ActiveModel = transaction.into();
    active.status = Set(TransactionStatus::Completed);
    active.update(txn).await?;
    Ok(())
}

async fn fail_transaction(
    txn: &DatabaseTransaction,
    transaction: transaction::Model,
) -> Result<(), ServiceError> {
    let mut active: transaction::ActiveModel = transaction.into();
    active.status = Set(TransactionStatus::Failed);
    active.update(txn).await?;
    Ok(())
}

async fn update_record(
    txn: &DatabaseTransaction,
    record: payment_record::Model,
    status: PaymentStatus,
    data: &Value,
) -> Result<(), ServiceError> {
    let gateway_payment_id = record.gateway_payment_id.clone().or_else(|| {
        data.get("paymentId")
            .or_else(|| data.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let mut active: payment_record::ActiveModel = record.into();
    active.status = Set(status);
    active.gateway_payment_id = Set(gateway_payment_id);
    active.webhook_data = Set(Some(data.clone()));
    match status {
        PaymentStatus::Completed => active.completed_at = Set(Some(Utc::now())),
        PaymentStatus::Failed | PaymentStatus::Cancelled => {
            active.failed_at = Set(Some(Utc::now()))
        }
        _ => {}
    }
    active.update(txn).await?;
    Ok(())
}
