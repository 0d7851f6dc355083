use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::auth::Actor;
use crate::entities::payment_record::{self, PaymentStatus};
use crate::entities::transaction::{self, TransactionStatus, TransactionType};
use crate::entities::user;
use crate::errors::{classify::is_unique_violation, ServiceError};
use crate::repositories::PaymentRepository;
use crate::services::checksum::PayloadSigner;
use crate::services::encryption::EncryptionService;

const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;
const DEFAULT_PAYMENT_METHOD: &str = "mobile_money";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentKind {
    Deposit,
    Withdrawal,
}

impl PaymentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
        }
    }

    pub fn transaction_type(self) -> TransactionType {
        match self {
            Self::Deposit => TransactionType::Deposit,
            Self::Withdrawal => TransactionType::Withdrawal,
        }
    }

    fn reference_prefix(self) -> &'static str {
        match self {
            Self::Deposit => "DEPO",
            Self::Withdrawal => "WDRW",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub amount: Decimal,
    pub currency: String,
    pub phone_number: String,
    pub payment_method: Option<String>,
    pub idempotency_key: Option<String>,
    pub description: Option<String>,
}

/// A payment record with its wallet transaction.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub record: payment_record::Model,
    pub transaction: transaction::Model,
    /// True when an earlier request with the same idempotency key produced this record.
    pub replayed: bool,
    pub customer_phone_masked: Option<String>,
}

impl PaymentOutcome {
    /// Signed request prepared for the gateway, if a checksum key was configured.
    pub fn gateway_request(&self) -> Option<&Value> {
        self.record.metadata.get("gateway_request")
    }
}

/// Initiates deposits and withdrawals.
///
/// Duplicate submissions are resolved by the unique `(user_id, metadata.idempotency_key)` index
/// rather than by locking: the first insert wins and every retry gets the original record back.
#[derive(Debug, Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    repository: PaymentRepository,
    encryption: Arc<EncryptionService>,
    signer: Option<PayloadSigner>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        encryption: Arc<EncryptionService>,
        signer: Option<PayloadSigner>,
    ) -> Self {
        Self {
            repository: PaymentRepository::new(db.clone()),
            db,
            encryption,
            signer,
        }
    }

    #[instrument(skip(self, input), fields(user_id = actor.user_id, kind = kind.as_str()))]
    pub async fn initiate(
        &self,
        actor: &Actor,
        kind: PaymentKind,
        input: InitiatePayment,
    ) -> Result<PaymentOutcome, ServiceError> {
        let amount = validate_amount(input.amount)?;
        let currency = input.currency.trim().to_ascii_uppercase();
        let phone = normalize_phone(&input.phone_number)?;
        let payment_method = input
            .payment_method
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());

        let wallet_owner = user::Entity::find_by_id(actor.user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found.".to_string()))?;
        if wallet_owner.wallet_currency != currency {
            return Err(ServiceError::CurrencyMismatch {
                wallet: wallet_owner.wallet_currency,
                request: currency,
            });
        }

        let idempotency_key = match input.idempotency_key.map(|k| k.trim().to_string()) {
            Some(key) if key.len() > MAX_IDEMPOTENCY_KEY_LEN => {
                return Err(ServiceError::ValidationError(format!(
                    "Idempotency key must be at most {MAX_IDEMPOTENCY_KEY_LEN} characters."
                )));
            }
            Some(key) if !key.is_empty() => key,
            _ => generate_idempotency_key(wallet_owner.id, amount, &phone),
        };

        if let Some(existing) = self
            .find_replay(&*self.db, wallet_owner.id, &idempotency_key)
            .await?
        {
            info!(record_id = existing.record.id, "idempotent replay");
            metrics::counter!("arena.payments.replayed", 1);
            return Ok(existing);
        }

        let order_reference = generate_order_reference(kind);
        let gateway_request = self.signer.as_ref().map(|signer| {
            signer.attach(json!({
                "amount": amount.to_string(),
                "currency": currency,
                "orderReference": order_reference,
                "paymentMethod": payment_method,
                "type": kind.as_str(),
            }))
        });
        let encrypted_phone = self.encryption.encrypt(&phone)?;

        let mut metadata = json!({
            "idempotency_key": idempotency_key,
            "kind": kind.as_str(),
        });
        if let Some(request) = gateway_request {
            metadata["gateway_request"] = request;
        }

        let draft = PaymentDraft {
            user_id: wallet_owner.id,
            kind,
            amount,
            currency,
            payment_method,
            order_reference,
            description: input.description,
            metadata,
            phone_ciphertext: encrypted_phone.ciphertext,
            phone_iv: encrypted_phone.iv,
        };

        let txn = self.db.begin().await?;
        match insert_payment(&txn, draft).await {
            Ok((record, transaction)) => {
                txn.commit().await?;
                metrics::counter!("arena.payments.initiated", 1, "kind" => kind.as_str());
                info!(
                    record_id = record.id,
                    order_reference = %record.order_reference,
                    "payment initiated"
                );
                Ok(PaymentOutcome {
                    customer_phone_masked: Some(mask_phone(&phone)),
                    record,
                    transaction,
                    replayed: false,
                })
            }
            Err(ServiceError::DatabaseError(err)) if is_unique_violation(&err) => {
                txn.rollback().await?;
                // A concurrent request with the same key committed first.
                match self
                    .find_replay(&*self.db, wallet_owner.id, &idempotency_key)
                    .await?
                {
                    Some(existing) => {
                        info!(record_id = existing.record.id, "idempotent replay after conflict");
                        metrics::counter!("arena.payments.replayed", 1);
                        Ok(existing)
                    }
                    None => Err(ServiceError::DatabaseError(err)),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// A payment as seen by its owner or an admin.
    pub async fn get_payment(
        &self,
        actor: &Actor,
        payment_id: i32,
    ) -> Result<PaymentOutcome, ServiceError> {
        let not_found = || ServiceError::NotFound("Payment not found.".to_string());

        let (record, transaction) = self
            .repository
            .find_by_id(payment_id)
            .await?
            .ok_or_else(not_found)?;
        if record.user_id != actor.user_id && !actor.is_admin() {
            return Err(not_found());
        }
        let transaction = transaction.ok_or_else(|| {
            ServiceError::InternalError(format!("payment {payment_id} has no transaction"))
        })?;

        Ok(self.outcome(record, transaction, false))
    }

    async fn find_replay<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i32,
        idempotency_key: &str,
    ) -> Result<Option<PaymentOutcome>, ServiceError> {
        let Some((record, transaction)) =
            PaymentRepository::find_by_idempotency_key(conn, user_id, idempotency_key).await?
        else {
            return Ok(None);
        };
        let transaction = transaction.ok_or_else(|| {
            ServiceError::InternalError(format!("payment {} has no transaction", record.id))
        })?;
        Ok(Some(self.outcome(record, transaction, true)))
    }

    fn outcome(
        &self,
        record: payment_record::Model,
        transaction: transaction::Model,
        replayed: bool,
    ) -> PaymentOutcome {
        let customer_phone_masked = match (
            &record.customer_phone_ciphertext,
            &record.customer_phone_iv,
        ) {
            (Some(ciphertext), Some(iv)) => match self.encryption.decrypt(ciphertext, iv) {
                Ok(phone) => Some(mask_phone(&phone)),
                Err(err) => {
                    warn!(record_id = record.id, error = %err, "could not decrypt customer phone");
                    None
                }
            },
            _ => None,
        };

        PaymentOutcome {
            record,
            transaction,
            replayed,
            customer_phone_masked,
        }
    }
}

struct PaymentDraft {
    user_id: i32,
    kind: PaymentKind,
    amount: Decimal,
    currency: String,
    payment_method: String,
    order_reference: String,
    description: Option<String>,
    metadata: Value,
    phone_ciphertext: String,
    phone_iv: String,
}

/// Writes the pending transaction and its payment record. Withdrawals debit the wallet first,
/// conditionally on the balance covering the amount.
async fn insert_payment(
    txn: &DatabaseTransaction,
    draft: PaymentDraft,
) -> Result<(payment_record::Model, transaction::Model), ServiceError> {
    let transaction_type = draft.kind.transaction_type();

    if draft.kind == PaymentKind::Withdrawal {
        let debited = user::Entity::update_many()
            .col_expr(
                user::Column::WalletBalance,
                Expr::col(user::Column::WalletBalance).sub(draft.amount),
            )
            .filter(user::Column::Id.eq(draft.user_id))
            .filter(user::Column::WalletBalance.gte(draft.amount))
            .exec(txn)
            .await?;
        if debited.rows_affected == 0 {
            return Err(ServiceError::InsufficientFunds(
                "Insufficient wallet balance.".to_string(),
            ));
        }
    }

    let current_balance = wallet_balance(txn, draft.user_id).await?;
    let balance_before = match draft.kind {
        // Already debited above.
        PaymentKind::Withdrawal => current_balance + draft.amount,
        PaymentKind::Deposit => current_balance,
    };

    let transaction = transaction::ActiveModel {
        user_id: Set(draft.user_id),
        transaction_type: Set(transaction_type),
        amount: Set(draft.amount),
        balance_before: Set(balance_before),
        balance_after: Set(transaction_type.apply(balance_before, draft.amount)),
        status: Set(TransactionStatus::Pending),
        transaction_reference: Set(Some(draft.order_reference.clone())),
        currency: Set(draft.currency.clone()),
        description: Set(draft.description),
        metadata: Set(Some(json!({
            "idempotency_key": draft.metadata["idempotency_key"],
            "payment_method": draft.payment_method,
        }))),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let record = payment_record::ActiveModel {
        user_id: Set(draft.user_id),
        transaction_id: Set(transaction.id),
        order_reference: Set(draft.order_reference),
        gateway_payment_id: Set(None),
        amount: Set(draft.amount),
        currency: Set(draft.currency),
        payment_method: Set(draft.payment_method),
        status: Set(PaymentStatus::Pending),
        customer_phone_ciphertext: Set(Some(draft.phone_ciphertext)),
        customer_phone_iv: Set(Some(draft.phone_iv)),
        gateway_response: Set(None),
        webhook_data: Set(None),
        metadata: Set(draft.metadata),
        completed_at: Set(None),
        failed_at: Set(None),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    Ok((record, transaction))
}

/// Current wallet balance read on `conn`.
pub(crate) async fn wallet_balance<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Decimal, ServiceError> {
    user::Entity::find_by_id(user_id)
        .one(conn)
        .await?
        .map(|u| u.wallet_balance)
        .ok_or_else(|| ServiceError::NotFound("User not found.".to_string()))
}

fn validate_amount(amount: Decimal) -> Result<Decimal, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Amount must be greater than zero.".to_string(),
        ));
    }
    if amount.round_dp(2) != amount {
        return Err(ServiceError::ValidationError(
            "Amount must have at most two decimal places.".to_string(),
        ));
    }
    Ok(amount)
}

/// Strips formatting and checks the number is 9 to 15 digits, optionally `+`-prefixed.
pub fn normalize_phone(raw: &str) -> Result<String, ServiceError> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    if (9..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(compact)
    } else {
        Err(ServiceError::ValidationError(
            "A valid phone number is required.".to_string(),
        ))
    }
}

/// Keeps the last three characters visible.
pub fn mask_phone(phone: &str) -> String {
    const VISIBLE: usize = 3;
    let len = phone.chars().count();
    phone
        .chars()
        .enumerate()
        .map(|(i, c)| if i + VISIBLE < len { '*' } else { c })
        .collect()
}

/// `IDEMP_` followed by 32 hex characters of SHA-256 over user, amount, recipient and time.
pub fn generate_idempotency_key(user_id: i32, amount: Decimal, recipient: &str) -> String {
    let seed = format!(
        "{}:{}:{}:{}",
        user_id,
        amount,
        recipient,
        Utc::now().timestamp_millis()
    );
    let digest = hex::encode(Sha256::digest(seed.as_bytes()));
    format!("IDEMP_{}", &digest[..32])
}

/// Prefix, epoch milliseconds, then eight random upper-case alphanumerics.
pub fn generate_order_reference(kind: PaymentKind) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!(
        "{}{}{}",
        kind.reference_prefix(),
        Utc::now().timestamp_millis(),
        suffix
    )
}
