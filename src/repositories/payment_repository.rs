use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityName, EntityTrait, IdenStatic,
    QueryFilter,
};
use std::sync::Arc;

use crate::db::json_text_extract;
use crate::entities::{payment_record, transaction};
use crate::errors::AppError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Repository for payment records and their wallet transactions
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    base: BaseRepository,
}

impl PaymentRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn find_by_id(
        &self,
        id: i32,
    ) -> Result<Option<(payment_record::Model, Option<transaction::Model>)>, AppError> {
        payment_record::Entity::find_by_id(id)
            .find_also_related(transaction::Entity)
            .one(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Looks up the record created for `(user_id, idempotency_key)` on any connection,
    /// including an open transaction.
    pub async fn find_by_idempotency_key<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
        idempotency_key: &str,
    ) -> Result<Option<(payment_record::Model, Option<transaction::Model>)>, AppError> {
        // Qualified: the joined transactions table has a metadata column too.
        let column = format!(
            "{}.{}",
            payment_record::Entity.table_name(),
            payment_record::Column::Metadata.as_str()
        );
        let key_expr = json_text_extract(conn.get_database_backend(), &column, "idempotency_key");

        payment_record::Entity::find()
            .filter(payment_record::Column::UserId.eq(user_id))
            .filter(Expr::expr(Expr::cust(key_expr)).eq(idempotency_key))
            .find_also_related(transaction::Entity)
            .one(conn)
            .await
            .map_err(AppError::DatabaseError)
    }

    pub async fn find_by_order_reference<C: ConnectionTrait>(
        conn: &C,
        order_reference: &str,
    ) -> Result<Option<(payment_record::Model, Option<transaction::Model>)>, AppError> {
        payment_record::Entity::find()
            .filter(payment_record::Column::OrderReference.eq(order_reference))
            .find_also_related(transaction::Entity)
            .one(conn)
            .await
            .map_err(AppError::DatabaseError)
    }
}
