use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_arena_tables::Migration),
            Box::new(m20240301_000002_create_payment_tables::Migration),
            Box::new(m20240301_000003_create_payment_idempotency_index::Migration),
            Box::new(m20240301_000004_create_webhook_logs_table::Migration),
        ]
    }
}

mod m20240301_000001_create_arena_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_arena_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Users::Username).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::Role).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Users::WalletBalance)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Users::WalletCurrency).string_len(3).not_null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Tournaments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Tournaments::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Tournaments::Name).string().not_null())
                        .col(ColumnDef::new(Tournaments::Game).string().null())
                        .col(ColumnDef::new(Tournaments::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Tournaments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Tournaments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TournamentParticipants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TournamentParticipants::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(TournamentParticipants::TournamentId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TournamentParticipants::UserId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TournamentParticipants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TournamentParticipants::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_tournament_participants_tournament_id")
                                .from(
                                    TournamentParticipants::Table,
                                    TournamentParticipants::TournamentId,
                                )
                                .to(Tournaments::Table, Tournaments::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_tournament_participants_user_id")
                                .from(TournamentParticipants::Table, TournamentParticipants::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_tournament_participants_tournament_user")
                        .table(TournamentParticipants::Table)
                        .col(TournamentParticipants::TournamentId)
                        .col(TournamentParticipants::UserId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Matches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Matches::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Matches::TournamentId).integer().not_null())
                        .col(
                            ColumnDef::new(Matches::RoundNumber)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Matches::Participant1Id).integer().null())
                        .col(ColumnDef::new(Matches::Participant2Id).integer().null())
                        .col(ColumnDef::new(Matches::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Matches::WinnerId).integer().null())
                        .col(ColumnDef::new(Matches::ConfirmedByUserId).integer().null())
                        .col(
                            ColumnDef::new(Matches::ConfirmedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Matches::ResolvedReason).string().null())
                        .col(
                            ColumnDef::new(Matches::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Matches::ResolvedBy).string().null())
                        .col(ColumnDef::new(Matches::ForfeitUserId).integer().null())
                        .col(ColumnDef::new(Matches::ForfeitParticipantId).integer().null())
                        .col(
                            ColumnDef::new(Matches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Matches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_matches_tournament_id")
                                .from(Matches::Table, Matches::TournamentId)
                                .to(Tournaments::Table, Tournaments::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_matches_participant1_id")
                                .from(Matches::Table, Matches::Participant1Id)
                                .to(TournamentParticipants::Table, TournamentParticipants::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_matches_participant2_id")
                                .from(Matches::Table, Matches::Participant2Id)
                                .to(TournamentParticipants::Table, TournamentParticipants::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_matches_forfeit_user_id")
                                .from(Matches::Table, Matches::ForfeitUserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_matches_forfeit_participant_id")
                                .from(Matches::Table, Matches::ForfeitParticipantId)
                                .to(TournamentParticipants::Table, TournamentParticipants::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_matches_tournament_id")
                        .table(Matches::Table)
                        .col(Matches::TournamentId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Disputes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Disputes::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Disputes::MatchId).integer().not_null())
                        .col(ColumnDef::new(Disputes::RaisedByUserId).integer().not_null())
                        .col(ColumnDef::new(Disputes::Reason).text().not_null())
                        .col(ColumnDef::new(Disputes::EvidenceUrl).string().null())
                        .col(ColumnDef::new(Disputes::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Disputes::ResolutionDetails).text().null())
                        .col(ColumnDef::new(Disputes::ResolvedByAdminId).integer().null())
                        .col(
                            ColumnDef::new(Disputes::ClosedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Disputes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Disputes::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_disputes_match_id")
                                .from(Disputes::Table, Disputes::MatchId)
                                .to(Matches::Table, Matches::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_disputes_raised_by_user_id")
                                .from(Disputes::Table, Disputes::RaisedByUserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_disputes_resolved_by_admin_id")
                                .from(Disputes::Table, Disputes::ResolvedByAdminId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_disputes_match_id")
                        .table(Disputes::Table)
                        .col(Disputes::MatchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Disputes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Matches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(TournamentParticipants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Tournaments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        Username,
        Email,
        Role,
        WalletBalance,
        WalletCurrency,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Tournaments {
        Table,
        Id,
        Name,
        Game,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TournamentParticipants {
        Table,
        Id,
        TournamentId,
        UserId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Matches {
        Table,
        Id,
        TournamentId,
        RoundNumber,
        #[sea_orm(iden = "participant1_id")]
        Participant1Id,
        #[sea_orm(iden = "participant2_id")]
        Participant2Id,
        Status,
        WinnerId,
        ConfirmedByUserId,
        ConfirmedAt,
        ResolvedReason,
        ResolvedAt,
        ResolvedBy,
        ForfeitUserId,
        ForfeitParticipantId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Disputes {
        Table,
        Id,
        MatchId,
        RaisedByUserId,
        Reason,
        EvidenceUrl,
        Status,
        ResolutionDetails,
        ResolvedByAdminId,
        ClosedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_payment_tables {

    use super::m20240301_000001_create_arena_tables::Users;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_payment_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Transactions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Transactions::UserId).integer().not_null())
                        .col(ColumnDef::new(Transactions::Type).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Transactions::Amount)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::BalanceBefore)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::BalanceAfter)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transactions::Status).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Transactions::TransactionReference)
                                .string()
                                .null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Transactions::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Transactions::Description).string().null())
                        .col(ColumnDef::new(Transactions::Metadata).json_binary().null())
                        .col(
                            ColumnDef::new(Transactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transactions_user_id")
                                .from(Transactions::Table, Transactions::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_user_id")
                        .table(Transactions::Table)
                        .col(Transactions::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaymentRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentRecords::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(PaymentRecords::UserId).integer().not_null())
                        .col(
                            ColumnDef::new(PaymentRecords::TransactionId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::OrderReference)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::GatewayPaymentId)
                                .string()
                                .null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::Amount)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::Currency)
                                .string_len(3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::PaymentMethod)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentRecords::Status).string_len(16).not_null())
                        .col(
                            ColumnDef::new(PaymentRecords::CustomerPhoneCiphertext)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::CustomerPhoneIv)
                                .string_len(32)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::GatewayResponse)
                                .json_binary()
                                .null(),
                        )
                        .col(ColumnDef::new(PaymentRecords::WebhookData).json_binary().null())
                        .col(ColumnDef::new(PaymentRecords::Metadata).json_binary().not_null())
                        .col(
                            ColumnDef::new(PaymentRecords::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::FailedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_records_transaction_id")
                                .from(PaymentRecords::Table, PaymentRecords::TransactionId)
                                .to(Transactions::Table, Transactions::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_records_user_id")
                                .from(PaymentRecords::Table, PaymentRecords::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentRecords::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Transactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Transactions {
        Table,
        Id,
        UserId,
        Type,
        Amount,
        BalanceBefore,
        BalanceAfter,
        Status,
        TransactionReference,
        Currency,
        Description,
        Metadata,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PaymentRecords {
        Table,
        Id,
        UserId,
        TransactionId,
        OrderReference,
        GatewayPaymentId,
        Amount,
        Currency,
        PaymentMethod,
        Status,
        CustomerPhoneCiphertext,
        CustomerPhoneIv,
        GatewayResponse,
        WebhookData,
        Metadata,
        CompletedAt,
        FailedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_payment_idempotency_index {

    use crate::db::json_text_extract;
    use sea_orm::ConnectionTrait;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    const INDEX_NAME: &str = "idx_payment_records_user_idempotency_key";

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_payment_idempotency_index"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Expression index; sea-query's index builder only takes plain columns.
            let key_expr = json_text_extract(
                manager.get_database_backend(),
                "metadata",
                "idempotency_key",
            );
            let sql = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {INDEX_NAME} ON payment_records (user_id, {key_expr})"
            );
            manager.get_connection().execute_unprepared(&sql).await?;
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .get_connection()
                .execute_unprepared(&format!("DROP INDEX IF EXISTS {INDEX_NAME}"))
                .await?;
            Ok(())
        }
    }
}

mod m20240301_000004_create_webhook_logs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_webhook_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WebhookLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WebhookLogs::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(WebhookLogs::WebhookId).string().not_null())
                        .col(ColumnDef::new(WebhookLogs::EventType).string_len(64).not_null())
                        .col(ColumnDef::new(WebhookLogs::OrderReference).string().null())
                        .col(ColumnDef::new(WebhookLogs::RawPayload).text().not_null())
                        .col(ColumnDef::new(WebhookLogs::SignatureHeader).string().null())
                        .col(ColumnDef::new(WebhookLogs::Status).string_len(16).not_null())
                        .col(ColumnDef::new(WebhookLogs::Result).json_binary().null())
                        .col(ColumnDef::new(WebhookLogs::ErrorMessage).text().null())
                        .col(
                            ColumnDef::new(WebhookLogs::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WebhookLogs::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_webhook_logs_webhook_event")
                        .table(WebhookLogs::Table)
                        .col(WebhookLogs::WebhookId)
                        .col(WebhookLogs::EventType)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_webhook_logs_order_reference")
                        .table(WebhookLogs::Table)
                        .col(WebhookLogs::OrderReference)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WebhookLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WebhookLogs {
        Table,
        Id,
        WebhookId,
        EventType,
        OrderReference,
        RawPayload,
        SignatureHeader,
        Status,
        Result,
        ErrorMessage,
        ReceivedAt,
        ProcessedAt,
    }
}
