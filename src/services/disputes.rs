use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::Actor;
use crate::entities::dispute::{self, DisputeStatus};
use crate::entities::game_match::{self, MatchStatus};
use crate::entities::tournament_participant;
use crate::errors::ServiceError;
use crate::repositories::{DisputeDetails, DisputeRepository};

pub const DISPUTE_NOT_FOUND: &str = "Dispute not found.";
pub const MATCH_NOT_FOUND: &str = "Match not found.";

/// Input for raising a dispute against a reported result.
#[derive(Debug, Clone)]
pub struct RaiseDispute {
    pub reason: String,
    pub evidence_url: Option<String>,
}

/// Input for closing a dispute.
#[derive(Debug, Clone)]
pub struct ResolveDispute {
    pub resolution_details: String,
    /// When set, the match is completed with this participant as winner.
    pub winner_participant_id: Option<i32>,
}

/// Dispute lifecycle: `open -> under_review -> resolved`, or `open -> resolved` directly.
#[derive(Debug, Clone)]
pub struct DisputeService {
    db: Arc<DatabaseConnection>,
    repository: DisputeRepository,
}

impl DisputeService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            repository: DisputeRepository::new(db.clone()),
            db,
        }
    }

    /// Opens a dispute on a match awaiting confirmation and moves the match to `disputed`.
    #[instrument(skip(self, input), fields(user_id = actor.user_id))]
    pub async fn raise(
        &self,
        actor: &Actor,
        match_id: i32,
        input: RaiseDispute,
    ) -> Result<dispute::Model, ServiceError> {
        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "A reason is required to raise a dispute.".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let game = game_match::Entity::find_by_id(match_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(MATCH_NOT_FOUND.to_string()))?;

        let is_participant = tournament_participant::Entity::find()
            .filter(tournament_participant::Column::Id.is_in(game.participant_ids()))
            .filter(tournament_participant::Column::UserId.eq(actor.user_id))
            .one(&txn)
            .await?
            .is_some();
        if !is_participant {
            return Err(ServiceError::Forbidden(
                "You are not a participant of this match.".to_string(),
            ));
        }

        if game.status != MatchStatus::AwaitingConfirmation {
            return Err(ServiceError::InvalidStatus(
                "Match is not awaiting confirmation.".to_string(),
            ));
        }

        let created = dispute::ActiveModel {
            match_id: Set(match_id),
            raised_by_user_id: Set(actor.user_id),
            reason: Set(reason.to_string()),
            evidence_url: Set(input.evidence_url.filter(|url| !url.trim().is_empty())),
            status: Set(DisputeStatus::Open),
            resolution_details: Set(None),
            resolved_by_admin_id: Set(None),
            closed_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut game: game_match::ActiveModel = game.into();
        game.status = Set(MatchStatus::Disputed);
        game.update(&txn).await?;

        txn.commit().await?;

        metrics::counter!("arena.disputes.raised", 1);
        info!(dispute_id = created.id, match_id, "dispute raised");
        Ok(created)
    }

    /// Admin starts investigating an open dispute.
    #[instrument(skip(self), fields(admin_id = actor.user_id))]
    pub async fn begin_review(
        &self,
        actor: &Actor,
        dispute_id: i32,
    ) -> Result<dispute::Model, ServiceError> {
        actor.require_admin()?;

        // Conditional on the current status, so a concurrent resolve is never undone.
        let moved = dispute::Entity::update_many()
            .set(dispute::ActiveModel {
                status: Set(DisputeStatus::UnderReview),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(dispute::Column::Id.eq(dispute_id))
            .filter(
                dispute::Column::Status.is_in(DisputeStatus::sources_of(DisputeStatus::UnderReview)),
            )
            .exec(&*self.db)
            .await?;

        if moved.rows_affected == 0 {
            let current = self.load(dispute_id).await?;
            return Err(ServiceError::InvalidStatus(format!(
                "Dispute cannot move from {} to under_review.",
                current.status
            )));
        }

        info!(dispute_id, "dispute under review");
        self.load(dispute_id).await
    }

    /// Closes a dispute. Status, resolving admin and `closed_at` are written in one update.
    /// With a winner, the match must still be `disputed`; it is completed in the same
    /// transaction.
    #[instrument(skip(self, input), fields(admin_id = actor.user_id))]
    pub async fn resolve(
        &self,
        actor: &Actor,
        dispute_id: i32,
        input: ResolveDispute,
    ) -> Result<dispute::Model, ServiceError> {
        actor.require_admin()?;

        let details = input.resolution_details.trim();
        if details.is_empty() {
            return Err(ServiceError::ValidationError(
                "Resolution details are required.".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let current = dispute::Entity::find_by_id(dispute_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(DISPUTE_NOT_FOUND.to_string()))?;
        if !current.status.can_transition_to(DisputeStatus::Resolved) {
            return Err(ServiceError::InvalidStatus(
                "Dispute is already resolved.".to_string(),
            ));
        }
        let match_id = current.match_id;

        if let Some(winner_id) = input.winner_participant_id {
            let game = game_match::Entity::find_by_id(match_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(MATCH_NOT_FOUND.to_string()))?;
            if game.status != MatchStatus::Disputed {
                return Err(ServiceError::InvalidStatus(format!(
                    "Match is {}; a winner can only be set on a disputed match.",
                    game.status
                )));
            }
            if !game.has_participant(winner_id) {
                return Err(ServiceError::ValidationError(
                    "Winner must be a participant of the disputed match.".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let closed = dispute::Entity::update_many()
            .set(dispute::ActiveModel {
                status: Set(DisputeStatus::Resolved),
                resolution_details: Set(Some(details.to_string())),
                resolved_by_admin_id: Set(Some(actor.user_id)),
                closed_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(dispute::Column::Id.eq(dispute_id))
            .filter(dispute::Column::Status.is_in(DisputeStatus::sources_of(DisputeStatus::Resolved)))
            .exec(&txn)
            .await?;
        if closed.rows_affected == 0 {
            return Err(ServiceError::InvalidStatus(
                "Dispute is already resolved.".to_string(),
            ));
        }

        if let Some(winner_id) = input.winner_participant_id {
            let completed = game_match::Entity::update_many()
                .set(game_match::ActiveModel {
                    status: Set(MatchStatus::Completed),
                    winner_id: Set(Some(winner_id)),
                    confirmed_by_user_id: Set(Some(actor.user_id)),
                    confirmed_at: Set(Some(now)),
                    resolved_reason: Set(Some("dispute_resolution".to_string())),
                    resolved_at: Set(Some(now)),
                    resolved_by: Set(Some(actor.audit_label())),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .filter(game_match::Column::Id.eq(match_id))
                .filter(game_match::Column::Status.eq(MatchStatus::Disputed))
                .exec(&txn)
                .await?;
            if completed.rows_affected == 0 {
                return Err(ServiceError::InvalidStatus(
                    "Match is no longer disputed.".to_string(),
                ));
            }
        }

        let resolved = dispute::Entity::find_by_id(dispute_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(DISPUTE_NOT_FOUND.to_string()))?;
        txn.commit().await?;

        metrics::counter!("arena.disputes.resolved", 1);
        info!(
            dispute_id,
            match_id,
            winner = ?input.winner_participant_id,
            "dispute resolved"
        );
        Ok(resolved)
    }

    /// Dispute with its match, participants, users and tournament. Visible to admins and to
    /// the users involved.
    pub async fn get_details(
        &self,
        actor: &Actor,
        dispute_id: i32,
    ) -> Result<DisputeDetails, ServiceError> {
        let details = self
            .repository
            .find_with_details(dispute_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(DISPUTE_NOT_FOUND.to_string()))?;

        if !actor.is_admin() && !details.involves_user(actor.user_id) {
            // Same answer as a missing dispute; existence is not disclosed.
            return Err(ServiceError::NotFound(DISPUTE_NOT_FOUND.to_string()));
        }
        Ok(details)
    }

    /// All disputes, newest first. Admin only.
    pub async fn list(&self, actor: &Actor) -> Result<Vec<DisputeDetails>, ServiceError> {
        actor.require_admin()?;
        self.repository.list_with_details().await
    }

    async fn load(&self, dispute_id: i32) -> Result<dispute::Model, ServiceError> {
        self.repository
            .find_by_id(dispute_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(DISPUTE_NOT_FOUND.to_string()))
    }
}
