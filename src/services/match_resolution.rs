use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::Actor;
use crate::entities::game_match::{self, MatchStatus};
use crate::entities::tournament_participant;
use crate::errors::ServiceError;
use crate::services::disputes::MATCH_NOT_FOUND;

const DEFAULT_FORFEIT_REASON: &str = "forfeit";
const DEFAULT_NO_CONTEST_REASON: &str = "no_contest";

/// Settles matches outside normal play (forfeits and no-contests).
///
/// A forfeit always records the forfeiting participant together with that participant's user,
/// so `forfeit_user_id` can never disagree with `forfeit_participant_id`.
#[derive(Debug, Clone)]
pub struct MatchResolutionService {
    db: Arc<DatabaseConnection>,
}

impl MatchResolutionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, reason), fields(admin_id = actor.user_id))]
    pub async fn record_forfeit(
        &self,
        actor: &Actor,
        match_id: i32,
        forfeit_participant_id: i32,
        reason: Option<String>,
    ) -> Result<game_match::Model, ServiceError> {
        actor.require_admin()?;

        let txn = self.db.begin().await?;
        let game = load_open_match(&txn, match_id).await?;

        if !game.has_participant(forfeit_participant_id) {
            return Err(ServiceError::ValidationError(
                "Forfeiting participant is not part of this match.".to_string(),
            ));
        }
        let winner_id = game.opponent_of(forfeit_participant_id).ok_or_else(|| {
            ServiceError::InvalidStatus("Match has no opponent to award the win to.".to_string())
        })?;

        let participant = tournament_participant::Entity::find_by_id(forfeit_participant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Participant not found.".to_string()))?;

        let now = Utc::now();
        let mut active: game_match::ActiveModel = game.into();
        active.status = Set(MatchStatus::Forfeited);
        active.winner_id = Set(Some(winner_id));
        active.resolved_reason = Set(Some(non_empty_or(reason, DEFAULT_FORFEIT_REASON)));
        active.resolved_at = Set(Some(now));
        active.resolved_by = Set(Some(actor.audit_label()));
        active.forfeit_user_id = Set(Some(participant.user_id));
        active.forfeit_participant_id = Set(Some(participant.id));
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        metrics::counter!("arena.matches.forfeited", 1);
        info!(
            match_id,
            forfeit_participant_id,
            winner_id,
            "match resolved by forfeit"
        );
        Ok(updated)
    }

    #[instrument(skip(self, reason), fields(admin_id = actor.user_id))]
    pub async fn record_no_contest(
        &self,
        actor: &Actor,
        match_id: i32,
        reason: Option<String>,
    ) -> Result<game_match::Model, ServiceError> {
        actor.require_admin()?;

        let txn = self.db.begin().await?;
        let game = load_open_match(&txn, match_id).await?;

        let mut active: game_match::ActiveModel = game.into();
        active.status = Set(MatchStatus::NoContest);
        active.winner_id = Set(None);
        active.resolved_reason = Set(Some(non_empty_or(reason, DEFAULT_NO_CONTEST_REASON)));
        active.resolved_at = Set(Some(Utc::now()));
        active.resolved_by = Set(Some(actor.audit_label()));
        active.forfeit_user_id = Set(None);
        active.forfeit_participant_id = Set(None);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(match_id, "match resolved as no contest");
        Ok(updated)
    }
}

async fn load_open_match<C: sea_orm::ConnectionTrait>(
    conn: &C,
    match_id: i32,
) -> Result<game_match::Model, ServiceError> {
    let game = game_match::Entity::find_by_id(match_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(MATCH_NOT_FOUND.to_string()))?;

    if game.status.is_terminal() {
        return Err(ServiceError::InvalidStatus(format!(
            "Match is already {}.",
            game.status
        )));
    }
    Ok(game)
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
