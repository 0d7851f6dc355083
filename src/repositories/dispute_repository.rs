use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::entities::{dispute, game_match, tournament, tournament_participant, user};
use crate::errors::AppError;
use crate::repositories::Repository;

use super::BaseRepository;

#[derive(Debug, Clone)]
pub struct ParticipantWithUser {
    pub participant: tournament_participant::Model,
    pub user: Option<user::Model>,
}

/// A dispute with everything a reviewer needs eagerly loaded.
#[derive(Debug, Clone)]
pub struct DisputeDetails {
    pub dispute: dispute::Model,
    pub game_match: Option<game_match::Model>,
    pub participant1: Option<ParticipantWithUser>,
    pub participant2: Option<ParticipantWithUser>,
    pub tournament: Option<tournament::Model>,
    pub raised_by: Option<user::Model>,
    pub resolved_by: Option<user::Model>,
}

impl DisputeDetails {
    /// Users allowed to read this dispute besides admins.
    pub fn involves_user(&self, user_id: i32) -> bool {
        self.dispute.raised_by_user_id == user_id
            || [&self.participant1, &self.participant2]
                .into_iter()
                .flatten()
                .any(|p| p.participant.user_id == user_id)
    }
}

/// Repository for dispute reads
#[derive(Debug, Clone)]
pub struct DisputeRepository {
    base: BaseRepository,
}

impl DisputeRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<dispute::Model>, AppError> {
        dispute::Entity::find_by_id(id)
            .one(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Loads one dispute with its match, participants and their users, tournament, and the
    /// raising/resolving users.
    pub async fn find_with_details(&self, id: i32) -> Result<Option<DisputeDetails>, AppError> {
        let Some(found) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        Ok(self.hydrate(vec![found]).await?.pop())
    }

    /// All disputes, newest first, with the same expansion as [`Self::find_with_details`].
    pub async fn list_with_details(&self) -> Result<Vec<DisputeDetails>, AppError> {
        let disputes = dispute::Entity::find()
            .order_by_desc(dispute::Column::CreatedAt)
            .order_by_desc(dispute::Column::Id)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)?;
        self.hydrate(disputes).await
    }

    /// Resolves associations for a batch of disputes with one query per table.
    async fn hydrate(
        &self,
        disputes: Vec<dispute::Model>,
    ) -> Result<Vec<DisputeDetails>, AppError> {
        if disputes.is_empty() {
            return Ok(Vec::new());
        }
        let db = self.base.get_db();

        let match_ids: HashSet<i32> = disputes.iter().map(|d| d.match_id).collect();
        let matches: HashMap<i32, game_match::Model> = game_match::Entity::find()
            .filter(game_match::Column::Id.is_in(match_ids))
            .all(db)
            .await
            .map_err(AppError::DatabaseError)?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let participant_ids: HashSet<i32> =
            matches.values().flat_map(|m| m.participant_ids()).collect();
        let participants: HashMap<i32, tournament_participant::Model> =
            tournament_participant::Entity::find()
                .filter(tournament_participant::Column::Id.is_in(participant_ids))
                .all(db)
                .await
                .map_err(AppError::DatabaseError)?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();

        let tournament_ids: HashSet<i32> = matches.values().map(|m| m.tournament_id).collect();
        let tournaments: HashMap<i32, tournament::Model> = tournament::Entity::find()
            .filter(tournament::Column::Id.is_in(tournament_ids))
            .all(db)
            .await
            .map_err(AppError::DatabaseError)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut user_ids: HashSet<i32> = participants.values().map(|p| p.user_id).collect();
        for d in &disputes {
            user_ids.insert(d.raised_by_user_id);
            user_ids.extend(d.resolved_by_admin_id);
        }
        let users: HashMap<i32, user::Model> = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(db)
            .await
            .map_err(AppError::DatabaseError)?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let with_user = |participant_id: Option<i32>| {
            participant_id
                .and_then(|id| participants.get(&id))
                .map(|p| ParticipantWithUser {
                    participant: p.clone(),
                    user: users.get(&p.user_id).cloned(),
                })
        };

        Ok(disputes
            .into_iter()
            .map(|d| {
                let game_match = matches.get(&d.match_id).cloned();
                let (participant1, participant2, tournament) = match &game_match {
                    Some(m) => (
                        with_user(m.participant1_id),
                        with_user(m.participant2_id),
                        tournaments.get(&m.tournament_id).cloned(),
                    ),
                    None => (None, None, None),
                };
                DisputeDetails {
                    raised_by: users.get(&d.raised_by_user_id).cloned(),
                    resolved_by: d.resolved_by_admin_id.and_then(|id| users.get(&id).cloned()),
                    dispute: d,
                    game_match,
                    participant1,
                    participant2,
                    tournament,
                }
            })
            .collect())
    }
}
