use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "live")]
    Live,
    #[sea_orm(string_value = "awaiting_confirmation")]
    AwaitingConfirmation,
    #[sea_orm(string_value = "disputed")]
    Disputed,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "forfeited")]
    Forfeited,
    #[sea_orm(string_value = "no_contest")]
    NoContest,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl MatchStatus {
    /// No further result may be recorded once a match reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Forfeited | Self::NoContest | Self::Expired
        )
    }
}

/// A bracket match between two tournament participants.
///
/// The `resolved_*` and `forfeit_*` columns are only populated when a match is settled outside
/// normal play. `forfeit_participant_id` always names one of `participant1_id`/`participant2_id`
/// and `forfeit_user_id` is that participant's user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "matches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub tournament_id: i32,
    pub round_number: i32,
    pub participant1_id: Option<i32>,
    pub participant2_id: Option<i32>,
    pub status: MatchStatus,
    /// Winning participant
    pub winner_id: Option<i32>,
    pub confirmed_by_user_id: Option<i32>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub resolved_reason: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub forfeit_user_id: Option<i32>,
    pub forfeit_participant_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tournament::Entity",
        from = "Column::TournamentId",
        to = "super::tournament::Column::Id"
    )]
    Tournament,
    #[sea_orm(has_many = "super::dispute::Entity")]
    Disputes,
}

impl Related<super::tournament::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tournament.def()
    }
}

impl Related<super::dispute::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Disputes.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

impl Model {
    pub fn participant_ids(&self) -> impl Iterator<Item = i32> {
        self.participant1_id.into_iter().chain(self.participant2_id)
    }

    pub fn has_participant(&self, participant_id: i32) -> bool {
        self.participant_ids().any(|id| id == participant_id)
    }

    /// The participant facing `participant_id`, if both slots are filled.
    pub fn opponent_of(&self, participant_id: i32) -> Option<i32> {
        match (self.participant1_id, self.participant2_id) {
            (Some(p1), Some(p2)) if p1 == participant_id => Some(p2),
            (Some(p1), Some(p2)) if p2 == participant_id => Some(p1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(p1: Option<i32>, p2: Option<i32>) -> Model {
        let now = Utc::now();
        Model {
            id: 1,
            tournament_id: 1,
            round_number: 1,
            participant1_id: p1,
            participant2_id: p2,
            status: MatchStatus::AwaitingConfirmation,
            winner_id: None,
            confirmed_by_user_id: None,
            confirmed_at: None,
            resolved_reason: None,
            resolved_at: None,
            resolved_by: None,
            forfeit_user_id: None,
            forfeit_participant_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn opponent_requires_both_slots() {
        assert_eq!(sample(Some(10), Some(11)).opponent_of(10), Some(11));
        assert_eq!(sample(Some(10), Some(11)).opponent_of(11), Some(10));
        assert_eq!(sample(Some(10), None).opponent_of(10), None);
        assert_eq!(sample(Some(10), Some(11)).opponent_of(12), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(MatchStatus::Forfeited.is_terminal());
        assert!(MatchStatus::NoContest.is_terminal());
        assert!(!MatchStatus::Disputed.is_terminal());
        assert!(!MatchStatus::AwaitingConfirmation.is_terminal());
    }
}
