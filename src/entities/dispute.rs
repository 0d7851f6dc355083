use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{Iterable, Set};
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
pub enum DisputeStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "under_review")]
    UnderReview,
    #[sea_orm(string_value = "resolved")]
    Resolved,
}

impl DisputeStatus {
    /// `open -> under_review -> resolved`, with `open -> resolved` allowed directly.
    pub fn can_transition_to(self, next: DisputeStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::UnderReview)
                | (Self::Open, Self::Resolved)
                | (Self::UnderReview, Self::Resolved)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Resolved
    }

    /// Every status that may move to `next`.
    pub fn sources_of(next: DisputeStatus) -> Vec<DisputeStatus> {
        Self::iter().filter(|s| s.can_transition_to(next)).collect()
    }
}

/// A participant's challenge to a reported match result.
///
/// `resolved_by_admin_id` and `closed_at` are written in the same update as the move to
/// `resolved`; a row never carries one without the other.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "disputes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub match_id: i32,
    pub raised_by_user_id: i32,
    #[sea_orm(column_type = "Text")]
    pub reason: String,
    pub evidence_url: Option<String>,
    pub status: DisputeStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub resolution_details: Option<String>,
    pub resolved_by_admin_id: Option<i32>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::game_match::Entity",
        from = "Column::MatchId",
        to = "super::game_match::Column::Id"
    )]
    Match,
}

impl Related<super::game_match::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Match.def()
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
