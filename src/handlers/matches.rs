use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::Actor,
    entities::game_match::{self, MatchStatus},
    errors::{ErrorBody, ServiceError},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForfeitRequest {
    /// Participant who forfeits; the opponent is awarded the win
    pub forfeit_participant_id: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct NoContestRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResponse {
    pub id: i32,
    pub tournament_id: i32,
    pub round_number: i32,
    pub participant1_id: Option<i32>,
    pub participant2_id: Option<i32>,
    pub status: MatchStatus,
    pub winner_id: Option<i32>,
    pub resolved_reason: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub forfeit_user_id: Option<i32>,
    pub forfeit_participant_id: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl From<game_match::Model> for MatchResponse {
    fn from(model: game_match::Model) -> Self {
        Self {
            id: model.id,
            tournament_id: model.tournament_id,
            round_number: model.round_number,
            participant1_id: model.participant1_id,
            participant2_id: model.participant2_id,
            status: model.status,
            winner_id: model.winner_id,
            resolved_reason: model.resolved_reason,
            resolved_at: model.resolved_at,
            resolved_by: model.resolved_by,
            forfeit_user_id: model.forfeit_user_id,
            forfeit_participant_id: model.forfeit_participant_id,
            updated_at: model.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/matches/{id}/forfeit",
    params(("id" = i32, Path, description = "Match ID")),
    request_body = ForfeitRequest,
    responses(
        (status = 200, description = "Match resolved by forfeit", body = MatchResponse),
        (status = 400, description = "Match already settled or participant not in match", body = ErrorBody),
        (status = 403, description = "Admin only", body = ErrorBody),
        (status = 404, description = "Match not found", body = ErrorBody)
    ),
    tag = "Matches"
)]
pub async fn forfeit_match(
    State(state): State<AppState>,
    actor: Actor,
    Path(match_id): Path<i32>,
    Json(payload): Json<ForfeitRequest>,
) -> Result<Json<MatchResponse>, ServiceError> {
    payload.validate()?;

    let updated = state
        .services
        .match_resolution
        .record_forfeit(
            &actor,
            match_id,
            payload.forfeit_participant_id,
            payload.reason,
        )
        .await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/matches/{id}/no-contest",
    params(("id" = i32, Path, description = "Match ID")),
    request_body = NoContestRequest,
    responses(
        (status = 200, description = "Match closed without a winner", body = MatchResponse),
        (status = 400, description = "Match already settled", body = ErrorBody),
        (status = 403, description = "Admin only", body = ErrorBody),
        (status = 404, description = "Match not found", body = ErrorBody)
    ),
    tag = "Matches"
)]
pub async fn no_contest_match(
    State(state): State<AppState>,
    actor: Actor,
    Path(match_id): Path<i32>,
    payload: Option<Json<NoContestRequest>>,
) -> Result<Json<MatchResponse>, ServiceError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload.validate()?;

    let updated = state
        .services
        .match_resolution
        .record_no_contest(&actor, match_id, payload.reason)
        .await?;
    Ok(Json(updated.into()))
}
