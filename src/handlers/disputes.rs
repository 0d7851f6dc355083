use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::Actor,
    entities::{
        dispute::{self, DisputeStatus},
        game_match::MatchStatus,
        tournament, user,
    },
    errors::{ErrorBody, ServiceError},
    repositories::{DisputeDetails, ParticipantWithUser},
    services::disputes::{RaiseDispute, ResolveDispute},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RaiseDisputeRequest {
    #[validate(length(min = 1, max = 2000, message = "Reason must be 1-2000 characters"))]
    pub reason: String,
    #[validate(url(message = "Evidence must be a valid URL"))]
    pub evidence_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResolveDisputeRequest {
    #[validate(length(min = 1, message = "Resolution details are required"))]
    pub resolution_details: String,
    /// Completes the match with this participant as winner
    pub winner_participant_id: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DisputeResponse {
    pub id: i32,
    pub match_id: i32,
    pub raised_by_user_id: i32,
    pub reason: String,
    pub evidence_url: Option<String>,
    pub status: DisputeStatus,
    pub resolution_details: Option<String>,
    pub resolved_by_admin_id: Option<i32>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<dispute::Model> for DisputeResponse {
    fn from(model: dispute::Model) -> Self {
        Self {
            id: model.id,
            match_id: model.match_id,
            raised_by_user_id: model.raised_by_user_id,
            reason: model.reason,
            evidence_url: model.evidence_url,
            status: model.status,
            resolution_details: model.resolution_details,
            resolved_by_admin_id: model.resolved_by_admin_id,
            closed_at: model.closed_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
}

impl From<user::Model> for UserSummary {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantSummary {
    pub id: i32,
    pub user_id: i32,
    pub user: Option<UserSummary>,
}

impl From<ParticipantWithUser> for ParticipantSummary {
    fn from(p: ParticipantWithUser) -> Self {
        Self {
            id: p.participant.id,
            user_id: p.participant.user_id,
            user: p.user.map(UserSummary::from),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TournamentSummary {
    pub id: i32,
    pub name: String,
    pub game: Option<String>,
    pub status: String,
}

impl From<tournament::Model> for TournamentSummary {
    fn from(model: tournament::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            game: model.game,
            status: model.status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DisputedMatch {
    pub id: i32,
    pub tournament_id: i32,
    pub round_number: i32,
    pub status: MatchStatus,
    pub winner_id: Option<i32>,
    pub participant1: Option<ParticipantSummary>,
    pub participant2: Option<ParticipantSummary>,
    pub tournament: Option<TournamentSummary>,
}

/// Dispute with its match, participants, tournament and the users involved.
#[derive(Debug, Serialize, ToSchema)]
pub struct DisputeDetailResponse {
    pub id: i32,
    pub match_id: i32,
    pub reason: String,
    pub evidence_url: Option<String>,
    pub status: DisputeStatus,
    pub resolution_details: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "match")]
    pub game_match: Option<DisputedMatch>,
    pub raised_by: Option<UserSummary>,
    pub resolved_by: Option<UserSummary>,
}

impl From<DisputeDetails> for DisputeDetailResponse {
    fn from(details: DisputeDetails) -> Self {
        let DisputeDetails {
            dispute,
            game_match,
            participant1,
            participant2,
            tournament,
            raised_by,
            resolved_by,
        } = details;

        let game_match = game_match.map(|m| DisputedMatch {
            id: m.id,
            tournament_id: m.tournament_id,
            round_number: m.round_number,
            status: m.status,
            winner_id: m.winner_id,
            participant1: participant1.map(ParticipantSummary::from),
            participant2: participant2.map(ParticipantSummary::from),
            tournament: tournament.map(TournamentSummary::from),
        });

        Self {
            id: dispute.id,
            match_id: dispute.match_id,
            reason: dispute.reason,
            evidence_url: dispute.evidence_url,
            status: dispute.status,
            resolution_details: dispute.resolution_details,
            closed_at: dispute.closed_at,
            created_at: dispute.created_at,
            updated_at: dispute.updated_at,
            game_match,
            raised_by: raised_by.map(UserSummary::from),
            resolved_by: resolved_by.map(UserSummary::from),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/matches/{id}/disputes",
    params(("id" = i32, Path, description = "Match ID")),
    request_body = RaiseDisputeRequest,
    responses(
        (status = 201, description = "Dispute raised", body = DisputeResponse),
        (status = 400, description = "Match is not awaiting confirmation", body = ErrorBody),
        (status = 403, description = "Caller is not a participant", body = ErrorBody),
        (status = 404, description = "Match not found", body = ErrorBody)
    ),
    tag = "Disputes"
)]
pub async fn raise_dispute(
    State(state): State<AppState>,
    actor: Actor,
    Path(match_id): Path<i32>,
    Json(payload): Json<RaiseDisputeRequest>,
) -> Result<(StatusCode, Json<DisputeResponse>), ServiceError> {
    payload.validate()?;

    let created = state
        .services
        .disputes
        .raise(
            &actor,
            match_id,
            RaiseDispute {
                reason: payload.reason,
                evidence_url: payload.evidence_url,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/disputes",
    responses(
        (status = 200, description = "All disputes, newest first", body = [DisputeDetailResponse]),
        (status = 403, description = "Admin only", body = ErrorBody)
    ),
    tag = "Disputes"
)]
pub async fn list_disputes(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<Vec<DisputeDetailResponse>>, ServiceError> {
    let disputes = state.services.disputes.list(&actor).await?;
    Ok(Json(
        disputes
            .into_iter()
            .map(DisputeDetailResponse::from)
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/disputes/{id}",
    params(("id" = i32, Path, description = "Dispute ID")),
    responses(
        (status = 200, description = "Dispute with match, participants and users", body = DisputeDetailResponse),
        (status = 404, description = "Dispute not found", body = ErrorBody)
    ),
    tag = "Disputes"
)]
pub async fn get_dispute(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<Json<DisputeDetailResponse>, ServiceError> {
    let details = state.services.disputes.get_details(&actor, id).await?;
    Ok(Json(details.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/disputes/{id}/review",
    params(("id" = i32, Path, description = "Dispute ID")),
    responses(
        (status = 200, description = "Dispute under review", body = DisputeResponse),
        (status = 400, description = "Dispute is not open", body = ErrorBody),
        (status = 403, description = "Admin only", body = ErrorBody),
        (status = 404, description = "Dispute not found", body = ErrorBody)
    ),
    tag = "Disputes"
)]
pub async fn review_dispute(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<Json<DisputeResponse>, ServiceError> {
    let updated = state.services.disputes.begin_review(&actor, id).await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/disputes/{id}/resolve",
    params(("id" = i32, Path, description = "Dispute ID")),
    request_body = ResolveDisputeRequest,
    responses(
        (status = 200, description = "Dispute resolved", body = DisputeResponse),
        (status = 400, description = "Dispute already resolved or invalid winner", body = ErrorBody),
        (status = 403, description = "Admin only", body = ErrorBody),
        (status = 404, description = "Dispute not found", body = ErrorBody)
    ),
    tag = "Disputes"
)]
pub async fn resolve_dispute(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(payload): Json<ResolveDisputeRequest>,
) -> Result<Json<DisputeResponse>, ServiceError> {
    payload.validate()?;

    let resolved = state
        .services
        .disputes
        .resolve(
            &actor,
            id,
            ResolveDispute {
                resolution_details: payload.resolution_details,
                winner_participant_id: payload.winner_participant_id,
            },
        )
        .await?;

    Ok(Json(resolved.into()))
}
