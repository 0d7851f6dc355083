mod common;

use arena_api::entities::{
    dispute::{self, DisputeStatus},
    game_match::{self, MatchStatus},
    user::{self, UserRole},
};
use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::json;

use common::{response_json, TestApp};

struct Fixture {
    app: TestApp,
    alice: user::Model,
    bob: user::Model,
    outsider: user::Model,
    admin: user::Model,
    game: game_match::Model,
    alice_participant: i32,
    bob_participant: i32,
}

async fn fixture(status: MatchStatus) -> Fixture {
    let app = TestApp::new().await;
    let alice = app.create_user("alice", UserRole::Player, Decimal::ZERO, "USD").await;
    let bob = app.create_user("bob", UserRole::Player, Decimal::ZERO, "USD").await;
    let outsider = app.create_user("carol", UserRole::Player, Decimal::ZERO, "USD").await;
    let admin = app.create_user("referee", UserRole::Admin, Decimal::ZERO, "USD").await;

    let cup = app.create_tournament("Spring Cup").await;
    let p1 = app.add_participant(cup.id, alice.id).await;
    let p2 = app.add_participant(cup.id, bob.id).await;
    let game = app.create_match(cup.id, p1.id, p2.id, status).await;

    Fixture {
        app,
        alice,
        bob,
        outsider,
        admin,
        game,
        alice_participant: p1.id,
        bob_participant: p2.id,
    }
}

async fn raise(f: &Fixture) -> i32 {
    let response = f
        .app
        .request_as(
            &f.alice,
            Method::POST,
            &format!("/api/v1/matches/{}/disputes", f.game.id),
            Some(json!({ "reason": "Opponent reported the wrong score" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["status"], "open");
    body["id"].as_i64().expect("dispute id") as i32
}

#[tokio::test]
async fn missing_dispute_is_a_plain_404() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;

    let response = f
        .app
        .request_as(&f.admin, Method::GET, "/api/v1/disputes/9999", None)
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response_json(response).await,
        json!({ "message": "Dispute not found." })
    );
}

#[tokio::test]
async fn raising_moves_match_to_disputed_and_expands_details() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;
    let dispute_id = raise(&f).await;

    let game = game_match::Entity::find_by_id(f.game.id)
        .one(f.app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(game.status, MatchStatus::Disputed);

    let response = f
        .app
        .request_as(&f.bob, Method::GET, &format!("/api/v1/disputes/{dispute_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    assert_eq!(body["raised_by"]["username"], "alice");
    assert_eq!(body["match"]["tournament"]["name"], "Spring Cup");
    assert_eq!(body["match"]["participant1"]["user"]["username"], "alice");
    assert_eq!(body["match"]["participant2"]["user"]["username"], "bob");
    assert!(body["resolved_by"].is_null());
}

#[tokio::test]
async fn uninvolved_players_cannot_see_or_raise() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;
    let dispute_id = raise(&f).await;

    let response = f
        .app
        .request_as(
            &f.outsider,
            Method::GET,
            &format!("/api/v1/disputes/{dispute_id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = f
        .app
        .request_as(
            &f.outsider,
            Method::POST,
            &format!("/api/v1/matches/{}/disputes", f.game.id),
            Some(json!({ "reason": "I want in" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_matches_awaiting_confirmation_can_be_disputed() {
    let f = fixture(MatchStatus::Live).await;

    let response = f
        .app
        .request_as(
            &f.alice,
            Method::POST,
            &format!("/api/v1/matches/{}/disputes", f.game.id),
            Some(json!({ "reason": "Too early" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["code"], "INVALID_STATUS");
}

#[tokio::test]
async fn review_then_resolve_with_winner() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;
    let dispute_id = raise(&f).await;

    let forbidden = f
        .app
        .request_as(
            &f.alice,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/review"),
            None,
        )
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let review = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/review"),
            None,
        )
        .await;
    assert_eq!(review.status(), StatusCode::OK);
    assert_eq!(response_json(review).await["status"], "under_review");

    let resolve = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/resolve"),
            Some(json!({
                "resolution_details": "Screenshot confirms bob won",
                "winner_participant_id": f.bob_participant
            })),
        )
        .await;
    assert_eq!(resolve.status(), StatusCode::OK);
    let body = response_json(resolve).await;
    assert_eq!(body["status"], "resolved");
    assert_eq!(body["resolved_by_admin_id"], f.admin.id);
    assert!(!body["closed_at"].is_null());

    let game = game_match::Entity::find_by_id(f.game.id)
        .one(f.app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(game.status, MatchStatus::Completed);
    assert_eq!(game.winner_id, Some(f.bob_participant));
    assert_eq!(game.confirmed_by_user_id, Some(f.admin.id));
    assert_eq!(game.resolved_reason.as_deref(), Some("dispute_resolution"));

    let again = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/resolve"),
            Some(json!({ "resolution_details": "again" })),
        )
        .await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn open_dispute_can_be_resolved_directly() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;
    let dispute_id = raise(&f).await;

    let response = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/resolve"),
            Some(json!({ "resolution_details": "Withdrawn by player" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = dispute::Entity::find_by_id(dispute_id)
        .one(f.app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DisputeStatus::Resolved);
    assert_eq!(stored.resolved_by_admin_id, Some(f.admin.id));
    assert!(stored.closed_at.is_some());

    // Without a winner the match stays disputed.
    let game = game_match::Entity::find_by_id(f.game.id)
        .one(f.app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(game.status, MatchStatus::Disputed);
}

#[tokio::test]
async fn resolving_with_a_winner_cannot_reopen_a_forfeited_match() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;
    let dispute_id = raise(&f).await;

    let forfeit = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/matches/{}/forfeit", f.game.id),
            Some(json!({ "forfeit_participant_id": f.alice_participant })),
        )
        .await;
    assert_eq!(forfeit.status(), StatusCode::OK);

    let resolve = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/resolve"),
            Some(json!({
                "resolution_details": "Alice actually won",
                "winner_participant_id": f.alice_participant
            })),
        )
        .await;
    assert_eq!(resolve.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(resolve).await["code"], "INVALID_STATUS");

    let game = game_match::Entity::find_by_id(f.game.id)
        .one(f.app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(game.status, MatchStatus::Forfeited);
    assert_eq!(game.winner_id, Some(f.bob_participant));
    assert_eq!(game.forfeit_participant_id, Some(f.alice_participant));

    // The dispute itself is untouched and can still be closed without a winner.
    let stored = dispute::Entity::find_by_id(dispute_id)
        .one(f.app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DisputeStatus::Open);
    assert!(stored.closed_at.is_none());

    let close = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/resolve"),
            Some(json!({ "resolution_details": "Settled by forfeit" })),
        )
        .await;
    assert_eq!(close.status(), StatusCode::OK);
}

#[tokio::test]
async fn review_is_rejected_once_resolved() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;
    let dispute_id = raise(&f).await;

    let resolve = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/resolve"),
            Some(json!({ "resolution_details": "Withdrawn" })),
        )
        .await;
    assert_eq!(resolve.status(), StatusCode::OK);

    let review = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/disputes/{dispute_id}/review"),
            None,
        )
        .await;
    assert_eq!(review.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(review).await["code"], "INVALID_STATUS");

    let stored = dispute::Entity::find_by_id(dispute_id)
        .one(f.app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DisputeStatus::Resolved);
    assert!(stored.closed_at.is_some());

    let missing = f
        .app
        .request_as(&f.admin, Method::POST, "/api/v1/disputes/9999/review", None)
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_lists_disputes_newest_first() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;
    let first = raise(&f).await;

    let response = f
        .app
        .request_as(&f.admin, Method::GET, "/api/v1/disputes", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let items = body.as_array().expect("array body");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], first);
    assert_eq!(items[0]["match"]["participant2"]["user"]["username"], "bob");

    let response = f
        .app
        .request_as(&f.alice, Method::GET, "/api/v1/disputes", None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn forfeit_awards_opponent_and_records_forfeiting_user() {
    let f = fixture(MatchStatus::Live).await;

    let response = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/matches/{}/forfeit", f.game.id),
            Some(json!({ "forfeit_participant_id": f.alice_participant, "reason": "no-show" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "forfeited");
    assert_eq!(body["winner_id"], f.bob_participant);
    assert_eq!(body["forfeit_user_id"], f.alice.id);
    assert_eq!(body["forfeit_participant_id"], f.alice_participant);
    assert_eq!(body["resolved_reason"], "no-show");
    assert_eq!(body["resolved_by"], format!("admin:{}", f.admin.id));

    let again = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/matches/{}/no-contest", f.game.id),
            None,
        )
        .await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forfeit_rejects_participants_outside_the_match() {
    let f = fixture(MatchStatus::Live).await;

    let response = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/matches/{}/forfeit", f.game.id),
            Some(json!({ "forfeit_participant_id": 4242 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn no_contest_clears_winner() {
    let f = fixture(MatchStatus::Disputed).await;

    let response = f
        .app
        .request_as(
            &f.admin,
            Method::POST,
            &format!("/api/v1/matches/{}/no-contest", f.game.id),
            Some(json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "no_contest");
    assert!(body["winner_id"].is_null());
    assert_eq!(body["resolved_reason"], "no_contest");
}

#[tokio::test]
async fn requests_without_identity_are_rejected() {
    let f = fixture(MatchStatus::AwaitingConfirmation).await;
    let response = f
        .app
        .request(Method::GET, "/api/v1/disputes", None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
