//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`

mod fixtures;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use fixtures::{test_system, TestSystem, COMMUNITY};
use rally_point::http::{router, ApiState};
use rally_point::service::HealthContext;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

fn app(system: &TestSystem) -> Router {
    let health = HealthContext::new(
        "rally-point",
        system.service.clone(),
        None,
        Arc::new(RwLock::new(true)),
    );
    router(ApiState::new(system.service.clone(), system.metrics.clone()).with_health(health))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn join(app: &Router, user_id: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/queue/join",
        Some(json!({"communityId": COMMUNITY, "userId": user_id, "gameMode": "duel"})),
    )
    .await
}

#[tokio::test]
async fn test_duel_through_http() {
    let system = test_system();
    let app = app(&system);

    let (status, reply) = join(&app, "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["message"], "Joined Duel queue (1/2 players)");

    let (_, reply) = join(&app, "bob").await;
    assert_eq!(reply["message"], "Joined Duel queue, a ready check has started");

    let lobby_id = system.service.open_lobby_for("alice").unwrap().unwrap();
    let (status, lobby) = send(&app, "GET", &format!("/lobbies/{}", lobby_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lobby["members"].as_array().unwrap().len(), 2);

    let respond = format!("/ready-checks/{}/respond", lobby_id);
    let (_, reply) = send(&app, "POST", &respond, Some(json!({"userId": "alice", "accept": true}))).await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["allAccepted"], false);

    let (_, reply) = send(&app, "POST", &respond, Some(json!({"userId": "bob", "accept": true}))).await;
    assert_eq!(reply["allAccepted"], true);
    let match_id = reply["matchId"].as_str().unwrap().to_string();

    let (status, game) = send(&app, "GET", &format!("/matches/{}", match_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(game["status"], "ongoing");
    let winner = game["players"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["team"] == "One")
        .map(|p| p["user_id"].as_str().unwrap().to_string())
        .unwrap();

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/matches/{}/report", match_id),
        Some(json!({"reporterId": winner, "team1Score": 1, "team2Score": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["message"], "Result 1-0 recorded, awaiting approval");

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/matches/{}/approve", match_id),
        Some(json!({"winnerTeam": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["success"], true);
    assert_eq!(reply["mmrChanges"][&winner], 16);

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/matches/{}/approve", match_id),
        Some(json!({"winnerTeam": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(reply["success"], false);

    let (_, board) = send(&app, "GET", "/leaderboard/chess?limit=5", None).await;
    assert_eq!(board["gameId"], "chess");
    assert_eq!(board["entries"][0]["user_id"], winner.as_str());
    assert_eq!(board["entries"][0]["rating"], 1216);

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/matches/{}/void", match_id),
        Some(json!({"reason": "smurf account"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["reverted"], true);
    assert_eq!(reply["outcome"], "reverted");
    assert_eq!(reply["message"], "Match voided, ratings reverted for 2 players");
    assert_eq!(
        system.service.player_rating(&winner, "chess").unwrap().rating,
        1200
    );
}

#[tokio::test]
async fn test_leave_queue() {
    let system = test_system();
    let app = app(&system);
    join(&app, "alice").await;

    let (status, reply) = send(
        &app,
        "POST",
        "/queue/leave",
        Some(json!({"userId": "alice", "communityId": COMMUNITY})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["message"], "Left 1 queue(s)");

    // Leaving again is a no-op, not an error
    let (status, reply) = send(&app, "POST", "/queue/leave", Some(json!({"userId": "alice"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["success"], true);
    assert_eq!(reply["message"], "Player alice is not in any queue");
}

#[tokio::test]
async fn test_decline_reports_cancellation() {
    let system = test_system();
    let app = app(&system);
    join(&app, "alice").await;
    join(&app, "bob").await;
    let lobby_id = system.service.open_lobby_for("bob").unwrap().unwrap();

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/ready-checks/{}/respond", lobby_id),
        Some(json!({"userId": "bob", "accept": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["allAccepted"], false);
    assert_eq!(reply["message"], "Ready check cancelled (declined)");
}

#[tokio::test]
async fn test_validation_and_lookup_errors() {
    let system = test_system();
    let app = app(&system);

    let missing = uuid::Uuid::new_v4();
    let (status, reply) = send(&app, "GET", &format!("/matches/{}", missing), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(reply["message"], format!("Match not found: {}", missing));

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/matches/{}/approve", missing),
        Some(json!({"winnerTeam": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["message"], "winnerTeam must be 0, 1 or 2");

    let (status, _) = send(&app, "GET", "/lobbies/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_monitoring_endpoints() {
    let system = test_system();
    let app = app(&system);
    join(&app, "alice").await;

    let (status, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["stats"]["players_waiting"], 1);

    let (status, stats) = send(&app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["queues"]["playersWaiting"], 1);

    let (status, _) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, info) = send(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["service"], "rally-point");
}
