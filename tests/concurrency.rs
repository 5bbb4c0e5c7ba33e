//! Concurrent queueing and ready-check tests
//!
//! Races are driven with `join_all` over spawned tasks on a multi-threaded
//! runtime so store operations really interleave.

mod fixtures;

use fixtures::{test_system, COMMUNITY};
use futures::future::join_all;
use rally_point::lobby::{ReadyCheckOutcome, SweepTarget};
use rally_point::queue::{InMemoryQueueStore, QueueStore};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_extractions_never_both_succeed() {
    for _ in 0..50 {
        let queue = Arc::new(InMemoryQueueStore::new());
        queue.join("chess-duel", "alice").unwrap();
        queue.join("chess-duel", "bob").unwrap();
        let ids = vec!["alice".to_string(), "bob".to_string()];

        let attempts = (0..8).map(|_| {
            let queue = queue.clone();
            let ids = ids.clone();
            tokio::spawn(async move { queue.extract("chess-duel", &ids) })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.is_retryable()));
        assert_eq!(queue.count("chess-duel").unwrap(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_place_every_player_once() {
    let system = test_system();
    let players: Vec<String> = (0..40).map(|i| format!("player-{}", i)).collect();

    let joins = players.iter().cloned().map(|player| {
        let service = system.service.clone();
        tokio::spawn(async move { service.join(COMMUNITY, &player, "duel").await })
    });
    for result in join_all(joins).await {
        result.unwrap().unwrap();
    }

    // Joins that lost an extraction race leave players behind for the sweep
    system.service.sweep_once().await.unwrap();

    let stats = system.service.stats().unwrap();
    assert_eq!(stats.players_waiting, 0);
    assert_eq!(stats.open_lobbies, 20);

    let mut seen = HashSet::new();
    for player in &players {
        let lobby_id = system
            .service
            .open_lobby_for(player)
            .unwrap()
            .expect("every player is in a lobby");
        seen.insert(lobby_id);
    }
    assert_eq!(seen.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_start_exactly_one_match() {
    let system = test_system();
    let players: Vec<String> = (1..=4).map(|i| format!("p{}", i)).collect();

    let mut lobby_id = None;
    for player in &players {
        let outcome = system
            .service
            .join(COMMUNITY, player, "wingman")
            .await
            .unwrap();
        lobby_id = lobby_id.or(outcome.lobbies_opened.first().copied());
    }
    let lobby_id = lobby_id.unwrap();

    let responses = players.iter().cloned().map(|player| {
        let service = system.service.clone();
        tokio::spawn(async move { service.respond(lobby_id, &player, true).await })
    });
    let outcomes: Vec<_> = join_all(responses)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let started: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            ReadyCheckOutcome::MatchStarted { match_id } => Some(*match_id),
            _ => None,
        })
        .collect();
    assert_eq!(started.len(), 1);
    assert_eq!(system.service.stats().unwrap().matches.ongoing, 1);
    assert_eq!(system.notifier.wait_for("MatchStarted", 1).await, 1);

    let game = system.service.get_match(started[0]).unwrap();
    let mut roster = game.player_ids();
    roster.sort();
    assert_eq!(roster, players);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_responses() {
    let system = test_system();
    system
        .service
        .join(COMMUNITY, "alice", "duel")
        .await
        .unwrap();
    let lobby_id = system
        .service
        .join(COMMUNITY, "bob", "duel")
        .await
        .unwrap()
        .lobbies_opened[0];

    let responses = (0..6).map(|_| {
        let service = system.service.clone();
        tokio::spawn(async move { service.respond(lobby_id, "alice", true).await })
    });
    let results: Vec<_> = join_all(responses)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(system.service.get_lobby(lobby_id).unwrap().accepted_count(), 1);
}
