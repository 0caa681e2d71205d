//! WebSocket command handling against a live table actor.
//!
//! The tokio clock is paused, so betting windows and pacing delays elapse as
//! soon as every task is idle.

use pb_server::{
    api::{
        AppState,
        websocket::{ClientMessage, ServerMessage, handle_client_message, leave_on_disconnect},
    },
    metrics,
};
use private_blackjack::{
    Card, Phase, Rank, Shoe, Suit, TableActor, TableConfig, TableEvent, TableHandle, TableMessage,
    Username,
    wallet::{AccountPolicy, AccountStore, MemoryAccountStore},
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

fn create_state(ranks: &[Rank]) -> (AppState, Arc<MemoryAccountStore>) {
    let mut cards: Vec<Card> = ranks.iter().map(|&r| Card::new(r, Suit::Heart)).collect();
    cards.extend(std::iter::repeat_n(Card::new(Rank::Two, Suit::Club), 40));
    let store = Arc::new(MemoryAccountStore::new(AccountPolicy::default()));
    let (actor, table) =
        TableActor::with_shoe(TableConfig::default(), store.clone(), Shoe::stacked(cards));
    tokio::spawn(actor.run());
    (AppState::new(table, store.clone()), store)
}

async fn wait_for_phase(table: &TableHandle, phase: Phase) {
    for _ in 0..120 {
        if table.snapshot().await.unwrap().phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("table never reached {phase}");
}

fn assert_ok(message: &ServerMessage) {
    assert!(
        !matches!(message, ServerMessage::Error { .. }),
        "unexpected error: {message:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_and_rejoin() {
    let (state, _store) = create_state(&[]);
    let alice = Username::new("alice");

    let joined = handle_client_message(
        ClientMessage::Join {
            name: Some("Alice".to_string()),
        },
        &alice,
        &state,
    )
    .await;
    assert!(matches!(
        joined,
        ServerMessage::Joined {
            seat_index: 0,
            balance: 1000
        }
    ));

    let again = handle_client_message(ClientMessage::Join { name: None }, &alice, &state).await;
    match again {
        ServerMessage::Error { message } => assert_eq!(message, "already seated"),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_commands_in_wrong_phase_are_errors() {
    let (state, _store) = create_state(&[]);
    let bob = Username::new("bob");
    handle_client_message(ClientMessage::Join { name: None }, &bob, &state).await;

    let response = handle_client_message(ClientMessage::PlaceBet { amount: 10 }, &bob, &state).await;
    assert!(matches!(response, ServerMessage::Error { .. }));

    let response = handle_client_message(ClientMessage::Hit, &bob, &state).await;
    assert!(matches!(response, ServerMessage::Error { .. }));

    let snapshot = state.table.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, Phase::Lobby);
    assert_eq!(snapshot.seats[0].balance, 1000);
}

#[tokio::test(start_paused = true)]
async fn test_full_round_over_commands() {
    // alice: 10 9, dealer: 10 7
    let (state, store) = create_state(&[Rank::Ten, Rank::Nine, Rank::Ten, Rank::Seven]);
    let alice = Username::new("alice");

    let tracker = tokio::spawn(metrics::track_table(
        state.table.subscribe(Uuid::new_v4(), 256).await.unwrap(),
    ));

    for command in [
        ClientMessage::Join { name: None },
        ClientMessage::StartBetting,
        ClientMessage::PlaceBet { amount: 100 },
        ClientMessage::ConfirmBet,
    ] {
        assert_ok(&handle_client_message(command, &alice, &state).await);
    }

    wait_for_phase(&state.table, Phase::PlayerTurns).await;
    assert_ok(&handle_client_message(ClientMessage::Stand, &alice, &state).await);
    wait_for_phase(&state.table, Phase::Settlement).await;

    let snapshot = state.table.snapshot().await.unwrap();
    assert_eq!(snapshot.seats[0].balance, 1100);
    assert_eq!(snapshot.seats[0].result.as_deref(), Some("WIN +$100"));
    assert_eq!(store.get_balance(&alice).await.unwrap(), 1100);

    assert_ok(&handle_client_message(ClientMessage::NewRound, &alice, &state).await);
    assert_eq!(state.table.snapshot().await.unwrap().phase, Phase::Betting);

    let left = handle_client_message(ClientMessage::Leave, &alice, &state).await;
    match left {
        ServerMessage::Success { message } => assert!(message.contains("$1100")),
        other => panic!("expected success, got {other:?}"),
    }

    state
        .table
        .request(|response| TableMessage::Close { response })
        .await
        .unwrap();
    assert_eq!(tracker.await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bonus_command() {
    let (state, _store) = create_state(&[]);
    let erin = Username::new("erin");
    handle_client_message(ClientMessage::Join { name: None }, &erin, &state).await;

    match handle_client_message(ClientMessage::ClaimBonus, &erin, &state).await {
        ServerMessage::BonusClaimed { claim } => {
            assert_eq!(claim.amount, 500);
            assert_eq!(claim.balance, 1500);
            assert_eq!(claim.claims_remaining, 2);
        }
        other => panic!("expected bonus, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_snapshot_first() {
    let (state, _store) = create_state(&[]);
    let mut events = state.table.subscribe(Uuid::new_v4(), 16).await.unwrap();

    match events.recv().await {
        Some(TableEvent::Snapshot(snapshot)) => assert_eq!(snapshot.phase, Phase::Lobby),
        other => panic!("expected snapshot, got {other:?}"),
    }

    handle_client_message(ClientMessage::Join { name: None }, &Username::new("finn"), &state)
        .await;
    let mut saw_seat = false;
    while let Ok(event) = events.try_recv() {
        if let TableEvent::Snapshot(snapshot) = event {
            saw_seat |= snapshot.seats.len() == 1;
        }
    }
    assert!(saw_seat);
}

#[tokio::test(start_paused = true)]
async fn test_seat_kept_while_another_connection_is_open() {
    let (state, _store) = create_state(&[]);
    let gina = Username::new("gina");
    state.connections.open(&gina);
    state.connections.open(&gina);
    assert_ok(&handle_client_message(ClientMessage::Join { name: None }, &gina, &state).await);

    assert_eq!(leave_on_disconnect(&gina, &state).await, None);
    let snapshot = state.table.snapshot().await.unwrap();
    assert_eq!(snapshot.seats.len(), 1);

    assert_eq!(leave_on_disconnect(&gina, &state).await, Some(1000));
    assert!(state.table.snapshot().await.unwrap().seats.is_empty());
    assert_eq!(state.connections.count(&gina), 0);
}
