/// Integration tests for the table actor
///
/// The tokio clock is paused, so countdowns and pacing delays elapse as soon
/// as every task is idle.
use private_blackjack::{
    Action, Phase, TableActor, TableConfig, TableEvent, TableHandle, TableMessage, TableResponse,
    UserError, Username,
    game::entities::{Card, Rank, Shoe, Suit},
    settlement::Outcome,
    wallet::{AccountPolicy, AccountStore, MemoryAccountStore},
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

fn spawn_table(ranks: &[Rank]) -> (TableHandle, Arc<MemoryAccountStore>) {
    let mut cards: Vec<Card> = ranks.iter().map(|&r| Card::new(r, Suit::Diamond)).collect();
    cards.extend(std::iter::repeat_n(
        Card::new(Rank::Two, Suit::Club),
        2 * ranks.len() + 20,
    ));
    let store = Arc::new(MemoryAccountStore::new(AccountPolicy::default()));
    let (actor, handle) =
        TableActor::with_shoe(TableConfig::default(), store.clone(), Shoe::stacked(cards));
    tokio::spawn(actor.run());
    (handle, store)
}

async fn send(
    handle: &TableHandle,
    make: impl FnOnce(tokio::sync::oneshot::Sender<TableResponse>) -> TableMessage,
) -> TableResponse {
    handle.request(make).await.unwrap()
}

async fn wait_for_phase(handle: &TableHandle, phase: Phase) {
    for _ in 0..120 {
        if handle.snapshot().await.unwrap().phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("table never reached {phase}");
}

#[tokio::test(start_paused = true)]
async fn test_round_settles_and_persists() {
    // alice: 10 9, dealer: 10 6, dealer draws 5
    let (handle, store) = spawn_table(&[Rank::Ten, Rank::Nine, Rank::Ten, Rank::Six, Rank::Five]);
    let alice = Username::new("alice");

    handle.join(alice.clone(), "Alice".to_string()).await.unwrap();
    let player_id = alice.clone();
    assert!(send(&handle, |response| TableMessage::StartBetting { player_id, response })
        .await
        .is_success());
    assert_eq!(
        handle.place_bet(alice.clone(), 100).await.unwrap(),
        TableResponse::BetPlaced { bet: 100 }
    );
    let player_id = alice.clone();
    send(&handle, |response| TableMessage::ConfirmBet { player_id, response }).await;
    assert_eq!(store.get_balance(&alice).await.unwrap(), 900);

    wait_for_phase(&handle, Phase::PlayerTurns).await;
    assert_eq!(
        handle.take_action(alice.clone(), Action::Stand).await.unwrap(),
        TableResponse::Success
    );
    wait_for_phase(&handle, Phase::Settlement).await;

    // 19 against 21
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.dealer.total, 21);
    assert_eq!(snapshot.seats[0].result.as_deref(), Some("LOSS -$100"));

    let account = store.account(&alice).await.unwrap();
    assert_eq!(account.balance, 900);
    assert_eq!(account.total_games, 1);
    assert_eq!(account.total_losses, 1);
    let history = store.round_history(&alice, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, Outcome::Loss);
}

#[tokio::test(start_paused = true)]
async fn test_betting_countdown_reaches_subscribers() {
    let (handle, _store) = spawn_table(&[]);
    let alice = Username::new("alice");
    handle.join(alice.clone(), "Alice".to_string()).await.unwrap();
    let mut events = handle.subscribe(Uuid::new_v4(), 256).await.unwrap();

    let player_id = alice.clone();
    send(&handle, |response| TableMessage::StartBetting { player_id, response }).await;

    let mut countdown = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            TableEvent::Countdown { seconds_left } => countdown.push(seconds_left),
            TableEvent::Snapshot(snapshot) if snapshot.phase == Phase::Lobby && !countdown.is_empty() => {
                break;
            }
            _ => {}
        }
    }
    assert_eq!(countdown.len(), 30);
    assert_eq!(countdown.first(), Some(&29));
    assert_eq!(countdown.last(), Some(&0));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_turn_is_rejected() {
    let (handle, _store) = spawn_table(&[
        Rank::Ten,
        Rank::Six,
        Rank::Ten,
        Rank::Seven,
        Rank::Ten,
        Rank::Eight,
    ]);
    for name in ["alice", "bob"] {
        handle.join(name.into(), name.to_string()).await.unwrap();
    }
    send(&handle, |response| TableMessage::StartBetting {
        player_id: "alice".into(),
        response,
    })
    .await;
    for name in ["alice", "bob"] {
        handle.place_bet(name.into(), 10).await.unwrap();
        send(&handle, |response| TableMessage::ConfirmBet {
            player_id: name.into(),
            response,
        })
        .await;
    }
    wait_for_phase(&handle, Phase::PlayerTurns).await;

    let before = handle.snapshot().await.unwrap();
    assert_eq!(
        handle.take_action("bob".into(), Action::Hit).await.unwrap(),
        TableResponse::Rejected(UserError::OutOfTurnAction)
    );
    assert_eq!(handle.snapshot().await.unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn test_bonus_credits_seated_player() {
    let (handle, store) = spawn_table(&[]);
    let alice = Username::new("alice");
    handle.join(alice.clone(), "Alice".to_string()).await.unwrap();

    let player_id = alice.clone();
    let response = send(&handle, |response| TableMessage::ClaimBonus { player_id, response }).await;
    let TableResponse::BonusClaimed(claim) = response else {
        panic!("expected a bonus claim, got {response:?}");
    };
    assert_eq!(claim.amount, 500);
    assert_eq!(claim.balance, 1500);
    assert_eq!(handle.snapshot().await.unwrap().seats[0].balance, 1500);
    assert_eq!(store.get_balance(&alice).await.unwrap(), 1500);

    for _ in 0..2 {
        let player_id = alice.clone();
        send(&handle, |response| TableMessage::ClaimBonus { player_id, response }).await;
    }
    let player_id = alice.clone();
    let refused = send(&handle, |response| TableMessage::ClaimBonus { player_id, response }).await;
    assert!(!refused.is_success());
    assert_eq!(handle.snapshot().await.unwrap().seats[0].balance, 2500);
}

#[tokio::test(start_paused = true)]
async fn test_leave_mid_round_forfeits_stake() {
    let (handle, store) = spawn_table(&[Rank::Ten, Rank::Six, Rank::Ten, Rank::Seven]);
    let alice = Username::new("alice");
    handle.join(alice.clone(), "Alice".to_string()).await.unwrap();
    let player_id = alice.clone();
    send(&handle, |response| TableMessage::StartBetting { player_id, response }).await;
    handle.place_bet(alice.clone(), 50).await.unwrap();
    let player_id = alice.clone();
    send(&handle, |response| TableMessage::ConfirmBet { player_id, response }).await;
    wait_for_phase(&handle, Phase::PlayerTurns).await;

    let player_id = alice.clone();
    let response = send(&handle, |response| TableMessage::LeaveTable { player_id, response }).await;
    assert_eq!(response, TableResponse::Left { balance: 950 });

    let account = store.account(&alice).await.unwrap();
    assert_eq!(account.balance, 950);
    assert_eq!(account.total_losses, 1);
    let history = store.round_history(&alice, 1).await.unwrap();
    assert_eq!(history[0].outcome, Outcome::Forfeit);

    // With nobody left the round still runs out and the table reopens.
    wait_for_phase(&handle, Phase::Lobby).await;
}

#[tokio::test(start_paused = true)]
async fn test_close_returns_stakes() {
    let (handle, store) = spawn_table(&[]);
    let alice = Username::new("alice");
    handle.join(alice.clone(), "Alice".to_string()).await.unwrap();
    let player_id = alice.clone();
    send(&handle, |response| TableMessage::StartBetting { player_id, response }).await;
    handle.place_bet(alice.clone(), 75).await.unwrap();

    send(&handle, |response| TableMessage::Close { response }).await;
    assert_eq!(store.get_balance(&alice).await.unwrap(), 1000);
    assert!(handle.snapshot().await.is_err());
}
