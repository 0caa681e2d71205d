//! Seats, the dealer hand and the shoe, plus round metadata.

use chrono::{DateTime, Utc};

use super::{
    entities::{Hand, Phase, SeatIndex, SeatView, Shoe, Usd, Username},
    functional,
    state_machine::UserError,
};

#[derive(Clone, Debug)]
pub struct Seat {
    pub player_id: Username,
    pub display_name: String,
    pub balance: Usd,
    /// Empty until the cards are dealt, two entries after a split.
    pub hands: Vec<Hand>,
    pub active_hand_index: usize,
    /// Stake per hand. Taken out of `balance` as it is placed.
    pub bet: Usd,
    pub bet_confirmed: bool,
    /// Confirmed a bet before the betting window closed.
    pub in_round: bool,
    pub result: Option<String>,
    pub last_win: Usd,
}

impl Seat {
    #[must_use]
    pub fn new(player_id: Username, display_name: String, balance: Usd) -> Self {
        Self {
            player_id,
            display_name,
            balance,
            hands: Vec::with_capacity(2),
            active_hand_index: 0,
            bet: 0,
            bet_confirmed: false,
            in_round: false,
            result: None,
            last_win: 0,
        }
    }

    /// Clear everything that belongs to a single round.
    pub fn reset(&mut self) {
        self.hands.clear();
        self.active_hand_index = 0;
        self.bet = 0;
        self.bet_confirmed = false;
        self.in_round = false;
        self.result = None;
        self.last_win = 0;
    }

    /// Give back a bet that was never confirmed. Returns the refund.
    pub fn refund_pending_bet(&mut self) -> Usd {
        if self.bet_confirmed {
            return 0;
        }
        let refund = self.bet;
        self.balance += refund;
        self.bet = 0;
        refund
    }

    /// Everything this seat has at risk in the current round.
    #[must_use]
    pub fn stake(&self) -> Usd {
        let hands = u32::try_from(self.hands.len().max(1)).unwrap_or(1);
        self.bet * hands
    }

    #[must_use]
    pub fn active_hand(&self) -> Option<&Hand> {
        self.hands.get(self.active_hand_index)
    }

    pub fn active_hand_mut(&mut self) -> Option<&mut Hand> {
        self.hands.get_mut(self.active_hand_index)
    }

    /// First hand at or after `from` that can still take cards.
    #[must_use]
    pub fn next_open_hand(&self, from: usize) -> Option<usize> {
        (from..self.hands.len()).find(|&i| !self.hands[i].is_finished())
    }

    #[must_use]
    pub fn has_open_hand(&self) -> bool {
        self.next_open_hand(0).is_some()
    }

    fn single_open_two_card_hand(&self) -> Option<&Hand> {
        match self.hands.as_slice() {
            [hand] if self.in_round && hand.cards.len() == 2 && !hand.is_finished() => Some(hand),
            _ => None,
        }
    }

    #[must_use]
    pub fn can_double(&self) -> bool {
        self.single_open_two_card_hand()
            .is_some_and(|hand| !hand.doubled && self.balance >= self.bet)
    }

    #[must_use]
    pub fn can_split(&self) -> bool {
        self.single_open_two_card_hand()
            .is_some_and(|hand| functional::can_split(&hand.cards) && self.balance >= self.bet)
    }

    #[must_use]
    pub fn view(&self) -> SeatView {
        SeatView {
            player_id: self.player_id.clone(),
            display_name: self.display_name.clone(),
            balance: self.balance,
            bet: self.bet,
            bet_confirmed: self.bet_confirmed,
            in_round: self.in_round,
            hands: self.hands.iter().map(Into::into).collect(),
            active_hand_index: self.active_hand_index,
            can_split: self.can_split(),
            can_double: self.can_double(),
            result: self.result.clone(),
            last_win: self.last_win,
        }
    }
}

#[derive(Debug)]
pub struct Table {
    pub seats: Vec<Seat>,
    pub max_seats: usize,
    pub dealer_hand: Hand,
    pub shoe: Shoe,
    pub phase: Phase,
    /// Meaningful only during `Phase::PlayerTurns`.
    pub active_seat_index: SeatIndex,
    pub betting_deadline: Option<DateTime<Utc>>,
    pub betting_time_left: u32,
    /// Bumped on every phase change. Timers carry the value they were
    /// scheduled under and are ignored once it moves on.
    pub round_token: u64,
    pub round_number: u64,
}

impl Table {
    #[must_use]
    pub fn new(max_seats: usize, shoe: Shoe) -> Self {
        Self {
            seats: Vec::with_capacity(max_seats),
            max_seats,
            dealer_hand: Hand::new(),
            shoe,
            phase: Phase::Lobby,
            active_seat_index: 0,
            betting_deadline: None,
            betting_time_left: 0,
            round_token: 0,
            round_number: 0,
        }
    }

    #[must_use]
    pub fn seat_index(&self, player_id: &Username) -> Option<SeatIndex> {
        self.seats.iter().position(|s| &s.player_id == player_id)
    }

    #[must_use]
    pub fn seat(&self, player_id: &Username) -> Option<&Seat> {
        self.seats.iter().find(|s| &s.player_id == player_id)
    }

    pub fn seat_mut(&mut self, player_id: &Username) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| &s.player_id == player_id)
    }

    /// Seats taking part in the current round.
    pub fn participants(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter().filter(|s| s.in_round)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.max_seats
    }

    pub fn add_seat(
        &mut self,
        player_id: Username,
        display_name: String,
        starting_balance: Usd,
    ) -> Result<SeatIndex, UserError> {
        if self.phase != Phase::Lobby {
            return Err(UserError::GameAlreadyInProgress);
        }
        if self.seat_index(&player_id).is_some() {
            return Err(UserError::UserAlreadyExists);
        }
        if self.is_full() {
            return Err(UserError::CapacityReached);
        }
        self.seats
            .push(Seat::new(player_id, display_name, starting_balance));
        Ok(self.seats.len() - 1)
    }

    /// Take a seat off the table, refunding any unconfirmed bet first.
    ///
    /// Turn order is not touched here; the round engine reindexes.
    pub fn remove_seat(&mut self, player_id: &Username) -> Result<(SeatIndex, Seat), UserError> {
        let idx = self
            .seat_index(player_id)
            .ok_or(UserError::UserDoesNotExist)?;
        let mut seat = self.seats.remove(idx);
        seat.refund_pending_bet();
        Ok((idx, seat))
    }

    /// Advance the token, invalidating every timer scheduled so far.
    pub fn bump_token(&mut self) -> u64 {
        self.round_token += 1;
        self.round_token
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.bump_token();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{Card, Rank, Suit};

    fn table() -> Table {
        Table::new(7, Shoe::new(1))
    }

    #[test]
    fn test_add_seat() {
        let mut table = table();
        let idx = table
            .add_seat("alice".into(), "Alice".to_string(), 1000)
            .unwrap();
        assert_eq!(idx, 0);
        assert_eq!(table.seats[0].balance, 1000);
    }

    #[test]
    fn test_table_full() {
        let mut table = table();
        for i in 0..7 {
            table
                .add_seat(format!("p{i}").into(), format!("P{i}"), 100)
                .unwrap();
        }
        assert_eq!(
            table.add_seat("late".into(), "Late".to_string(), 100),
            Err(UserError::CapacityReached)
        );
    }

    #[test]
    fn test_cannot_join_mid_round() {
        let mut table = table();
        table.set_phase(Phase::Betting);
        assert_eq!(
            table.add_seat("bob".into(), "Bob".to_string(), 100),
            Err(UserError::GameAlreadyInProgress)
        );
    }

    #[test]
    fn test_duplicate_seat_rejected() {
        let mut table = table();
        table
            .add_seat("bob".into(), "Bob".to_string(), 100)
            .unwrap();
        assert_eq!(
            table.add_seat("bob".into(), "Bobby".to_string(), 100),
            Err(UserError::UserAlreadyExists)
        );
    }

    #[test]
    fn test_remove_seat_refunds_pending_bet() {
        let mut table = table();
        table
            .add_seat("carol".into(), "Carol".to_string(), 1000)
            .unwrap();
        let seat = &mut table.seats[0];
        seat.bet = 50;
        seat.balance = 950;
        let (idx, seat) = table.remove_seat(&"carol".into()).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(seat.balance, 1000);
        assert!(table.seats.is_empty());
    }

    #[test]
    fn test_remove_seat_keeps_confirmed_bet() {
        let mut table = table();
        table
            .add_seat("dave".into(), "Dave".to_string(), 1000)
            .unwrap();
        let seat = &mut table.seats[0];
        seat.bet = 50;
        seat.balance = 950;
        seat.bet_confirmed = true;
        let (_, seat) = table.remove_seat(&"dave".into()).unwrap();
        assert_eq!(seat.balance, 950);
    }

    #[test]
    fn test_remove_unknown_seat() {
        let mut table = table();
        assert!(matches!(
            table.remove_seat(&"ghost".into()),
            Err(UserError::UserDoesNotExist)
        ));
    }

    #[test]
    fn test_phase_change_bumps_token() {
        let mut table = table();
        let before = table.round_token;
        table.set_phase(Phase::Betting);
        assert_eq!(table.round_token, before + 1);
    }

    #[test]
    fn test_split_and_double_eligibility() {
        let mut seat = Seat::new("erin".into(), "Erin".to_string(), 100);
        seat.bet = 50;
        seat.in_round = true;
        let mut hand = Hand::new();
        hand.push(Card::new(Rank::Eight, Suit::Club));
        hand.push(Card::new(Rank::Eight, Suit::Heart));
        seat.hands.push(hand);
        assert!(seat.can_split());
        assert!(seat.can_double());

        seat.balance = 49;
        assert!(!seat.can_split());
        assert!(!seat.can_double());
    }
}
