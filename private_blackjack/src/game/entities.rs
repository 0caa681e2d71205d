use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

use super::{constants, functional};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl Suit {
    pub const ALL: [Self; 4] = [Self::Club, Self::Spade, Self::Diamond, Self::Heart];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
}

impl Rank {
    pub const ALL: [Self; 13] = [
        Self::Ace,
        Self::Two,
        Self::Three,
        Self::Four,
        Self::Five,
        Self::Six,
        Self::Seven,
        Self::Eight,
        Self::Nine,
        Self::Ten,
        Self::Jack,
        Self::Queen,
        Self::King,
    ];

    /// Ten, jack, queen and king all count as ten.
    #[must_use]
    pub fn is_ten_valued(self) -> bool {
        matches!(self, Self::Ten | Self::Jack | Self::Queen | Self::King)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Ace => "A",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Eight => "8",
            Self::Nine => "9",
            Self::Ten => "10",
            Self::Jack => "J",
            Self::Queen => "Q",
            Self::King => "K",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
    pub face_up: bool,
}

impl Card {
    #[must_use]
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self {
            rank,
            suit,
            face_up: true,
        }
    }

    #[must_use]
    pub const fn face_down(self) -> Self {
        Self {
            face_up: false,
            ..self
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.face_up {
            let repr = format!("{}/{}", self.rank, self.suit);
            write!(f, "{repr:>4}")
        } else {
            write!(f, "{:>4}", "??")
        }
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ShoeError {
    #[error("shoe exhausted after {drawn} of {total} cards")]
    Exhausted { drawn: usize, total: usize },
}

/// The multi-deck card supply. Cards are drawn from the back of `cards`.
#[derive(Debug)]
pub struct Shoe {
    cards: Vec<Card>,
    num_decks: usize,
    total: usize,
    drawn: usize,
}

impl Shoe {
    #[must_use]
    pub fn new(num_decks: usize) -> Self {
        let mut shoe = Self {
            cards: Vec::with_capacity(num_decks * 52),
            num_decks,
            total: 0,
            drawn: 0,
        };
        shoe.reshuffle();
        shoe
    }

    /// A shoe that deals `cards` front to back without shuffling.
    ///
    /// A later `reshuffle` rebuilds a regular shoe with enough decks to cover
    /// the stacked cards.
    #[must_use]
    pub fn stacked(cards: Vec<Card>) -> Self {
        let total = cards.len();
        let mut cards = cards;
        cards.reverse();
        Self {
            cards,
            num_decks: total.div_ceil(52).max(1),
            total,
            drawn: 0,
        }
    }

    pub fn draw(&mut self) -> Result<Card, ShoeError> {
        let card = self.cards.pop().ok_or(ShoeError::Exhausted {
            drawn: self.drawn,
            total: self.total,
        })?;
        self.drawn += 1;
        Ok(card)
    }

    /// Half the shoe has been dealt.
    #[must_use]
    pub fn needs_reshuffle(&self) -> bool {
        2 * self.drawn >= self.total
    }

    pub fn reshuffle(&mut self) {
        self.cards.clear();
        for _ in 0..self.num_decks {
            for suit in Suit::ALL {
                for rank in Rank::ALL {
                    self.cards.push(Card::new(rank, suit));
                }
            }
        }
        self.cards.shuffle(&mut rand::rng());
        self.total = self.cards.len();
        self.drawn = 0;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn drawn(&self) -> usize {
        self.drawn
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn num_decks(&self) -> usize {
        self.num_decks
    }
}

/// Type alias for whole dollars. Bets and balances never go fractional;
/// the 3:2 blackjack bonus is floored.
pub type Usd = u32;

/// One set of cards belonging to the dealer or to one position of a seat.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Hand {
    pub cards: Vec<Card>,
    pub total: u8,
    pub busted: bool,
    pub is_natural: bool,
    pub standing: bool,
    pub doubled: bool,
}

impl Hand {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cards: Vec::with_capacity(4),
            ..Self::default()
        }
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
        self.recompute();
    }

    /// Turn every face-down card face up.
    pub fn reveal(&mut self) {
        for card in &mut self.cards {
            card.face_up = true;
        }
        self.recompute();
    }

    pub fn recompute(&mut self) {
        self.total = functional::calculate_total(&self.cards);
        self.busted = self.total > constants::BLACKJACK;
    }

    /// No further cards can be taken.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.busted || self.standing || self.is_natural
    }

    #[must_use]
    pub fn is_soft(&self) -> bool {
        functional::is_soft(&self.cards)
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Username(String);

impl Username {
    pub fn new(s: &str) -> Self {
        let username: String = s
            .trim()
            .chars()
            .take(constants::MAX_USER_INPUT_LENGTH)
            .map(|c| if c.is_ascii_whitespace() { '_' } else { c })
            .collect();
        Self(username)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

impl From<String> for Username {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for Username {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Type alias for seat positions at the table.
pub type SeatIndex = usize;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Phase {
    Lobby,
    Betting,
    Dealing,
    PlayerTurns,
    DealerTurn,
    Settlement,
}

impl Phase {
    /// A round has started and has not been settled yet.
    #[must_use]
    pub fn is_mid_round(self) -> bool {
        matches!(self, Self::Dealing | Self::PlayerTurns | Self::DealerTurn)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Lobby => "lobby",
            Self::Betting => "betting",
            Self::Dealing => "dealing",
            Self::PlayerTurns => "player turns",
            Self::DealerTurn => "dealer turn",
            Self::Settlement => "settlement",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Hit,
    Stand,
    Double,
    Split,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Hit => "hits",
            Self::Stand => "stands",
            Self::Double => "doubles down",
            Self::Split => "splits",
        };
        write!(f, "{repr}")
    }
}

/// A card as observers see it. Face-down cards keep their position but
/// not their face.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardView {
    Up { rank: Rank, suit: Suit },
    Hidden,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        if card.face_up {
            Self::Up {
                rank: card.rank,
                suit: card.suit,
            }
        } else {
            Self::Hidden
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandView {
    pub cards: Vec<CardView>,
    pub total: u8,
    pub busted: bool,
    pub is_natural: bool,
    pub standing: bool,
    pub doubled: bool,
}

impl From<&Hand> for HandView {
    fn from(hand: &Hand) -> Self {
        Self {
            cards: hand.cards.iter().map(CardView::from).collect(),
            total: hand.total,
            busted: hand.busted,
            is_natural: hand.is_natural,
            standing: hand.standing,
            doubled: hand.doubled,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SeatView {
    pub player_id: Username,
    pub display_name: String,
    pub balance: Usd,
    pub bet: Usd,
    pub bet_confirmed: bool,
    pub in_round: bool,
    pub hands: Vec<HandView>,
    pub active_hand_index: usize,
    pub can_split: bool,
    pub can_double: bool,
    pub result: Option<String>,
    pub last_win: Usd,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ShoeView {
    pub remaining: usize,
    pub drawn: usize,
    pub total: usize,
}

/// Everything a client needs to render the table.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub round_number: u64,
    pub phase: Phase,
    pub seats: Vec<SeatView>,
    pub active_seat_index: Option<SeatIndex>,
    pub dealer: HandView,
    pub shoe: ShoeView,
    pub betting_time_left: Option<u32>,
    pub betting_deadline: Option<DateTime<Utc>>,
}
