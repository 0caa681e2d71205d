//! Pure hand evaluation.

use super::{
    constants::BLACKJACK,
    entities::{Card, Rank},
};

/// Face value with aces counted high.
#[must_use]
pub fn card_value(rank: Rank) -> u8 {
    match rank {
        Rank::Ace => 11,
        Rank::Two => 2,
        Rank::Three => 3,
        Rank::Four => 4,
        Rank::Five => 5,
        Rank::Six => 6,
        Rank::Seven => 7,
        Rank::Eight => 8,
        Rank::Nine => 9,
        Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 10,
    }
}

/// Returns the best total of the face-up cards and how many aces are still
/// counted as 11 in it.
fn total_with_soft_aces(cards: &[Card]) -> (u32, u8) {
    let mut total = 0u32;
    let mut soft_aces = 0u8;
    for card in cards.iter().filter(|c| c.face_up) {
        if card.rank == Rank::Ace {
            soft_aces += 1;
        }
        total += u32::from(card_value(card.rank));
    }
    while total > u32::from(BLACKJACK) && soft_aces > 0 {
        total -= 10;
        soft_aces -= 1;
    }
    (total, soft_aces)
}

/// Blackjack total of the face-up cards.
///
/// Aces count 11 and drop to 1, one at a time, while the total is over 21.
/// Face-down cards are ignored. Totals saturate at `u8::MAX`, far beyond
/// anything a legal hand reaches.
#[must_use]
pub fn calculate_total(cards: &[Card]) -> u8 {
    let (total, _) = total_with_soft_aces(cards);
    u8::try_from(total).unwrap_or(u8::MAX)
}

/// An ace is still counted as 11.
#[must_use]
pub fn is_soft(cards: &[Card]) -> bool {
    total_with_soft_aces(cards).1 > 0
}

#[must_use]
pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && calculate_total(cards) == BLACKJACK
}

/// Two cards of the same rank, or any two ten-valued cards.
#[must_use]
pub fn can_split(cards: &[Card]) -> bool {
    match cards {
        [first, second] => {
            first.rank == second.rank || (first.rank.is_ten_valued() && second.rank.is_ten_valued())
        }
        _ => false,
    }
}
