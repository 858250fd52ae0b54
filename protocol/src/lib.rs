use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ---- Cards ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
}

/// Ranks of the 36-card deck. Court cards price lower than pip cards;
/// an Ace counts 11 until scoring softens it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Rank {
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 9] = [
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// Point price used for scoring.
    pub fn price(self) -> u32 {
        match self {
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack => 2,
            Rank::Queen => 3,
            Rank::King => 4,
            Rank::Ace => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Rank::Six => "Six",
            Rank::Seven => "Seven",
            Rank::Eight => "Eight",
            Rank::Nine => "Nine",
            Rank::Ten => "Ten",
            Rank::Jack => "Jack",
            Rank::Queen => "Queen",
            Rank::King => "King",
            Rank::Ace => "Ace",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = match self.rank {
            Rank::Ace => "A",
            Rank::King => "K",
            Rank::Queen => "Q",
            Rank::Jack => "J",
            Rank::Ten => "10",
            Rank::Nine => "9",
            Rank::Eight => "8",
            Rank::Seven => "7",
            Rank::Six => "6",
        };
        let s = match self.suit {
            Suit::Clubs => "♣",
            Suit::Diamonds => "♦",
            Suit::Hearts => "♥",
            Suit::Spades => "♠",
        };
        write!(f, "{}{}", r, s)
    }
}

/// Wire form of a card: rank name, suit and the rank's point price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardDto {
    pub value: String,
    pub suit: Suit,
    pub price: u32,
}

impl From<Card> for CardDto {
    fn from(card: Card) -> Self {
        CardDto {
            value: card.rank.name().to_string(),
            suit: card.suit,
            price: card.rank.price(),
        }
    }
}

/// ---- Deck ----
///
/// Holds the cards not yet dealt. `draw` removes one uniformly at random;
/// an exhausted deck regenerates a full 36-card set before drawing, so
/// drawing never fails.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    pub const SIZE: usize = 36;

    pub fn new() -> Self {
        Deck {
            cards: Self::full_shuffled(),
        }
    }

    /// Deck with a fixed set of remaining cards. Draw order is still
    /// random among what remains.
    pub fn stacked(cards: Vec<Card>) -> Self {
        Deck { cards }
    }

    fn full_shuffled() -> Vec<Card> {
        let mut cards = Vec::with_capacity(Self::SIZE);
        for &suit in &Suit::ALL {
            for &rank in &Rank::ALL {
                cards.push(Card { rank, suit });
            }
        }
        cards.shuffle(&mut thread_rng());
        cards
    }

    pub fn draw(&mut self) -> Card {
        if self.cards.is_empty() {
            self.cards = Self::full_shuffled();
        }
        let i = thread_rng().gen_range(0..self.cards.len());
        self.cards.swap_remove(i)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

/// ---- Scoring ----
pub const BUST_THRESHOLD: u32 = 21;

/// Sum of rank prices with soft-Ace handling: every Ace starts at 11 and
/// drops by 10 only while the total would bust. Recomputed from the whole
/// hand, so the result never depends on deal order.
pub fn score_hand(cards: &[Card]) -> u32 {
    let mut total = 0;
    let mut aces = 0;
    for card in cards {
        total += card.rank.price();
        if card.rank == Rank::Ace {
            aces += 1;
        }
    }
    while total > BUST_THRESHOLD && aces > 0 {
        total -= 10;
        aces -= 1;
    }
    total
}

/// ---- State views ----
///
/// Per-recipient serialization of a player: the hand's owner (and every
/// recipient once the game is over) sees the full entry, everyone else
/// gets the hidden one with no `score` or `hand` key at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PlayerView {
    #[serde(rename_all = "camelCase")]
    Full {
        id: Uuid,
        name: String,
        score: u32,
        is_standing: bool,
        hand: Vec<CardDto>,
        cards_in_hand: usize,
    },
    #[serde(rename_all = "camelCase")]
    Hidden {
        id: Uuid,
        name: String,
        is_standing: bool,
        cards_in_hand: usize,
    },
}

impl PlayerView {
    pub fn id(&self) -> Uuid {
        match self {
            PlayerView::Full { id, .. } | PlayerView::Hidden { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub players: Vec<PlayerView>,
    pub current_player_id: Option<Uuid>,
    pub game_over: bool,
    pub message: String,
}

/// ---- Wire protocol ----
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GameCommand {
    #[serde(rename_all = "camelCase")]
    Join { player_name: String },
    #[serde(rename_all = "camelCase")]
    Hit { player_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Stand { player_id: Uuid },
    /// Reserved: matches start automatically once a second player joins.
    #[serde(rename_all = "camelCase")]
    StartGame { player_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GameEvent {
    #[serde(rename_all = "camelCase")]
    PlayerJoined { player: PlayerView, game_id: Uuid },
    #[serde(rename_all = "camelCase")]
    GameStarted { game_state: GameStateView },
    #[serde(rename_all = "camelCase")]
    CardDealt { player_id: Uuid, card: CardDto },
    AnotherPlayerTookCard,
    #[serde(rename_all = "camelCase")]
    PlayerStood { player_id: Uuid },
    #[serde(rename_all = "camelCase")]
    GameOver {
        winner_id: Option<Uuid>,
        game_state: GameStateView,
    },
    Error { message: String },
    Info { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fresh_deck_covers_every_rank_suit_pair() {
        let mut deck = Deck::new();
        let mut seen = HashSet::new();
        for _ in 0..Deck::SIZE {
            assert!(seen.insert(deck.draw()), "duplicate card before exhaustion");
        }
        assert_eq!(seen.len(), Deck::SIZE);
        assert_eq!(deck.remaining(), 0);
    }

    #[test]
    fn exhausted_deck_regenerates_before_drawing() {
        let mut deck = Deck::stacked(vec![]);
        let card = deck.draw();
        assert_eq!(deck.remaining(), Deck::SIZE - 1);
        assert!(Rank::ALL.contains(&card.rank));
    }

    #[test]
    fn two_aces_and_a_nine_score_twenty_one() {
        let hand = [
            Card { rank: Rank::Ace, suit: Suit::Hearts },
            Card { rank: Rank::Ace, suit: Suit::Spades },
            Card { rank: Rank::Nine, suit: Suit::Clubs },
        ];
        assert_eq!(score_hand(&hand), 21);
    }

    #[test]
    fn ace_stays_high_while_under_threshold() {
        let hand = [
            Card { rank: Rank::Ace, suit: Suit::Hearts },
            Card { rank: Rank::Ten, suit: Suit::Clubs },
        ];
        assert_eq!(score_hand(&hand), 21);
        let hand = [
            Card { rank: Rank::Ace, suit: Suit::Hearts },
            Card { rank: Rank::Six, suit: Suit::Clubs },
        ];
        assert_eq!(score_hand(&hand), 17);
    }

    #[test]
    fn court_cards_use_their_reduced_prices() {
        let hand = [
            Card { rank: Rank::Jack, suit: Suit::Hearts },
            Card { rank: Rank::Queen, suit: Suit::Clubs },
            Card { rank: Rank::King, suit: Suit::Spades },
        ];
        assert_eq!(score_hand(&hand), 9);
    }

    #[test]
    fn commands_use_type_discriminator() {
        let cmd: GameCommand =
            serde_json::from_str(r#"{"type":"Join","playerName":"Alice"}"#).unwrap();
        assert_eq!(
            cmd,
            GameCommand::Join {
                player_name: "Alice".to_string()
            }
        );

        let id = Uuid::new_v4();
        let text = serde_json::to_string(&GameCommand::Hit { player_id: id }).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["type"], "Hit");
        assert_eq!(parsed["playerId"], id.to_string());
    }

    #[test]
    fn unit_event_serializes_as_bare_tag() {
        let text = serde_json::to_string(&GameEvent::AnotherPlayerTookCard).unwrap();
        assert_eq!(text, r#"{"type":"AnotherPlayerTookCard"}"#);
    }

    #[test]
    fn hidden_player_view_omits_score_and_hand() {
        let view = PlayerView::Hidden {
            id: Uuid::new_v4(),
            name: "Bob".to_string(),
            is_standing: false,
            cards_in_hand: 2,
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&view).unwrap()).unwrap();
        assert!(parsed.get("score").is_none());
        assert!(parsed.get("hand").is_none());
        assert_eq!(parsed["cardsInHand"], 2);
    }

    #[test]
    fn full_player_view_carries_card_dtos() {
        let view = PlayerView::Full {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            score: 17,
            is_standing: false,
            hand: vec![CardDto::from(Card {
                rank: Rank::Ace,
                suit: Suit::Spades,
            })],
            cards_in_hand: 1,
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&view).unwrap()).unwrap();
        assert_eq!(parsed["hand"][0]["value"], "Ace");
        assert_eq!(parsed["hand"][0]["suit"], "Spades");
        assert_eq!(parsed["hand"][0]["price"], 11);
        assert_eq!(parsed["isStanding"], false);
    }
}
