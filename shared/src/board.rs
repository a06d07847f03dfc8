//! Board replenishment for a running round
//!
//! The board is the window of face-up cards every player in a room sees. It is
//! dealt from the front of the remaining deck and topped back up after each
//! accepted set. Nothing here guarantees the refilled board actually contains
//! a set; when the deck runs dry the board just shrinks.

use crate::cards::Card;
use serde::{Deserialize, Serialize};

/// Number of face-up cards in the base game
pub const BOARD_SIZE: usize = 12;

/// The last submission made in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Display name of the submitting player
    pub user: String,
    pub valid: bool,
    /// Card ids exactly as submitted
    pub selection: Vec<String>,
}

/// State of one round in one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Undrawn cards; the next draw comes from the front
    pub deck: Vec<Card>,
    pub board: Vec<Card>,
    pub number_of_sets: u32,
    pub previous_selection: Option<Selection>,
}

impl GameState {
    /// Deals a fresh round from the given deck
    pub fn deal(deck: Vec<Card>, board_size: usize) -> Self {
        let (board, deck) = initial_board(deck, board_size);
        Self {
            deck,
            board,
            number_of_sets: 0,
            previous_selection: None,
        }
    }

    /// Looks up a board card by its wire id
    pub fn board_card(&self, id: &str) -> Option<Card> {
        self.board.iter().copied().find(|card| card.id() == id)
    }

    pub fn board_ids(&self) -> Vec<String> {
        self.board.iter().map(Card::id).collect()
    }

    pub fn deck_ids(&self) -> Vec<String> {
        self.deck.iter().map(Card::id).collect()
    }
}

/// Draws the opening board from the front of the deck
///
/// Returns `(board, remaining_deck)`. A deck shorter than `board_size` is
/// dealt out entirely.
pub fn initial_board(mut deck: Vec<Card>, board_size: usize) -> (Vec<Card>, Vec<Card>) {
    let take = board_size.min(deck.len());
    let board: Vec<Card> = deck.drain(..take).collect();
    (board, deck)
}

/// Removes `removed` from the board, then refills it from the deck
///
/// Replacement cards are drawn one at a time from the front of the deck until
/// the board holds `board_size` cards or the deck is empty. `number_of_sets`
/// is stored as given: callers pass the incremented count after a valid
/// submission and zero when seeding a round. The previous selection is not
/// touched here.
pub fn update_board(
    mut deck: Vec<Card>,
    mut board: Vec<Card>,
    number_of_sets: u32,
    removed: &[Card],
    board_size: usize,
) -> GameState {
    board.retain(|card| !removed.contains(card));

    let missing = board_size.saturating_sub(board.len()).min(deck.len());
    board.extend(deck.drain(..missing));

    GameState {
        deck,
        board,
        number_of_sets,
        previous_selection: None,
    }
}
