pub mod board;
pub mod cards;

pub use board::{initial_board, update_board, GameState, Selection, BOARD_SIZE};
pub use cards::{
    build_deck, find_set, is_valid_set, new_deck, third_card, Card, Color, Number, Shading, Shape,
    DECK_SIZE,
};

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
/// Largest datagram either side will read
pub const MAX_PACKET_SIZE: usize = 16384;
/// Longest room or user name the server accepts, in bytes
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    JoinRoom {
        room_name: String,
        username: String,
    },
    SetGameType {
        room_name: String,
        game_type: String,
    },
    StartGame {
        room_name: String,
    },
    VerifySet {
        room_name: String,
        selected: Vec<String>,
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
    },
    Users {
        room_name: String,
        users: Vec<UserSummary>,
    },
    GameType {
        room_name: String,
        game_type: String,
    },
    UpdateGame {
        room_name: String,
        game: GameSnapshot,
    },
    Rejected {
        reason: String,
    },
    Disconnected {
        reason: String,
    },
}

/// A room member as shown to clients
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub name: String,
    pub points: i64,
}

/// Public view of a room's game state
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    /// Remaining deck, present only when the server exposes it
    pub deck: Option<Vec<String>>,
    pub deck_remaining: usize,
    pub board: Vec<String>,
    pub number_of_sets: u32,
    pub previous_selection: Option<Selection>,
}

impl GameSnapshot {
    pub fn from_state(state: &GameState, expose_deck: bool) -> Self {
        Self {
            deck: expose_deck.then(|| state.deck_ids()),
            deck_remaining: state.deck.len(),
            board: state.board_ids(),
            number_of_sets: state.number_of_sets,
            previous_selection: state.previous_selection.clone(),
        }
    }

    /// Board ids parsed back into cards, skipping anything malformed
    pub fn board_cards(&self) -> Vec<Card> {
        self.board.iter().filter_map(|id| Card::from_id(id)).collect()
    }
}
