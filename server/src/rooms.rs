//! Room registry: the authoritative per-room state machine
//!
//! Every room is stored behind its own mutex, and every transition on a room
//! (join, leave, set game type, start, verify) runs while holding that lock.
//! Two players submitting against the same board are therefore applied one
//! after the other, while different rooms never contend. The map of rooms is
//! only locked long enough to look a room up or insert it.
//!
//! Transitions return the events they produced. When an outbox is attached,
//! the same events are published to it before the room lock is released, so
//! every member observes a room's events in the order they were applied.

use log::{debug, info, warn};
use shared::{
    is_valid_set, new_deck, update_board, Card, GameSnapshot, GameState, Packet, Selection,
    UserSummary, BOARD_SIZE,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};

/// Connection-scoped user identity assigned by the gateway
pub type UserId = u32;

/// Number of cards in a submission
pub const SELECTION_SIZE: usize = 3;

/// Tunable room policies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Face-up window size for newly started rounds
    pub board_size: usize,
    /// Whether joining a room again resets the user's points to zero
    pub reset_points_on_rejoin: bool,
    /// Whether `updateGame` carries the full remaining deck or only its size
    pub expose_full_deck: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            board_size: BOARD_SIZE,
            reset_points_on_rejoin: true,
            expose_full_deck: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct User {
    id: UserId,
    name: String,
    /// May go negative
    points: i64,
}

impl User {
    fn new(id: UserId, name: String) -> Self {
        Self {
            id,
            name,
            points: 0,
        }
    }
}

/// Membership and game state of one room
#[derive(Debug)]
struct Room {
    name: String,
    game_type: Option<String>,
    /// Members in join order
    users: Vec<User>,
    game_state: Option<GameState>,
    // Set once the room has been dropped from the registry
    closed: bool,
}

impl Room {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            game_type: None,
            users: Vec::new(),
            game_state: None,
            closed: false,
        }
    }

    fn user_summaries(&self) -> Vec<UserSummary> {
        self.users
            .iter()
            .map(|user| UserSummary {
                name: user.name.clone(),
                points: user.points,
            })
            .collect()
    }

    fn member_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|user| user.id).collect()
    }

    fn user_index(&self, user_id: UserId) -> Result<usize, RoomError> {
        self.users
            .iter()
            .position(|user| user.id == user_id)
            .ok_or_else(|| RoomError::UnknownUser {
                room_name: self.name.clone(),
                user_id,
            })
    }
}

/// Something every member of a room should be told
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Users(Vec<UserSummary>),
    GameType(String),
    GameUpdated(GameSnapshot),
}

impl RoomEvent {
    pub fn into_packet(self, room_name: String) -> Packet {
        match self {
            RoomEvent::Users(users) => Packet::Users { room_name, users },
            RoomEvent::GameType(game_type) => Packet::GameType {
                room_name,
                game_type,
            },
            RoomEvent::GameUpdated(game) => Packet::UpdateGame { room_name, game },
        }
    }
}

/// A room event addressed to the members present when it was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub room_name: String,
    pub recipients: Vec<UserId>,
    pub event: RoomEvent,
}

/// Why a submitted selection could not be judged at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    WrongCount(usize),
    DuplicateCard(String),
    NotOnBoard(String),
}

impl std::error::Error for SelectionError {}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::WrongCount(count) => write!(
                f,
                "Expected {} cards in a selection but got {}",
                SELECTION_SIZE, count
            ),
            SelectionError::DuplicateCard(id) => {
                write!(f, "Card {} was selected more than once", id)
            }
            SelectionError::NotOnBoard(id) => write!(f, "Card {} is not on the board", id),
        }
    }
}

/// Recoverable failures reported back to the gateway. Invalid transitions
/// (e.g. starting a round twice) are not errors; they are silent no-ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    UnknownRoom(String),
    UnknownUser { room_name: String, user_id: UserId },
    InvalidSelection(SelectionError),
}

impl std::error::Error for RoomError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RoomError::InvalidSelection(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::UnknownRoom(name) => write!(f, "Room {} does not exist", name),
            RoomError::UnknownUser { room_name, user_id } => {
                write!(f, "User {} is not a member of room {}", user_id, room_name)
            }
            RoomError::InvalidSelection(err) => write!(f, "Invalid selection: {}", err),
        }
    }
}

impl From<SelectionError> for RoomError {
    fn from(err: SelectionError) -> Self {
        RoomError::InvalidSelection(err)
    }
}

pub type RoomResult = Result<Vec<RoomEvent>, RoomError>;

/// Owns every room for the lifetime of a server
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
    config: RegistryConfig,
    outbox: Option<mpsc::UnboundedSender<Broadcast>>,
}

impl RoomRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
            outbox: None,
        }
    }

    /// Creates a registry that also publishes every event to `outbox`
    pub fn with_outbox(config: RegistryConfig, outbox: mpsc::UnboundedSender<Broadcast>) -> Self {
        Self {
            outbox: Some(outbox),
            ..Self::new(config)
        }
    }

    async fn room(&self, room_name: &str) -> Result<Arc<Mutex<Room>>, RoomError> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_name)
            .cloned()
            .ok_or_else(|| RoomError::UnknownRoom(room_name.to_string()))
    }

    /// Locks a room that is still registered
    async fn open_room(&self, room_name: &str) -> Result<OwnedMutexGuard<Room>, RoomError> {
        let room = self.room(room_name).await?.lock_owned().await;
        if room.closed {
            return Err(RoomError::UnknownRoom(room_name.to_string()));
        }
        Ok(room)
    }

    async fn room_or_create(&self, room_name: &str) -> Arc<Mutex<Room>> {
        if let Ok(room) = self.room(room_name).await {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        Arc::clone(rooms.entry(room_name.to_string()).or_insert_with(|| {
            info!("Created room {}", room_name);
            Arc::new(Mutex::new(Room::new(room_name)))
        }))
    }

    // Must be called with the room lock held
    fn publish(&self, room: &Room, events: &[RoomEvent]) {
        let Some(outbox) = &self.outbox else {
            return;
        };

        let recipients = room.member_ids();
        for event in events {
            let broadcast = Broadcast {
                room_name: room.name.clone(),
                recipients: recipients.clone(),
                event: event.clone(),
            };
            if outbox.send(broadcast).is_err() {
                warn!("Broadcast outbox closed, dropping event for room {}", room.name);
            }
        }
    }

    fn snapshot(&self, state: &GameState) -> GameSnapshot {
        GameSnapshot::from_state(state, self.config.expose_full_deck)
    }

    /// Adds a user to a room, creating the room on first use
    ///
    /// Joining again with the same id keeps the user's slot in the member
    /// list and replaces the display name; points are reset unless the
    /// registry is configured to keep them. Always succeeds.
    pub async fn join(&self, room_name: &str, user_id: UserId, username: &str) -> Vec<RoomEvent> {
        loop {
            let handle = self.room_or_create(room_name).await;
            let mut room = handle.lock().await;
            if room.closed {
                // Emptied and dropped between lookup and lock; look it up again
                continue;
            }

            let reset = self.config.reset_points_on_rejoin;
            match room.users.iter_mut().find(|user| user.id == user_id) {
                Some(user) => {
                    user.name = username.to_string();
                    if reset {
                        user.points = 0;
                    }
                    debug!("User {} rejoined room {}", user_id, room_name);
                }
                None => {
                    room.users.push(User::new(user_id, username.to_string()));
                    info!("User {} ({}) joined room {}", user_id, username, room_name);
                }
            }

            let events = vec![RoomEvent::Users(room.user_summaries())];
            self.publish(&room, &events);
            return events;
        }
    }

    /// Removes a user from a room. The room itself is dropped once empty.
    pub async fn leave(&self, room_name: &str, user_id: UserId) -> RoomResult {
        let handle = self.room(room_name).await?;
        let mut room = handle.lock().await;
        if room.closed {
            return Err(RoomError::UnknownRoom(room_name.to_string()));
        }

        let index = room.user_index(user_id)?;
        room.users.remove(index);
        info!("User {} left room {}", user_id, room_name);

        if room.users.is_empty() {
            room.closed = true;
            let mut rooms = self.rooms.write().await;
            if rooms
                .get(room_name)
                .is_some_and(|stored| Arc::ptr_eq(stored, &handle))
            {
                rooms.remove(room_name);
            }
            info!("Removed empty room {}", room_name);
            return Ok(Vec::new());
        }

        let events = vec![RoomEvent::Users(room.user_summaries())];
        self.publish(&room, &events);
        Ok(events)
    }

    /// Chooses the room's game type. Ignored once a round has started.
    pub async fn set_game_type(&self, room_name: &str, game_type: &str) -> RoomResult {
        let mut room = self.open_room(room_name).await?;
        if room.game_state.is_some() {
            debug!("Ignoring game type change in running room {}", room_name);
            return Ok(Vec::new());
        }

        room.game_type = Some(game_type.to_string());
        let events = vec![RoomEvent::GameType(game_type.to_string())];
        self.publish(&room, &events);
        Ok(events)
    }

    /// Deals a new round. Ignored if the room already has one.
    pub async fn start_game(&self, room_name: &str) -> RoomResult {
        let mut room = self.open_room(room_name).await?;
        if room.game_state.is_some() {
            debug!("Ignoring start request for running room {}", room_name);
            return Ok(Vec::new());
        }

        let state = GameState::deal(new_deck(), self.config.board_size);
        info!(
            "Started round in room {} ({} on board, {} in deck)",
            room_name,
            state.board.len(),
            state.deck.len()
        );

        let events = vec![RoomEvent::GameUpdated(self.snapshot(&state))];
        room.game_state = Some(state);
        self.publish(&room, &events);
        Ok(events)
    }

    /// Judges a player's three-card submission against the current board
    ///
    /// A valid set is removed from the board, the board is refilled and the
    /// player gains a point. Anything else costs the player a point and leaves
    /// the board alone. Selections that cannot be judged (wrong size, repeated
    /// ids, ids not on the board) are rejected without touching the score.
    pub async fn verify_selection(
        &self,
        room_name: &str,
        user_id: UserId,
        selected: &[String],
    ) -> RoomResult {
        let mut guard = self.open_room(room_name).await?;
        let index = guard.user_index(user_id)?;
        let board_size = self.config.board_size;
        let room = &mut *guard;

        let Some(game) = room.game_state.as_mut() else {
            debug!("Ignoring selection in room {} before the round started", room_name);
            return Ok(Vec::new());
        };

        let cards = resolve_selection(game, selected)?;
        let valid = is_valid_set(&cards);
        let user = &mut room.users[index];

        let mut events = Vec::with_capacity(2);
        if valid {
            let number_of_sets = game.number_of_sets + 1;
            let deck = std::mem::take(&mut game.deck);
            let board = std::mem::take(&mut game.board);
            *game = update_board(deck, board, number_of_sets, &cards, board_size);
            game.previous_selection = Some(Selection {
                user: user.name.clone(),
                valid,
                selection: selected.to_vec(),
            });
            user.points += 1;

            info!(
                "User {} found set #{} in room {} ({} left in deck)",
                user_id,
                number_of_sets,
                room_name,
                game.deck.len()
            );
            events.push(RoomEvent::GameUpdated(self.snapshot(game)));
        } else {
            // Misses only touch the score; the last accepted set stays on record
            user.points -= 1;
            debug!("User {} submitted a non-set in room {}", user_id, room_name);
        }

        events.push(RoomEvent::Users(room.user_summaries()));
        self.publish(room, &events);
        Ok(events)
    }

    pub async fn users(&self, room_name: &str) -> Result<Vec<UserSummary>, RoomError> {
        let room = self.open_room(room_name).await?;
        Ok(room.user_summaries())
    }

    pub async fn members(&self, room_name: &str) -> Result<Vec<UserId>, RoomError> {
        let room = self.open_room(room_name).await?;
        Ok(room.member_ids())
    }

    pub async fn game_type(&self, room_name: &str) -> Result<Option<String>, RoomError> {
        let room = self.open_room(room_name).await?;
        Ok(room.game_type.clone())
    }

    pub async fn game_state(&self, room_name: &str) -> Result<Option<GameState>, RoomError> {
        let room = self.open_room(room_name).await?;
        Ok(room.game_state.clone())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Maps submitted ids onto cards currently on the board
fn resolve_selection(game: &GameState, selected: &[String]) -> Result<Vec<Card>, SelectionError> {
    if selected.len() != SELECTION_SIZE {
        return Err(SelectionError::WrongCount(selected.len()));
    }

    let mut cards = Vec::with_capacity(SELECTION_SIZE);
    for id in selected {
        let card = game
            .board_card(id)
            .ok_or_else(|| SelectionError::NotOnBoard(id.clone()))?;
        if cards.contains(&card) {
            return Err(SelectionError::DuplicateCard(id.clone()));
        }
        cards.push(card);
    }
    Ok(cards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{find_set, third_card, DECK_SIZE};
    use tokio_test::{assert_err, assert_ok};

    fn ids(cards: &[Card]) -> Vec<String> {
        cards.iter().map(Card::id).collect()
    }

    /// Three distinct board cards that do not form a set
    fn non_set(board: &[Card]) -> [Card; 3] {
        let (a, b) = (board[0], board[1]);
        let completing = third_card(&a, &b);
        let c = board[2..]
            .iter()
            .copied()
            .find(|card| *card != completing)
            .unwrap();
        [a, b, c]
    }

    fn summary(name: &str, points: i64) -> UserSummary {
        UserSummary {
            name: name.to_string(),
            points,
        }
    }

    /// Starts rooms until one is dealt a board containing a set
    async fn started_room_with_set(registry: &RoomRegistry) -> (String, [Card; 3]) {
        for attempt in 1..=50 {
            let name = format!("R{}", attempt);
            registry.join(&name, 1, "alice").await;
            registry.join(&name, 2, "bob").await;
            assert_ok!(registry.start_game(&name).await);

            let state = registry.game_state(&name).await.unwrap().unwrap();
            if let Some(set) = find_set(&state.board) {
                return (name, set);
            }
        }
        panic!("no dealt board contained a set");
    }

    #[tokio::test]
    async fn test_join_creates_room_and_lists_users() {
        let registry = RoomRegistry::default();

        let events = registry.join("R1", 1, "alice").await;
        assert_eq!(events, vec![RoomEvent::Users(vec![summary("alice", 0)])]);

        let events = registry.join("R1", 2, "bob").await;
        assert_eq!(
            events,
            vec![RoomEvent::Users(vec![summary("alice", 0), summary("bob", 0)])]
        );
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(registry.members("R1").await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_operations_on_unknown_room_fail() {
        let registry = RoomRegistry::default();
        let missing = RoomError::UnknownRoom("nowhere".to_string());

        assert_eq!(registry.set_game_type("nowhere", "set").await, Err(missing.clone()));
        assert_eq!(registry.start_game("nowhere").await, Err(missing.clone()));
        assert_eq!(
            registry.verify_selection("nowhere", 1, &[]).await,
            Err(missing.clone())
        );
        assert_eq!(registry.leave("nowhere", 1).await, Err(missing));
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_set_game_type_before_and_after_start() {
        let registry = RoomRegistry::default();
        registry.join("R1", 1, "alice").await;

        let events = assert_ok!(registry.set_game_type("R1", "set").await);
        assert_eq!(events, vec![RoomEvent::GameType("set".to_string())]);

        assert_ok!(registry.start_game("R1").await);

        let events = assert_ok!(registry.set_game_type("R1", "other").await);
        assert!(events.is_empty());
        assert_eq!(registry.game_type("R1").await.unwrap(), Some("set".to_string()));
    }

    #[tokio::test]
    async fn test_start_game_deals_board_once() {
        let registry = RoomRegistry::default();
        registry.join("R1", 1, "alice").await;

        let events = assert_ok!(registry.start_game("R1").await);
        let snapshot = match &events[..] {
            [RoomEvent::GameUpdated(snapshot)] => snapshot.clone(),
            other => panic!("unexpected events {:?}", other),
        };
        assert_eq!(snapshot.board.len(), BOARD_SIZE);
        assert_eq!(snapshot.number_of_sets, 0);
        assert_eq!(snapshot.deck_remaining, DECK_SIZE - BOARD_SIZE);
        assert_eq!(snapshot.deck.as_ref().map(Vec::len), Some(DECK_SIZE - BOARD_SIZE));

        let before = registry.game_state("R1").await.unwrap();
        let events = assert_ok!(registry.start_game("R1").await);
        assert!(events.is_empty());
        assert_eq!(registry.game_state("R1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_hidden_deck_policy() {
        let registry = RoomRegistry::new(RegistryConfig {
            expose_full_deck: false,
            ..RegistryConfig::default()
        });
        registry.join("R1", 1, "alice").await;

        let events = assert_ok!(registry.start_game("R1").await);
        match &events[0] {
            RoomEvent::GameUpdated(snapshot) => {
                assert_eq!(snapshot.deck, None);
                assert_eq!(snapshot.deck_remaining, DECK_SIZE - BOARD_SIZE);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verify_before_start_is_ignored() {
        let registry = RoomRegistry::default();
        registry.join("R1", 1, "alice").await;

        let selected = ids(&Card::all()[..3]);
        let events = assert_ok!(registry.verify_selection("R1", 1, &selected).await);
        assert!(events.is_empty());
        assert_eq!(registry.users("R1").await.unwrap(), vec![summary("alice", 0)]);
    }

    #[tokio::test]
    async fn test_verify_by_unknown_user_fails() {
        let registry = RoomRegistry::default();
        registry.join("R1", 1, "alice").await;
        assert_ok!(registry.start_game("R1").await);

        let result = registry.verify_selection("R1", 99, &[]).await;
        assert_eq!(
            result,
            Err(RoomError::UnknownUser {
                room_name: "R1".to_string(),
                user_id: 99
            })
        );
    }

    #[tokio::test]
    async fn test_round_scenario() {
        let registry = RoomRegistry::default();
        let (room, set) = started_room_with_set(&registry).await;
        assert_eq!(
            registry.users(&room).await.unwrap(),
            vec![summary("alice", 0), summary("bob", 0)]
        );

        // alice finds a set
        let events = assert_ok!(registry.verify_selection(&room, 1, &ids(&set)).await);
        assert_eq!(events.len(), 2);
        match &events[0] {
            RoomEvent::GameUpdated(snapshot) => {
                assert_eq!(snapshot.number_of_sets, 1);
                assert_eq!(snapshot.board.len(), BOARD_SIZE);
                let previous = snapshot.previous_selection.as_ref().unwrap();
                assert_eq!(previous.user, "alice");
                assert!(previous.valid);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            events[1],
            RoomEvent::Users(vec![summary("alice", 1), summary("bob", 0)])
        );

        let state = registry.game_state(&room).await.unwrap().unwrap();
        for card in &set {
            assert!(!state.board.contains(card));
            assert!(!state.deck.contains(card));
        }

        // bob misses
        let miss = non_set(&state.board);
        let events = assert_ok!(registry.verify_selection(&room, 2, &ids(&miss)).await);
        assert_eq!(
            events,
            vec![RoomEvent::Users(vec![summary("alice", 1), summary("bob", -1)])]
        );

        let after = registry.game_state(&room).await.unwrap().unwrap();
        assert_eq!(after.board, state.board);
        assert_eq!(after.deck, state.deck);
        assert_eq!(after.number_of_sets, 1);
        assert_eq!(after.previous_selection, state.previous_selection);
    }

    #[tokio::test]
    async fn test_broadcast_selection_record_follows_accepted_sets() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = RoomRegistry::with_outbox(RegistryConfig::default(), tx);
        let (room, set) = started_room_with_set(&registry).await;
        while rx.try_recv().is_ok() {}

        let state = registry.game_state(&room).await.unwrap().unwrap();
        let miss = non_set(&state.board);
        assert_ok!(registry.verify_selection(&room, 2, &ids(&miss)).await);
        assert_eq!(
            registry.game_state(&room).await.unwrap().unwrap().previous_selection,
            None
        );
        assert_ok!(registry.verify_selection(&room, 1, &ids(&set)).await);

        let mut updates = Vec::new();
        while let Ok(broadcast) = rx.try_recv() {
            if let RoomEvent::GameUpdated(snapshot) = broadcast.event {
                updates.push(snapshot);
            }
        }
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].previous_selection,
            Some(Selection {
                user: "alice".to_string(),
                valid: true,
                selection: ids(&set),
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_selection_is_rejected_without_penalty() {
        let registry = RoomRegistry::default();
        registry.join("R1", 1, "alice").await;
        assert_ok!(registry.start_game("R1").await);
        let state = registry.game_state("R1").await.unwrap().unwrap();
        let board = ids(&state.board);

        let two = board[..2].to_vec();
        assert_eq!(
            registry.verify_selection("R1", 1, &two).await,
            Err(RoomError::InvalidSelection(SelectionError::WrongCount(2)))
        );

        let repeated = vec![board[0].clone(), board[0].clone(), board[1].clone()];
        assert_eq!(
            registry.verify_selection("R1", 1, &repeated).await,
            Err(RoomError::InvalidSelection(SelectionError::DuplicateCard(
                board[0].clone()
            )))
        );

        let undealt = state.deck[0].id();
        let off_board = vec![board[0].clone(), board[1].clone(), undealt.clone()];
        assert_eq!(
            registry.verify_selection("R1", 1, &off_board).await,
            Err(RoomError::InvalidSelection(SelectionError::NotOnBoard(undealt)))
        );

        let garbage = vec![board[0].clone(), board[1].clone(), "xyz".to_string()];
        assert_err!(registry.verify_selection("R1", 1, &garbage).await);

        assert_eq!(registry.users("R1").await.unwrap(), vec![summary("alice", 0)]);
        assert_eq!(registry.game_state("R1").await.unwrap().unwrap(), state);
    }

    #[tokio::test]
    async fn test_rejoin_resets_points_by_default() {
        let registry = RoomRegistry::default();
        registry.join("R1", 1, "alice").await;
        assert_ok!(registry.start_game("R1").await);
        let state = registry.game_state("R1").await.unwrap().unwrap();
        assert_ok!(registry.verify_selection("R1", 1, &ids(&non_set(&state.board))).await);
        assert_eq!(registry.users("R1").await.unwrap(), vec![summary("alice", -1)]);

        let events = registry.join("R1", 1, "alicia").await;
        assert_eq!(events, vec![RoomEvent::Users(vec![summary("alicia", 0)])]);
    }

    #[tokio::test]
    async fn test_rejoin_can_keep_points() {
        let registry = RoomRegistry::new(RegistryConfig {
            reset_points_on_rejoin: false,
            ..RegistryConfig::default()
        });
        registry.join("R1", 1, "alice").await;
        registry.join("R1", 2, "bob").await;
        assert_ok!(registry.start_game("R1").await);
        let state = registry.game_state("R1").await.unwrap().unwrap();
        assert_ok!(registry.verify_selection("R1", 1, &ids(&non_set(&state.board))).await);

        let events = registry.join("R1", 1, "alice").await;
        assert_eq!(
            events,
            vec![RoomEvent::Users(vec![summary("alice", -1), summary("bob", 0)])]
        );
    }

    #[tokio::test]
    async fn test_leave_updates_members_and_drops_empty_room() {
        let registry = RoomRegistry::default();
        registry.join("R1", 1, "alice").await;
        registry.join("R1", 2, "bob").await;

        let events = assert_ok!(registry.leave("R1", 1).await);
        assert_eq!(events, vec![RoomEvent::Users(vec![summary("bob", 0)])]);

        assert_eq!(
            registry.leave("R1", 1).await,
            Err(RoomError::UnknownUser {
                room_name: "R1".to_string(),
                user_id: 1
            })
        );

        let events = assert_ok!(registry.leave("R1", 2).await);
        assert!(events.is_empty());
        assert_eq!(registry.room_count().await, 0);
        assert_err!(registry.users("R1").await);

        // the name can be reused for a brand new room
        let events = registry.join("R1", 3, "carol").await;
        assert_eq!(events, vec![RoomEvent::Users(vec![summary("carol", 0)])]);
        assert_eq!(registry.game_state("R1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reads_on_a_closed_room_fail() {
        let registry = RoomRegistry::default();
        registry.join("R1", 1, "alice").await;

        // a reader that looked the room up just before its last member left
        let handle = registry.room("R1").await.unwrap();
        assert_eq!(assert_ok!(registry.leave("R1", 1).await), vec![]);
        registry
            .rooms
            .write()
            .await
            .insert("R1".to_string(), Arc::clone(&handle));
        assert!(handle.lock().await.closed);

        let missing = RoomError::UnknownRoom("R1".to_string());
        assert_eq!(registry.users("R1").await, Err(missing.clone()));
        assert_eq!(registry.members("R1").await, Err(missing.clone()));
        assert_eq!(registry.game_type("R1").await, Err(missing.clone()));
        assert_eq!(registry.game_state("R1").await, Err(missing.clone()));
        assert_eq!(registry.start_game("R1").await, Err(missing));
    }

    #[tokio::test]
    async fn test_outbox_receives_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = RoomRegistry::with_outbox(RegistryConfig::default(), tx);

        registry.join("R1", 1, "alice").await;
        registry.join("R1", 2, "bob").await;
        assert_ok!(registry.set_game_type("R1", "set").await);
        assert_ok!(registry.start_game("R1").await);
        assert_ok!(registry.start_game("R1").await);
        registry.join("R2", 3, "carol").await;

        let first = rx.try_recv().unwrap();
        assert_eq!(first.room_name, "R1");
        assert_eq!(first.recipients, vec![1]);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.recipients, vec![1, 2]);

        let third = rx.try_recv().unwrap();
        assert_eq!(third.event, RoomEvent::GameType("set".to_string()));

        let fourth = rx.try_recv().unwrap();
        assert!(matches!(fourth.event, RoomEvent::GameUpdated(_)));

        // the second start was a no-op and published nothing
        let fifth = rx.try_recv().unwrap();
        assert_eq!(fifth.room_name, "R2");
        assert_eq!(fifth.recipients, vec![3]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_submissions_score_once() {
        let registry = Arc::new(RoomRegistry::default());
        let (room, set) = started_room_with_set(&registry).await;
        for user_id in 3..=16 {
            registry.join(&room, user_id, &format!("player{}", user_id)).await;
        }

        let selected = ids(&set);
        let mut handles = Vec::new();
        for user_id in 1..=16 {
            let registry = Arc::clone(&registry);
            let room = room.clone();
            let selected = selected.clone();
            handles.push(tokio::spawn(async move {
                registry.verify_selection(&room, user_id, &selected).await
            }));
        }

        let mut accepted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(events) => {
                    assert_eq!(events.len(), 2);
                    accepted += 1;
                }
                Err(RoomError::InvalidSelection(SelectionError::NotOnBoard(_))) => rejected += 1,
                Err(other) => panic!("unexpected error {}", other),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(rejected, 15);

        let state = registry.game_state(&room).await.unwrap().unwrap();
        assert_eq!(state.number_of_sets, 1);
        let total: i64 = registry.users(&room).await.unwrap().iter().map(|u| u.points).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disjoint_submissions_all_count() {
        let registry = Arc::new(RoomRegistry::default());
        let (room, _) = started_room_with_set(&registry).await;
        let state = registry.game_state(&room).await.unwrap().unwrap();

        // greedily pick disjoint sets from the dealt board
        let mut remaining = state.board.clone();
        let mut sets = Vec::new();
        while let Some(found) = find_set(&remaining) {
            remaining.retain(|card| !found.contains(card));
            sets.push(found);
        }
        assert!(!sets.is_empty());

        let mut handles = Vec::new();
        for (i, set) in sets.iter().enumerate() {
            let registry = Arc::clone(&registry);
            let room = room.clone();
            let selected = ids(set);
            let user_id = if i % 2 == 0 { 1 } else { 2 };
            handles.push(tokio::spawn(async move {
                registry.verify_selection(&room, user_id, &selected).await
            }));
        }
        for handle in handles {
            assert_ok!(handle.await.unwrap());
        }

        let state = registry.game_state(&room).await.unwrap().unwrap();
        assert_eq!(state.number_of_sets as usize, sets.len());
        assert_eq!(
            state.deck.len() + state.board.len() + 3 * sets.len(),
            DECK_SIZE
        );
        let total: i64 = registry.users(&room).await.unwrap().iter().map(|u| u.points).sum();
        assert_eq!(total, sets.len() as i64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rooms_are_independent() {
        let registry = Arc::new(RoomRegistry::default());

        let mut handles = Vec::new();
        for n in 0..8u32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let room = format!("room-{}", n);
                registry.join(&room, n, "host").await;
                registry.start_game(&room).await
            }));
        }
        for handle in handles {
            let events = assert_ok!(handle.await.unwrap());
            assert_eq!(events.len(), 1);
        }

        assert_eq!(registry.room_count().await, 8);
        for n in 0..8u32 {
            let room = format!("room-{}", n);
            assert_eq!(registry.members(&room).await.unwrap(), vec![n]);
        }
    }

    #[test]
    fn test_error_messages() {
        let err = RoomError::InvalidSelection(SelectionError::WrongCount(4));
        assert_eq!(
            err.to_string(),
            "Invalid selection: Expected 3 cards in a selection but got 4"
        );
        assert!(std::error::Error::source(&err).is_some());

        let err = RoomError::UnknownRoom("R9".to_string());
        assert_eq!(err.to_string(), "Room R9 does not exist");
        assert!(std::error::Error::source(&err).is_none());
    }
}
