//! # Set Room Server Library
//!
//! This library provides the authoritative server for multiplayer Set. Players
//! join named rooms, a host deals a round, and every three-card submission is
//! judged here before the updated room state is broadcast to all members.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Room State
//! The server owns every room, its members and their points, and the running
//! round (deck, board, sets found). Clients never mutate state directly; they
//! send intents and conform to the state broadcast back to them.
//!
//! ### Serialized Transitions
//! Each room is guarded by its own lock. Concurrent submissions against the
//! same board are applied one at a time, so a card can only ever be claimed
//! once, while separate rooms never wait on each other.
//!
//! ### Connection Lifecycle
//! Connections are tracked from connect to disconnect or timeout. When a
//! connection goes away, its memberships are released and the remaining
//! members receive the updated user list.
//!
//! ## Module Organization
//!
//! ### Rooms Module (`rooms`)
//! The room registry and its state machine:
//! - Join/leave with ordered membership and per-user points
//! - Game type selection before a round starts
//! - Dealing a round and judging submissions
//! - Ordered broadcast of room events through an outbox
//!
//! ### Client Manager Module (`client_manager`)
//! Connection bookkeeping: id assignment, address lookup, joined rooms,
//! capacity limits and timeouts.
//!
//! ### Network Module (`network`)
//! The UDP session gateway that decodes intents, forwards them to the
//! registry and fans room events out to member addresses.
//!
//! ### Config Module (`config`)
//! Runtime settings shared by the gateway and registry.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     let mut server = Server::new(&config).await?;
//!     if let Err(e) = server.run().await {
//!         eprintln!("server stopped: {}", e);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The registry can also be driven directly, without any networking:
//!
//! ```rust
//! use server::rooms::RoomRegistry;
//!
//! # tokio_test::block_on(async {
//! let registry = RoomRegistry::default();
//! registry.join("R1", 1, "alice").await;
//! registry.start_game("R1").await.unwrap();
//!
//! let state = registry.game_state("R1").await.unwrap().unwrap();
//! assert_eq!(state.board.len(), shared::BOARD_SIZE);
//! # });
//! ```

pub mod client_manager;
pub mod config;
pub mod network;
pub mod rooms;
