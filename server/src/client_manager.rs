//! Connection tracking for the session gateway
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Mapping datagram addresses to connection-scoped user ids
//! - Remembering which rooms each connection joined, so teardown can
//!   release every membership
//! - Client capacity management
//!
//! The client manager knows nothing about game state; it only answers
//! "who is this packet from" and "where do I send this room event".

use crate::rooms::UserId;
use log::info;
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a connected client
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: UserId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Rooms this connection has joined
    pub rooms: BTreeSet<String>,
}

impl Client {
    /// Creates a new client with the given ID and network address
    ///
    /// The client starts out marked as recently active and belonging to no
    /// room.
    pub fn new(id: UserId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            rooms: BTreeSet::new(),
        }
    }

    /// Marks the client as active right now
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Enforces the server capacity limit and hands out ids starting from 1. Ids
/// are never reused while the server is running, so a reconnecting client is
/// always a new user.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<UserId, Client>,
    /// Next available client ID for new connections
    next_client_id: UserId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    /// Silence after which a client is considered gone
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<UserId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr);
        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns the removed client so the caller can release its room
    /// memberships, or None if it was already gone.
    pub fn remove_client(&mut self, client_id: &UserId) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<UserId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes a client's activity timestamp. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: UserId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Records that a client joined a room
    pub fn join_room(&mut self, client_id: UserId, room_name: &str) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.rooms.insert(room_name.to_string());
                true
            }
            None => false,
        }
    }

    /// Addresses of the given clients that are still connected
    pub fn addrs_for(&self, client_ids: &[UserId]) -> Vec<(UserId, SocketAddr)> {
        client_ids
            .iter()
            .filter_map(|id| self.clients.get(id).map(|client| (*id, client.addr)))
            .collect()
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed clients so their room memberships can be released.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timed_out: Vec<UserId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(self.timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
