//! Session gateway: UDP transport between clients and the room registry

use crate::client_manager::{Client, ClientManager};
use crate::config::ServerConfig;
use crate::rooms::{Broadcast, RoomError, RoomRegistry, UserId};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, MAX_NAME_LEN, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client: Client },
    Shutdown,
}

/// Direct replies sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// UDP front end for a [`RoomRegistry`]
///
/// Intents are handled one at a time in arrival order by the main loop. Room
/// events come back through the registry's outbox and are fanned out to the
/// addresses of the recipients by a dedicated sender task.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    registry: Arc<RoomRegistry>,
    timeout_check_interval: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
    outbox_rx: mpsc::UnboundedReceiver<Broadcast>,
}

impl Server {
    pub async fn new(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();

        let registry = RoomRegistry::with_outbox(config.registry.clone(), outbox_tx);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            registry: Arc::new(registry),
            timeout_check_interval: config.timeout_check_interval,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            outbox_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.registry)
    }

    /// Sender that can stop a running server with [`ServerMessage::Shutdown`]
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that sends direct replies and fans out room broadcasts
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);
        let mut outbox_rx = std::mem::replace(&mut self.outbox_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(message) = game_rx.recv() => {
                        let GameMessage::SendPacket { packet, addr } = message;
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    Some(broadcast) = outbox_rx.recv() => {
                        let addrs = clients.read().await.addrs_for(&broadcast.recipients);
                        let packet = broadcast.event.into_packet(broadcast.room_name);

                        for (client_id, addr) in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                    else => break,
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let period = self.timeout_check_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                let timed_out = clients.write().await.check_timeouts();

                for client in timed_out {
                    info!("Client {} timed out", client.id);
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn client_id(&self, addr: SocketAddr) -> Option<UserId> {
        self.clients.read().await.find_client_by_addr(addr)
    }

    /// Releases every room membership held by a departed connection
    async fn release(&self, client: Client) {
        for room_name in &client.rooms {
            match self.registry.leave(room_name, client.id).await {
                Ok(_) => debug!("Released client {} from room {}", client.id, room_name),
                // Already gone, e.g. the room was emptied and recreated
                Err(e) => debug!("Nothing to release for client {}: {}", client.id, e),
            }
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                // Replace any previous connection from the same address
                let existing = match self.client_id(addr).await {
                    Some(existing_id) => self.clients.write().await.remove_client(&existing_id),
                    None => None,
                };
                if let Some(existing) = existing {
                    info!("Removing existing client {} from {}", existing.id, addr);
                    self.release(existing).await;
                }

                if client_version != PROTOCOL_VERSION {
                    let reason = "Protocol version mismatch".to_string();
                    self.send_packet(Packet::Disconnected { reason }, addr);
                    return;
                }

                let client_id = self.clients.write().await.add_client(addr);
                let response = match client_id {
                    Some(client_id) => Packet::Connected { client_id },
                    None => Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                };
                self.send_packet(response, addr);
            }

            Packet::Disconnect => {
                let removed = match self.client_id(addr).await {
                    Some(client_id) => self.clients.write().await.remove_client(&client_id),
                    None => None,
                };
                if let Some(client) = removed {
                    self.release(client).await;
                }
            }

            intent @ (Packet::JoinRoom { .. }
            | Packet::SetGameType { .. }
            | Packet::StartGame { .. }
            | Packet::VerifySet { .. }
            | Packet::Heartbeat) => {
                let Some(client_id) = self.client_id(addr).await else {
                    warn!("Intent from unconnected address {}", addr);
                    let reason = "Not connected".to_string();
                    self.send_packet(Packet::Rejected { reason }, addr);
                    return;
                };

                self.clients.write().await.touch(client_id);

                if let Some(reason) = oversized_name(&intent) {
                    warn!("Rejected join from client {}: {}", client_id, reason);
                    self.send_packet(Packet::Rejected { reason }, addr);
                    return;
                }

                if let Err(e) = self.dispatch(client_id, intent).await {
                    warn!("Rejected intent from client {}: {}", client_id, e);
                    let reason = e.to_string();
                    self.send_packet(Packet::Rejected { reason }, addr);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Forwards a client intent to the registry
    ///
    /// Resulting events reach clients through the registry outbox, so only
    /// the error (if any) matters here.
    async fn dispatch(&self, client_id: UserId, intent: Packet) -> Result<(), RoomError> {
        match intent {
            Packet::JoinRoom {
                room_name,
                username,
            } => {
                self.clients.write().await.join_room(client_id, &room_name);
                self.registry.join(&room_name, client_id, &username).await;
            }
            Packet::SetGameType {
                room_name,
                game_type,
            } => {
                self.registry.set_game_type(&room_name, &game_type).await?;
            }
            Packet::StartGame { room_name } => {
                self.registry.start_game(&room_name).await?;
            }
            Packet::VerifySet {
                room_name,
                selected,
            } => {
                self.registry
                    .verify_selection(&room_name, client_id, &selected)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        loop {
            match self.server_rx.recv().await {
                Some(ServerMessage::PacketReceived { packet, addr }) => {
                    self.handle_packet(packet, addr).await;
                }
                Some(ServerMessage::ClientTimeout { client }) => {
                    self.release(client).await;
                }
                Some(ServerMessage::Shutdown) | None => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Names longer than this could push a room's user list past one datagram
fn oversized_name(intent: &Packet) -> Option<String> {
    let Packet::JoinRoom {
        room_name,
        username,
    } = intent
    else {
        return None;
    };

    if room_name.len() > MAX_NAME_LEN {
        Some(format!("Room name is longer than {} bytes", MAX_NAME_LEN))
    } else if username.len() > MAX_NAME_LEN {
        Some(format!("Username is longer than {} bytes", MAX_NAME_LEN))
    } else {
        None
    }
}
