use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, info, warn};
use shared::{find_set, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Scripted player that joins a room, starts the round and claims every set it sees
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Room to join
    #[arg(short, long, default_value = "lobby")]
    room: String,

    /// Display name
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Milliseconds to wait before submitting a spotted set
    #[arg(short, long, default_value = "500")]
    delay: u64,
}

// Quiet periods tolerated before giving up on the round
const MAX_IDLE_ROUNDS: u32 = 3;

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    server_addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, server_addr).await?;
    Ok(())
}

/// Waits up to five seconds for the next packet
async fn recv(socket: &UdpSocket) -> Result<Option<Packet>, Box<dyn std::error::Error>> {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    match timeout(Duration::from_secs(5), socket.recv_from(&mut buf)).await {
        Ok(received) => {
            let (len, _) = received?;
            Ok(Some(deserialize(&buf[..len])?))
        }
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let server_addr = args.server.parse::<SocketAddr>()?;
    info!("Client socket bound to {}", socket.local_addr()?);

    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
        server_addr,
    )
    .await?;

    let client_id = match recv(&socket).await? {
        Some(Packet::Connected { client_id }) => client_id,
        Some(other) => return Err(format!("Expected Connected but got {:?}", other).into()),
        None => return Err("Server did not answer".into()),
    };
    info!("Connected as client {}", client_id);

    let room_name = args.room.clone();
    send(
        &socket,
        &Packet::JoinRoom {
            room_name: room_name.clone(),
            username: args.name.clone(),
        },
        server_addr,
    )
    .await?;
    send(
        &socket,
        &Packet::SetGameType {
            room_name: room_name.clone(),
            game_type: "set".to_string(),
        },
        server_addr,
    )
    .await?;
    // Ignored by the server if somebody else already started the round
    send(
        &socket,
        &Packet::StartGame {
            room_name: room_name.clone(),
        },
        server_addr,
    )
    .await?;

    let mut idle = 0;
    loop {
        let packet = match recv(&socket).await? {
            Some(packet) => packet,
            None => {
                idle += 1;
                if idle >= MAX_IDLE_ROUNDS {
                    info!("Nothing happening in room {}, leaving", room_name);
                    break;
                }
                send(&socket, &Packet::Heartbeat, server_addr).await?;
                continue;
            }
        };
        idle = 0;

        match packet {
            Packet::UpdateGame { room_name: r, game } if r == room_name => {
                info!(
                    "Board has {} cards, {} in deck, {} sets found",
                    game.board.len(),
                    game.deck_remaining,
                    game.number_of_sets
                );

                match find_set(&game.board_cards()) {
                    Some(set) => {
                        sleep(Duration::from_millis(args.delay)).await;
                        let selected = set.iter().map(|card| card.id()).collect();
                        send(
                            &socket,
                            &Packet::VerifySet {
                                room_name: room_name.clone(),
                                selected,
                            },
                            server_addr,
                        )
                        .await?;
                    }
                    None if game.deck_remaining == 0 => {
                        info!("Round over after {} sets", game.number_of_sets);
                        break;
                    }
                    None => info!("No set on the board, waiting"),
                }
            }
            Packet::Users { users, .. } => {
                for user in users {
                    info!("  {}: {}", user.name, user.points);
                }
            }
            Packet::GameType { game_type, .. } => info!("Game type is {}", game_type),
            // Usually someone else claimed those cards first
            Packet::Rejected { reason } => warn!("Rejected: {}", reason),
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                return Ok(());
            }
            other => debug!("Ignoring {:?}", other),
        }
    }

    send(&socket, &Packet::Disconnect, server_addr).await?;
    info!("Test client finished");
    Ok(())
}
