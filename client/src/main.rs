use clap::Parser;
use client::network::Connection;
use log::warn;
use shared::{Packet, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use tokio::time::sleep;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to connect to
    #[clap(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Display name
    #[clap(short, long, default_value = "Игрок")]
    name: String,
    /// Room to join
    #[clap(short, long, default_value = "Room1")]
    room: String,
    /// Color to reserve
    #[clap(short, long, default_value = "#ff0000")]
    color: String,
}

/// Scripted smoke client: walks the full handshake against a running server
/// and prints everything the room sends afterwards.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let addr = format!("{}:{}", args.host, args.port);
    let mut conn = Connection::connect(&addr).await?;
    println!("Connected to {}", addr);

    conn.send(&Packet::Name {
        name: args.name.clone(),
    })
    .await?;
    match conn.recv().await? {
        Some(Packet::FreeRooms { rooms }) => println!("Rooms: {:?}", rooms),
        other => warn!("expected room list, got {:?}", other),
    }

    conn.send(&Packet::JoinRoom {
        room: args.room.clone(),
    })
    .await?;
    // The protocol is unframed; pace sends so they arrive one per read.
    sleep(Duration::from_millis(50)).await;

    conn.send(&Packet::Color {
        color: args.color.clone(),
    })
    .await?;
    match conn.recv().await? {
        Some(Packet::ColorFree) => {
            println!("Reserved color {}", args.color);
            conn.send(&Packet::NewPlayer).await?;
            sleep(Duration::from_millis(50)).await;
            conn.send(&Packet::Ready).await?;
        }
        Some(Packet::ColorNotFree { reason }) => {
            println!("{}", reason);
            conn.send(&Packet::ExitColorWindow).await?;
            return Ok(());
        }
        other => warn!("expected a reservation reply, got {:?}", other),
    }

    // Print whatever the room broadcasts until it ends or we are cut off.
    while let Some(packet) = conn.recv().await? {
        match packet {
            Packet::Chat { message } => println!("{}", message),
            Packet::StartGame { notice } => println!("{}", notice),
            Packet::UpdateTimer { seconds_left } => println!("{} s left", seconds_left),
            Packet::CellClaimed { x, y, color } => {
                println!("cell ({}, {}) painted {}", x, y, color)
            }
            Packet::ContinueGame { canvas } => {
                println!("joined a running round, {} cells painted", canvas.len())
            }
            Packet::EndGame => println!("Round over"),
            Packet::ExitApp | Packet::ExitColorWindowAck => break,
            other => warn!("unexpected packet {:?}", other),
        }
    }

    Ok(())
}
