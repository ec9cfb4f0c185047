//! Per-connection session: the blocking receive loop and packet dispatch.

use crate::registry::RoomRegistry;
use crate::room::{GameRoom, LeaveKind, MemberId, ReadyOutcome};
use bincode::{deserialize, serialize};
use log::{debug, info, warn};
use shared::{Cell, Packet, COLOR_TAKEN, READ_BUFFER_SIZE};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Owns one accepted connection. The session task runs the receive loop and
/// dispatches inbound packets; a companion writer task drains the outbound
/// queue into the socket so room broadcasts never block on a slow peer.
pub struct ClientSession {
    id: MemberId,
    registry: Arc<RoomRegistry>,
    outbound: mpsc::UnboundedSender<Packet>,
    name: String,
    room: Option<Arc<GameRoom>>,
}

impl ClientSession {
    /// Serves one connection to completion. Returns when the peer closes the
    /// connection or a transport error occurs.
    pub async fn run(id: MemberId, stream: TcpStream, registry: Arc<RoomRegistry>) {
        let (mut reader, mut writer) = stream.into_split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Packet>();

        tokio::spawn(async move {
            while let Some(packet) = outbound_rx.recv().await {
                let bytes = match serialize(&packet) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("failed to encode outbound packet: {}", e);
                        continue;
                    }
                };
                if writer.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let mut session = ClientSession {
            id,
            registry,
            outbound,
            name: String::new(),
            room: None,
        };

        // No length-prefix framing: each read consumes up to the buffer size
        // and decodes exactly one packet, trailing bytes are dropped. This
        // mirrors the original protocol and assumes clients pace their sends.
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    info!("client {} ({}) disconnected", id, session.name);
                    break;
                }
                Ok(n) => match deserialize::<Packet>(&buf[..n]) {
                    Ok(packet) => session.dispatch(packet).await,
                    Err(e) => {
                        warn!("client {}: undecodable packet of {} bytes: {}", id, n, e)
                    }
                },
                Err(e) => {
                    info!("client {} ({}) connection error: {}", id, session.name, e);
                    break;
                }
            }
        }

        session.cleanup().await;
    }

    async fn dispatch(&mut self, packet: Packet) {
        match packet {
            Packet::Name { name } => {
                info!("client {} registered as {}", self.id, name);
                self.name = name;
                self.send(Packet::FreeRooms {
                    rooms: self.registry.room_names(),
                });
            }
            Packet::JoinRoom { room } => {
                if self.room.is_some() {
                    warn!("client {} is already in a room, ignoring join", self.id);
                    return;
                }
                match self.registry.find(&room) {
                    Some(room) => {
                        room.join(self.id, self.name.clone(), self.outbound.clone())
                            .await;
                        self.room = Some(room);
                    }
                    None => warn!("client {} asked for unknown room {:?}", self.id, room),
                }
            }
            Packet::Color { color } => {
                let Some(room) = self.room.clone() else {
                    warn!("client {} sent a color before joining a room", self.id);
                    return;
                };
                if room.reserve_color(self.id, color).await {
                    self.send(Packet::ColorFree);
                } else {
                    self.send(Packet::ColorNotFree {
                        reason: COLOR_TAKEN.to_string(),
                    });
                }
            }
            Packet::NewPlayer => {
                if let Some(room) = self.room.clone() {
                    room.announce_player(self.id).await;
                }
            }
            Packet::Ready => {
                let Some(room) = self.room.clone() else {
                    warn!("client {} sent ready before joining a room", self.id);
                    return;
                };
                match room.ready(self.id).await {
                    ReadyOutcome::Continued(canvas) => {
                        self.send(Packet::ContinueGame { canvas })
                    }
                    ReadyOutcome::Started | ReadyOutcome::Waiting => {}
                }
            }
            Packet::CellClaim { x, y, color } => {
                if let Some(room) = self.room.clone() {
                    room.claim_cell(self.id, Cell::new(x, y), color).await;
                }
            }
            Packet::Chat { message } => {
                if let Some(room) = self.room.clone() {
                    room.chat(self.id, &message).await;
                    self.send(Packet::Chat {
                        message: format!("You: {}", message),
                    });
                }
            }
            Packet::Exit => {
                if let Some(room) = self.room.take() {
                    room.leave(self.id, LeaveKind::MidRound).await;
                }
                self.send(Packet::ExitApp);
            }
            Packet::ExitColorWindow => {
                if let Some(room) = self.room.take() {
                    room.leave(self.id, LeaveKind::PreRound).await;
                }
                self.send(Packet::ExitColorWindowAck);
            }
            other => {
                // Server-to-client variants have no business arriving here.
                warn!("client {} sent unexpected packet {:?}", self.id, other);
            }
        }
    }

    fn send(&self, packet: Packet) {
        if self.outbound.send(packet).is_err() {
            debug!("client {}: writer gone, dropping packet", self.id);
        }
    }

    /// Abrupt disconnects run the same room cleanup as an explicit leave.
    /// The room picks the path from its own record of the member's
    /// readiness, which it resets at every round end.
    async fn cleanup(&mut self) {
        if let Some(room) = self.room.take() {
            room.disconnect(self.id).await;
        }
    }
}
