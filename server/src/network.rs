//! Connection listener: accepts TCP connections and spawns one session task
//! per client.

use crate::registry::RoomRegistry;
use crate::room::MemberId;
use crate::session::ClientSession;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;

pub struct GameServer {
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
}

impl GameServer {
    pub async fn bind(
        addr: &str,
        registry: Arc<RoomRegistry>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections indefinitely. Every accepted connection gets its
    /// own session task immediately; there is no connection limit. Accept
    /// failures are transient (resets, fd pressure), so the loop logs and
    /// keeps serving.
    pub async fn run(self) {
        let mut next_session_id: MemberId = 1;
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let id = next_session_id;
                    next_session_id += 1;
                    info!("Client {} connected from {}", id, peer);

                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        ClientSession::run(id, stream, registry).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_to_an_ephemeral_port() {
        let registry = Arc::new(RoomRegistry::new(60));
        let server = GameServer::bind("127.0.0.1:0", registry).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn rejects_an_unparseable_address() {
        let registry = Arc::new(RoomRegistry::new(60));
        assert!(GameServer::bind("not-an-address", registry).await.is_err());
    }
}
