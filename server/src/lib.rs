//! # Game Server Library
//!
//! Authoritative server for the room-based multiplayer drawing game. Clients
//! pick a display name, join one of a fixed set of rooms, reserve a color and
//! then claim grid cells that are broadcast to every room member as a shared
//! canvas.
//!
//! ## Architecture
//!
//! One tokio task per connection runs that client's receive loop
//! ([`session::ClientSession`]); every mutation of a room's state goes
//! through that room's own mutex ([`room::GameRoom`]), so concurrent sessions
//! and the round countdown task never race on membership, colors, the
//! canvas or the lifecycle status. Broadcasts are fan-outs over per-member
//! outbound queues taken under the same lock.
//!
//! ## Module Organization
//!
//! - [`network`] — the TCP listener; accepts connections and spawns sessions.
//! - [`session`] — per-connection packet decode and dispatch.
//! - [`registry`] — the fixed set of rooms and name lookup.
//! - [`room`] — the per-room state machine: membership, color reservations,
//!   readiness gating, the canvas and round lifecycle.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::GameServer;
//! use server::registry::RoomRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(RoomRegistry::new(shared::ROUND_SECONDS));
//!     let server = GameServer::bind("127.0.0.1:3434", registry).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod registry;
pub mod room;
pub mod session;
mod timer;
