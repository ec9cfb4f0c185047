//! # Game Client Library
//!
//! Headless client side of the room-based drawing game. The server treats a
//! client as nothing more than a source and sink of tagged packets, and this
//! crate provides exactly that: [`network::Connection`] wraps one long-lived
//! TCP stream and encodes/decodes the shared [`shared::Packet`] type.
//!
//! Rendering, widgets and dialogs are deliberately out of scope; a UI (or a
//! test) drives this crate by sending requests and reacting to the packets it
//! receives. The bundled binary is a scripted smoke client that walks the
//! full handshake: name, room, color, readiness, then prints whatever the
//! room broadcasts.

pub mod network;
