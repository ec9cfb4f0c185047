use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3434;
pub const ROUND_SECONDS: u32 = 60;
/// One transport read consumes at most this many bytes and decodes one packet.
pub const READ_BUFFER_SIZE: usize = 1024;
pub const ROOM_NAMES: [&str; 3] = ["Room1", "Room2", "Room3"];

pub const COLOR_TAKEN: &str = "Цвет уже занят";
pub const GAME_STARTED: &str = "Игра началась!";
pub const TIME_UP: &str = "Время вышло. Игра завершена.\nИтоговое изображение уже у вас.";

/// A grid coordinate on the shared canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The room's authoritative cell-to-color mapping, rebuilt each round.
pub type Canvas = HashMap<Cell, String>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> Server
    Name {
        name: String,
    },
    JoinRoom {
        room: String,
    },
    Color {
        color: String,
    },
    NewPlayer,
    Ready,
    CellClaim {
        x: i32,
        y: i32,
        color: String,
    },
    Chat {
        message: String,
    },
    Exit,
    ExitColorWindow,

    // Server -> Client
    FreeRooms {
        rooms: Vec<String>,
    },
    ColorFree,
    ColorNotFree {
        reason: String,
    },
    StartGame {
        notice: String,
    },
    ContinueGame {
        canvas: Canvas,
    },
    EndGame,
    UpdateTimer {
        seconds_left: u32,
    },
    CellClaimed {
        x: i32,
        y: i32,
        color: String,
    },
    ExitApp,
    ExitColorWindowAck,
}
