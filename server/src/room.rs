//! Per-room state machine: membership, color reservations, the shared canvas
//! and the round lifecycle.
//!
//! Every mutation of a room — joins, color claims, canvas writes, readiness,
//! lifecycle transitions — goes through the room's single mutex. Broadcasts
//! iterate the membership while the lock is held; sends are non-blocking
//! channel pushes, so no member is ever observed half-added or half-removed.

use crate::timer::{self, RoundTimer};
use log::{debug, info, warn};
use shared::{Canvas, Cell, Packet, GAME_STARTED, TIME_UP};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

/// Session identifier assigned by the connection listener.
pub type MemberId = u32;

/// Outbound handle for one connected client. The session's writer task owns
/// the socket; the room only ever pushes packets into this queue.
pub type PacketSender = UnboundedSender<Packet>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Active,
}

/// How a member leaves the room. Only the departure notice differs; either
/// way the member record (and its readiness flag) is removed whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveKind {
    /// Mid-round exit.
    MidRound,
    /// Pre-round exit (client backed out of color selection).
    PreRound,
}

/// Outcome of a readiness signal, acted on by the sender's session.
#[derive(Debug)]
pub enum ReadyOutcome {
    /// Not everyone is ready yet (or the room is still solo).
    Waiting,
    /// The round just started; `StartGame` was broadcast by the room.
    Started,
    /// The round was already running; the caller gets this canvas snapshot.
    Continued(Canvas),
}

/// One connected player inside the room. A single record per member replaces
/// the original index-parallel name/color lists, so members can leave in any
/// order without bookkeeping drift.
struct Member {
    id: MemberId,
    name: String,
    color: Option<String>,
    /// Readied into the current gate. Reset for everyone when a round ends,
    /// so a stale signal from a previous round can never count toward the
    /// next one.
    ready: bool,
    sender: PacketSender,
}

struct RoomState {
    members: Vec<Member>,
    colors_in_use: HashSet<String>,
    canvas: Canvas,
    status: RoomStatus,
    timer: Option<RoundTimer>,
}

impl RoomState {
    fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Number of members readied into the current gate. Derived from the
    /// per-member flags, so it can never drift outside `0..=members.len()`.
    fn ready_count(&self) -> usize {
        self.members.iter().filter(|m| m.ready).count()
    }

    /// Fans a packet out to the current membership, optionally skipping one
    /// member. A failed send means that member's writer is gone; delivery
    /// continues to the rest.
    fn broadcast(&self, packet: Packet, exclude: Option<MemberId>) {
        for member in &self.members {
            if Some(member.id) == exclude {
                continue;
            }
            if member.sender.send(packet.clone()).is_err() {
                debug!("member {} unreachable, skipping", member.id);
            }
        }
    }
}

/// A named, statically-provisioned session container. Created once at server
/// startup and never destroyed; cycles Waiting -> Active -> Waiting as rounds
/// start and end.
pub struct GameRoom {
    pub name: String,
    round_seconds: u32,
    state: Mutex<RoomState>,
}

impl GameRoom {
    pub fn new(name: &str, round_seconds: u32) -> Self {
        Self {
            name: name.to_string(),
            round_seconds,
            state: Mutex::new(RoomState {
                members: Vec::new(),
                colors_in_use: HashSet::new(),
                canvas: Canvas::new(),
                status: RoomStatus::Waiting,
                timer: None,
            }),
        }
    }

    pub async fn join(&self, id: MemberId, name: String, sender: PacketSender) {
        let mut state = self.state.lock().await;
        info!("room {}: player {} ({}) joined", self.name, name, id);
        state.members.push(Member {
            id,
            name,
            color: None,
            ready: false,
            sender,
        });
    }

    /// Attempts to reserve a color for the given member. The check and the
    /// commit happen atomically under the room lock, so a second client
    /// proposing the same color can never also observe it as free.
    pub async fn reserve_color(&self, id: MemberId, color: String) -> bool {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        if state.colors_in_use.contains(&color) {
            debug!("room {}: color {} already taken", self.name, color);
            return false;
        }
        let Some(member) = state.members.iter_mut().find(|m| m.id == id) else {
            warn!("room {}: color claim from non-member {}", self.name, id);
            return false;
        };
        // Re-reserving releases the previous pick.
        let previous = member.color.replace(color.clone());
        state.colors_in_use.insert(color);
        if let Some(previous) = previous {
            state.colors_in_use.remove(&previous);
        }
        true
    }

    /// Announces a finalized reservation to the rest of the room.
    pub async fn announce_player(&self, id: MemberId) {
        let state = self.state.lock().await;
        let Some(member) = state.member(id) else {
            return;
        };
        state.broadcast(
            Packet::Chat {
                message: format!("Игрок {} присоединился к комнате.", member.name),
            },
            Some(id),
        );
    }

    /// Registers a readiness signal. The round starts the first time every
    /// current member is ready and there are at least two of them; a signal
    /// arriving while a round is already running yields a canvas snapshot for
    /// the late joiner instead of a second timer.
    pub async fn ready(self: &Arc<Self>, id: MemberId) -> ReadyOutcome {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        let Some(member) = state.members.iter_mut().find(|m| m.id == id) else {
            warn!("room {}: ready from non-member {}", self.name, id);
            return ReadyOutcome::Waiting;
        };
        // Repeats are idempotent: one member cannot ready twice into a gate.
        member.ready = true;

        match state.status {
            RoomStatus::Active => ReadyOutcome::Continued(state.canvas.clone()),
            RoomStatus::Waiting => {
                if state.members.len() > 1 && state.members.iter().all(|m| m.ready) {
                    info!(
                        "room {}: round started with {} players",
                        self.name,
                        state.members.len()
                    );
                    state.status = RoomStatus::Active;
                    state.broadcast(
                        Packet::StartGame {
                            notice: GAME_STARTED.to_string(),
                        },
                        None,
                    );
                    state.timer = Some(timer::spawn(Arc::clone(self), self.round_seconds));
                    ReadyOutcome::Started
                } else {
                    debug!(
                        "room {}: {}/{} ready",
                        self.name,
                        state.ready_count(),
                        state.members.len()
                    );
                    ReadyOutcome::Waiting
                }
            }
        }
    }

    /// Writes one cell claim into the canvas and fans it out to everyone but
    /// the claimant. Claims outside an active round are dropped: canvas
    /// entries only exist while a round is running.
    pub async fn claim_cell(&self, id: MemberId, cell: Cell, color: String) -> bool {
        let mut state = self.state.lock().await;
        if state.status != RoomStatus::Active {
            warn!("room {}: cell claim from {} outside a round", self.name, id);
            return false;
        }
        state.canvas.insert(cell, color.clone());
        state.broadcast(
            Packet::CellClaimed {
                x: cell.x,
                y: cell.y,
                color,
            },
            Some(id),
        );
        true
    }

    /// Relays a chat line to everyone but the sender, prefixed with the
    /// sender's display name. The sender's own echo is sent by its session.
    pub async fn chat(&self, id: MemberId, message: &str) {
        let state = self.state.lock().await;
        let Some(member) = state.member(id) else {
            return;
        };
        state.broadcast(
            Packet::Chat {
                message: format!("{}: {}", member.name, message),
            },
            Some(id),
        );
    }

    /// Removes a member, releases its color and notifies the rest of the
    /// room. A mid-round departure that leaves a single player behind ends
    /// the round early.
    pub async fn leave(&self, id: MemberId, kind: LeaveKind) {
        let mut state = self.state.lock().await;
        self.leave_locked(&mut state, id, kind);
    }

    /// Abrupt disconnect: runs the mid-round cleanup when the member had
    /// readied into the current gate, the pre-round cleanup otherwise. A
    /// member whose readiness was reset at the end of a round departs the
    /// pre-round way and cannot touch the next gate.
    pub async fn disconnect(&self, id: MemberId) {
        let mut state = self.state.lock().await;
        let kind = match state.member(id) {
            Some(m) if m.ready => LeaveKind::MidRound,
            Some(_) => LeaveKind::PreRound,
            None => return,
        };
        self.leave_locked(&mut state, id, kind);
    }

    fn leave_locked(&self, state: &mut RoomState, id: MemberId, kind: LeaveKind) {
        let Some(idx) = state.members.iter().position(|m| m.id == id) else {
            return;
        };
        let member = state.members.remove(idx);
        if let Some(color) = &member.color {
            state.colors_in_use.remove(color);
        }
        info!("room {}: player {} ({}) left", self.name, member.name, id);

        let message = match kind {
            LeaveKind::MidRound => format!("Игрок {} покинул игру.", member.name),
            LeaveKind::PreRound => format!("Игрок {} покинул комнату.", member.name),
        };
        state.broadcast(Packet::Chat { message }, None);
        // The leaver's readiness flag went with the member record; the gate
        // only ever counts current membership.
        if state.members.len() == 1 && state.status == RoomStatus::Active {
            self.end_round_locked(state, false);
        }
    }

    /// One timer tick: broadcasts the remaining seconds unless this timer was
    /// cancelled. Returns false to stop the ticking task. The flag is only
    /// ever set inside a room critical section, so checking it under the lock
    /// is race-free.
    pub(crate) async fn timer_tick(&self, seconds_left: u32, cancelled: &AtomicBool) -> bool {
        let state = self.state.lock().await;
        if cancelled.load(Ordering::Relaxed) {
            return false;
        }
        state.broadcast(Packet::UpdateTimer { seconds_left }, None);
        true
    }

    /// Normal end of round, invoked by the timer after its final tick.
    pub(crate) async fn round_expired(&self, cancelled: &AtomicBool) {
        let mut state = self.state.lock().await;
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        self.end_round_locked(&mut state, true);
    }

    /// Active -> Waiting in one critical section: notice, canvas wipe,
    /// readiness reset, timer cancellation.
    fn end_round_locked(&self, state: &mut RoomState, expired: bool) {
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        if expired && state.members.len() > 1 {
            state.broadcast(
                Packet::Chat {
                    message: TIME_UP.to_string(),
                },
                None,
            );
        }
        state.broadcast(Packet::EndGame, None);
        state.canvas.clear();
        for member in &mut state.members {
            member.ready = false;
        }
        state.status = RoomStatus::Waiting;
        info!(
            "room {}: round over ({})",
            self.name,
            if expired { "time up" } else { "early end" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::timeout;

    fn room(round_seconds: u32) -> Arc<GameRoom> {
        Arc::new(GameRoom::new("Room1", round_seconds))
    }

    async fn add_member(room: &Arc<GameRoom>, id: MemberId, name: &str) -> UnboundedReceiver<Packet> {
        let (tx, rx) = mpsc::unbounded_channel();
        room.join(id, name.to_string(), tx).await;
        rx
    }

    async fn next_packet(rx: &mut UnboundedReceiver<Packet>) -> Packet {
        timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("timed out waiting for packet")
            .expect("channel closed")
    }

    /// Receives the next non-timer packet.
    async fn next_event(rx: &mut UnboundedReceiver<Packet>) -> Packet {
        loop {
            match next_packet(rx).await {
                Packet::UpdateTimer { .. } => continue,
                packet => return packet,
            }
        }
    }

    #[tokio::test]
    async fn color_reservation_is_first_come_first_served() {
        let room = room(60);
        let _a = add_member(&room, 1, "Анна").await;
        let _b = add_member(&room, 2, "Борис").await;

        assert!(room.reserve_color(1, "#ff0000".to_string()).await);
        // Interleaved attempt for the same color before any confirmation
        assert!(!room.reserve_color(2, "#ff0000".to_string()).await);
        assert!(room.reserve_color(2, "#00ff00".to_string()).await);
    }

    #[tokio::test]
    async fn re_reserving_releases_the_previous_color() {
        let room = room(60);
        let _a = add_member(&room, 1, "Анна").await;
        let _b = add_member(&room, 2, "Борис").await;

        assert!(room.reserve_color(1, "#ff0000".to_string()).await);
        assert!(room.reserve_color(1, "#123456".to_string()).await);
        // The first pick is free again
        assert!(room.reserve_color(2, "#ff0000".to_string()).await);
    }

    #[tokio::test]
    async fn leaving_releases_the_color() {
        let room = room(60);
        let _a = add_member(&room, 1, "Анна").await;
        let _b = add_member(&room, 2, "Борис").await;

        assert!(room.reserve_color(1, "#ff0000".to_string()).await);
        room.leave(1, LeaveKind::PreRound).await;
        assert!(room.reserve_color(2, "#ff0000".to_string()).await);
    }

    #[tokio::test]
    async fn round_starts_exactly_once_when_everyone_is_ready() {
        let room = room(60);
        let mut a = add_member(&room, 1, "Анна").await;
        let mut b = add_member(&room, 2, "Борис").await;

        assert!(matches!(room.ready(1).await, ReadyOutcome::Waiting));
        // Nothing has been broadcast yet
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());

        assert!(matches!(room.ready(2).await, ReadyOutcome::Started));
        assert!(matches!(next_packet(&mut a).await, Packet::StartGame { .. }));
        assert!(matches!(next_packet(&mut b).await, Packet::StartGame { .. }));
    }

    #[tokio::test]
    async fn solo_member_cannot_start_a_round() {
        let room = room(60);
        let mut a = add_member(&room, 1, "Анна").await;

        assert!(matches!(room.ready(1).await, ReadyOutcome::Waiting));
        assert!(a.try_recv().is_err());
        assert_eq!(room.state.lock().await.status, RoomStatus::Waiting);
    }

    #[tokio::test]
    async fn late_ready_gets_snapshot_and_no_second_timer() {
        let room = room(60);
        let mut a = add_member(&room, 1, "Анна").await;
        let _b = add_member(&room, 2, "Борис").await;
        room.ready(1).await;
        room.ready(2).await;
        assert!(matches!(next_packet(&mut a).await, Packet::StartGame { .. }));

        room.claim_cell(1, Cell::new(2, 2), "#ff0000".to_string()).await;

        let first_timer = {
            let state = room.state.lock().await;
            Arc::clone(&state.timer.as_ref().unwrap().cancelled)
        };

        let _c = add_member(&room, 3, "Вера").await;
        match room.ready(3).await {
            ReadyOutcome::Continued(canvas) => {
                assert_eq!(canvas.get(&Cell::new(2, 2)).unwrap(), "#ff0000");
            }
            other => panic!("expected snapshot, got {:?}", other),
        }

        // Still the same timer, still one round
        let state = room.state.lock().await;
        assert!(Arc::ptr_eq(
            &first_timer,
            &state.timer.as_ref().unwrap().cancelled
        ));
        assert_eq!(state.status, RoomStatus::Active);
    }

    #[tokio::test]
    async fn cell_claims_outside_a_round_are_dropped() {
        let room = room(60);
        let _a = add_member(&room, 1, "Анна").await;

        assert!(!room.claim_cell(1, Cell::new(0, 0), "#ff0000".to_string()).await);
        assert!(room.state.lock().await.canvas.is_empty());
    }

    #[tokio::test]
    async fn cell_claims_reach_everyone_but_the_claimant() {
        let room = room(60);
        let mut a = add_member(&room, 1, "Анна").await;
        let mut b = add_member(&room, 2, "Борис").await;
        room.ready(1).await;
        room.ready(2).await;
        assert!(matches!(next_packet(&mut a).await, Packet::StartGame { .. }));
        assert!(matches!(next_packet(&mut b).await, Packet::StartGame { .. }));

        assert!(room.claim_cell(1, Cell::new(3, 4), "#ff0000".to_string()).await);

        match next_event(&mut b).await {
            Packet::CellClaimed { x, y, color } => {
                assert_eq!((x, y), (3, 4));
                assert_eq!(color, "#ff0000");
            }
            other => panic!("expected cell claim, got {:?}", other),
        }
        // The claimant only sees timer traffic
        while let Ok(packet) = a.try_recv() {
            assert!(matches!(packet, Packet::UpdateTimer { .. }));
        }
        assert_eq!(
            room.state.lock().await.canvas.get(&Cell::new(3, 4)).unwrap(),
            "#ff0000"
        );
    }

    #[tokio::test]
    async fn timer_counts_down_inclusive_and_ends_the_round() {
        let room = room(1);
        let mut a = add_member(&room, 1, "Анна").await;
        let mut b = add_member(&room, 2, "Борис").await;
        room.ready(1).await;
        room.ready(2).await;
        assert!(matches!(next_packet(&mut a).await, Packet::StartGame { .. }));

        // duration + 1 ticks: 1 down to 0 inclusive
        assert_eq!(next_packet(&mut a).await, Packet::UpdateTimer { seconds_left: 1 });
        assert_eq!(next_packet(&mut a).await, Packet::UpdateTimer { seconds_left: 0 });
        assert_eq!(
            next_packet(&mut a).await,
            Packet::Chat {
                message: TIME_UP.to_string()
            }
        );
        assert_eq!(next_packet(&mut a).await, Packet::EndGame);

        let state = room.state.lock().await;
        assert_eq!(state.status, RoomStatus::Waiting);
        assert_eq!(state.ready_count(), 0);
        assert!(state.canvas.is_empty());
        assert!(state.timer.is_none());
        drop(state);

        // A fresh ready/ready pair starts a new round on an empty canvas
        room.ready(1).await;
        assert!(matches!(room.ready(2).await, ReadyOutcome::Started));
        let _ = next_event(&mut b);
    }

    #[tokio::test]
    async fn midround_exit_with_one_left_ends_early() {
        let room = room(60);
        let mut a = add_member(&room, 1, "Анна").await;
        let mut b = add_member(&room, 2, "Борис").await;
        room.ready(1).await;
        room.ready(2).await;
        assert!(matches!(next_packet(&mut a).await, Packet::StartGame { .. }));
        assert!(matches!(next_packet(&mut b).await, Packet::StartGame { .. }));
        room.claim_cell(1, Cell::new(5, 5), "#ff0000".to_string()).await;

        room.leave(1, LeaveKind::MidRound).await;

        assert_eq!(
            next_event(&mut b).await,
            Packet::Chat {
                message: "Игрок Анна покинул игру.".to_string()
            }
        );
        // Early end: no time's-up notice, straight to EndGame
        assert_eq!(next_event(&mut b).await, Packet::EndGame);

        let state = room.state.lock().await;
        assert_eq!(state.status, RoomStatus::Waiting);
        assert_eq!(state.ready_count(), 0);
        assert!(state.canvas.is_empty());
        assert!(state.timer.is_none());
    }

    #[tokio::test]
    async fn preround_exit_leaves_readiness_alone() {
        let room = room(60);
        let _a = add_member(&room, 1, "Анна").await;
        let mut b = add_member(&room, 2, "Борис").await;
        let _c = add_member(&room, 3, "Вера").await;
        room.ready(1).await;

        room.leave(3, LeaveKind::PreRound).await;

        assert_eq!(
            next_packet(&mut b).await,
            Packet::Chat {
                message: "Игрок Вера покинул комнату.".to_string()
            }
        );
        let state = room.state.lock().await;
        assert_eq!(state.ready_count(), 1);
        assert_eq!(state.members.len(), 2);
    }

    #[tokio::test]
    async fn double_ready_from_one_member_does_not_start_the_round() {
        let room = room(60);
        let mut a = add_member(&room, 1, "Анна").await;
        let _b = add_member(&room, 2, "Борис").await;

        assert!(matches!(room.ready(1).await, ReadyOutcome::Waiting));
        assert!(matches!(room.ready(1).await, ReadyOutcome::Waiting));
        assert!(a.try_recv().is_err());

        let state = room.state.lock().await;
        assert_eq!(state.status, RoomStatus::Waiting);
        assert_eq!(state.ready_count(), 1);
    }

    #[tokio::test]
    async fn repeat_ready_while_active_keeps_the_count_bounded() {
        let room = room(60);
        let mut a = add_member(&room, 1, "Анна").await;
        let _b = add_member(&room, 2, "Борис").await;
        room.ready(1).await;
        room.ready(2).await;
        assert!(matches!(next_packet(&mut a).await, Packet::StartGame { .. }));

        // Retries mid-round fetch snapshots, never a third readiness
        assert!(matches!(room.ready(1).await, ReadyOutcome::Continued(_)));
        assert!(matches!(room.ready(1).await, ReadyOutcome::Continued(_)));

        let state = room.state.lock().await;
        assert!(state.ready_count() <= state.members.len());
        assert_eq!(state.ready_count(), 2);
    }

    #[tokio::test]
    async fn disconnect_between_rounds_does_not_consume_readiness() {
        let room = room(1);
        let mut a = add_member(&room, 1, "Анна").await;
        let _b = add_member(&room, 2, "Борис").await;
        room.ready(1).await;
        room.ready(2).await;
        assert!(matches!(next_packet(&mut a).await, Packet::StartGame { .. }));
        // Let the one-second round expire
        loop {
            if next_packet(&mut a).await == Packet::EndGame {
                break;
            }
        }

        // A readies into the next gate, then B drops its connection
        assert!(matches!(room.ready(1).await, ReadyOutcome::Waiting));
        room.disconnect(2).await;
        assert_eq!(
            next_event(&mut a).await,
            Packet::Chat {
                message: "Игрок Борис покинул комнату.".to_string()
            }
        );

        // A fresh pair of readiness signals still opens the gate
        let _c = add_member(&room, 3, "Вера").await;
        assert!(matches!(room.ready(3).await, ReadyOutcome::Started));
        assert!(matches!(next_event(&mut a).await, Packet::StartGame { .. }));
    }

    #[tokio::test]
    async fn disconnect_of_a_readied_member_runs_the_midround_cleanup() {
        let room = room(60);
        let mut a = add_member(&room, 1, "Анна").await;
        let _b = add_member(&room, 2, "Борис").await;
        room.ready(1).await;
        room.ready(2).await;
        assert!(matches!(next_packet(&mut a).await, Packet::StartGame { .. }));

        room.disconnect(2).await;

        assert_eq!(
            next_event(&mut a).await,
            Packet::Chat {
                message: "Игрок Борис покинул игру.".to_string()
            }
        );
        assert_eq!(next_event(&mut a).await, Packet::EndGame);
    }
}
