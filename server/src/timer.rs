//! The round countdown: one background task per active round.

use crate::room::GameRoom;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Handle to a running countdown. Dropping it does not stop the task;
/// cancellation is cooperative and observed once per tick.
pub struct RoundTimer {
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl RoundTimer {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Starts the countdown for one round. Broadcasts the remaining seconds once
/// per second, `duration` down to 0 inclusive, then triggers the room's
/// end-of-round transition unless the round was already ended early.
pub(crate) fn spawn(room: Arc<GameRoom>, duration: u32) -> RoundTimer {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        for seconds_left in (0..=duration).rev() {
            ticker.tick().await;
            if !room.timer_tick(seconds_left, &flag).await {
                debug!("room {}: countdown cancelled", room.name);
                return;
            }
        }
        room.round_expired(&flag).await;
    });

    RoundTimer { cancelled }
}
