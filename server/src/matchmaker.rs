//! HELLO handling: username uniqueness, FIFO pairing and the first-mover
//! coin flip.

use log::info;
use rand::Rng;
use shared::Packet;

use crate::registry::{PlayerStatus, Registry};

/// What a HELLO resulted in. Mostly of interest to logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloOutcome {
    /// Username already taken; the slot stays Reserved for a retry.
    Rejected,
    /// No opponent available; the player waits in the queue.
    Queued,
    /// Matched with the earliest queued player.
    Paired,
}

/// Processes a validated HELLO for the Reserved player in `slot`.
///
/// Pairing always matches the newcomer with the earliest still-queued
/// player, one pairing per HELLO. The first mover is picked uniformly at
/// random; BEGIN_X goes to whoever will play X.
pub fn handle_hello(registry: &mut Registry, slot: usize, username: &str) -> HelloOutcome {
    if registry.username_taken(username) {
        registry.send_to(slot, Packet::BadUsername);
        info!("username '{}' already taken, slot {} may retry", username, slot);
        return HelloOutcome::Rejected;
    }
    registry.player_mut(slot).username = username.to_string();

    let Some(queued) = registry.first_queued() else {
        registry.player_mut(slot).status = PlayerStatus::Queued;
        info!("player '{}' queued (slot {})", username, slot);
        return HelloOutcome::Queued;
    };

    let (x_slot, o_slot) = if rand::thread_rng().gen_bool(0.5) {
        (slot, queued)
    } else {
        (queued, slot)
    };
    registry.pair_players(x_slot, o_slot);
    registry.send_to(x_slot, Packet::BeginX);
    registry.send_to(o_slot, Packet::BeginO);

    info!(
        "paired '{}' (slot {}) with '{}' (slot {}), '{}' moves first",
        username,
        slot,
        registry.player(queued).username,
        queued,
        registry.player(x_slot).username
    );
    HelloOutcome::Paired
}
