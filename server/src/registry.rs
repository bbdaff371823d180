//! Bounded player slot table shared by the reactor and the sweeper.
//!
//! The registry owns fixed-capacity storage for every connected player, the
//! arena of running games and each connection's outbound packet channel. It
//! is the only state shared between the two actors and lives behind a single
//! `tokio::sync::Mutex`; every method here expects that lock to be held.

use std::collections::HashMap;

use log::{debug, info};
use shared::{Game, Mark, Packet};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Token identifying one accepted connection.
///
/// Slot indices are reused as soon as a player is deleted; the token is what
/// keeps a late event from a dead connection away from the slot's next
/// occupant. Tokens are allocated monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

/// Arena index of a running game. Both paired players store the same id;
/// the entry is removed exactly once when the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GameId(u64);

/// Per-slot connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Free slot, available for reuse.
    Empty,
    /// Connection accepted, HELLO not yet received.
    Reserved,
    /// Identified and waiting for an opponent.
    Queued,
    /// Paired into a running game.
    Playing,
}

/// One slot of the registry.
#[derive(Debug)]
pub struct Player {
    pub status: PlayerStatus,
    pub conn: ConnId,
    /// Cleared by the sweeper each round, set again by an answering PING.
    pub alive: bool,
    pub username: String,
    /// Mark assigned at pairing time; the mark MOVE packets are applied with.
    pub mark: Option<Mark>,
    /// Slot index of the paired opponent. Not an owning reference.
    pub opponent: Option<usize>,
    pub game: Option<GameId>,
    outbound: Option<mpsc::UnboundedSender<Packet>>,
    reader: Option<AbortHandle>,
}

impl Player {
    fn empty() -> Self {
        Self {
            status: PlayerStatus::Empty,
            conn: ConnId(0),
            alive: false,
            username: String::new(),
            mark: None,
            opponent: None,
            game: None,
            outbound: None,
            reader: None,
        }
    }
}

/// Fixed-capacity player table plus the game arena.
pub struct Registry {
    slots: Vec<Player>,
    games: HashMap<GameId, Game>,
    next_game_id: u64,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Player::empty()).collect(),
            games: HashMap::new(),
            next_game_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of non-empty slots.
    pub fn active_players(&self) -> usize {
        self.slots
            .iter()
            .filter(|p| p.status != PlayerStatus::Empty)
            .count()
    }

    pub fn player(&self, slot: usize) -> &Player {
        &self.slots[slot]
    }

    pub fn player_mut(&mut self, slot: usize) -> &mut Player {
        &mut self.slots[slot]
    }

    /// Reserves the first free slot for a new connection. Returns the slot
    /// index, or `None` when the registry is at capacity (the caller must
    /// reply FULL and close).
    pub fn create_player(
        &mut self,
        conn: ConnId,
        outbound: mpsc::UnboundedSender<Packet>,
        reader: AbortHandle,
    ) -> Option<usize> {
        let slot = self
            .slots
            .iter()
            .position(|p| p.status == PlayerStatus::Empty)?;

        let player = &mut self.slots[slot];
        player.status = PlayerStatus::Reserved;
        player.conn = conn;
        player.alive = true;
        player.username.clear();
        player.mark = None;
        player.opponent = None;
        player.game = None;
        player.outbound = Some(outbound);
        player.reader = Some(reader);
        Some(slot)
    }

    /// Resolves a connection token to its current slot. Returns `None` once
    /// the player has been deleted, even if the slot was since reused.
    pub fn slot_of(&self, conn: ConnId) -> Option<usize> {
        self.slots
            .iter()
            .position(|p| p.status != PlayerStatus::Empty && p.conn == conn)
    }

    /// Earliest still-queued player by slot order, the FIFO pairing rule.
    pub fn first_queued(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|p| p.status == PlayerStatus::Queued)
    }

    /// Linear scan over non-empty slots. Uniqueness is only enforced among
    /// active players; a freed name may be claimed again.
    pub fn username_taken(&self, username: &str) -> bool {
        self.slots
            .iter()
            .any(|p| p.status != PlayerStatus::Empty && p.username == username)
    }

    /// Queues a packet on the player's outbound channel. The channel is
    /// unbounded, so this never blocks and may be called under the lock.
    pub fn send_to(&self, slot: usize, packet: Packet) {
        if let Some(outbound) = &self.slots[slot].outbound {
            if outbound.send(packet).is_err() {
                debug!("slot {}: writer task already gone", slot);
            }
        }
    }

    /// Cross-links two players into a fresh game. `x_slot` receives mark X
    /// and moves first.
    pub fn pair_players(&mut self, x_slot: usize, o_slot: usize) -> GameId {
        let id = GameId(self.next_game_id);
        self.next_game_id += 1;
        self.games.insert(id, Game::new());

        self.slots[x_slot].status = PlayerStatus::Playing;
        self.slots[x_slot].mark = Some(Mark::X);
        self.slots[x_slot].opponent = Some(o_slot);
        self.slots[x_slot].game = Some(id);

        self.slots[o_slot].status = PlayerStatus::Playing;
        self.slots[o_slot].mark = Some(Mark::O);
        self.slots[o_slot].opponent = Some(x_slot);
        self.slots[o_slot].game = Some(id);

        id
    }

    pub fn game_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.games.get_mut(&id)
    }

    /// Unified teardown path for disconnects, protocol violations, liveness
    /// evictions and finished games.
    ///
    /// Idempotent: a token that no longer resolves is a no-op, so a late
    /// hangup event after an eviction cannot double-notify an opponent. If
    /// the victim was mid-game, the shared game is destroyed, the opponent's
    /// references are cleared and the opponent is sent
    /// OPPONENT_DISCONNECTED.
    pub fn delete_player(&mut self, conn: ConnId) {
        let Some(slot) = self.slot_of(conn) else {
            return;
        };

        if self.slots[slot].status == PlayerStatus::Playing {
            if let Some(opp) = self.slots[slot].opponent {
                if self.slots[opp].status == PlayerStatus::Playing
                    && self.slots[opp].opponent == Some(slot)
                {
                    if let Some(game) = self.slots[opp].game.take() {
                        self.games.remove(&game);
                    }
                    self.slots[opp].opponent = None;
                    self.send_to(opp, Packet::OpponentDisconnected);
                }
            }
        }

        info!(
            "removing player '{}' (connection {}, slot {})",
            self.slots[slot].username, conn.0, slot
        );
        self.reset_slot(slot);
    }

    /// Frees both slots of a finished game without opponent notifications.
    /// Result packets must be queued before calling this; the writer tasks
    /// drain their channels before closing the sockets.
    pub fn finish_game(&mut self, slot: usize, opp: usize) {
        if let Some(game) = self.slots[slot].game.take() {
            self.games.remove(&game);
        }
        self.slots[opp].game = None;
        self.slots[slot].opponent = None;
        self.slots[opp].opponent = None;
        self.reset_slot(slot);
        self.reset_slot(opp);
    }

    /// One liveness round: players that answered since the last round get a
    /// fresh PING, players that did not are evicted through the unified
    /// delete path. Returns the number of evictions.
    pub fn sweep(&mut self) -> usize {
        let mut stale = Vec::new();
        for (slot, player) in self.slots.iter_mut().enumerate() {
            if player.status == PlayerStatus::Empty {
                continue;
            }
            if player.alive {
                player.alive = false;
                if let Some(outbound) = &player.outbound {
                    if outbound.send(Packet::Ping).is_err() {
                        debug!("slot {}: writer task already gone", slot);
                    }
                }
            } else {
                stale.push(player.conn);
            }
        }

        for conn in &stale {
            self.delete_player(*conn);
        }
        stale.len()
    }

    fn reset_slot(&mut self, slot: usize) {
        let player = &mut self.slots[slot];
        if let Some(game) = player.game.take() {
            self.games.remove(&game);
        }
        let player = &mut self.slots[slot];
        if let Some(reader) = player.reader.take() {
            reader.abort();
        }
        // Dropping the sender lets the writer task flush queued packets,
        // shut the socket down and exit.
        player.outbound = None;
        player.status = PlayerStatus::Empty;
        player.alive = false;
        player.username.clear();
        player.mark = None;
        player.opponent = None;
        player.game = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn dummy_abort() -> AbortHandle {
        tokio::spawn(std::future::pending::<()>()).abort_handle()
    }

    fn connect(registry: &mut Registry, conn: u64) -> (usize, UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = registry
            .create_player(ConnId(conn), tx, dummy_abort())
            .expect("registry full");
        (slot, rx)
    }

    fn pair(registry: &mut Registry, a: u64, b: u64) -> ((usize, UnboundedReceiver<Packet>), (usize, UnboundedReceiver<Packet>)) {
        let (x, x_rx) = connect(registry, a);
        let (o, o_rx) = connect(registry, b);
        registry.player_mut(x).username = "x".to_string();
        registry.player_mut(o).username = "o".to_string();
        registry.pair_players(x, o);
        ((x, x_rx), (o, o_rx))
    }

    #[tokio::test]
    async fn test_create_player_reserves_first_free_slot() {
        let mut registry = Registry::new(4);
        let (slot, _rx) = connect(&mut registry, 1);

        assert_eq!(slot, 0);
        assert_eq!(registry.player(slot).status, PlayerStatus::Reserved);
        assert!(registry.player(slot).alive);
        assert!(registry.player(slot).username.is_empty());
        assert_eq!(registry.active_players(), 1);
    }

    #[tokio::test]
    async fn test_capacity_exhaustion() {
        let mut registry = Registry::new(2);
        let (_, _rx1) = connect(&mut registry, 1);
        let (_, _rx2) = connect(&mut registry, 2);

        let (tx, _rx3) = mpsc::unbounded_channel();
        assert!(registry.create_player(ConnId(3), tx, dummy_abort()).is_none());
    }

    #[tokio::test]
    async fn test_slot_reuse_after_delete() {
        let mut registry = Registry::new(2);
        let (slot, _rx) = connect(&mut registry, 1);
        registry.delete_player(ConnId(1));
        assert_eq!(registry.player(slot).status, PlayerStatus::Empty);

        let (reused, _rx2) = connect(&mut registry, 2);
        assert_eq!(reused, slot);
        assert_eq!(registry.slot_of(ConnId(2)), Some(reused));
        // The stale token must not resolve to the reused slot.
        assert_eq!(registry.slot_of(ConnId(1)), None);
    }

    #[tokio::test]
    async fn test_username_uniqueness_spans_non_empty_slots_only() {
        let mut registry = Registry::new(4);
        let (slot, _rx) = connect(&mut registry, 1);
        registry.player_mut(slot).username = "alice".to_string();

        assert!(registry.username_taken("alice"));
        assert!(!registry.username_taken("bob"));

        registry.delete_player(ConnId(1));
        assert!(!registry.username_taken("alice"));
    }

    #[tokio::test]
    async fn test_first_queued_is_lowest_slot() {
        let mut registry = Registry::new(4);
        let (a, _rx1) = connect(&mut registry, 1);
        let (b, _rx2) = connect(&mut registry, 2);
        registry.player_mut(b).status = PlayerStatus::Queued;
        assert_eq!(registry.first_queued(), Some(b));

        registry.player_mut(a).status = PlayerStatus::Queued;
        assert_eq!(registry.first_queued(), Some(a));
    }

    #[tokio::test]
    async fn test_pair_players_cross_links() {
        let mut registry = Registry::new(4);
        let ((x, _x_rx), (o, _o_rx)) = pair(&mut registry, 1, 2);

        assert_eq!(registry.player(x).status, PlayerStatus::Playing);
        assert_eq!(registry.player(o).status, PlayerStatus::Playing);
        assert_eq!(registry.player(x).mark, Some(Mark::X));
        assert_eq!(registry.player(o).mark, Some(Mark::O));
        assert_eq!(registry.player(x).opponent, Some(o));
        assert_eq!(registry.player(o).opponent, Some(x));
        assert_eq!(registry.player(x).game, registry.player(o).game);
        assert!(registry.player(x).game.is_some());
    }

    #[tokio::test]
    async fn test_delete_playing_player_notifies_opponent() {
        let mut registry = Registry::new(4);
        let ((x, _x_rx), (o, mut o_rx)) = pair(&mut registry, 1, 2);

        registry.delete_player(ConnId(1));

        assert_eq!(o_rx.try_recv().unwrap(), Packet::OpponentDisconnected);
        assert_eq!(registry.player(x).status, PlayerStatus::Empty);
        assert_eq!(registry.player(o).status, PlayerStatus::Playing);
        assert_eq!(registry.player(o).opponent, None);
        assert_eq!(registry.player(o).game, None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let mut registry = Registry::new(4);
        let ((_, _x_rx), (_, mut o_rx)) = pair(&mut registry, 1, 2);

        registry.delete_player(ConnId(1));
        registry.delete_player(ConnId(1));

        assert_eq!(o_rx.try_recv().unwrap(), Packet::OpponentDisconnected);
        // Exactly one notification, no double-notify on the second call.
        assert!(o_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_finish_game_frees_both_without_notification() {
        let mut registry = Registry::new(4);
        let ((x, mut x_rx), (o, mut o_rx)) = pair(&mut registry, 1, 2);

        registry.finish_game(x, o);

        assert_eq!(registry.player(x).status, PlayerStatus::Empty);
        assert_eq!(registry.player(o).status, PlayerStatus::Empty);
        assert_eq!(registry.active_players(), 0);
        assert!(x_rx.try_recv().is_err());
        assert!(o_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sweep_pings_then_evicts() {
        let mut registry = Registry::new(4);
        let (slot, mut rx) = connect(&mut registry, 1);

        // First round: player answered previously, gets pinged.
        assert_eq!(registry.sweep(), 0);
        assert_eq!(rx.try_recv().unwrap(), Packet::Ping);
        assert!(!registry.player(slot).alive);

        // Second round without an answer: evicted.
        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.player(slot).status, PlayerStatus::Empty);
    }

    #[tokio::test]
    async fn test_sweep_spares_answering_player() {
        let mut registry = Registry::new(4);
        let (slot, mut rx) = connect(&mut registry, 1);

        for _ in 0..3 {
            assert_eq!(registry.sweep(), 0);
            assert_eq!(rx.try_recv().unwrap(), Packet::Ping);
            // Simulate the PING answer arriving before the next round.
            registry.player_mut(slot).alive = true;
        }
        assert_eq!(registry.player(slot).status, PlayerStatus::Reserved);
    }

    #[tokio::test]
    async fn test_sweep_eviction_notifies_opponent() {
        let mut registry = Registry::new(4);
        let ((x, _x_rx), (o, mut o_rx)) = pair(&mut registry, 1, 2);

        registry.sweep(); // both pinged
        assert_eq!(o_rx.try_recv().unwrap(), Packet::Ping);
        registry.player_mut(o).alive = true; // only O answers

        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.player(x).status, PlayerStatus::Empty);
        assert_eq!(registry.player(o).status, PlayerStatus::Playing);
        assert_eq!(o_rx.try_recv().unwrap(), Packet::Ping);
        assert_eq!(o_rx.try_recv().unwrap(), Packet::OpponentDisconnected);
    }
}
