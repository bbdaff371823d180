//! # Tic-Tac-Toe Matchmaking Server Library
//!
//! Authoritative server pairing connected clients into two-player
//! tic-tac-toe sessions and relaying their moves until a win, tie or
//! disconnect ends the session.
//!
//! ## Architecture
//!
//! Two concurrent actors share one player table:
//!
//! - The **connection reactor** ([`network`]) accepts TCP and Unix-socket
//!   connections and drains a single event channel fed by per-connection
//!   reader tasks. All packet handling happens sequentially in that one
//!   loop, so two connections' packets never race and each connection's
//!   packets are handled strictly in arrival order.
//! - The **liveness sweeper** ([`sweeper`]) wakes on a fixed period, pings
//!   every connected player and evicts those that did not answer the
//!   previous round's ping.
//!
//! Both actors go through the [`registry`] behind one mutex; it owns the
//! fixed-capacity slot table, the per-connection outbound channels and the
//! running games, and its `delete_player` is the single teardown path for
//! disconnects, protocol violations, evictions and finished games.
//!
//! ## Module Organization
//!
//! - [`registry`] — bounded player slot table, game arena, teardown.
//! - [`matchmaker`] — HELLO handling: username uniqueness, FIFO pairing,
//!   first-mover coin flip.
//! - [`network`] — listeners, per-connection tasks, the reactor loop and
//!   packet dispatch.
//! - [`sweeper`] — the periodic ping/evict pass.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server =
//!         Server::new("127.0.0.1:8080", None, Duration::from_secs(5), 32).await?;
//!     server.run().await
//! }
//! ```

pub mod matchmaker;
pub mod network;
pub mod registry;
pub mod sweeper;
