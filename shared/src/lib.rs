//! Shared definitions for the tic-tac-toe matchmaking server and its client.
//!
//! The crate has two halves:
//! - [`protocol`] — the fixed-layout wire format both peers speak. Every
//!   message starts with a one-byte discriminator followed by a payload of a
//!   width that is fully determined by that discriminator (and, for MOVE, by
//!   the direction of travel).
//! - [`game`] — the 3x3 board rules: move application, win and tie
//!   detection, turn tracking. Pure logic, no I/O.

pub mod game;
pub mod protocol;

pub use game::{Game, Mark};
pub use protocol::{Direction, Packet, PacketKind, ProtocolError};
