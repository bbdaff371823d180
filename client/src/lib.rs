//! Terminal client for the tic-tac-toe matchmaking server.
//!
//! Connects over TCP or a Unix domain socket, registers a username and
//! plays one game: the board is printed after every opponent move and a
//! cell index is read from stdin whenever it is this player's turn.

pub mod session;
