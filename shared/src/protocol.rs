//! Fixed-layout wire protocol spoken between server and client.
//!
//! Every packet is a one-byte discriminator followed by a payload whose
//! exact width is implied by the discriminator. The transport is a byte
//! stream with no message boundaries of its own, so readers must consume
//! exactly the discriminator, then exactly the implied payload width --
//! nothing is self-delimiting and a short read is a hard error.
//!
//! The MOVE discriminator is shared by both directions but carries
//! different payloads: a single cell index towards the server, a full
//! board snapshot towards the client. Decoders therefore take a
//! [`Direction`].
//!
//! The format is closed and versionless; an unknown discriminator is a
//! protocol violation, never a recoverable case.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::{Game, Mark, BOARD_CELLS};

/// Longest username accepted on the wire, excluding the NUL terminator.
pub const USERNAME_MAX: usize = 20;

/// Width of the HELLO username field: the name plus its NUL terminator,
/// NUL-padded to the full width.
pub const USERNAME_FIELD: usize = USERNAME_MAX + 1;

const EMPTY_CELL: u8 = b'-';

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown packet discriminator {0:#04x}")]
    UnknownKind(u8),
    #[error("payload shorter than the declared width for {0:?}")]
    Truncated(PacketKind),
    #[error("username is empty, too long, unterminated or not valid UTF-8")]
    BadUsername,
    #[error("move cell index {0} out of range")]
    InvalidCell(u8),
    #[error("invalid board cell byte {0:#04x}")]
    InvalidBoardByte(u8),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The leading discriminator of every wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Hello = 0,
    Full = 1,
    BadUsername = 2,
    BeginX = 3,
    BeginO = 4,
    Move = 5,
    Win = 6,
    Lose = 7,
    Tie = 8,
    Ping = 9,
    OpponentDisconnected = 10,
}

/// Which peer a packet is travelling towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToServer,
    ToClient,
}

impl PacketKind {
    pub fn from_wire(byte: u8) -> Result<PacketKind, ProtocolError> {
        match byte {
            0 => Ok(PacketKind::Hello),
            1 => Ok(PacketKind::Full),
            2 => Ok(PacketKind::BadUsername),
            3 => Ok(PacketKind::BeginX),
            4 => Ok(PacketKind::BeginO),
            5 => Ok(PacketKind::Move),
            6 => Ok(PacketKind::Win),
            7 => Ok(PacketKind::Lose),
            8 => Ok(PacketKind::Tie),
            9 => Ok(PacketKind::Ping),
            10 => Ok(PacketKind::OpponentDisconnected),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }

    /// Exact number of payload bytes following the discriminator.
    pub fn payload_len(self, direction: Direction) -> usize {
        match (self, direction) {
            (PacketKind::Hello, _) => USERNAME_FIELD,
            (PacketKind::Move, Direction::ToServer) => 1,
            // 9 board cells plus the turn flag
            (PacketKind::Move, Direction::ToClient) => BOARD_CELLS + 1,
            _ => 0,
        }
    }
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Client to server, once per session: the desired username.
    Hello { username: String },
    Full,
    BadUsername,
    BeginX,
    BeginO,
    /// Client to server: the cell the player claims.
    Move { cell: u8 },
    /// Server to client: the board after the opponent's move, prompting the
    /// receiver to move. Shares the MOVE discriminator.
    Board { game: Game },
    Win,
    Lose,
    Tie,
    Ping,
    OpponentDisconnected,
}

impl Packet {
    /// Builds a HELLO, validating the username against the wire field.
    pub fn hello(username: &str) -> Result<Packet, ProtocolError> {
        if username.is_empty() || username.len() > USERNAME_MAX || username.contains('\0') {
            return Err(ProtocolError::BadUsername);
        }
        Ok(Packet::Hello {
            username: username.to_string(),
        })
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Hello { .. } => PacketKind::Hello,
            Packet::Full => PacketKind::Full,
            Packet::BadUsername => PacketKind::BadUsername,
            Packet::BeginX => PacketKind::BeginX,
            Packet::BeginO => PacketKind::BeginO,
            Packet::Move { .. } | Packet::Board { .. } => PacketKind::Move,
            Packet::Win => PacketKind::Win,
            Packet::Lose => PacketKind::Lose,
            Packet::Tie => PacketKind::Tie,
            Packet::Ping => PacketKind::Ping,
            Packet::OpponentDisconnected => PacketKind::OpponentDisconnected,
        }
    }

    /// Serializes the packet: discriminator byte, then the fixed payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.kind() as u8];
        match self {
            Packet::Hello { username } => {
                let mut field = [0u8; USERNAME_FIELD];
                let name = username.as_bytes();
                let len = name.len().min(USERNAME_MAX);
                field[..len].copy_from_slice(&name[..len]);
                buf.extend_from_slice(&field);
            }
            Packet::Move { cell } => buf.push(*cell),
            Packet::Board { game } => {
                for cell in game.board() {
                    buf.push(match cell {
                        None => EMPTY_CELL,
                        Some(mark) => mark.as_char() as u8,
                    });
                }
                buf.push(game.x_next() as u8);
            }
            _ => {}
        }
        buf
    }

    /// Decodes a payload of at least the declared width for `kind`. Never
    /// reads past that width, even when the caller hands over more bytes.
    pub fn decode(
        kind: PacketKind,
        payload: &[u8],
        direction: Direction,
    ) -> Result<Packet, ProtocolError> {
        if payload.len() < kind.payload_len(direction) {
            return Err(ProtocolError::Truncated(kind));
        }

        match (kind, direction) {
            (PacketKind::Hello, _) => {
                let field = &payload[..USERNAME_FIELD];
                let end = field
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(ProtocolError::BadUsername)?;
                let username =
                    std::str::from_utf8(&field[..end]).map_err(|_| ProtocolError::BadUsername)?;
                Packet::hello(username)
            }
            (PacketKind::Move, Direction::ToServer) => {
                let cell = payload[0];
                if cell as usize >= BOARD_CELLS {
                    return Err(ProtocolError::InvalidCell(cell));
                }
                Ok(Packet::Move { cell })
            }
            (PacketKind::Move, Direction::ToClient) => {
                let mut board = [None; BOARD_CELLS];
                for (cell, &byte) in board.iter_mut().zip(&payload[..BOARD_CELLS]) {
                    *cell = match byte {
                        EMPTY_CELL => None,
                        b'X' => Some(Mark::X),
                        b'O' => Some(Mark::O),
                        other => return Err(ProtocolError::InvalidBoardByte(other)),
                    };
                }
                let x_next = payload[BOARD_CELLS] != 0;
                Ok(Packet::Board {
                    game: Game::from_parts(board, x_next),
                })
            }
            (PacketKind::Full, _) => Ok(Packet::Full),
            (PacketKind::BadUsername, _) => Ok(Packet::BadUsername),
            (PacketKind::BeginX, _) => Ok(Packet::BeginX),
            (PacketKind::BeginO, _) => Ok(Packet::BeginO),
            (PacketKind::Win, _) => Ok(Packet::Win),
            (PacketKind::Lose, _) => Ok(Packet::Lose),
            (PacketKind::Tie, _) => Ok(Packet::Tie),
            (PacketKind::Ping, _) => Ok(Packet::Ping),
            (PacketKind::OpponentDisconnected, _) => Ok(Packet::OpponentDisconnected),
        }
    }
}

/// Reads exactly one packet off a stream: the discriminator byte first,
/// then exactly the payload width it implies.
pub async fn read_packet<R>(reader: &mut R, direction: Direction) -> Result<Packet, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut kind_byte = [0u8; 1];
    reader.read_exact(&mut kind_byte).await?;
    let kind = PacketKind::from_wire(kind_byte[0])?;

    let mut payload = vec![0u8; kind.payload_len(direction)];
    reader.read_exact(&mut payload).await?;
    Packet::decode(kind, &payload, direction)
}

/// Writes one encoded packet to a stream.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&packet.encode()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_wire_layout() {
        let packet = Packet::hello("alice").unwrap();
        let bytes = packet.encode();

        assert_eq!(bytes.len(), 1 + USERNAME_FIELD);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..6], b"alice");
        // NUL terminator and NUL padding out to the full field width
        assert!(bytes[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_hello_roundtrip() {
        let packet = Packet::hello("bob").unwrap();
        let bytes = packet.encode();
        let decoded = Packet::decode(PacketKind::Hello, &bytes[1..], Direction::ToServer).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_hello_rejects_bad_usernames() {
        assert!(matches!(Packet::hello(""), Err(ProtocolError::BadUsername)));
        assert!(matches!(
            Packet::hello("this-name-is-way-too-long"),
            Err(ProtocolError::BadUsername)
        ));
        assert!(matches!(
            Packet::hello("nul\0byte"),
            Err(ProtocolError::BadUsername)
        ));
        assert!(Packet::hello("exactly-twenty-chars").is_ok());
    }

    #[test]
    fn test_hello_decode_requires_terminator() {
        let field = [b'a'; USERNAME_FIELD];
        let result = Packet::decode(PacketKind::Hello, &field, Direction::ToServer);
        assert!(matches!(result, Err(ProtocolError::BadUsername)));
    }

    #[test]
    fn test_move_to_server_layout() {
        let bytes = Packet::Move { cell: 4 }.encode();
        assert_eq!(bytes, vec![5, 4]);

        let decoded = Packet::decode(PacketKind::Move, &[4], Direction::ToServer).unwrap();
        assert_eq!(decoded, Packet::Move { cell: 4 });
    }

    #[test]
    fn test_move_cell_out_of_range() {
        let result = Packet::decode(PacketKind::Move, &[9], Direction::ToServer);
        assert!(matches!(result, Err(ProtocolError::InvalidCell(9))));
    }

    #[test]
    fn test_board_to_client_layout() {
        let mut game = Game::new();
        game.apply_move(4, Mark::X);
        game.toggle_turn();

        let bytes = Packet::Board { game: game.clone() }.encode();
        assert_eq!(bytes.len(), 1 + 9 + 1);
        assert_eq!(bytes[0], 5);
        assert_eq!(&bytes[1..10], b"----X----");
        assert_eq!(bytes[10], 0); // O to move

        let decoded = Packet::decode(PacketKind::Move, &bytes[1..], Direction::ToClient).unwrap();
        assert_eq!(decoded, Packet::Board { game });
    }

    #[test]
    fn test_board_rejects_invalid_cell_byte() {
        let mut payload = [EMPTY_CELL; 10];
        payload[3] = b'?';
        payload[9] = 1;
        let result = Packet::decode(PacketKind::Move, &payload, Direction::ToClient);
        assert!(matches!(result, Err(ProtocolError::InvalidBoardByte(b'?'))));
    }

    #[test]
    fn test_unknown_discriminator() {
        assert!(matches!(
            PacketKind::from_wire(11),
            Err(ProtocolError::UnknownKind(11))
        ));
        assert!(matches!(
            PacketKind::from_wire(0xff),
            Err(ProtocolError::UnknownKind(0xff))
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let result = Packet::decode(PacketKind::Hello, &[b'a', b'b'], Direction::ToServer);
        assert!(matches!(result, Err(ProtocolError::Truncated(PacketKind::Hello))));

        let result = Packet::decode(PacketKind::Move, &[], Direction::ToServer);
        assert!(matches!(result, Err(ProtocolError::Truncated(PacketKind::Move))));
    }

    #[test]
    fn test_payload_widths() {
        assert_eq!(PacketKind::Hello.payload_len(Direction::ToServer), 21);
        assert_eq!(PacketKind::Move.payload_len(Direction::ToServer), 1);
        assert_eq!(PacketKind::Move.payload_len(Direction::ToClient), 10);
        assert_eq!(PacketKind::Ping.payload_len(Direction::ToServer), 0);
        assert_eq!(PacketKind::Win.payload_len(Direction::ToClient), 0);
    }

    #[test]
    fn test_no_payload_packets_encode_to_single_byte() {
        for (packet, byte) in [
            (Packet::Full, 1u8),
            (Packet::BadUsername, 2),
            (Packet::BeginX, 3),
            (Packet::BeginO, 4),
            (Packet::Win, 6),
            (Packet::Lose, 7),
            (Packet::Tie, 8),
            (Packet::Ping, 9),
            (Packet::OpponentDisconnected, 10),
        ] {
            assert_eq!(packet.encode(), vec![byte]);
        }
    }

    #[test]
    fn test_decode_ignores_bytes_past_declared_width() {
        // A decoder must never read past the declared payload width.
        let mut payload = vec![3u8];
        payload.extend_from_slice(&[0xAA; 16]);
        let decoded = Packet::decode(PacketKind::Move, &payload, Direction::ToServer).unwrap();
        assert_eq!(decoded, Packet::Move { cell: 3 });
    }

    #[tokio::test]
    async fn test_read_packet_from_stream() {
        let mut stream: &[u8] = &[9, 5, 2];
        let first = read_packet(&mut stream, Direction::ToServer).await.unwrap();
        assert_eq!(first, Packet::Ping);
        let second = read_packet(&mut stream, Direction::ToServer).await.unwrap();
        assert_eq!(second, Packet::Move { cell: 2 });
    }

    #[tokio::test]
    async fn test_read_packet_partial_frame_is_an_error() {
        // Discriminator promises 21 more bytes; the stream ends early.
        let mut stream: &[u8] = &[0, b'a', b'l'];
        let result = read_packet(&mut stream, Direction::ToServer).await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }
}
