//! One client session: handshake, ping answering, move prompting.
//!
//! The session runs three tasks: a receiver draining server packets, a
//! writer draining an outbound queue, and the main loop reading stdin only
//! when a turn notification says this player may move. Gating the stdin
//! read on a channel keeps socket reads out of any select arm, so a frame
//! is never dropped halfway through.

use std::error::Error;
use std::io;
use std::path::Path;

use log::{debug, info};
use shared::protocol::{self, Direction, Packet, ProtocolError};
use shared::Game;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;

type SessionError = Box<dyn Error + Send + Sync>;

/// Connects over TCP and plays one session.
pub async fn run_tcp(username: &str, addr: &str) -> Result<(), Box<dyn Error>> {
    info!("connecting to {}", addr);
    let stream = TcpStream::connect(addr).await?;
    run_session(username, stream).await
}

/// Connects over a Unix domain socket and plays one session.
pub async fn run_unix(username: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    info!("connecting to unix socket {}", path.display());
    let stream = UnixStream::connect(path).await?;
    run_session(username, stream).await
}

/// Plays one session on an established stream: HELLO, then moves whenever
/// entitled, until the server reports a result or goes away.
pub async fn run_session<S>(username: &str, stream: S) -> Result<(), Box<dyn Error>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Packet>();
    let writer = tokio::spawn(async move {
        while let Some(packet) = out_rx.recv().await {
            if protocol::write_packet(&mut write_half, &packet).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    out_tx.send(Packet::hello(username)?).ok();

    let (turn_tx, mut turn_rx) = mpsc::unbounded_channel::<()>();
    let receiver = tokio::spawn(receive_loop(read_half, out_tx.clone(), turn_tx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // The receiver drops its end when the session is over; recv() then
    // returns None and the prompt loop ends.
    while turn_rx.recv().await.is_some() {
        loop {
            let Some(line) = lines.next_line().await? else {
                debug!("stdin closed");
                break;
            };
            match parse_cell(&line) {
                Some(cell) => {
                    out_tx.send(Packet::Move { cell }).ok();
                    break;
                }
                None => println!("enter a cell number 0-8"),
            }
        }
    }

    let result = receiver.await?;
    drop(out_tx);
    let _ = writer.await;
    result.map_err(|e| e as Box<dyn Error>)?;
    Ok(())
}

/// Drains server packets: prints state changes, answers pings, signals the
/// main loop whenever this player becomes entitled to move.
async fn receive_loop<R>(
    mut reader: R,
    out_tx: mpsc::UnboundedSender<Packet>,
    turn_tx: mpsc::UnboundedSender<()>,
) -> Result<(), SessionError>
where
    R: AsyncRead + Send + Unpin,
{
    loop {
        let packet = match protocol::read_packet(&mut reader, Direction::ToClient).await {
            Ok(packet) => packet,
            Err(ProtocolError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err("server disconnected".into());
            }
            Err(e) => return Err(e.into()),
        };

        match packet {
            Packet::Full => return Err("server full".into()),
            Packet::BadUsername => return Err("username not unique".into()),
            Packet::BeginX => {
                println!("Game begins, you move first!");
                print!("{}", render_board(&Game::new()));
                let _ = turn_tx.send(());
            }
            Packet::BeginO => println!("Game begins, wait for the move!"),
            Packet::Board { game } => {
                println!("Opponent moved, please move!");
                print!("{}", render_board(&game));
                let _ = turn_tx.send(());
            }
            Packet::Win => {
                println!("you won!");
                return Ok(());
            }
            Packet::Lose => {
                println!("you lost!");
                return Ok(());
            }
            Packet::Tie => {
                println!("you tied!");
                return Ok(());
            }
            Packet::Ping => {
                debug!("answering server ping");
                let _ = out_tx.send(Packet::Ping);
            }
            Packet::OpponentDisconnected => {
                println!("opponent disconnected");
                return Ok(());
            }
            other => {
                return Err(format!("unexpected packet from server: {:?}", other).into());
            }
        }
    }
}

/// Cell indices alongside the board, matching the prompt format:
/// `012   X-O`.
pub fn render_board(game: &Game) -> String {
    let mut out = String::new();
    for row in 0..3u8 {
        let cells: String = (0..3u8)
            .map(|col| match game.cell(row * 3 + col) {
                None => '-',
                Some(mark) => mark.as_char(),
            })
            .collect();
        out.push_str(&format!(
            "{}{}{}   {}\n",
            row * 3,
            row * 3 + 1,
            row * 3 + 2,
            cells
        ));
    }
    out
}

/// Parses a cell index 0-8 from one line of input.
pub fn parse_cell(line: &str) -> Option<u8> {
    line.trim().parse::<u8>().ok().filter(|&cell| cell < 9)
}
