//! Connection reactor: listeners, per-connection tasks and packet dispatch.
//!
//! Every accepted stream gets a reader task and a writer task. Reader tasks
//! decode one full packet at a time and forward it on a single event
//! channel; the reactor loop in [`Server::run`] drains that channel and
//! handles each event to completion under the registry lock. The channel is
//! FIFO and each reader is sequential, so a connection's packets are
//! processed strictly in arrival order with no interleaved partial reads.
//!
//! Writer tasks drain an unbounded per-connection outbound channel, which
//! lets the reactor and the sweeper queue replies without blocking while
//! they hold the lock.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use shared::protocol::{self, Direction, Packet, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};

use crate::matchmaker;
use crate::registry::{ConnId, PlayerStatus, Registry};
use crate::sweeper;

/// Events fed to the reactor loop by per-connection reader tasks.
#[derive(Debug)]
pub enum ReactorEvent {
    /// One complete, well-formed packet from a connection.
    Packet { conn: ConnId, packet: Packet },
    /// The connection hung up, failed, or sent malformed bytes.
    Hangup { conn: ConnId },
}

/// The matchmaking server: listeners, shared registry and the event loop.
pub struct Server {
    tcp: TcpListener,
    unix: Option<UnixListener>,
    registry: Arc<Mutex<Registry>>,
    ping_interval: Duration,
    event_tx: mpsc::UnboundedSender<ReactorEvent>,
    event_rx: mpsc::UnboundedReceiver<ReactorEvent>,
    next_conn: u64,
}

impl Server {
    /// Binds the TCP listener (and optionally a Unix domain socket
    /// listener). Failure to bind either transport is fatal.
    pub async fn new(
        addr: &str,
        unix_path: Option<&Path>,
        ping_interval: Duration,
        max_players: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let tcp = TcpListener::bind(addr).await?;
        info!("listening on {}", tcp.local_addr()?);

        let unix = match unix_path {
            Some(path) => {
                // A previous run may have left the socket file behind.
                let _ = std::fs::remove_file(path);
                let listener = UnixListener::bind(path)?;
                info!("listening on unix socket {}", path.display());
                Some(listener)
            }
            None => None,
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            tcp,
            unix,
            registry: Arc::new(Mutex::new(Registry::new(max_players))),
            ping_interval,
            event_tx,
            event_rx,
            next_conn: 1,
        })
    }

    /// Local address of the TCP listener, mainly for tests binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Runs the reactor loop: accept new connections, drain reader events,
    /// with the liveness sweeper ticking in the background.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        sweeper::spawn(Arc::clone(&self.registry), self.ping_interval);
        info!("server started");

        loop {
            tokio::select! {
                result = self.tcp.accept() => {
                    match result {
                        Ok((stream, peer)) => self.register(stream, peer.to_string()).await,
                        Err(e) => warn!("tcp accept failed: {}", e),
                    }
                },

                result = accept_unix(&self.unix) => {
                    match result {
                        Ok(stream) => self.register(stream, "unix".to_string()).await,
                        Err(e) => warn!("unix accept failed: {}", e),
                    }
                },

                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                },
            }
        }

        Ok(())
    }

    /// Registers an accepted stream: spawns its reader and writer tasks and
    /// reserves a registry slot, or replies FULL and closes.
    async fn register<S>(&mut self, stream: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let conn = ConnId(self.next_conn);
        self.next_conn += 1;

        let (read_half, mut write_half) = tokio::io::split(stream);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Packet>();
        tokio::spawn(async move {
            while let Some(packet) = out_rx.recv().await {
                if let Err(e) = write_half.write_all(&packet.encode()).await {
                    debug!("write to connection {} failed: {}", conn.0, e);
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        let reader = tokio::spawn(read_loop(read_half, conn, self.event_tx.clone()));

        let mut registry = self.registry.lock().await;
        match registry.create_player(conn, out_tx.clone(), reader.abort_handle()) {
            Some(slot) => {
                info!("connection {} from {} reserved slot {}", conn.0, peer, slot);
            }
            None => {
                warn!("registry full, rejecting connection from {}", peer);
                let _ = out_tx.send(Packet::Full);
                reader.abort();
            }
        }
    }

    async fn handle_event(&mut self, event: ReactorEvent) {
        let mut registry = self.registry.lock().await;
        match event {
            ReactorEvent::Packet { conn, packet } => handle_packet(&mut registry, conn, packet),
            ReactorEvent::Hangup { conn } => registry.delete_player(conn),
        }
    }
}

/// Accept on the optional Unix listener; pends forever when it is absent so
/// the select loop ignores the branch.
async fn accept_unix(listener: &Option<UnixListener>) -> io::Result<UnixStream> {
    match listener {
        Some(listener) => listener.accept().await.map(|(stream, _)| stream),
        None => std::future::pending().await,
    }
}

/// Per-connection read task: one full packet at a time, forwarded in order.
/// Ends on hangup, read failure or malformed input; whatever bytes were
/// still buffered on the socket are discarded with it.
async fn read_loop<R>(mut reader: R, conn: ConnId, events: mpsc::UnboundedSender<ReactorEvent>)
where
    R: AsyncRead + Send + Unpin,
{
    loop {
        match protocol::read_packet(&mut reader, Direction::ToServer).await {
            Ok(packet) => {
                if events.send(ReactorEvent::Packet { conn, packet }).is_err() {
                    break;
                }
            }
            Err(ProtocolError::Io(e)) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    debug!("read on connection {} failed: {}", conn.0, e);
                }
                let _ = events.send(ReactorEvent::Hangup { conn });
                break;
            }
            Err(e) => {
                warn!("malformed input on connection {}: {}", conn.0, e);
                let _ = events.send(ReactorEvent::Hangup { conn });
                break;
            }
        }
    }
}

/// Dispatches one packet under the registry lock.
fn handle_packet(registry: &mut Registry, conn: ConnId, packet: Packet) {
    let Some(slot) = registry.slot_of(conn) else {
        // The player was deleted while this packet sat in the queue.
        debug!("dropping packet from closed connection {}", conn.0);
        return;
    };
    let status = registry.player(slot).status;

    match packet {
        Packet::Hello { username } if status == PlayerStatus::Reserved => {
            matchmaker::handle_hello(registry, slot, &username);
        }
        Packet::Move { cell } if status == PlayerStatus::Playing => {
            handle_move(registry, slot, cell);
        }
        Packet::Ping => {
            registry.player_mut(slot).alive = true;
            debug!("ping answered by slot {}", slot);
        }
        other => {
            warn!(
                "protocol violation on slot {}: {:?} while {:?}",
                slot,
                other.kind(),
                status
            );
            registry.delete_player(conn);
        }
    }
}

/// Applies a MOVE from a Playing player with their assigned mark, then
/// settles the game: win and tie are checked in that order; otherwise the
/// turn flips and the updated board is relayed to the opponent only.
fn handle_move(registry: &mut Registry, slot: usize, cell: u8) {
    let player = registry.player(slot);
    let conn = player.conn;
    let (Some(mark), Some(opp), Some(game_id)) = (player.mark, player.opponent, player.game)
    else {
        warn!("slot {} is playing without a game, dropping", slot);
        registry.delete_player(conn);
        return;
    };

    let Some(game) = registry.game_mut(game_id) else {
        registry.delete_player(conn);
        return;
    };
    game.apply_move(cell, mark);
    let won = game.check_win(mark);
    let tied = !won && game.check_tie();
    if !won && !tied {
        game.toggle_turn();
    }
    let snapshot = game.clone();

    if won {
        info!(
            "'{}' wins against '{}'",
            registry.player(slot).username,
            registry.player(opp).username
        );
        registry.send_to(slot, Packet::Win);
        registry.send_to(opp, Packet::Lose);
        registry.finish_game(slot, opp);
    } else if tied {
        info!(
            "'{}' and '{}' tie",
            registry.player(slot).username,
            registry.player(opp).username
        );
        registry.send_to(slot, Packet::Tie);
        registry.send_to(opp, Packet::Tie);
        registry.finish_game(slot, opp);
    } else {
        registry.send_to(opp, Packet::Board { game: snapshot });
    }
}
