//! Bidirectional relay engine
//!
//! Both sides of the tunnel relay a pair the same way:
//!
//! - the **origin** is the connection that was accepted, the **leg** is the
//!   connection opened for it
//! - **forward** copies origin -> leg, **reverse** copies leg -> origin
//! - each copy task runs until its source ends (EOF or error), then
//!   half-closes its destination so the peer sees end-of-stream
//!
//! The one asymmetry is the close rule: when the reverse direction finishes,
//! the encrypted stream of the pair is closed and the forward task is told so.
//!
//! - encrypted origin (remote side): forward stops reading it as if it had
//!   reached end-of-stream
//! - encrypted leg (local side): forward closes the leg and keeps reading the
//!   plaintext client until the client's own end-of-stream, discarding what
//!   arrives. The client is never cut off.

use log::{debug, error, info, warn};
use metrics::{counter, histogram};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::timeout;

use super::counter::SessionGuard;

/// Default per-direction buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Upper bound for the final close of an endpoint
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Copy direction within a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Origin to leg
    Forward,
    /// Leg back to origin
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Reverse => write!(f, "reverse"),
        }
    }
}

/// One member of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The accepted connection
    Origin,
    /// The connection opened for it
    Leg,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Origin => write!(f, "origin"),
            Self::Leg => write!(f, "leg"),
        }
    }
}

/// Outcome of one copy direction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transfer {
    /// Bytes written to the destination
    pub bytes: u64,
    /// Read or write error that ended the copy, if any
    pub error: Option<io::ErrorKind>,
    /// The copy was stopped by the close rule rather than by its source
    pub closed: bool,
}

/// Summary of one relayed pair
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Session the pair belonged to
    pub session_id: u64,
    /// Origin -> leg
    pub forward: Transfer,
    /// Leg -> origin
    pub reverse: Transfer,
    /// Direction that completed first
    pub first_finished: Option<Direction>,
    /// Time from accept to teardown
    pub elapsed: Duration,
}

struct Copied<R, W> {
    transfer: Transfer,
    reader: ReadHalf<R>,
    writer: WriteHalf<W>,
}

enum Finished<O, L> {
    Forward(Copied<O, L>),
    Reverse(Copied<L, O>),
}

/// Relay engine configured for one side of the tunnel
#[derive(Debug, Clone, Copy)]
pub struct Relay {
    encrypted: Endpoint,
    buffer_size: usize,
}

impl Relay {
    /// Create a relay whose encrypted stream is `encrypted`
    ///
    /// The local side passes [`Endpoint::Leg`] (it opens the TLS stream), the
    /// remote side passes [`Endpoint::Origin`] (it accepts the TLS stream).
    pub fn new(encrypted: Endpoint) -> Self {
        Self {
            encrypted,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the per-direction buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Relay a pair until both directions are done
    ///
    /// Both endpoints are closed when this returns. Errors end only the
    /// direction they occur in and are reported in the returned stats.
    pub async fn run<O, L>(&self, session: &SessionGuard, origin: O, leg: L) -> RelayStats
    where
        O: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        L: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = session.id();
        let buffer_size = self.buffer_size;
        let (origin_reader, origin_writer) = split(origin);
        let (leg_reader, leg_writer) = split(leg);

        let (close_tx, close_rx) = oneshot::channel::<()>();
        let forward_close = CloseSignal {
            rx: close_rx,
            source_encrypted: self.encrypted == Endpoint::Origin,
        };
        let mut close_tx = Some(close_tx);

        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            Finished::Forward(
                copy(id, Direction::Forward, origin_reader, leg_writer, buffer_size, Some(forward_close))
                    .await,
            )
        });
        tasks.spawn(async move {
            Finished::Reverse(
                copy(id, Direction::Reverse, leg_reader, origin_writer, buffer_size, None).await,
            )
        });

        let mut forward: Option<Copied<O, L>> = None;
        let mut reverse: Option<Copied<L, O>> = None;
        let mut first_finished = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Finished::Forward(copied)) => {
                    first_finished.get_or_insert(Direction::Forward);
                    forward = Some(copied);
                }
                Ok(Finished::Reverse(copied)) => {
                    first_finished.get_or_insert(Direction::Reverse);
                    reverse = Some(copied);
                    if let Some(tx) = close_tx.take() {
                        if forward.is_none() {
                            debug!("[#{}] reverse done, closing encrypted {}", id, self.encrypted);
                        }
                        // The receiver is gone if forward already finished
                        let _ = tx.send(());
                    }
                }
                Err(e) => error!("[#{}] relay task failed: {}", id, e),
            }
        }

        let mut stats = RelayStats {
            session_id: id,
            forward: Transfer::default(),
            reverse: Transfer::default(),
            first_finished,
            elapsed: session.elapsed(),
        };

        match (forward, reverse) {
            (Some(forward), Some(reverse)) => {
                stats.forward = forward.transfer;
                stats.reverse = reverse.transfer;

                let mut origin = forward.reader.unsplit(reverse.writer);
                let mut leg = reverse.reader.unsplit(forward.writer);
                close_quietly(id, Endpoint::Origin, &mut origin).await;
                close_quietly(id, Endpoint::Leg, &mut leg).await;
            }
            // A task panicked; whatever halves are left close on drop
            (forward, reverse) => {
                if let Some(forward) = forward {
                    stats.forward = forward.transfer;
                }
                if let Some(reverse) = reverse {
                    stats.reverse = reverse.transfer;
                }
            }
        }

        let service = session.service();
        info!(
            "[#{}] {} session done: written {} bytes, read {} bytes, elapsed {:?}, active {}",
            id,
            service,
            stats.forward.bytes,
            stats.reverse.bytes,
            stats.elapsed,
            session.active()
        );
        counter!("tunnel.relay.bytes", "service" => service, "direction" => "forward").increment(stats.forward.bytes);
        counter!("tunnel.relay.bytes", "service" => service, "direction" => "reverse").increment(stats.reverse.bytes);
        histogram!("tunnel.relay.duration_ms", "service" => service).record(stats.elapsed.as_millis() as f64);

        stats
    }
}

/// Close-rule notice for the forward task
struct CloseSignal {
    rx: oneshot::Receiver<()>,
    /// The encrypted stream is this copy's source rather than its destination
    source_encrypted: bool,
}

enum Step {
    Read(io::Result<usize>),
    Closed,
}

/// Copy one direction until the source ends, then half-close the destination
async fn copy<R, W>(
    id: u64,
    direction: Direction,
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    buffer_size: usize,
    mut close: Option<CloseSignal>,
) -> Copied<R, W>
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut buf = vec![0u8; buffer_size];
    let mut transfer = Transfer::default();
    let mut draining = false;
    let mut discarded = 0u64;

    loop {
        let step = match close.as_mut() {
            Some(signal) => tokio::select! {
                _ = &mut signal.rx => Step::Closed,
                read = reader.read(&mut buf) => Step::Read(read),
            },
            None => Step::Read(reader.read(&mut buf).await),
        };

        let read = match step {
            Step::Read(read) => read,
            Step::Closed => {
                transfer.closed = true;
                if close.take().is_some_and(|signal| signal.source_encrypted) {
                    break;
                }
                // The destination is the encrypted stream: close it, then
                // drain the plaintext source until it ends on its own.
                if let Err(e) = writer.shutdown().await {
                    debug!("[#{}] {} close: {}", id, direction, e);
                }
                draining = true;
                continue;
            }
        };

        match read {
            Ok(0) => break,
            Ok(n) if draining => discarded += n as u64,
            Ok(n) => {
                if let Err(e) = writer.write_all(&buf[..n]).await {
                    warn!("[#{}] {} write error after {} bytes: {}", id, direction, transfer.bytes, e);
                    transfer.error = Some(e.kind());
                    break;
                }
                transfer.bytes += n as u64;
            }
            Err(e) => {
                warn!("[#{}] {} read error after {} bytes: {}", id, direction, transfer.bytes, e);
                transfer.error = Some(e.kind());
                break;
            }
        }
    }

    // Half-close only: the destination stays readable for the other direction
    if !draining {
        if let Err(e) = writer.shutdown().await {
            debug!("[#{}] {} half-close: {}", id, direction, e);
        }
    }
    if discarded > 0 {
        debug!("[#{}] {} discarded {} bytes after close", id, direction, discarded);
    }
    debug!("[#{}] {} copied {} bytes", id, direction, transfer.bytes);

    Copied { transfer, reader, writer }
}

/// Close an endpoint, tolerating one that is already closed
pub(crate) async fn close_quietly<S>(id: u64, endpoint: Endpoint, stream: &mut S)
where
    S: AsyncWrite + Unpin,
{
    match timeout(CLOSE_GRACE, stream.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("[#{}] close {}: {}", id, endpoint, e),
        Err(_) => debug!("[#{}] close {}: peer did not acknowledge in {:?}", id, endpoint, CLOSE_GRACE),
    }
}
