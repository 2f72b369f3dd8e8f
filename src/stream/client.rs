//! TCP stream client for one tracker feed
//!
//! `open` connects and spawns a reader thread; the thread polls the
//! non-blocking socket, frames lines and overwrites the mailbox slot.
//! `close` stops the thread with a bounded wait so a hung read can never
//! block shutdown.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::{ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::error::{DepthwallError, StreamError};
use crate::stream::framing::{LineFramer, RawFrame};
use crate::stream::mailbox::{mailbox, MailboxReceiver, MailboxSender};
use crate::tracking::Modality;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Failed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Failed,
            _ => Self::Disconnected,
        }
    }
}

/// Counters for the current connection (reset by `open`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Complete frames produced by the framer
    pub frames_received: u64,
    /// Frames overwritten in the mailbox before the tick loop took them
    pub frames_superseded: u64,
}

/// State shared between the client and one reader thread.
///
/// Every `open` starts a fresh session, so a reader detached by a timed-out
/// `close` can only ever write to its own, already abandoned, state.
#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    state: AtomicU8,
    frames_received: AtomicU64,
    frames_superseded: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

struct ReaderHandle {
    thread: thread::JoinHandle<()>,
    /// Disconnects when the reader thread exits
    done_rx: Receiver<()>,
    /// Clone of the reader's socket, used to unblock and release it on close
    stream: TcpStream,
}

pub struct StreamClient {
    modality: Modality,
    host: String,
    port: u16,
    config: StreamConfig,
    shared: Arc<Shared>,
    inbox: Option<MailboxReceiver<RawFrame>>,
    reader: Option<ReaderHandle>,
}

impl StreamClient {
    /// Create a client (does not connect yet)
    pub fn new(modality: Modality, host: &str, port: u16, config: &StreamConfig) -> Self {
        Self {
            modality,
            host: host.to_string(),
            port,
            config: config.clone(),
            shared: Arc::new(Shared::default()),
            inbox: None,
            reader: None,
        }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Whether the reader thread is alive and reading
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            frames_received: self.shared.frames_received.load(Ordering::Acquire),
            frames_superseded: self.shared.frames_superseded.load(Ordering::Acquire),
        }
    }

    /// Connect and start the reader thread. No-op while already running.
    pub fn open(&mut self) -> Result<(), DepthwallError> {
        if self.is_running() {
            return Ok(());
        }
        // A reader that died on a stream error still holds its socket
        self.close();

        self.shared = Arc::new(Shared::default());
        self.shared.set_state(ConnectionState::Connecting);

        let stream = match self.connect() {
            Ok(s) => s,
            Err(e) => {
                self.shared.set_state(ConnectionState::Failed);
                return Err(e.into());
            }
        };

        let reader_stream = stream.try_clone().map_err(|e| {
            self.shared.set_state(ConnectionState::Failed);
            self.connect_error(format!("failed to clone socket: {}", e))
        })?;

        let (outbox, inbox) = mailbox();
        let (done_tx, done_rx) = bounded::<()>(0);

        let reader = Reader {
            modality: self.modality,
            stream: reader_stream,
            outbox,
            shared: Arc::clone(&self.shared),
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            read_buffer_bytes: self.config.read_buffer_bytes,
            max_frame_bytes: self.config.max_frame_bytes,
            _done: done_tx,
        };

        self.shared.running.store(true, Ordering::Release);
        self.shared.set_state(ConnectionState::Connected);

        let thread = thread::Builder::new()
            .name(format!("{}-reader", self.modality))
            .spawn(move || reader.run())
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                self.shared.set_state(ConnectionState::Failed);
                StreamError::Spawn(e.to_string())
            })?;

        self.inbox = Some(inbox);
        self.reader = Some(ReaderHandle {
            thread,
            done_rx,
            stream,
        });

        tracing::info!("[{}] connected to {}", self.modality, self.addr());
        Ok(())
    }

    fn connect(&self) -> Result<TcpStream, StreamError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.connect_error(format!("address resolution failed: {}", e)))?
            .collect();

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_nonblocking(true)
                        .map_err(|e| self.connect_error(format!("failed to set non-blocking: {}", e)))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(self.connect_error(match last_err {
            Some(e) => e.to_string(),
            None => "no addresses resolved".to_string(),
        }))
    }

    fn connect_error(&self, message: String) -> StreamError {
        StreamError::Connect {
            modality: self.modality,
            addr: self.addr(),
            message,
        }
    }

    /// Stop the reader and release the socket. Idempotent.
    pub fn close(&mut self) {
        self.shared.running.store(false, Ordering::Release);

        if let Some(reader) = self.reader.take() {
            let _ = reader.stream.shutdown(Shutdown::Both);

            let timeout = Duration::from_millis(self.config.close_timeout_ms);
            match reader.done_rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        "[{}] reader did not stop within {:?}, detaching",
                        self.modality,
                        timeout
                    );
                }
                _ => {
                    let _ = reader.thread.join();
                }
            }

            let stats = self.stats();
            tracing::debug!(
                "[{}] closed ({} frames, {} superseded)",
                self.modality,
                stats.frames_received,
                stats.frames_superseded
            );
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Take the newest framed message if one arrived since the last call
    pub fn take_latest(&self) -> Option<RawFrame> {
        self.inbox.as_ref().and_then(MailboxReceiver::take)
    }

    pub fn has_new_data(&self) -> bool {
        self.inbox.as_ref().is_some_and(MailboxReceiver::has_new)
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything the reader thread owns
struct Reader {
    modality: Modality,
    stream: TcpStream,
    outbox: MailboxSender<RawFrame>,
    shared: Arc<Shared>,
    poll_interval: Duration,
    read_buffer_bytes: usize,
    max_frame_bytes: usize,
    /// Dropped on exit to wake `close`
    _done: Sender<()>,
}

impl Reader {
    fn run(mut self) {
        let mut buf = vec![0u8; self.read_buffer_bytes];
        let mut framer = LineFramer::new(self.max_frame_bytes);

        tracing::debug!("[{}] reader thread started", self.modality);

        let mut failure = None;
        while self.shared.running.load(Ordering::Acquire) {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    failure = Some(StreamError::Closed {
                        modality: self.modality,
                    });
                    break;
                }
                Ok(n) => ingest(self.modality, &mut framer, &buf[..n], &self.outbox, &self.shared),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(self.poll_interval),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    failure = Some(StreamError::Read {
                        modality: self.modality,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        // Only report failures that were not caused by close()
        let was_running = self.shared.running.load(Ordering::Acquire);
        match failure {
            Some(e) if was_running => {
                tracing::warn!("{}", e);
                self.shared.set_state(ConnectionState::Failed);
            }
            _ => tracing::debug!(
                "[{}] reader thread stopped ({} unframed bytes)",
                self.modality,
                framer.pending()
            ),
        }
        self.shared.running.store(false, Ordering::Release);

        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Frame `bytes` and publish every completed line; only the last one survives in the slot.
fn ingest(
    modality: Modality,
    framer: &mut LineFramer,
    bytes: &[u8],
    outbox: &MailboxSender<RawFrame>,
    shared: &Shared,
) {
    let dropped = framer.extend(bytes);
    if dropped > 0 {
        tracing::warn!(
            "[{}] dropped {} bytes of a line over the frame limit{}",
            modality,
            dropped,
            if framer.is_discarding() {
                ", skipping to next newline"
            } else {
                ""
            }
        );
    }

    while let Some(frame) = framer.next_frame() {
        if outbox.publish(frame) {
            shared.frames_superseded.fetch_add(1, Ordering::AcqRel);
        }
        shared.frames_received.fetch_add(1, Ordering::AcqRel);
    }
}
