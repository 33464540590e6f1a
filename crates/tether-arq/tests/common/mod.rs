#![allow(dead_code)]

/// Shared test harness: an in-memory datagram link with fault injection and
/// a logger that keeps every event for later assertions.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use tether_arq::{
    decode_packet, run_receiver, run_sender, ArqConfig, Packet, PacketKind, Phase, ReceiveResult,
    ReceiverConfig, RecvOutcome, SendResult, SenderConfig, StatsSnapshot, TransferError,
    TransferEvent, TransferLog, TransferLogger, TransferStats, Transport,
};

pub const SENDER_ADDR: &str = "127.0.0.1:9001";
pub const RECEIVER_ADDR: &str = "127.0.0.1:9002";

/// Rewrites or drops (`None`) an outgoing datagram before it hits the link.
pub type Filter = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// One end of a lossless, ordered in-memory link.
pub struct ChannelTransport {
    peer: SocketAddr,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    timeout: Duration,
    filter: Mutex<Option<Filter>>,
    sent: Mutex<Vec<Vec<u8>>>,
    recv_calls: AtomicUsize,
}

impl ChannelTransport {
    /// (sender end, receiver end)
    pub fn pair(timeout: Duration) -> (Self, Self) {
        let (to_receiver, from_sender) = unbounded();
        let (to_sender, from_receiver) = unbounded();
        let sender = Self::new(RECEIVER_ADDR.parse().unwrap(), to_receiver, from_receiver, timeout);
        let receiver = Self::new(SENDER_ADDR.parse().unwrap(), to_sender, from_sender, timeout);
        (sender, receiver)
    }

    fn new(peer: SocketAddr, tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>, timeout: Duration) -> Self {
        Self {
            peer,
            tx,
            rx,
            timeout,
            filter: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            recv_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_filter(self, filter: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static) -> Self {
        *self.filter.lock().unwrap() = Some(Box::new(filter));
        self
    }

    /// Every datagram handed to `send_to`, before filtering.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_packets(&self) -> Vec<Packet> {
        self.sent()
            .iter()
            .map(|bytes| decode_packet(bytes).unwrap())
            .collect()
    }

    pub fn count_sent(&self, kind: PacketKind) -> usize {
        self.sent_packets().iter().filter(|p| p.kind() == kind).count()
    }

    pub fn recv_calls(&self) -> usize {
        self.recv_calls.load(Ordering::SeqCst)
    }

    /// Test-side send, bypassing the filter log.
    pub fn inject(&self, bytes: &[u8]) {
        self.tx.send(bytes.to_vec()).unwrap();
    }

    /// Test-side receive: the next decoded packet, or `None` on timeout.
    pub fn next_packet(&self) -> Option<Packet> {
        self.next_packet_within(self.timeout)
    }

    pub fn next_packet_within(&self, wait: Duration) -> Option<Packet> {
        match self.rx.recv_timeout(wait) {
            Ok(bytes) => Some(decode_packet(&bytes).unwrap()),
            Err(_) => None,
        }
    }
}

impl Transport for ChannelTransport {
    fn send_to(&self, buf: &[u8], _peer: SocketAddr) -> io::Result<()> {
        self.sent.lock().unwrap().push(buf.to_vec());
        let out = match self.filter.lock().unwrap().as_mut() {
            Some(filter) => filter(buf),
            None => Some(buf.to_vec()),
        };
        if let Some(bytes) = out {
            self.tx
                .send(bytes)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))?;
        }
        Ok(())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<RecvOutcome> {
        self.recv_calls.fetch_add(1, Ordering::SeqCst);
        match self.rx.recv_timeout(self.timeout) {
            Ok(bytes) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(RecvOutcome::Datagram {
                    len,
                    from: self.peer,
                })
            }
            Err(RecvTimeoutError::Timeout) => Ok(RecvOutcome::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            }
        }
    }
}

/// Drop the `n`th (1-based) datagram of `kind`.
pub fn drop_nth(kind: PacketKind, n: usize) -> impl FnMut(&[u8]) -> Option<Vec<u8>> + Send {
    let mut seen = 0;
    move |bytes| {
        if bytes.first() == Some(&kind.tag()) {
            seen += 1;
            if seen == n {
                return None;
            }
        }
        Some(bytes.to_vec())
    }
}

/// Drop every `n`th datagram of `kind`.
pub fn drop_every_nth(kind: PacketKind, n: usize) -> impl FnMut(&[u8]) -> Option<Vec<u8>> + Send {
    let mut seen = 0;
    move |bytes| {
        if bytes.first() == Some(&kind.tag()) {
            seen += 1;
            if seen % n == 0 {
                return None;
            }
        }
        Some(bytes.to_vec())
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<TransferLog>>,
}

impl RecordingLogger {
    pub fn events(&self) -> Vec<TransferEvent> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&TransferEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    /// `consecutive` of every `Timeout` event in `phase`, in order.
    pub fn timeout_streaks(&self, phase: Phase) -> Vec<u32> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Timeout {
                    phase: p,
                    consecutive,
                    ..
                } if *p == phase => Some(*consecutive),
                _ => None,
            })
            .collect()
    }

    pub fn written_seqs(&self) -> Vec<u32> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                TransferEvent::ChunkWritten { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect()
    }
}

impl TransferLogger for RecordingLogger {
    fn log(&self, entry: TransferLog) {
        self.entries.lock().unwrap().push(entry);
    }
}

pub fn arq(chunk_size: usize) -> ArqConfig {
    ArqConfig {
        chunk_size,
        recv_timeout: Duration::from_millis(50),
        max_retries: 15,
    }
}

/// Write `len` bytes of a fixed pattern to `dir/name`.
pub fn write_input(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    // prime modulus so chunk boundaries never line up with the pattern
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    fs::write(&path, data).unwrap();
    path
}

pub struct Outcome {
    pub send: Result<SendResult, TransferError>,
    pub recv: Result<ReceiveResult, TransferError>,
    pub send_stats: StatsSnapshot,
    pub recv_stats: StatsSnapshot,
    pub send_log: Arc<RecordingLogger>,
    pub recv_log: Arc<RecordingLogger>,
}

/// Run both engines to completion over the given link ends.
pub fn transfer(
    input: &Path,
    output_dir: &Path,
    config: ArqConfig,
    sender_side: &ChannelTransport,
    receiver_side: &ChannelTransport,
) -> Outcome {
    init_tracing();

    let send_log = Arc::new(RecordingLogger::default());
    let recv_log = Arc::new(RecordingLogger::default());
    let send_stats = Arc::new(TransferStats::new());
    let recv_stats = Arc::new(TransferStats::new());

    let receiver_config = ReceiverConfig {
        peer_addr: SENDER_ADDR.parse().unwrap(),
        output_dir: output_dir.to_path_buf(),
        arq: config.clone(),
        logger: Some(recv_log.clone() as Arc<dyn TransferLogger>),
    };
    let sender_config = SenderConfig {
        file_path: input.to_path_buf(),
        peer_addr: RECEIVER_ADDR.parse().unwrap(),
        arq: config,
        logger: Some(send_log.clone() as Arc<dyn TransferLogger>),
    };

    let (send, recv) = thread::scope(|s| {
        let rs = recv_stats.clone();
        let recv_handle = s.spawn(move || run_receiver(receiver_config, receiver_side, rs));
        let ss = send_stats.clone();
        let send_handle = s.spawn(move || run_sender(sender_config, sender_side, ss));
        (
            send_handle.join().expect("sender panicked"),
            recv_handle.join().expect("receiver panicked"),
        )
    });

    Outcome {
        send,
        recv,
        send_stats: send_stats.snapshot(),
        recv_stats: recv_stats.snapshot(),
        send_log,
        recv_log,
    }
}
