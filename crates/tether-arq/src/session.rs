/// Plumbing shared by the sender and receiver engines: one transport, one
/// fixed peer, a receive buffer, the retry budget and the event sink.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Phase, TransferError};
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::protocol::{decode_packet, encode_packet, DecodeError, Packet, RECV_BUFFER};
use crate::stats::TransferStats;
use crate::transport::{RecvOutcome, Transport};

/// What one receive call produced.
pub(crate) enum Incoming {
    Packet(Packet),
    Malformed(DecodeError),
    /// Timeout, or a receive error treated as one.
    Silence,
}

pub(crate) struct Endpoint<T> {
    component: &'static str,
    transport: T,
    peer: SocketAddr,
    logger: Option<Arc<dyn TransferLogger>>,
    pub(crate) stats: Arc<TransferStats>,
    max_retries: u32,
    consecutive_failures: u32,
    buf: Vec<u8>,
}

impl<T: Transport> Endpoint<T> {
    pub(crate) fn new(
        component: &'static str,
        transport: T,
        peer: SocketAddr,
        logger: Option<Arc<dyn TransferLogger>>,
        stats: Arc<TransferStats>,
        max_retries: u32,
    ) -> Self {
        Self {
            component,
            transport,
            peer,
            logger,
            stats,
            max_retries,
            consecutive_failures: 0,
            buf: vec![0u8; RECV_BUFFER],
        }
    }

    pub(crate) fn emit(&self, event: TransferEvent) {
        if let Some(ref logger) = self.logger {
            logger.log(TransferLog {
                component: self.component,
                peer: self.peer,
                event,
            });
        }
    }

    /// Best-effort send. A failed send is not fatal: the missing reply shows
    /// up as a timeout and is retried within the budget.
    pub(crate) fn send(&self, bytes: &Bytes) {
        if let Err(e) = self.transport.send_to(bytes, self.peer) {
            tracing::warn!(component = self.component, peer = %self.peer, "UDP send failed: {}", e);
        }
    }

    pub(crate) fn send_packet(&self, packet: &Packet) {
        self.send(&encode_packet(packet));
    }

    pub(crate) fn recv(&mut self) -> Incoming {
        match self.transport.recv_from(&mut self.buf) {
            Ok(RecvOutcome::Datagram { len, .. }) => match decode_packet(&self.buf[..len]) {
                Ok(packet) => Incoming::Packet(packet),
                Err(e) => Incoming::Malformed(e),
            },
            Ok(RecvOutcome::Timeout) => Incoming::Silence,
            Err(e) => {
                tracing::warn!(component = self.component, peer = %self.peer, "UDP recv failed: {}", e);
                Incoming::Silence
            }
        }
    }

    /// Charge one timeout against the budget. Errors once `max_retries`
    /// consecutive timeouts have accumulated in the current phase.
    pub(crate) fn timeout(&mut self, phase: Phase, seq: u32) -> Result<(), TransferError> {
        self.consecutive_failures += 1;
        TransferStats::bump(&self.stats.timeouts);
        self.emit(TransferEvent::Timeout {
            phase,
            seq,
            consecutive: self.consecutive_failures,
        });

        if self.consecutive_failures >= self.max_retries {
            let err = TransferError::RetriesExhausted {
                phase,
                seq,
                attempts: self.consecutive_failures,
            };
            self.emit(TransferEvent::Error {
                message: err.to_string(),
            });
            return Err(err);
        }
        Ok(())
    }

    /// The peer made progress; the next phase starts with a full budget.
    pub(crate) fn reset_budget(&mut self) {
        self.consecutive_failures = 0;
    }

    pub(crate) fn discard(&self, reason: String) {
        TransferStats::bump(&self.stats.discarded);
        self.emit(TransferEvent::Discarded { reason });
    }
}
