/// Datagram transport consumed by the engines.
///
/// The receive timeout is fixed when the transport is created and applies to
/// every `recv_from` for the rest of the session.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// OS socket buffer size. A stop-and-wait peer never has more than one
/// datagram queued, but a roomy buffer absorbs duplicates after retransmits.
const SOCKET_BUFFER: usize = 256 * 1024;

/// Result of one receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    Datagram { len: usize, from: SocketAddr },
    Timeout,
}

pub trait Transport {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<()>;

    /// Block until a datagram arrives or the session timeout elapses.
    /// Datagrams longer than `buf` are truncated.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<RecvOutcome>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<()> {
        (**self).send_to(buf, peer)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<RecvOutcome> {
        (**self).recv_from(buf)
    }
}

/// UDP socket transport.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a blocking UDP socket with the session receive timeout.
    pub fn bind(local: SocketAddr, recv_timeout: Duration) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(false)?;
        socket.set_recv_buffer_size(SOCKET_BUFFER)?;
        socket.set_send_buffer_size(SOCKET_BUFFER)?;
        socket.set_read_timeout(Some(recv_timeout))?;
        socket.bind(&local.into())?;

        Ok(Self {
            socket: socket.into(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<()> {
        let sent = self.socket.send_to(buf, peer)?;
        if sent != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short UDP send: {} of {} bytes", sent, buf.len()),
            ));
        }
        Ok(())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<RecvOutcome> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => Ok(RecvOutcome::Datagram { len, from }),
            // Windows returns TimedOut, Unix returns WouldBlock
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(RecvOutcome::Timeout)
            }
            Err(e) => Err(e),
        }
    }
}
