use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::TftpError;
use crate::packet::TftpPacket;
use crate::MAX_DATAGRAM_SIZE;

/// Datagram exchange with the single peer of a session.
///
/// `read` returns [`TftpError::Timeout`] when nothing arrives within the
/// given duration and [`TftpError::Malformed`] for a datagram that does not
/// decode.
pub trait Transport: Send {
    fn read(
        &mut self,
        wait: Duration,
    ) -> impl Future<Output = Result<TftpPacket, TftpError>> + Send;

    fn write(
        &mut self,
        packet: &TftpPacket,
    ) -> impl Future<Output = Result<(), TftpError>> + Send;
}

/// UDP socket connected to one peer, bound to a fresh ephemeral port
/// which serves as the server side transfer id.
pub struct UdpTransport {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpTransport {
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let bind_addr: SocketAddr = match peer {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(peer).await?;
        Ok(Self::from_socket(socket))
    }

    /// Wrap a socket that is already connected to the peer.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            buf: vec![0; MAX_DATAGRAM_SIZE],
        }
    }
}

impl Transport for UdpTransport {
    async fn read(&mut self, wait: Duration) -> Result<TftpPacket, TftpError> {
        let n = match timeout(wait, self.socket.recv(&mut self.buf)).await {
            Ok(res) => res?,
            Err(_) => return Err(TftpError::Timeout),
        };
        TftpPacket::deserialize(&self.buf[..n])
    }

    async fn write(&mut self, packet: &TftpPacket) -> Result<(), TftpError> {
        self.socket.send(&packet.serialize()).await?;
        Ok(())
    }
}
