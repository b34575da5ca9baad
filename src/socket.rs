use std::{io, net::SocketAddr};

/// The datagram transport a session runs over.
///
/// Implementations must be non-blocking: both operations return
/// `WouldBlock` instead of waiting, which is what lets the per-tick
/// pump drain pending I/O and move on.
pub trait Socket {
  fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
  fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

impl Socket for std::net::UdpSocket {
  fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
    std::net::UdpSocket::send_to(self, buf, target)
  }

  fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
    std::net::UdpSocket::recv_from(self, buf)
  }
}
