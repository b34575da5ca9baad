use crate::{
  codec::{self, Decode, Encode},
  Protocol,
};

impl Encode for Protocol {
  fn encode<B: bytes::BufMut>(&self, buf: &mut B) {
    self.0.encode(buf);
  }
}

impl Decode for Protocol {
  fn decode<B: bytes::Buf>(buf: &mut B) -> codec::Result<Self> {
    Ok(Protocol(u64::decode(buf)?))
  }
}

/// Delivery pipeline a data frame travels through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
  /// Exactly-once, in-order delivery backed by acknowledgements
  /// and retransmission.
  Reliable,
  /// At-most-once delivery; packets older than the newest delivered
  /// one are dropped.
  Unreliable,
}

impl Encode for Channel {
  fn encode<B: bytes::BufMut>(&self, buf: &mut B) {
    (*self as u8).encode(buf);
  }
}

impl Decode for Channel {
  fn decode<B: bytes::Buf>(buf: &mut B) -> codec::Result<Self> {
    match u8::decode(buf)? {
      0 => Ok(Channel::Reliable),
      1 => Ok(Channel::Unreliable),
      _ => Err(codec::Error::InvalidValue("channel")),
    }
  }
}

const KIND_CONNECT: u8 = 0;
const KIND_ACCEPT: u8 = 1;
const KIND_DISCONNECT: u8 = 2;
const KIND_DATA: u8 = 3;
const KIND_ACK: u8 = 4;
const KIND_PING: u8 = 5;

/// Contents of one datagram, minus the protocol id.
///
/// A frame equals one datagram payload; the transport's own datagram
/// boundary is the only length prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
  /// Connection request. Repeated by the client while connecting, with
  /// the same nonce for the whole attempt. A known address showing up
  /// with a new nonce has started over; its old association is dead.
  Connect { nonce: u32 },
  /// Connection request granted.
  Accept,
  /// Intentional close. Sent best-effort, never retransmitted.
  Disconnect,
  /// Application payload with its pipeline sequence number.
  Data {
    channel: Channel,
    sequence: u32,
    payload: Vec<u8>,
  },
  /// Cumulative acknowledgement for the reliable channel:
  /// every sequence up to and including `ack` has been delivered.
  Ack { ack: u32 },
  /// Keepalive. Sent when a connection has been quiet for a while so
  /// the remote side can tell silence from death.
  Ping,
}

impl Encode for Frame {
  fn encode<B: bytes::BufMut>(&self, buf: &mut B) {
    match self {
      Frame::Connect { nonce } => {
        KIND_CONNECT.encode(buf);
        nonce.encode(buf);
      }
      Frame::Accept => KIND_ACCEPT.encode(buf),
      Frame::Disconnect => KIND_DISCONNECT.encode(buf),
      Frame::Data { channel, sequence, payload } => {
        KIND_DATA.encode(buf);
        channel.encode(buf);
        sequence.encode(buf);
        buf.put(&payload[..]);
      }
      Frame::Ack { ack } => {
        KIND_ACK.encode(buf);
        ack.encode(buf);
      }
      Frame::Ping => KIND_PING.encode(buf),
    }
  }
}

impl Decode for Frame {
  fn decode<B: bytes::Buf>(buf: &mut B) -> codec::Result<Self> {
    match u8::decode(buf)? {
      KIND_CONNECT => Ok(Frame::Connect { nonce: u32::decode(buf)? }),
      KIND_ACCEPT => Ok(Frame::Accept),
      KIND_DISCONNECT => Ok(Frame::Disconnect),
      KIND_DATA => {
        let channel = Channel::decode(buf)?;
        let sequence = u32::decode(buf)?;
        let mut payload = vec![0u8; buf.remaining()];
        buf.copy_to_slice(&mut payload[..]);
        Ok(Frame::Data { channel, sequence, payload })
      }
      KIND_ACK => Ok(Frame::Ack { ack: u32::decode(buf)? }),
      KIND_PING => Ok(Frame::Ping),
      _ => Err(codec::Error::InvalidValue("frame kind")),
    }
  }
}

/// Serialize a data frame into `buffer` without building an owned
/// [`Frame`], returning the number of bytes written. Produces exactly
/// the bytes `Packet::encode` would for `Frame::Data`.
pub(crate) fn write_data_frame(
  protocol: Protocol,
  channel: Channel,
  sequence: u32,
  payload: &[u8],
  buffer: &mut [u8],
) -> usize {
  let mut cursor = &mut buffer[..];
  let before = cursor.len();
  protocol.encode(&mut cursor);
  KIND_DATA.encode(&mut cursor);
  channel.encode(&mut cursor);
  sequence.encode(&mut cursor);
  bytes::BufMut::put(&mut cursor, payload);
  before - cursor.len()
}

/// A full datagram: protocol id followed by one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
  pub protocol: Protocol,
  pub frame: Frame,
}

impl Packet {
  pub fn new(protocol: Protocol, frame: Frame) -> Self {
    Self { protocol, frame }
  }

  /// Serialize into `buffer`, returning the number of bytes written.
  pub fn write_to(&self, buffer: &mut [u8]) -> usize {
    let mut cursor = &mut buffer[..];
    let before = cursor.len();
    self.encode(&mut cursor);
    before - cursor.len()
  }
}

impl Encode for Packet {
  fn encode<B: bytes::BufMut>(&self, buf: &mut B) {
    self.protocol.encode(buf);
    self.frame.encode(buf);
  }
}

impl Decode for Packet {
  fn decode<B: bytes::Buf>(buf: &mut B) -> codec::Result<Self> {
    let protocol = Protocol::decode(buf)?;
    let frame = Frame::decode(buf)?;
    Ok(Self { protocol, frame })
  }
}

#[cfg(test)]
mod tests {
  use {super::*, pretty_assertions::assert_eq};

  #[test]
  fn encode_and_decode_lifecycle_frames() {
    for frame in [Frame::Accept, Frame::Disconnect, Frame::Ping] {
      let mut buf = bytes::BytesMut::new();
      frame.encode(&mut buf);
      let mut buf = buf.freeze();
      assert_eq!(buf.len(), 1);
      assert_eq!(Frame::decode(&mut buf).unwrap(), frame);
    }
  }

  #[test]
  fn encode_and_decode_connect_frame() {
    let frame = Frame::Connect { nonce: 0xC0FFEE };
    let mut buf = bytes::BytesMut::new();
    frame.encode(&mut buf);
    let mut buf = buf.freeze();
    assert_eq!(buf.len(), 1 + 4);
    assert_eq!(Frame::decode(&mut buf).unwrap(), frame);
  }

  #[rustfmt::skip]
  #[test]
  fn encode_and_decode_data_frame() {
    let frame = Frame::Data {
      channel: Channel::Reliable,
      sequence: 17,
      payload: vec![1, 2, 3, 4],
    };
    let mut buf = bytes::BytesMut::new();
    frame.encode(&mut buf);
    let mut buf = buf.freeze();
    assert_eq!(
      buf.len(),
      {
          1 // kind
        + 1 // channel
        + 4 // sequence
        + 4 // payload
      }
    );
    assert_eq!(Frame::decode(&mut buf).unwrap(), frame);
  }

  #[test]
  fn encode_and_decode_ack_frame() {
    let frame = Frame::Ack { ack: 42 };
    let mut buf = bytes::BytesMut::new();
    frame.encode(&mut buf);
    let mut buf = buf.freeze();
    assert_eq!(buf.len(), 1 + 4);
    assert_eq!(Frame::decode(&mut buf).unwrap(), frame);
  }

  #[test]
  fn encode_and_decode_packet() {
    let packet = Packet::new(Protocol(7), Frame::Ack { ack: 0 });
    let mut buf = bytes::BytesMut::new();
    packet.encode(&mut buf);
    let mut buf = buf.freeze();
    assert_eq!(buf.len(), 8 + 1 + 4);
    assert_eq!(Packet::decode(&mut buf).unwrap(), packet);
  }

  #[test]
  fn decode_unknown_kind() {
    let mut buf = &[99u8][..];
    assert_eq!(
      Frame::decode(&mut buf),
      Err(codec::Error::InvalidValue("frame kind"))
    );
  }

  #[test]
  fn decode_truncated_data_frame() {
    // data frame cut off in the middle of the sequence field
    let mut buf = &[KIND_DATA, 0, 0, 0][..];
    assert_eq!(Frame::decode(&mut buf), Err(codec::Error::UnexpectedEof));
  }

  #[test]
  fn write_data_frame_matches_packet_encoding() {
    let payload = vec![9u8, 8, 7];
    let packet = Packet::new(
      Protocol(3),
      Frame::Data {
        channel: Channel::Unreliable,
        sequence: 5,
        payload: payload.clone(),
      },
    );
    let mut expected = bytes::BytesMut::new();
    packet.encode(&mut expected);

    let mut buffer = [0u8; 64];
    let size = write_data_frame(Protocol(3), Channel::Unreliable, 5, &payload, &mut buffer);
    assert_eq!(&buffer[..size], &expected[..]);
  }

  #[test]
  fn write_to_returns_length() {
    let packet = Packet::new(Protocol(1), Frame::Connect { nonce: 9 });
    let mut buffer = [0u8; 64];
    let size = packet.write_to(&mut buffer);
    assert_eq!(size, 8 + 1 + 4);
    let mut slice = &buffer[..size];
    assert_eq!(Packet::decode(&mut slice).unwrap(), packet);
  }
}
