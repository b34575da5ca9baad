use {
  crate::{
    packet::{self, Channel, Frame, Packet},
    peer::{InFlight, PeerState},
    socket::Socket,
    Protocol,
  },
  std::{io, time::Instant},
};

/// Result of an attempted send on a peer's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
  Sent,
  /// The reliable window is full. The payload was not taken; the
  /// caller may retry after an acknowledgement arrives.
  Backpressure,
}

/// Whether the peer's reliable channel is still making progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
  Alive,
  Stale,
}

/// Serialize `payload` into a data frame and transmit it on `channel`.
///
/// Reliable payloads enter the retransmit buffer and survive a
/// `WouldBlock` on the initial transmission (the resend pump picks them
/// up). Unreliable payloads are fire-and-forget either way.
pub(crate) fn send_one<S: Socket>(
  protocol: Protocol,
  peer: &mut PeerState,
  channel: Channel,
  payload: &[u8],
  buffer: &mut [u8],
  socket: &S,
  now: Instant,
) -> io::Result<SendOutcome> {
  peer.last_send = now;
  match channel {
    Channel::Unreliable => {
      peer.unreliable_sequence += 1;
      let size = packet::write_data_frame(
        protocol,
        channel,
        peer.unreliable_sequence,
        payload,
        buffer,
      );
      match socket.send_to(&buffer[..size], peer.addr) {
        Ok(_) => Ok(SendOutcome::Sent),
        // at-most-once: a send the socket cannot take right now is lost
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(SendOutcome::Sent),
        Err(e) => Err(e),
      }
    }
    Channel::Reliable => {
      if peer.in_flight.len() >= peer.config.window {
        return Ok(SendOutcome::Backpressure);
      }

      peer.local_sequence += 1;
      let sequence = peer.local_sequence;
      let size = packet::write_data_frame(protocol, channel, sequence, payload, buffer);

      match socket.send_to(&buffer[..size], peer.addr) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => return Err(e),
      }

      peer.in_flight.insert(
        sequence,
        InFlight {
          payload: payload.to_vec(),
          sent_at: now,
          retries: 0,
        },
      );

      Ok(SendOutcome::Sent)
    }
  }
}

/// Retransmit unacknowledged reliable packets that have outlived the
/// resend interval.
///
/// Returns `Stale` once any packet has exhausted its retry budget,
/// which the session turns into a timeout disconnect.
pub(crate) fn resend_pending<S: Socket>(
  protocol: Protocol,
  peer: &mut PeerState,
  buffer: &mut [u8],
  socket: &S,
  now: Instant,
) -> io::Result<Liveness> {
  for sequence in peer.acked + 1..=peer.local_sequence {
    let Some(entry) = peer.in_flight.get_mut(sequence) else {
      continue;
    };
    if now.duration_since(entry.sent_at) < peer.config.resend_interval {
      continue;
    }
    if entry.retries >= peer.config.max_retries {
      log::warn!(
        "reliable packet (seq {sequence}, {} bytes) exhausted its retries",
        entry.payload.len()
      );
      return Ok(Liveness::Stale);
    }

    entry.retries += 1;
    entry.sent_at = now;
    peer.last_send = now;
    let size = packet::write_data_frame(
      protocol,
      Channel::Reliable,
      sequence,
      &entry.payload,
      buffer,
    );
    match socket.send_to(&buffer[..size], peer.addr) {
      Ok(_) => {}
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        // socket is saturated, the rest can wait for the next tick
        return Ok(Liveness::Alive);
      }
      Err(e) => return Err(e),
    }
  }

  Ok(Liveness::Alive)
}

/// Send a ping if the connection has been quiet long enough.
///
/// Without this an idle connection would trip the remote side's silence
/// timeout even though both ends are healthy.
pub(crate) fn keepalive<S: Socket>(
  protocol: Protocol,
  peer: &mut PeerState,
  buffer: &mut [u8],
  socket: &S,
  now: Instant,
) -> io::Result<()> {
  if now.duration_since(peer.last_send) < peer.config.keepalive_interval {
    return Ok(());
  }
  peer.last_send = now;
  let size = Packet::new(protocol, Frame::Ping).write_to(buffer);
  match socket.send_to(&buffer[..size], peer.addr) {
    Ok(_) => Ok(()),
    // a lost ping just delays the next one
    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
    Err(e) => Err(e),
  }
}
