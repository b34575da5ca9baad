use {
  crate::{
    codec::Decode,
    conn::Connection,
    packet::{Channel, Frame, Packet},
    peer::PeerState,
    socket::Socket,
    Event, Protocol,
  },
  std::{io, net::SocketAddr, time::Instant},
};

pub(crate) enum Recv {
  /// The socket has no more datagrams this tick.
  Stop,
  Frame(SocketAddr, Frame),
}

/// Try to receive one well-formed frame.
///
/// Malformed datagrams and datagrams from a different protocol are
/// dropped here; they never reach the session.
pub(crate) fn recv_one<S: Socket>(
  protocol: Protocol,
  buffer: &mut [u8],
  socket: &S,
) -> io::Result<Recv> {
  loop {
    let (size, addr) = match socket.recv_from(buffer) {
      Ok(v) => v,
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Recv::Stop),
      Err(e) => return Err(e),
    };

    let mut slice = &buffer[..size];
    let packet = match Packet::decode(&mut slice) {
      Ok(packet) => packet,
      Err(e) => {
        log::warn!("dropping malformed datagram from {addr}: {e}");
        continue;
      }
    };

    if packet.protocol != protocol {
      log::trace!("dropping foreign-protocol datagram from {addr}");
      continue;
    }

    return Ok(Recv::Frame(addr, packet.frame));
  }
}

/// Feed a data or ack frame into the peer's pipelines, appending any
/// delivered payloads to `events`.
///
/// Reliable data is acknowledged cumulatively: every received data
/// frame (including duplicates) answers with the highest contiguously
/// delivered sequence.
pub(crate) fn handle_frame<S: Socket>(
  conn: Connection,
  peer: &mut PeerState,
  frame: Frame,
  events: &mut Vec<Event>,
  protocol: Protocol,
  buffer: &mut [u8],
  socket: &S,
  now: Instant,
) -> io::Result<()> {
  peer.last_recv = now;

  match frame {
    Frame::Data { channel: Channel::Reliable, sequence, payload } => {
      let window = peer.config.window as u32;
      if sequence <= peer.delivered {
        log::trace!("duplicate reliable packet (seq {sequence}), re-acking");
      } else if sequence == peer.delivered + 1 {
        peer.delivered = sequence;
        events.push(Event::Data(conn, payload));
        // a gap may have just closed; drain the holding buffer
        while let Some(held) = peer.held.take(peer.delivered + 1) {
          peer.delivered += 1;
          events.push(Event::Data(conn, held));
        }
      } else if sequence <= peer.delivered + window {
        // out-of-order arrival, hold it until the gap fills
        if !peer.held.contains(sequence) {
          peer.held.insert(sequence, payload);
        }
      } else {
        // a compliant sender cannot have this many unacked packets
        log::warn!("dropping reliable packet outside the window (seq {sequence})");
      }

      let ack = Packet::new(protocol, Frame::Ack { ack: peer.delivered });
      let size = ack.write_to(buffer);
      match socket.send_to(&buffer[..size], peer.addr) {
        Ok(_) => {}
        // a lost ack is recovered by the sender's retransmission
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => return Err(e),
      }
    }
    Frame::Data { channel: Channel::Unreliable, sequence, payload } => {
      if sequence > peer.unreliable_delivered {
        peer.unreliable_delivered = sequence;
        events.push(Event::Data(conn, payload));
      } else {
        log::trace!("dropping old unreliable packet (seq {sequence})");
      }
    }
    Frame::Ack { ack } => {
      let ack = ack.min(peer.local_sequence);
      while peer.acked < ack {
        peer.acked += 1;
        peer.in_flight.take(peer.acked);
      }
    }
    // nothing to do beyond refreshing `last_recv` above
    Frame::Ping => {}
    // lifecycle frames are the session's business
    Frame::Connect { .. } | Frame::Accept | Frame::Disconnect => {
      debug_assert!(false, "lifecycle frame routed into the pipeline");
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use {
    super::*,
    crate::{
      peer::send::{keepalive, resend_pending, send_one, Liveness, SendOutcome},
      peer::PipelineConfig,
      socket::sim::{SimNet, SimSocket},
    },
    pretty_assertions::assert_eq,
    std::time::Duration,
  };

  const PROTO: Protocol = Protocol(1);

  struct Endpoint {
    socket: SimSocket,
    peer: PeerState,
    conn: Connection,
    buffer: Vec<u8>,
  }

  /// Two endpoints wired to each other through a `SimNet`.
  fn pair(net: &SimNet, now: Instant) -> (Endpoint, Endpoint) {
    let (a, b) = (SimNet::addr(9000), SimNet::addr(9001));
    let make = |addr, remote, id| Endpoint {
      socket: net.socket(addr),
      peer: PeerState::new(remote, PipelineConfig::default(), now),
      conn: Connection::from_raw(id),
      buffer: vec![0u8; 1 << 16],
    };
    (make(a, b, 1), make(b, a, 2))
  }

  fn send(from: &mut Endpoint, channel: Channel, payload: &[u8], now: Instant) -> SendOutcome {
    send_one(
      PROTO,
      &mut from.peer,
      channel,
      payload,
      &mut from.buffer,
      &from.socket,
      now,
    )
    .unwrap()
  }

  /// Drain `at`'s socket into its pipeline, returning delivered payloads.
  fn pump(at: &mut Endpoint, now: Instant) -> Vec<Vec<u8>> {
    let mut events = Vec::new();
    loop {
      match recv_one(PROTO, &mut at.buffer, &at.socket).unwrap() {
        Recv::Stop => break,
        Recv::Frame(_, frame) => handle_frame(
          at.conn,
          &mut at.peer,
          frame,
          &mut events,
          PROTO,
          &mut at.buffer,
          &at.socket,
          now,
        )
        .unwrap(),
      }
    }
    events
      .into_iter()
      .map(|event| match event {
        Event::Data(_, payload) => payload,
        other => panic!("unexpected event {other:?}"),
      })
      .collect()
  }

  #[test]
  fn reliable_in_order_delivery() {
    let net = SimNet::new();
    let now = Instant::now();
    let (mut a, mut b) = pair(&net, now);

    for i in 0..5u8 {
      assert_eq!(send(&mut a, Channel::Reliable, &[i], now), SendOutcome::Sent);
    }
    let delivered = pump(&mut b, now);
    assert_eq!(delivered, vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);

    // acks flow back and clear the window
    assert_eq!(pump(&mut a, now), Vec::<Vec<u8>>::new());
    assert_eq!(a.peer.acked, 5);
    assert_eq!(a.peer.in_flight.len(), 0);
  }

  #[test]
  fn reliable_reorders_out_of_order_arrivals() {
    let net = SimNet::new();
    let now = Instant::now();
    let (mut a, mut b) = pair(&net, now);

    send(&mut a, Channel::Reliable, b"first", now);
    send(&mut a, Channel::Reliable, b"second", now);
    net.swap_next_two(b.socket.addr());

    let delivered = pump(&mut b, now);
    assert_eq!(delivered, vec![b"first".to_vec(), b"second".to_vec()]);
  }

  #[test]
  fn reliable_ignores_duplicates() {
    let net = SimNet::new();
    let now = Instant::now();
    let (mut a, mut b) = pair(&net, now);

    send(&mut a, Channel::Reliable, b"once", now);
    net.duplicate_next(b.socket.addr());

    let delivered = pump(&mut b, now);
    assert_eq!(delivered, vec![b"once".to_vec()]);
    assert_eq!(b.peer.delivered, 1);
  }

  #[test]
  fn reliable_survives_loss_via_retransmit() {
    let net = SimNet::new();
    let mut now = Instant::now();
    let (mut a, mut b) = pair(&net, now);

    send(&mut a, Channel::Reliable, b"lost", now);
    send(&mut a, Channel::Reliable, b"kept", now);
    net.drop_next(b.socket.addr());

    // only the second packet arrives; it is held, nothing delivered
    assert_eq!(pump(&mut b, now), Vec::<Vec<u8>>::new());
    assert_eq!(b.peer.delivered, 0);

    // resend interval elapses, the sender retransmits sequence 1
    now += Duration::from_millis(150);
    assert_eq!(
      resend_pending(PROTO, &mut a.peer, &mut a.buffer, &a.socket, now).unwrap(),
      Liveness::Alive
    );

    // the gap fills and both payloads deliver in order, exactly once
    let delivered = pump(&mut b, now);
    assert_eq!(delivered, vec![b"lost".to_vec(), b"kept".to_vec()]);
  }

  #[test]
  fn reliable_exactly_once_under_loss_dup_and_reorder() {
    let net = SimNet::new();
    let mut now = Instant::now();
    let (mut a, mut b) = pair(&net, now);

    let payloads: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 3]).collect();
    for payload in &payloads {
      assert_eq!(send(&mut a, Channel::Reliable, payload, now), SendOutcome::Sent);
    }

    // mangle the wire: drop the first, swap a pair, duplicate the front
    net.drop_next(b.socket.addr());
    net.swap_next_two(b.socket.addr());
    net.duplicate_next(b.socket.addr());

    let mut delivered = pump(&mut b, now);

    // retransmits recover the dropped packet
    for _ in 0..3 {
      now += Duration::from_millis(150);
      pump(&mut a, now);
      resend_pending(PROTO, &mut a.peer, &mut a.buffer, &a.socket, now).unwrap();
      delivered.extend(pump(&mut b, now));
    }

    assert_eq!(delivered, payloads);
  }

  #[test]
  fn backpressure_when_window_is_full() {
    let net = SimNet::new();
    let now = Instant::now();
    let (mut a, mut b) = pair(&net, now);

    for i in 0..32u8 {
      assert_eq!(send(&mut a, Channel::Reliable, &[i], now), SendOutcome::Sent);
    }
    // the 33rd is rejected, not dropped
    assert_eq!(
      send(&mut a, Channel::Reliable, &[33], now),
      SendOutcome::Backpressure
    );

    // one round trip acknowledges everything; sending works again
    pump(&mut b, now);
    pump(&mut a, now);
    assert_eq!(send(&mut a, Channel::Reliable, &[33], now), SendOutcome::Sent);
  }

  #[test]
  fn retry_exhaustion_reports_stale() {
    let net = SimNet::new();
    let mut now = Instant::now();
    let (mut a, b) = pair(&net, now);

    send(&mut a, Channel::Reliable, b"void", now);
    // the remote never answers; burn through the retry budget
    let mut liveness = Liveness::Alive;
    for _ in 0..=a.peer.config.max_retries {
      now += Duration::from_millis(150);
      net.drop_next(b.socket.addr());
      liveness = resend_pending(PROTO, &mut a.peer, &mut a.buffer, &a.socket, now).unwrap();
    }
    assert_eq!(liveness, Liveness::Stale);
  }

  #[test]
  fn unreliable_drops_old_packets() {
    let net = SimNet::new();
    let now = Instant::now();
    let (mut a, mut b) = pair(&net, now);

    send(&mut a, Channel::Unreliable, b"one", now);
    send(&mut a, Channel::Unreliable, b"two", now);
    net.swap_next_two(b.socket.addr());

    // "two" arrives first and wins; the older "one" is dropped
    let delivered = pump(&mut b, now);
    assert_eq!(delivered, vec![b"two".to_vec()]);
    assert_eq!(b.peer.unreliable_delivered, 2);

    // a newer packet is always delivered
    send(&mut a, Channel::Unreliable, b"three", now);
    assert_eq!(pump(&mut b, now), vec![b"three".to_vec()]);
  }

  #[test]
  fn keepalive_pings_refresh_an_idle_connection() {
    let net = SimNet::new();
    let mut now = Instant::now();
    let (mut a, mut b) = pair(&net, now);

    // idle long enough for a ping to go out
    now += Duration::from_secs(2);
    keepalive(PROTO, &mut a.peer, &mut a.buffer, &a.socket, now).unwrap();
    assert_eq!(pump(&mut b, now), Vec::<Vec<u8>>::new());
    assert!(!b.peer.is_silent(now));

    // without further pings the silence timeout eventually trips
    now += Duration::from_secs(6);
    assert!(b.peer.is_silent(now));
  }

  #[test]
  fn keepalive_stays_quiet_on_an_active_connection() {
    let net = SimNet::new();
    let now = Instant::now();
    let (mut a, b) = pair(&net, now);

    send(&mut a, Channel::Reliable, b"busy", now);
    keepalive(PROTO, &mut a.peer, &mut a.buffer, &a.socket, now).unwrap();

    // only the data frame is on the wire
    assert_eq!(net.pending(b.socket.addr()), 1);
  }

  #[test]
  fn malformed_datagrams_never_reach_the_session() {
    let net = SimNet::new();
    let now = Instant::now();
    let (a, mut b) = pair(&net, now);

    // junk, truncated header, foreign protocol
    a.socket.send_to(&[0xFF; 3], b.socket.addr()).unwrap();
    a.socket.send_to(&[], b.socket.addr()).unwrap();
    let foreign = Packet::new(Protocol(999), Frame::Connect { nonce: 0 });
    let mut buffer = [0u8; 64];
    let size = foreign.write_to(&mut buffer);
    a.socket.send_to(&buffer[..size], b.socket.addr()).unwrap();

    assert_eq!(pump(&mut b, now), Vec::<Vec<u8>>::new());
  }
}
