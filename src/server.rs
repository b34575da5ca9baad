use {
  crate::{
    conn::{Connection, ConnectionTable},
    error::{Error, Result, SendError},
    message::{EffectTarget, Message, Registry},
    outbox::Outbox,
    packet::{Channel, Frame, Packet},
    peer::{
      recv::{handle_frame, recv_one, Recv},
      send::{keepalive, resend_pending, send_one, Liveness, SendOutcome},
      PeerState, PipelineConfig,
    },
    queue::Queue,
    socket::Socket,
    Event, Protocol, Reason,
  },
  std::{
    io,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    time::Instant,
  },
};

pub struct Config {
  pub protocol: Protocol,
  pub port: u16,
  /// Maximum number of simultaneous connections. Requests beyond this
  /// stay queued until a slot frees up.
  pub max_connections: usize,
  pub pipeline: PipelineConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      protocol: Protocol::from("mooring"),
      port: 9000,
      max_connections: 16,
      pipeline: PipelineConfig::default(),
    }
  }
}

/// Listening endpoint. Accepts connections, delivers their messages and
/// broadcasts state changes back out.
///
/// All work happens inside [`Server::tick`]; nothing runs between calls.
pub struct Server<S: Socket = UdpSocket> {
  protocol: Protocol,
  pipeline: PipelineConfig,
  socket: S,
  table: ConnectionTable,
  /// Connection requests awaiting a free slot, in arrival order,
  /// each with the nonce of the attempt that made it.
  pending: Queue<(SocketAddr, u32)>,
  outbox: Outbox,
  registry: Registry,
  buffer: Vec<u8>,
}

impl Server<UdpSocket> {
  /// Bind the listening socket. A bind failure is fatal.
  pub fn bind(config: Config) -> Result<Self> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port))?;
    socket.set_nonblocking(true)?;
    log::info!("listening on port {}", config.port);
    Ok(Self::with_socket(config, socket))
  }
}

impl<S: Socket> Server<S> {
  pub(crate) fn with_socket(config: Config, socket: S) -> Self {
    Self {
      protocol: config.protocol,
      pipeline: config.pipeline,
      socket,
      table: ConnectionTable::new(config.max_connections),
      pending: Queue::new(config.max_connections),
      outbox: Outbox::new(256),
      registry: Registry::standard(),
      buffer: vec![0u8; 1 << 16],
    }
  }

  pub fn connection_count(&self) -> usize {
    self.table.live_count()
  }

  pub fn has_connections(&self) -> bool {
    self.table.live_count() > 0
  }

  /// Queue `message` for every connection on the next flush.
  ///
  /// With no one connected the message is dropped immediately; it will
  /// not be replayed to peers that connect later.
  pub fn broadcast(&mut self, message: &Message, channel: Channel) {
    if !self.has_connections() {
      log::trace!("no connections, dropping broadcast");
      return;
    }
    self.outbox.put(message, channel);
  }

  /// Send `message` to a single connection, immediately.
  pub fn send_to(
    &mut self,
    conn: Connection,
    message: &Message,
    channel: Channel,
    now: Instant,
  ) -> Result<()> {
    let bytes = message.to_bytes();
    let slot = self.table.get_mut(conn).ok_or(SendError::ConnectionInvalid)?;
    let outcome = send_one(
      self.protocol,
      &mut slot.peer,
      channel,
      &bytes,
      &mut self.buffer,
      &self.socket,
      now,
    )?;
    match outcome {
      SendOutcome::Sent => Ok(()),
      SendOutcome::Backpressure => Err(Error::Send(SendError::Backpressure)),
    }
  }

  /// Close a connection on purpose. Invalid handles are a no-op.
  pub fn disconnect(&mut self, conn: Connection) {
    let addr = match self.table.get_mut(conn) {
      Some(slot) => {
        slot.live = false;
        slot.peer.addr
      }
      None => {
        log::trace!("disconnect on an invalid handle");
        return;
      }
    };
    log::info!("closing connection to {addr}");
    if let Err(e) = self.send_lifecycle(addr, Frame::Disconnect) {
      log::warn!("failed to notify {addr} of the disconnect: {e}");
    }
  }

  /// Notify every connection and drop them all. Safe to call more than
  /// once; later calls find nothing to do.
  pub fn shutdown(&mut self) {
    let addrs: Vec<SocketAddr> = self.table.iter_live().map(|slot| slot.peer.addr).collect();
    for addr in addrs {
      // best effort; the silence timeout covers anyone who misses it
      let _ = self.send_lifecycle(addr, Frame::Disconnect);
    }
    for slot in self.table.iter_live_mut() {
      slot.live = false;
    }
    self.table.compact();
    self.pending.drain().for_each(drop);
  }

  /// Run one server step: pump the socket, groom the connection table,
  /// accept waiting peers, apply delivered messages to `effects` and
  /// flush the outbox.
  ///
  /// Returned events are in occurrence order. A connection reported
  /// disconnected is invalid before the flush, so no outgoing traffic
  /// targets it within the same tick.
  pub fn tick<T: EffectTarget>(&mut self, now: Instant, effects: &mut T) -> Result<Vec<Event>> {
    let mut events = Vec::new();

    // 1. pump socket i/o
    loop {
      match recv_one(self.protocol, &mut self.buffer, &self.socket)? {
        Recv::Stop => break,
        Recv::Frame(addr, frame) => self.route(addr, frame, &mut events, now)?,
      }
    }
    for slot in self.table.iter_live_mut() {
      let liveness = resend_pending(self.protocol, &mut slot.peer, &mut self.buffer, &self.socket, now)?;
      if liveness == Liveness::Stale || slot.peer.is_silent(now) {
        log::info!("{} timed out", slot.peer.addr);
        slot.live = false;
        events.push(Event::Disconnect(slot.conn, Reason::Timeout));
        continue;
      }
      keepalive(self.protocol, &mut slot.peer, &mut self.buffer, &self.socket, now)?;
    }

    // 2. compact the table
    self.table.compact();

    // 3. accept waiting peers
    while !self.table.is_full() {
      let Some((addr, nonce)) = self.pending.get() else { break };
      if self.table.contains_addr(addr) {
        // connected off an earlier queue entry in the meantime
        continue;
      }
      let mut peer = PeerState::new(addr, self.pipeline, now);
      peer.nonce = nonce;
      let Ok(conn) = self.table.insert(peer) else { break };
      self.send_lifecycle(addr, Frame::Accept)?;
      log::info!("accepted a connection from {addr}");
      events.push(Event::Connect(conn));
    }

    // 4. apply delivered messages
    for event in &events {
      if let Event::Data(_, payload) = event {
        match self.registry.dispatch(payload, effects) {
          Ok(applied) => {
            if !applied {
              log::trace!("message had no matching target");
            }
          }
          Err(e) => log::warn!("dropping malformed message: {e}"),
        }
      }
    }

    // 5. flush queued broadcasts
    self
      .outbox
      .flush(&mut self.table, self.protocol, &mut self.buffer, &self.socket, now);

    Ok(events)
  }

  fn route(
    &mut self,
    addr: SocketAddr,
    frame: Frame,
    events: &mut Vec<Event>,
    now: Instant,
  ) -> Result<()> {
    match frame {
      Frame::Connect { nonce } => {
        let mut same_association = false;
        if let Some(slot) = self.table.by_addr_mut(addr) {
          if slot.peer.nonce == nonce {
            slot.peer.last_recv = now;
            same_association = true;
          } else {
            // the peer started over; its old pipeline state must not
            // swallow the fresh one's sequence numbers
            log::info!("{addr} reconnected, dropping its old association");
            slot.live = false;
            events.push(Event::Disconnect(slot.conn, Reason::Normal));
          }
        }
        if same_association {
          // our accept may have been lost, answer again
          self.send_lifecycle(addr, Frame::Accept)?;
        } else if !self.pending.contains(&(addr, nonce)) && self.pending.put((addr, nonce)).is_some()
        {
          log::trace!("connection queue is full, refusing {addr}");
        }
      }
      Frame::Disconnect => {
        if let Some(slot) = self.table.by_addr_mut(addr) {
          log::info!("{addr} disconnected");
          slot.live = false;
          events.push(Event::Disconnect(slot.conn, Reason::Normal));
        }
      }
      // a client-bound frame has no meaning here
      Frame::Accept => log::trace!("ignoring stray accept from {addr}"),
      other => {
        if let Some(slot) = self.table.by_addr_mut(addr) {
          handle_frame(
            slot.conn,
            &mut slot.peer,
            other,
            events,
            self.protocol,
            &mut self.buffer,
            &self.socket,
            now,
          )?;
        } else {
          log::trace!("dropping frame from unknown peer {addr}");
        }
      }
    }
    Ok(())
  }

  fn send_lifecycle(&mut self, addr: SocketAddr, frame: Frame) -> io::Result<()> {
    let size = Packet::new(self.protocol, frame).write_to(&mut self.buffer);
    match self.socket.send_to(&self.buffer[..size], addr) {
      Ok(_) => Ok(()),
      // the remote side retries lifecycle exchanges on its own
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
      Err(e) => Err(e),
    }
  }
}
