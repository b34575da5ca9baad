use {
  crate::{
    conn::{Connection, ConnectionTable},
    error::Result,
    message::{EffectTarget, Message, Registry},
    outbox::Outbox,
    packet::{Channel, Frame, Packet},
    peer::{
      recv::{handle_frame, recv_one, Recv},
      send::{keepalive, resend_pending, Liveness},
      PeerState, PipelineConfig,
    },
    socket::Socket,
    Event, Protocol, Reason,
  },
  std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    time::{Duration, Instant},
  },
};

pub struct Config {
  pub protocol: Protocol,
  /// Server address as text. Empty means loopback.
  pub server_ip: String,
  pub port: u16,
  pub pipeline: PipelineConfig,
  /// Whether an unexpected disconnect starts a fresh connection
  /// attempt automatically. An intentional [`Client::disconnect`]
  /// never reconnects.
  pub reconnect_on_drop: bool,
  /// Delay between connection requests while connecting.
  pub connect_interval: Duration,
  /// How many connection requests go unanswered before giving up.
  pub max_connect_attempts: u32,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      protocol: Protocol::from("mooring"),
      server_ip: String::new(),
      port: 9000,
      pipeline: PipelineConfig::default(),
      reconnect_on_drop: true,
      connect_interval: Duration::from_millis(250),
      max_connect_attempts: 20,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
  /// No association and none wanted.
  Disconnected,
  /// Repeating connection requests, waiting for an accept.
  Connecting,
  Connected,
  /// The previous association was lost; a fresh attempt starts on the
  /// next tick.
  Reconnecting,
}

/// Connecting endpoint. Maintains a single association with a server,
/// re-establishing it after unexpected drops.
///
/// Every association gets a fresh [`Connection`] handle; a handle from
/// before a reconnect stays invalid forever.
pub struct Client<S: Socket = UdpSocket> {
  protocol: Protocol,
  pipeline: PipelineConfig,
  reconnect_on_drop: bool,
  connect_interval: Duration,
  max_connect_attempts: u32,
  socket: S,
  server_addr: SocketAddr,
  state: ClientState,
  table: ConnectionTable,
  outbox: Outbox,
  registry: Registry,
  buffer: Vec<u8>,
  /// Connection requests sent during the current attempt.
  attempts: u32,
  last_attempt: Option<Instant>,
  /// Bumped per attempt so the server can tell a reconnect from a
  /// repeated request of the association it already holds.
  nonce: u32,
}

impl Client<UdpSocket> {
  /// Bind an ephemeral socket and start connecting. The connection is
  /// not established until a later [`Client::tick`] observes the
  /// server's accept.
  pub fn connect(config: Config) -> Result<Self> {
    let ip = if config.server_ip.is_empty() {
      IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
      config.server_ip.parse().map_err(|_| {
        io::Error::new(
          io::ErrorKind::InvalidInput,
          format!("invalid server ip {:?}", config.server_ip),
        )
      })?
    };
    let server_addr = SocketAddr::new(ip, config.port);
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_nonblocking(true)?;
    log::info!("connecting to {server_addr}");
    Ok(Self::with_socket(config, socket, server_addr, Instant::now()))
  }
}

impl<S: Socket> Client<S> {
  pub(crate) fn with_socket(config: Config, socket: S, server_addr: SocketAddr, now: Instant) -> Self {
    let mut client = Self {
      protocol: config.protocol,
      pipeline: config.pipeline,
      reconnect_on_drop: config.reconnect_on_drop,
      connect_interval: config.connect_interval,
      max_connect_attempts: config.max_connect_attempts,
      socket,
      server_addr,
      state: ClientState::Disconnected,
      table: ConnectionTable::new(1),
      outbox: Outbox::new(256),
      registry: Registry::standard(),
      buffer: vec![0u8; 1 << 16],
      attempts: 0,
      last_attempt: None,
      nonce: 0,
    };
    client.begin_attempt(now);
    client
  }

  pub fn state(&self) -> ClientState {
    self.state
  }

  pub fn is_connected(&self) -> bool {
    self.state == ClientState::Connected
  }

  /// The handle for the current association, if established.
  pub fn connection(&self) -> Option<Connection> {
    if self.state != ClientState::Connected {
      return None;
    }
    self.table.iter_live().next().map(|slot| slot.conn)
  }

  /// Queue `message` for the server on the next flush.
  ///
  /// Without an established connection the message is dropped; nothing
  /// is buffered across a disconnected period.
  pub fn send(&mut self, message: &Message, channel: Channel) {
    if self.state != ClientState::Connected {
      log::trace!("not connected, dropping outgoing message");
      return;
    }
    self.outbox.put(message, channel);
  }

  /// Close the association on purpose. Suppresses any reconnect.
  pub fn disconnect(&mut self) {
    if self.state == ClientState::Disconnected {
      return;
    }
    let live = match self.table.by_addr_mut(self.server_addr) {
      Some(slot) => {
        slot.live = false;
        true
      }
      None => false,
    };
    if live {
      // best effort; the server's silence timeout covers a lost frame
      if let Err(e) = self.send_lifecycle(Frame::Disconnect) {
        log::warn!("failed to notify the server of the disconnect: {e}");
      }
    }
    self.state = ClientState::Disconnected;
    self.outbox.clear();
    log::info!("disconnected from {}", self.server_addr);
  }

  /// Run one client step: pump the socket, groom the association,
  /// progress the handshake, apply delivered messages to `effects` and
  /// flush the outbox.
  ///
  /// Returned events are in occurrence order. After a disconnect event
  /// the reported handle is invalid; if reconnecting is enabled the
  /// replacement association starts within the same tick.
  pub fn tick<T: EffectTarget>(&mut self, now: Instant, effects: &mut T) -> Result<Vec<Event>> {
    let mut events = Vec::new();

    // 1. pump socket i/o
    loop {
      match recv_one(self.protocol, &mut self.buffer, &self.socket)? {
        Recv::Stop => break,
        Recv::Frame(addr, frame) => {
          if addr != self.server_addr {
            log::trace!("dropping datagram from unexpected peer {addr}");
            continue;
          }
          self.handle(frame, &mut events, now)?;
        }
      }
    }
    if self.state == ClientState::Connected {
      let mut lost = false;
      if let Some(slot) = self.table.by_addr_mut(self.server_addr) {
        let liveness = resend_pending(self.protocol, &mut slot.peer, &mut self.buffer, &self.socket, now)?;
        if liveness == Liveness::Stale || slot.peer.is_silent(now) {
          log::info!("server stopped responding");
          slot.live = false;
          events.push(Event::Disconnect(slot.conn, Reason::Timeout));
          lost = true;
        } else {
          keepalive(self.protocol, &mut slot.peer, &mut self.buffer, &self.socket, now)?;
        }
      }
      if lost {
        self.after_drop();
      }
    }

    // 2. compact the table
    self.table.compact();

    // 3. progress the handshake
    if self.state == ClientState::Reconnecting {
      self.begin_attempt(now);
    }
    if self.state == ClientState::Connecting {
      let due = match self.last_attempt {
        None => true,
        Some(at) => now.duration_since(at) >= self.connect_interval,
      };
      if due {
        if self.attempts >= self.max_connect_attempts {
          log::warn!("gave up connecting after {} attempts", self.attempts);
          if let Some(slot) = self.table.by_addr_mut(self.server_addr) {
            slot.live = false;
            events.push(Event::Disconnect(slot.conn, Reason::Timeout));
          }
          self.state = ClientState::Disconnected;
        } else {
          self.attempts += 1;
          self.last_attempt = Some(now);
          self.send_lifecycle(Frame::Connect { nonce: self.nonce })?;
        }
      }
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

    // 5. flush queued sends
    self
      .outbox
      .flush(&mut self.table, self.protocol, &mut self.buffer, &self.socket, now);

    Ok(events)
  }

  fn handle(&mut self, frame: Frame, events: &mut Vec<Event>, now: Instant) -> Result<()> {
    match frame {
      Frame::Accept => {
        if self.state != ClientState::Connecting {
          log::trace!("ignoring accept while {:?}", self.state);
          return Ok(());
        }
        if let Some(slot) = self.table.by_addr_mut(self.server_addr) {
          slot.peer.last_recv = now;
          self.state = ClientState::Connected;
          log::info!("connected to {}", self.server_addr);
          events.push(Event::Connect(slot.conn));
        }
      }
      Frame::Disconnect => {
        let dropped = match self.table.by_addr_mut(self.server_addr) {
          Some(slot) => {
            log::info!("server closed the connection");
            slot.live = false;
            events.push(Event::Disconnect(slot.conn, Reason::Normal));
            true
          }
          None => false,
        };
        if dropped {
          self.after_drop();
        }
      }
      // a server-bound frame has no meaning here
      Frame::Connect { .. } => log::trace!("ignoring stray connect"),
      other => {
        if self.state != ClientState::Connected {
          log::trace!("dropping frame received while {:?}", self.state);
          return Ok(());
        }
        if let Some(slot) = self.table.by_addr_mut(self.server_addr) {
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
        }
      }
    }
    Ok(())
  }

  /// Issue a fresh handle and start the connection request cycle.
  fn begin_attempt(&mut self, now: Instant) {
    self.nonce = self.nonce.wrapping_add(1);
    let mut peer = PeerState::new(self.server_addr, self.pipeline, now);
    peer.nonce = self.nonce;
    if self.table.insert(peer).is_err() {
      debug_assert!(false, "stale entry left in the connection table");
      return;
    }
    self.state = ClientState::Connecting;
    self.attempts = 0;
    self.last_attempt = None;
    self.outbox.clear();
  }

  fn after_drop(&mut self) {
    if self.reconnect_on_drop {
      log::info!("connection lost, scheduling a reconnect");
      self.state = ClientState::Reconnecting;
    } else {
      self.state = ClientState::Disconnected;
    }
  }

  fn send_lifecycle(&mut self, frame: Frame) -> io::Result<()> {
    let size = Packet::new(self.protocol, frame).write_to(&mut self.buffer);
    match self.socket.send_to(&self.buffer[..size], self.server_addr) {
      Ok(_) => Ok(()),
      // connect frames repeat on their own, the rest is best effort
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
      Err(e) => Err(e),
    }
  }
}
