pub(crate) mod recv;
pub(crate) mod send;

use crate::seq::Buffer;
use std::{
  net::SocketAddr,
  time::{Duration, Instant},
};

/// Per-connection tuning for the delivery pipelines.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
  /// Maximum number of unacknowledged reliable packets in flight.
  /// A send beyond this bound is rejected with `Backpressure`,
  /// never dropped.
  pub window: usize,
  /// How long an unacknowledged reliable packet waits before it is
  /// retransmitted.
  pub resend_interval: Duration,
  /// How many retransmissions a reliable packet survives before the
  /// connection is considered stale.
  pub max_retries: u32,
  /// How long a connection may stay silent before it is considered
  /// stale.
  pub timeout: Duration,
  /// How long to let the connection idle before a ping goes out.
  /// Must be well under `timeout` or quiet connections look dead.
  pub keepalive_interval: Duration,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      window: 32,
      resend_interval: Duration::from_millis(100),
      max_retries: 10,
      timeout: Duration::from_secs(5),
      keepalive_interval: Duration::from_secs(1),
    }
  }
}

/// A reliable packet awaiting acknowledgement.
pub(crate) struct InFlight {
  pub payload: Vec<u8>,
  pub sent_at: Instant,
  pub retries: u32,
}

/// Pipeline state for a single peer.
///
/// Sequence numbers start at 1 on both channels; 0 means "nothing yet".
/// The reliable channel holds exactly the sequences in
/// `acked + 1 ..= local_sequence` in its retransmit buffer, so the
/// in-flight count always equals the unacknowledged span.
pub(crate) struct PeerState {
  pub addr: SocketAddr,
  pub config: PipelineConfig,
  /// Connect nonce this association was established with. A connect
  /// carrying a different nonce belongs to a new association.
  pub nonce: u32,

  // reliable, send side
  pub local_sequence: u32,
  pub acked: u32,
  pub in_flight: Buffer<InFlight>,

  // reliable, receive side
  pub delivered: u32,
  pub held: Buffer<Vec<u8>>,

  // unreliable, both sides
  pub unreliable_sequence: u32,
  pub unreliable_delivered: u32,

  pub last_recv: Instant,
  pub last_send: Instant,
}

impl PeerState {
  pub fn new(addr: SocketAddr, config: PipelineConfig, now: Instant) -> Self {
    Self {
      addr,
      config,
      nonce: 0,
      local_sequence: 0,
      acked: 0,
      in_flight: Buffer::new(config.window),
      delivered: 0,
      held: Buffer::new(config.window),
      unreliable_sequence: 0,
      unreliable_delivered: 0,
      last_recv: now,
      last_send: now,
    }
  }

  /// Whether the peer has been silent for longer than the configured
  /// timeout.
  pub fn is_silent(&self, now: Instant) -> bool {
    now.duration_since(self.last_recv) > self.config.timeout
  }
}
