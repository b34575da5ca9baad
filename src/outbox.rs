use {
  crate::{
    conn::ConnectionTable,
    message::Message,
    packet::Channel,
    peer::send::{send_one, SendOutcome},
    queue::Queue,
    socket::Socket,
    Protocol,
  },
  std::time::Instant,
};

/// Application messages awaiting flush, in enqueue order.
///
/// The queue is drained fully each tick. Messages enqueued while no
/// peer is connected are dropped by the session before they get here;
/// nothing is buffered across a no-peer period.
pub(crate) struct Outbox {
  queue: Queue<(Vec<u8>, Channel)>,
}

impl Outbox {
  pub fn new(capacity: usize) -> Self {
    Self {
      queue: Queue::new(capacity),
    }
  }

  /// Encode `message` once and append it.
  pub fn put(&mut self, message: &Message, channel: Channel) {
    if self.queue.put((message.to_bytes(), channel)).is_some() {
      log::warn!("outbound queue is full, dropping message");
    }
  }

  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }

  /// Discard everything queued. Used when the association it was
  /// queued for goes away.
  pub fn clear(&mut self) {
    self.queue.drain().for_each(drop);
  }

  pub fn len(&self) -> usize {
    self.queue.remaining()
  }

  /// Send every pending message, in enqueue order, to every live
  /// connection.
  ///
  /// A backpressured or failing connection misses that message without
  /// aborting the flush for the others. A peer whose sends hard-fail is
  /// left for the silence timeout to reap.
  pub fn flush<S: Socket>(
    &mut self,
    table: &mut ConnectionTable,
    protocol: Protocol,
    buffer: &mut [u8],
    socket: &S,
    now: Instant,
  ) {
    while let Some((payload, channel)) = self.queue.get() {
      for slot in table.iter_live_mut() {
        match send_one(protocol, &mut slot.peer, channel, &payload, buffer, socket, now) {
          Ok(SendOutcome::Sent) => {}
          Ok(SendOutcome::Backpressure) => log::warn!(
            "reliable window to {} is full, message missed this connection",
            slot.peer.addr
          ),
          Err(err) => log::warn!("send to {} failed: {err}", slot.peer.addr),
        }
      }
    }
  }
}
