use crate::peer::PeerState;
use std::net::SocketAddr;

/// Opaque handle identifying one peer association.
///
/// A handle is either live or invalid. Operations on an invalid handle
/// are no-ops; once invalidated, a handle is never reused. Reconnecting
/// issues a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
  id: u64,
}

impl Connection {
  pub(crate) fn from_raw(id: u64) -> Self {
    Self { id }
  }
}

pub(crate) struct Slot {
  pub conn: Connection,
  pub peer: PeerState,
  pub live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TableFull;

/// Bounded collection of connections.
///
/// Removal is deferred: a disconnected entry is invalidated in place
/// and physically removed by the next `compact` pass, so the table is
/// never mutated while the tick is iterating it. Compaction removes by
/// swap-with-last, which is O(1) but does not preserve order; indices
/// are not stable across a `compact` call.
pub(crate) struct ConnectionTable {
  slots: Vec<Slot>,
  capacity: usize,
  next_id: u64,
}

impl ConnectionTable {
  pub fn new(capacity: usize) -> Self {
    Self {
      slots: Vec::with_capacity(capacity),
      capacity,
      next_id: 1,
    }
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn is_full(&self) -> bool {
    self.slots.len() >= self.capacity
  }

  /// Number of live entries.
  pub fn live_count(&self) -> usize {
    self.slots.iter().filter(|slot| slot.live).count()
  }

  /// Add a connection for `peer`, issuing a fresh handle.
  pub fn insert(&mut self, peer: PeerState) -> Result<Connection, TableFull> {
    if self.is_full() {
      return Err(TableFull);
    }
    let conn = Connection::from_raw(self.next_id);
    self.next_id += 1;
    self.slots.push(Slot { conn, peer, live: true });
    Ok(conn)
  }

  /// Look up a live entry by handle.
  pub fn get_mut(&mut self, conn: Connection) -> Option<&mut Slot> {
    self.slots.iter_mut().find(|slot| slot.live && slot.conn == conn)
  }

  /// Look up a live entry by peer address.
  pub fn by_addr_mut(&mut self, addr: SocketAddr) -> Option<&mut Slot> {
    self
      .slots
      .iter_mut()
      .find(|slot| slot.live && slot.peer.addr == addr)
  }

  pub fn contains_addr(&self, addr: SocketAddr) -> bool {
    self
      .slots
      .iter()
      .any(|slot| slot.live && slot.peer.addr == addr)
  }

  /// Mark a connection invalid. Returns whether the handle was live.
  pub fn invalidate(&mut self, conn: Connection) -> bool {
    match self.get_mut(conn) {
      Some(slot) => {
        slot.live = false;
        true
      }
      None => false,
    }
  }

  /// Remove every invalidated entry. Call once per tick, after event
  /// processing and before accepting new connections.
  pub fn compact(&mut self) {
    let mut index = 0;
    while index < self.slots.len() {
      if self.slots[index].live {
        index += 1;
      } else {
        self.slots.swap_remove(index);
      }
    }
  }

  pub fn iter_live(&self) -> impl Iterator<Item = &Slot> {
    self.slots.iter().filter(|slot| slot.live)
  }

  pub fn iter_live_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
    self.slots.iter_mut().filter(|slot| slot.live)
  }
}
