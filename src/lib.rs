pub mod client;
pub mod error;
pub mod message;
pub mod mirror;
pub mod server;

mod codec;
mod conn;
mod outbox;
mod packet;
mod peer;
mod queue;
mod seq;
mod socket;

pub use client::{Client, ClientState};
pub use conn::Connection;
pub use error::{Error, Reason, SendError};
pub use message::{EffectTarget, Message, Registry, Transform};
pub use mirror::TransformMirror;
pub use packet::Channel;
pub use peer::PipelineConfig;
pub use server::Server;
pub use socket::Socket;

use std::hash::{Hash, Hasher};

/// An opaque value identifying your protocol (and its version).
///
/// Datagrams carrying a different protocol id are dropped before any
/// further processing.
///
/// `Protocol(n)` uses `n` as the wire id directly. The `From` impl
/// instead *hashes* its input, integers included, so pick one and use
/// it on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol(pub u64);

/// Derives the id by hashing with FNV-1a, which is fixed by this crate
/// rather than the standard library. `DefaultHasher` output may change
/// between compiler releases, and a client and server built with
/// different toolchains must still agree on the wire id.
impl<T: Hash> From<T> for Protocol {
  fn from(v: T) -> Self {
    let mut s = Fnv1a::new();
    v.hash(&mut s);
    Self(s.finish())
  }
}

/// 64-bit FNV-1a.
struct Fnv1a(u64);

impl Fnv1a {
  const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
  const PRIME: u64 = 0x100000001b3;

  fn new() -> Self {
    Self(Self::OFFSET_BASIS)
  }
}

impl Hasher for Fnv1a {
  fn write(&mut self, bytes: &[u8]) {
    for &byte in bytes {
      self.0 ^= byte as u64;
      self.0 = self.0.wrapping_mul(Self::PRIME);
    }
  }

  fn finish(&self) -> u64 {
    self.0
  }
}

/// An event observed by a session during one `tick`.
///
/// Events are produced by the pipeline pump and consumed exactly once.
/// Within one connection they preserve arrival-processing order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  /// The connection was established.
  Connect(Connection),
  /// The connection delivered an application payload.
  Data(Connection, Vec<u8>),
  /// The connection was closed. The handle is no longer valid.
  Disconnect(Connection, Reason),
}

#[cfg(test)]
mod tests {
  use {super::*, pretty_assertions::assert_eq};

  #[test]
  fn fnv1a_matches_the_reference_vectors() {
    let hash = |bytes: &[u8]| {
      let mut hasher = Fnv1a::new();
      hasher.write(bytes);
      hasher.finish()
    };
    assert_eq!(hash(b""), 0xcbf29ce484222325);
    assert_eq!(hash(b"a"), 0xaf63dc4c8601ec8c);
    assert_eq!(hash(b"foobar"), 0x85944171f73967e8);
  }

  #[test]
  fn protocol_ids_are_deterministic_and_distinct() {
    assert_eq!(Protocol::from("mooring"), Protocol::from("mooring"));
    assert_ne!(Protocol::from("mooring"), Protocol::from("mooring-v2"));
    // the raw constructor wraps, `From` hashes
    assert_ne!(Protocol::from(7u64), Protocol(7));
  }
}
