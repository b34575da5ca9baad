use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A transport-level failure. Bind errors are fatal to the session;
  /// they are reported before the tick loop ever runs.
  #[error("io error: {0}")]
  Io(#[from] io::Error),
  /// A send could not be performed. Recoverable.
  #[error(transparent)]
  Send(#[from] SendError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why an individual send could not be performed.
///
/// Both variants are recoverable: the caller may retry on a later tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
  /// The reliable window already holds the maximum number of
  /// unacknowledged packets. Retrying after an acknowledgement
  /// arrives will succeed.
  #[error("reliable window is full")]
  Backpressure,
  /// The connection handle has been invalidated.
  #[error("connection is no longer valid")]
  ConnectionInvalid,
}

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
  /// The connection was closed on purpose on either side, or replaced
  /// by a fresh association from the same peer.
  Normal,
  /// The remote side stopped acknowledging reliable packets, went
  /// silent for longer than the configured timeout, or never answered
  /// a connection request.
  Timeout,
}
