use {
  crate::message::{Message, Transform},
  std::time::Duration,
};

/// Watches one named object's transform and produces update messages
/// when it changes, rate limited per one-second window.
///
/// Call [`TransformMirror::update`] every frame. A frame where the
/// transform is unchanged, or where the window's refresh budget is
/// already spent, produces nothing. A change skipped by the rate limit
/// is caught up on the next window, since the last published transform
/// still differs from the current one.
pub struct TransformMirror {
  name: String,
  max_refresh_rate: u32,
  refreshes_this_second: u32,
  window: Duration,
  previous: Option<Transform>,
}

impl TransformMirror {
  pub fn new(name: impl Into<String>) -> Self {
    Self::with_refresh_rate(name, 30)
  }

  pub fn with_refresh_rate(name: impl Into<String>, max_refresh_rate: u32) -> Self {
    Self {
      name: name.into(),
      max_refresh_rate,
      refreshes_this_second: 0,
      window: Duration::ZERO,
      previous: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Observe the current transform, `dt` after the previous
  /// observation. Returns the message to publish, if any.
  pub fn update(&mut self, dt: Duration, current: &Transform) -> Option<Message> {
    self.window += dt;
    if self.window >= Duration::from_secs(1) {
      self.window = Duration::ZERO;
      self.refreshes_this_second = 0;
    }

    if self.previous.as_ref() == Some(current) {
      return None;
    }
    if self.refreshes_this_second >= self.max_refresh_rate {
      return None;
    }

    self.refreshes_this_second += 1;
    self.previous = Some(*current);
    Some(Message::TransformUpdate {
      name: self.name.clone(),
      transform: *current,
    })
  }
}
