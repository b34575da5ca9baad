struct Entry<T> {
  sequence: u32,
  item: T,
}

/// Fixed-size buffer indexed by packet sequence number.
///
/// Each sequence maps to the slot at `sequence % buffer.size`. A slot
/// only answers for the exact sequence stored in it, so stale entries
/// from an earlier wrap are never returned. The reliable window never
/// holds more than `size` consecutive sequences in flight, which makes
/// slot collisions between live entries impossible.
pub struct Buffer<T> {
  inner: Vec<Option<Entry<T>>>,
  occupied: usize,
}

impl<T> Buffer<T> {
  pub fn new(size: usize) -> Self {
    assert!(size > 0);
    let mut inner = Vec::new();
    inner.resize_with(size, || None);
    Self { inner, occupied: 0 }
  }

  #[inline]
  fn index(&self, sequence: u32) -> usize {
    sequence as usize % self.inner.len()
  }

  /// Get the entry for `sequence`, if one is stored.
  #[inline]
  pub fn get(&self, sequence: u32) -> Option<&T> {
    match &self.inner[self.index(sequence)] {
      Some(entry) if entry.sequence == sequence => Some(&entry.item),
      _ => None,
    }
  }

  /// Get the entry for `sequence` mutably, if one is stored.
  #[inline]
  pub fn get_mut(&mut self, sequence: u32) -> Option<&mut T> {
    let index = self.index(sequence);
    match &mut self.inner[index] {
      Some(entry) if entry.sequence == sequence => Some(&mut entry.item),
      _ => None,
    }
  }

  #[inline]
  pub fn contains(&self, sequence: u32) -> bool {
    self.get(sequence).is_some()
  }

  /// Store `item` under `sequence`, returning whatever previously
  /// occupied the slot.
  pub fn insert(&mut self, sequence: u32, item: T) -> Option<T> {
    let index = self.index(sequence);
    let evicted = self.inner[index].take().map(|e| e.item);
    if evicted.is_none() {
      self.occupied += 1;
    }
    self.inner[index] = Some(Entry { sequence, item });
    evicted
  }

  /// Remove and return the entry for `sequence`, if one is stored.
  pub fn take(&mut self, sequence: u32) -> Option<T> {
    let index = self.index(sequence);
    match &self.inner[index] {
      Some(entry) if entry.sequence == sequence => {
        self.occupied -= 1;
        self.inner[index].take().map(|e| e.item)
      }
      _ => None,
    }
  }

  /// Number of stored entries.
  #[inline]
  pub fn len(&self) -> usize {
    self.occupied
  }

  #[inline]
  pub fn is_full(&self) -> bool {
    self.occupied == self.inner.len()
  }
}
