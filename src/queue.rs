/// FIFO queue backed by a ring buffer
#[derive(Debug, Clone)]
pub struct Queue<T> {
  buffer: Vec<Option<T>>,
  head: usize,
  tail: usize,
}

impl<T> Queue<T> {
  pub fn new(capacity: usize) -> Self {
    let mut buffer = Vec::new();
    buffer.resize_with(capacity, Default::default);
    Self {
      buffer,
      head: 0,
      tail: 0,
    }
  }

  pub fn remaining(&self) -> usize {
    use std::cmp::Ordering::*;
    let (tail, head) = (self.tail, self.head);
    match head.cmp(&tail) {
      Greater => head - tail,
      Equal => {
        if self.buffer[self.tail].is_some() {
          self.buffer.len()
        } else {
          0
        }
      }
      Less => self.buffer.len() - tail + head,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.remaining() == 0
  }

  /// Returns `Some(T)` if the queue is full
  pub fn put(&mut self, item: T) -> Option<T> {
    if self.buffer[self.head].is_none() {
      self.buffer[self.head] = Some(item);
      self.head = (self.head + 1) % self.buffer.len();
      None
    } else {
      Some(item)
    }
  }

  pub fn get(&mut self) -> Option<T> {
    let item = self.buffer[self.tail].take();
    if item.is_some() {
      self.tail = (self.tail + 1) % self.buffer.len();
    }
    item
  }

  pub fn iter(&self) -> Iter<'_, T> {
    Iter {
      queue: self,
      index: self.tail,
    }
  }

  pub fn contains(&self, item: &T) -> bool
  where
    T: PartialEq,
  {
    self.iter().any(|v| v == item)
  }

  pub fn drain(&mut self) -> Drain<'_, T> {
    Drain(self)
  }
}

pub struct Iter<'a, T> {
  queue: &'a Queue<T>,
  index: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
  type Item = &'a T;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(item) = self.queue.buffer[self.index].as_ref() {
      self.index = (self.index + 1) % self.queue.buffer.len();
      Some(item)
    } else {
      None
    }
  }
}

pub struct Drain<'a, T>(&'a mut Queue<T>);

impl<'a, T> Iterator for Drain<'a, T> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    self.0.get()
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.0.remaining(), Some(self.0.remaining()))
  }
}
