//! Receive buffer for the player's output stream.

/// Capacity used by the transport unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fixed-capacity byte buffer assembling newline-terminated lines.
///
/// Invariant: `cursor <= filled <= capacity`. Consumed bytes are compacted to
/// the front after every pass, so between calls the cursor is zero and the
/// buffer holds only an incomplete line. A buffer that fills up without a
/// terminator is flushed as one line.
#[derive(Debug)]
pub struct ReceiveBuffer {
  data: Box<[u8]>,
  filled: usize,
  cursor: usize,
}

impl Default for ReceiveBuffer {
  fn default() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }
}

impl ReceiveBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      data: vec![0; capacity.max(1)].into_boxed_slice(),
      filled: 0,
      cursor: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.data.len()
  }

  /// Bytes of the pending, unterminated line.
  pub fn len(&self) -> usize {
    self.filled
  }

  pub fn is_empty(&self) -> bool {
    self.filled == 0
  }

  /// Free space after the pending bytes, for reading into.
  pub fn spare_mut(&mut self) -> &mut [u8] {
    &mut self.data[self.filled..]
  }

  /// Account for `n` bytes written into [`spare_mut`](Self::spare_mut) and
  /// return the lines they completed, terminators stripped.
  pub fn commit(&mut self, n: usize) -> Vec<Vec<u8>> {
    self.filled = (self.filled + n).min(self.capacity());
    self.drain_lines()
  }

  /// Copy `bytes` in, chunk by chunk, returning every completed line.
  pub fn extend(&mut self, mut bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while !bytes.is_empty() {
      let spare = self.spare_mut();
      let n = spare.len().min(bytes.len());
      spare[..n].copy_from_slice(&bytes[..n]);
      bytes = &bytes[n..];
      lines.extend(self.commit(n));
    }
    lines
  }

  fn drain_lines(&mut self) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(offset) = self.data[self.cursor..self.filled]
      .iter()
      .position(|&b| b == b'\n')
    {
      let end = self.cursor + offset;
      lines.push(self.data[self.cursor..end].to_vec());
      self.cursor = end + 1;
    }

    if self.cursor > 0 {
      self.data.copy_within(self.cursor..self.filled, 0);
      self.filled -= self.cursor;
      self.cursor = 0;
    }

    // full without a terminator: flush everything, the rest of the line is lost
    if self.filled == self.capacity() {
      log::debug!("Receive buffer overflow, flushing {} bytes", self.filled);
      lines.push(self.data.to_vec());
      self.filled = 0;
    }
    lines
  }
}
