use heapless::Vec;

/// Assembles a byte stream into newline-terminated lines.
///
/// A trailing `\r` is stripped. Lines longer than `N` bytes are handed out in
/// `N`-byte pieces.
pub struct LineBuffer<const N: usize> {
    buf: Vec<u8, N>,
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn feed(&mut self, data: &[u8], mut on_line: impl FnMut(&[u8])) {
        for &byte in data {
            if byte == b'\n' {
                let line = match self.buf.as_slice() {
                    [rest @ .., b'\r'] => rest,
                    line => line,
                };
                on_line(line);
                self.buf.clear();
                continue;
            }
            if self.buf.push(byte).is_err() {
                on_line(&self.buf);
                self.buf.clear();
                // Cannot fail, the buffer was just emptied.
                let _ = self.buf.push(byte);
            }
        }
    }

    /// Bytes received since the last complete line.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
