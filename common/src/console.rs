use embedded_io_async::{ErrorType, Write};

/// Console channel that may have failed to open.
///
/// A detached console accepts and discards every write, so the rest of the
/// program does not need to care whether the UART came up.
pub struct Console<W> {
    inner: Option<W>,
}

impl<W> Console<W> {
    pub fn attached(writer: W) -> Self {
        Self {
            inner: Some(writer),
        }
    }

    pub fn detached() -> Self {
        Self { inner: None }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_some()
    }
}

impl<W: ErrorType> ErrorType for Console<W> {
    type Error = W::Error;
}

impl<W: Write> Write for Console<W> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self.inner.as_mut() {
            Some(writer) => writer.write(buf).await,
            None => Ok(buf.len()),
        }
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        match self.inner.as_mut() {
            Some(writer) => writer.flush().await,
            None => Ok(()),
        }
    }
}
