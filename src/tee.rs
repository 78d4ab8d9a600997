//! Read-side tee: mirror every byte to a live destination while
//! accumulating a copy for later parsing.

use std::io::{self, Write};

use tokio::io::{AsyncRead, AsyncReadExt};

/// Wraps a readable stream so that every successful read is simultaneously
/// written to a mirror destination and appended to an in-memory buffer.
///
/// The mirror is a byte-exact, real-time copy of the stream: a human
/// watching it sees the crash output immediately, whether or not parsing
/// ever happens. End-of-stream and read errors propagate unchanged.
#[derive(Debug)]
pub struct TeeReader<R, W> {
    inner: R,
    mirror: W,
    captured: Vec<u8>,
}

impl<R, W> TeeReader<R, W>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    /// Wrap `inner`, mirroring to `mirror`.
    pub fn new(inner: R, mirror: W) -> Self {
        Self {
            inner,
            mirror,
            captured: Vec::new(),
        }
    }

    /// Read from the underlying stream into `buf`.
    ///
    /// Any bytes read are mirrored and accumulated before this returns.
    /// Mirror write failures are logged and swallowed: the pipe must keep
    /// draining or the writer on the far end could block.
    ///
    /// # Errors
    ///
    /// Propagates the underlying stream's read error unchanged.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf).await?;
        if n > 0 {
            if let Err(e) = self.mirror.write_all(&buf[..n]) {
                tracing::warn!(error = %e, "mirror write failed, continuing to drain");
            }
            self.captured.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }

    /// The bytes accumulated so far.
    pub fn captured(&self) -> &[u8] {
        &self.captured
    }

    /// Consume the reader, returning the accumulation buffer.
    pub fn into_captured(self) -> Vec<u8> {
        self.captured
    }
}
