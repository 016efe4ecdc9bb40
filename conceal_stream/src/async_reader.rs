use pin_project::pin_project;
use std::{
    pin::Pin,
    task::{ready, Context, Poll},
};
use tokio::io::{AsyncRead, ReadBuf};

use crate::state::CipherState;
use crate::{CipherEngine, Error, CHUNK_SIZE};

/// Async counterpart of [`CipherReader`](crate::CipherReader).
///
/// Same guarantees: output doesn't depend on read sizes, and a decrypting
/// reader must be read to the end before its plaintext is trusted.
#[pin_project]
pub struct AsyncCipherReader<R, E> {
    #[pin]
    source: R,
    state: CipherState<E>,
}

impl<R: AsyncRead, E: CipherEngine> AsyncCipherReader<R, E> {
    pub fn new(source: R, engine: E) -> Result<Self, Error> {
        Self::with_chunk_size(source, engine, CHUNK_SIZE)
    }

    /// # Panics
    /// If `chunk_size` is 0.
    pub fn with_chunk_size(source: R, engine: E, chunk_size: usize) -> Result<Self, Error> {
        let state = CipherState::new(engine, chunk_size)?;
        log::debug!("async cipher reader created, chunk size {chunk_size}");
        Ok(Self { source, state })
    }

    pub fn supports_random_access(&self) -> bool {
        false
    }

    pub fn is_finalized(&self) -> bool {
        self.state.is_finalized()
    }

    pub fn into_parts(self) -> (R, E) {
        (self.source, self.state.into_engine())
    }
}

impl<R: AsyncRead, E: CipherEngine> AsyncRead for AsyncCipherReader<R, E> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let mut this = self.project();

        // Never writes more than a scratch buffer's worth per call.
        let limit = std::cmp::min(buf.remaining(), this.state.scratch_capacity());

        loop {
            let dst = buf.initialize_unfilled_to(limit);

            if let Some(n) = this.state.read_buffered(dst) {
                buf.advance(n);
                return Poll::Ready(Ok(()));
            }

            let pull_len = this.state.pull_len(dst.len());
            let mut pull_buf = ReadBuf::new(&mut dst[..pull_len]);
            ready!(this.source.as_mut().poll_read(cx, &mut pull_buf))?;
            let pulled = pull_buf.filled().len();

            let produced = if pulled == 0 {
                this.state.finish(dst)?
            } else {
                this.state.transform(dst, pulled)?
            };

            if produced > 0 || this.state.is_finalized() {
                buf.advance(produced);
                return Poll::Ready(Ok(()));
            }
        }
    }
}
