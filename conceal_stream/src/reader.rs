use std::io::{ErrorKind, Read, Write};

use crate::state::CipherState;
use crate::{CipherEngine, Error, CHUNK_SIZE};

/// Encrypts or decrypts a blocking byte source as it is read.
///
/// Output is identical no matter how the reads are sized. When decrypting,
/// read until `Ok(0)` (or call [`drain_and_verify`](Self::drain_and_verify))
/// before trusting anything read so far: a tampered ciphertext is only
/// detected at the end of the stream, and shows up as an
/// [`ErrorKind::InvalidData`] error rather than end of stream.
///
/// After a read fails inside the engine the reader is spent. Reading from
/// it again panics.
pub struct CipherReader<R, E> {
    source: R,
    state: CipherState<E>,
}

impl<R: Read, E: CipherEngine> CipherReader<R, E> {
    /// Wraps `source` with an already initialized `engine`.
    pub fn new(source: R, engine: E) -> Result<Self, Error> {
        Self::with_chunk_size(source, engine, CHUNK_SIZE)
    }

    /// Like [`new`](Self::new), feeding the engine `chunk_size` bytes at a time.
    ///
    /// # Panics
    /// If `chunk_size` is 0.
    pub fn with_chunk_size(source: R, engine: E, chunk_size: usize) -> Result<Self, Error> {
        let state = CipherState::new(engine, chunk_size)?;
        log::debug!(
            "cipher reader created, chunk size {chunk_size}, scratch {} bytes",
            state.scratch_capacity()
        );
        Ok(Self { source, state })
    }

    /// Reads a single byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut byte = [0];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// The stream only moves forward.
    pub fn supports_random_access(&self) -> bool {
        false
    }

    /// True once the engine has been finalized successfully.
    pub fn is_finalized(&self) -> bool {
        self.state.is_finalized()
    }

    /// Copies the rest of the stream into `sink`, returning the number of
    /// bytes copied.
    ///
    /// Success means the engine was finalized and accepted the whole stream.
    /// Bytes are written to `sink` as they come, so on failure it may hold
    /// unverified output. A failing source is reported as [`Error::IO`] and a
    /// failing sink as [`Error::Sink`].
    pub fn drain_and_verify<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64, Error> {
        let mut buf = vec![0; self.state.chunk_size()];
        let mut total = 0;

        loop {
            let n = match self.read_chunk(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(Error::IO(err)) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            sink.write_all(&buf[..n]).map_err(Error::Sink)?;
            total += n as u64;
        }

        debug_assert!(self.state.is_finalized());
        Ok(total)
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn engine(&self) -> &E {
        self.state.engine()
    }

    /// Gives back the source and engine, e.g. to destroy a finalized engine.
    pub fn into_parts(self) -> (R, E) {
        (self.source, self.state.into_engine())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if let Some(n) = self.state.read_buffered(buf) {
            return Ok(n);
        }

        // An update may swallow a partial block without output, so keep
        // pulling until something comes out or the source ends.
        loop {
            let pull_len = self.state.pull_len(buf.len());
            let pulled = self.source.read(&mut buf[..pull_len])?;

            if pulled == 0 {
                return self.state.finish(buf);
            }

            let produced = self.state.transform(buf, pulled)?;
            if produced > 0 {
                return Ok(produced);
            }
        }
    }
}

impl<R: Read, E: CipherEngine> Read for CipherReader<R, E> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.read_chunk(buf)?)
    }
}
