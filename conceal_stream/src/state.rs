use crate::{CipherEngine, EngineError, EngineState, Error, ScratchBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Streaming,
    /// `finalize` ran. Only the remainder is left to hand out.
    Finalized,
    /// The engine reported an error.
    Failed,
}

/// Source-agnostic half of the cipher readers.
///
/// The caller pulls source bytes straight into its own output buffer,
/// then hands them to [`transform`](Self::transform), which runs them
/// through the engine and writes the output back over them.
pub(crate) struct CipherState<E> {
    engine: E,
    scratch: ScratchBuf,
    chunk_size: usize,
    stage: Stage,
}

impl<E: CipherEngine> CipherState<E> {
    pub(crate) fn new(engine: E, chunk_size: usize) -> Result<Self, Error> {
        assert!(chunk_size > 0, "chunk size must be at least 1 byte");

        if engine.state() != EngineState::Initialized {
            return Err(Error::EngineInit(EngineError::NotInitialized));
        }

        let block_size = engine.block_size();
        assert!(block_size > 0, "cipher block size must be at least 1 byte");

        Ok(Self {
            engine,
            scratch: ScratchBuf::with_capacity(chunk_size + block_size - 1),
            chunk_size,
            stage: Stage::Streaming,
        })
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub(crate) fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.stage == Stage::Finalized
    }

    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    pub(crate) fn into_engine(self) -> E {
        self.engine
    }

    /// Answers a read without touching the source, if possible:
    /// leftover output first, then end of stream.
    ///
    /// # Panics
    /// If an earlier read failed inside the engine.
    pub(crate) fn read_buffered(&mut self, buf: &mut [u8]) -> Option<usize> {
        assert!(
            self.stage != Stage::Failed,
            "cipher stream read again after an engine failure"
        );

        if buf.is_empty() {
            Some(0)
        } else if self.scratch.has_remainder() {
            Some(self.scratch.drain_remainder(buf))
        } else if self.stage == Stage::Finalized {
            Some(0)
        } else {
            None
        }
    }

    /// How many source bytes to pull for a read of `capacity` bytes.
    pub(crate) fn pull_len(&self, capacity: usize) -> usize {
        std::cmp::min(capacity, self.chunk_size)
    }

    /// Runs the `pulled` source bytes at the start of `buf` through the
    /// engine, overwriting `buf` with as much output as fits.
    pub(crate) fn transform(&mut self, buf: &mut [u8], pulled: usize) -> Result<usize, Error> {
        debug_assert!(pulled > 0 && pulled <= self.chunk_size);

        let result = self.engine.update(&buf[..pulled], self.scratch.space());
        let produced = self.check(result)?;
        log::trace!("cipher update: {pulled} bytes in, {produced} bytes out");

        Ok(self.scratch.deliver(produced, buf))
    }

    /// Finalizes the engine once the source is exhausted.
    pub(crate) fn finish(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let result = self.engine.finalize(self.scratch.space());
        let produced = self.check(result)?;
        self.stage = Stage::Finalized;
        log::debug!("cipher finalized with {produced} trailing bytes");

        Ok(self.scratch.deliver(produced, buf))
    }

    fn check(&mut self, result: Result<usize, EngineError>) -> Result<usize, Error> {
        result.map_err(|err| {
            log::warn!("cipher engine failed: {err}");
            self.stage = Stage::Failed;
            Error::EngineTransform(err)
        })
    }
}
