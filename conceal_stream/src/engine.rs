use crate::EngineError;

/// Direction an engine was initialized for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

/// Lifecycle of a [`CipherEngine`].
///
/// Moves one way, `Uninitialized -> Initialized -> Finalized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Finalized,
}

/// A block cipher bound to a key and IV, consumed by the stream adapters.
///
/// Engines may keep up to `block_size - 1` bytes buffered between `update`
/// calls (a decrypting engine may keep a whole block), and emit them on a
/// later `update` or on [`finalize`](CipherEngine::finalize).
pub trait CipherEngine {
    fn state(&self) -> EngineState;

    /// Cipher block size in bytes. At least 1.
    fn block_size(&self) -> usize;

    /// Transforms `input`, writing between 0 and
    /// `input.len() + block_size() - 1` bytes to `output`.
    ///
    /// # Panics
    /// If `output` is shorter than `input.len() + block_size() - 1`.
    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, EngineError>;

    /// Flushes buffered bytes, adding or checking padding, and moves the
    /// engine to [`EngineState::Finalized`]. Writes at most `block_size()`
    /// bytes.
    ///
    /// For decryption this is the only place a tampered or truncated
    /// ciphertext is detected.
    ///
    /// # Panics
    /// If `output` is shorter than `block_size()`.
    fn finalize(&mut self, output: &mut [u8]) -> Result<usize, EngineError>;
}

impl<E: CipherEngine + ?Sized> CipherEngine for &mut E {
    fn state(&self) -> EngineState {
        (**self).state()
    }

    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, EngineError> {
        (**self).update(input, output)
    }

    fn finalize(&mut self, output: &mut [u8]) -> Result<usize, EngineError> {
        (**self).finalize(output)
    }
}

impl<E: CipherEngine + ?Sized> CipherEngine for Box<E> {
    fn state(&self) -> EngineState {
        (**self).state()
    }

    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, EngineError> {
        (**self).update(input, output)
    }

    fn finalize(&mut self, output: &mut [u8]) -> Result<usize, EngineError> {
        (**self).finalize(output)
    }
}
