//! Streaming encryption and decryption over blocking and async byte sources.
//!
//! A [`CipherReader`] wraps a byte source and a [`CipherEngine`] and hands out
//! the engine's output through an ordinary `read` call, no matter how the
//! caller sizes its reads. The source is fed to the engine in [`CHUNK_SIZE`]
//! pieces and any output that doesn't fit the caller's buffer is kept for the
//! next call.
//!
//! When decrypting, read the stream to the end. Padding is only checked by the
//! engine's final step, so plaintext handed out before end of stream is not
//! yet verified. [`CipherReader::drain_and_verify`] does this for you.
//!
//! ```no_run
//! use std::io::Read;
//!
//! let key = conceal_stream::crypto::generate_random_key(conceal_stream::KeySize::Aes256);
//! let iv = conceal_stream::crypto::generate_random_iv();
//! let file = std::fs::File::open("secret.bin")?;
//!
//! let mut reader = conceal_stream::crypto::decrypting_reader(file, &key, &iv)?;
//! let mut plaintext = Vec::new();
//! reader.drain_and_verify(&mut plaintext)?;
//! # Ok::<(), conceal_stream::Error>(())
//! ```

mod aes_cbc;
mod async_reader;
pub mod crypto;
mod engine;
mod error;
mod reader;
mod state;


use bytes::BytesMut;
use zeroize::Zeroize;

pub use aes_cbc::{AesCbcEngine, KeySize};
pub use async_reader::AsyncCipherReader;
pub use engine::{CipherEngine, EngineState, Mode};
pub use error::{EngineError, Error};
pub use reader::CipherReader;

/// Number of source bytes fed to the engine per `update` call.
pub const CHUNK_SIZE: usize = 1024;

/// IV length of [`AesCbcEngine`], one AES block.
pub const IV_LENGTH: usize = 16;

/// Engine output that hasn't been handed to the caller yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Remainder {
    start: usize,
    len: usize,
}

/// Fixed-size landing area for engine output.
///
/// Sized once as `chunk_size + block_size - 1`, the most a single `update`
/// on one chunk may return.
struct ScratchBuf {
    buf: BytesMut,
    remainder: Remainder,
}

impl ScratchBuf {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::zeroed(capacity),
            remainder: Remainder::default(),
        }
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn has_remainder(&self) -> bool {
        self.remainder.len > 0
    }

    /// Space for the engine to write into. Only valid once the
    /// previous output has been fully delivered.
    fn space(&mut self) -> &mut [u8] {
        debug_assert!(!self.has_remainder());
        &mut self.buf[..]
    }

    /// Copies the first `produced` bytes of fresh engine output into `dst`
    /// and keeps whatever doesn't fit as the remainder.
    fn deliver(&mut self, produced: usize, dst: &mut [u8]) -> usize {
        assert!(
            produced <= self.buf.len(),
            "engine output of {produced} bytes overflows scratch buffer of {}",
            self.buf.len()
        );

        let num_bytes = std::cmp::min(dst.len(), produced);
        dst[..num_bytes].copy_from_slice(&self.buf[..num_bytes]);
        self.remainder = Remainder {
            start: num_bytes,
            len: produced - num_bytes,
        };
        num_bytes
    }

    /// Hands out bytes left over from an earlier call.
    fn drain_remainder(&mut self, dst: &mut [u8]) -> usize {
        let Remainder { start, len } = self.remainder;
        let num_bytes = std::cmp::min(dst.len(), len);
        dst[..num_bytes].copy_from_slice(&self.buf[start..start + num_bytes]);
        self.remainder = Remainder {
            start: start + num_bytes,
            len: len - num_bytes,
        };
        num_bytes
    }
}

impl Drop for ScratchBuf {
    fn drop(&mut self) {
        self.buf[..].zeroize();
    }
}
