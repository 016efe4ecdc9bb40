//! Ready-made AES readers, key and IV generation.

use rand::Rng;
use std::io::Read;
use tokio::io::AsyncRead;

use crate::{
    AesCbcEngine, AsyncCipherReader, CipherEngine, CipherReader, Error, KeySize, IV_LENGTH,
};

/// True if the AES engine works on this machine.
///
/// Runs the first block of the NIST SP 800-38A CBC-AES128 vector.
pub fn is_available() -> bool {
    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    const IV: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];
    const PLAINTEXT: [u8; 16] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
        0x2a,
    ];
    const CIPHERTEXT: [u8; 16] = [
        0x76, 0x49, 0xab, 0xac, 0x81, 0x19, 0xb2, 0x46, 0xce, 0xe9, 0x8e, 0x9b, 0x12, 0xe9, 0x19,
        0x7d,
    ];

    let Ok(mut engine) = AesCbcEngine::encryptor(&KEY, &IV) else {
        return false;
    };
    let mut out = [0; 32];
    let available = matches!(engine.update(&PLAINTEXT, &mut out), Ok(16))
        && out[..16] == CIPHERTEXT
        && engine.finalize(&mut out).is_ok();

    if !available {
        log::warn!("AES engine failed its self test");
    }
    available
}

/// Encrypts everything read from `source` with AES-CBC.
pub fn encrypting_reader<R: Read>(
    source: R,
    key: &[u8],
    iv: &[u8],
) -> Result<CipherReader<R, AesCbcEngine>, Error> {
    let engine = AesCbcEngine::encryptor(key, iv).map_err(Error::EngineInit)?;
    CipherReader::new(source, engine)
}

/// Decrypts everything read from `source` with AES-CBC.
///
/// Read the returned stream to the end before trusting its output.
pub fn decrypting_reader<R: Read>(
    source: R,
    key: &[u8],
    iv: &[u8],
) -> Result<CipherReader<R, AesCbcEngine>, Error> {
    let engine = AesCbcEngine::decryptor(key, iv).map_err(Error::EngineInit)?;
    CipherReader::new(source, engine)
}

pub fn encrypting_async_reader<R: AsyncRead>(
    source: R,
    key: &[u8],
    iv: &[u8],
) -> Result<AsyncCipherReader<R, AesCbcEngine>, Error> {
    let engine = AesCbcEngine::encryptor(key, iv).map_err(Error::EngineInit)?;
    AsyncCipherReader::new(source, engine)
}

/// Read the returned stream to the end before trusting its output.
pub fn decrypting_async_reader<R: AsyncRead>(
    source: R,
    key: &[u8],
    iv: &[u8],
) -> Result<AsyncCipherReader<R, AesCbcEngine>, Error> {
    let engine = AesCbcEngine::decryptor(key, iv).map_err(Error::EngineInit)?;
    AsyncCipherReader::new(source, engine)
}

/// A fresh random IV. IVs aren't secret, but must not repeat under one key.
pub fn generate_random_iv() -> [u8; IV_LENGTH] {
    rand::random()
}

pub fn generate_random_key(size: KeySize) -> Vec<u8> {
    let mut key = vec![0; size.len()];
    rand::thread_rng().fill(&mut key[..]);
    key
}
