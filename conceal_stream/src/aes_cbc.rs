use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use zeroize::Zeroize;

use crate::{CipherEngine, EngineError, EngineState, Mode, IV_LENGTH};

const BLOCK_SIZE: usize = 16;

/// Supported AES key lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl KeySize {
    /// Key length in bytes.
    pub fn len(self) -> usize {
        match self {
            KeySize::Aes128 => 16,
            KeySize::Aes192 => 24,
            KeySize::Aes256 => 32,
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(KeySize::Aes128),
            24 => Some(KeySize::Aes192),
            32 => Some(KeySize::Aes256),
            _ => None,
        }
    }
}

/// The one reason given for any rejected final block.
const BAD_FINAL: &str = "malformed ciphertext or padding";

enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(key: &[u8]) -> Result<Self, EngineError> {
        let invalid = |_| EngineError::InvalidKeyLength(key.len());
        match KeySize::from_len(key.len()) {
            Some(KeySize::Aes128) => Aes128::new_from_slice(key)
                .map(Self::Aes128)
                .map_err(invalid),
            Some(KeySize::Aes192) => Aes192::new_from_slice(key)
                .map(Self::Aes192)
                .map_err(invalid),
            Some(KeySize::Aes256) => Aes256::new_from_slice(key)
                .map(Self::Aes256)
                .map_err(invalid),
            None => Err(EngineError::InvalidKeyLength(key.len())),
        }
    }

    fn encrypt(&self, block: &mut [u8; BLOCK_SIZE]) {
        let block = Block::from_mut_slice(block);
        match self {
            Self::Aes128(cipher) => cipher.encrypt_block(block),
            Self::Aes192(cipher) => cipher.encrypt_block(block),
            Self::Aes256(cipher) => cipher.encrypt_block(block),
        }
    }

    fn decrypt(&self, block: &mut [u8; BLOCK_SIZE]) {
        let block = Block::from_mut_slice(block);
        match self {
            Self::Aes128(cipher) => cipher.decrypt_block(block),
            Self::Aes192(cipher) => cipher.decrypt_block(block),
            Self::Aes256(cipher) => cipher.decrypt_block(block),
        }
    }
}

/// CBC chaining state plus at most one buffered block.
struct CbcContext {
    cipher: BlockCipher,
    mode: Mode,
    chain: [u8; BLOCK_SIZE],
    pending: [u8; BLOCK_SIZE],
    pending_len: usize,
}

impl CbcContext {
    /// Runs the full `pending` block through the cipher into `out`.
    fn process_pending(&mut self, out: &mut [u8]) {
        debug_assert_eq!(self.pending_len, BLOCK_SIZE);

        match self.mode {
            Mode::Encrypt => {
                xor_in_place(&mut self.pending, &self.chain);
                self.cipher.encrypt(&mut self.pending);
                self.chain = self.pending;
            }
            Mode::Decrypt => {
                let ciphertext = self.pending;
                self.cipher.decrypt(&mut self.pending);
                xor_in_place(&mut self.pending, &self.chain);
                self.chain = ciphertext;
            }
        }

        out[..BLOCK_SIZE].copy_from_slice(&self.pending);
        self.pending.zeroize();
        self.pending_len = 0;
    }

    fn update(&mut self, mut input: &[u8], output: &mut [u8]) -> usize {
        let mut written = 0;

        while !input.is_empty() {
            // A full block is only held back while decrypting, where it
            // might be the padded last one.
            if self.pending_len == BLOCK_SIZE {
                self.process_pending(&mut output[written..]);
                written += BLOCK_SIZE;
            }

            let take = std::cmp::min(BLOCK_SIZE - self.pending_len, input.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&input[..take]);
            self.pending_len += take;
            input = &input[take..];

            if self.pending_len == BLOCK_SIZE && self.mode == Mode::Encrypt {
                self.process_pending(&mut output[written..]);
                written += BLOCK_SIZE;
            }
        }

        written
    }

    fn finalize(&mut self, output: &mut [u8]) -> Result<usize, EngineError> {
        match self.mode {
            Mode::Encrypt => {
                // PKCS#7: always at least one byte of padding.
                let pad = BLOCK_SIZE - self.pending_len;
                self.pending[self.pending_len..].fill(pad as u8);
                self.pending_len = BLOCK_SIZE;
                self.process_pending(output);
                Ok(BLOCK_SIZE)
            }
            Mode::Decrypt => {
                if self.pending_len != BLOCK_SIZE {
                    return Err(EngineError::BadFinal(BAD_FINAL));
                }

                let mut block = [0; BLOCK_SIZE];
                self.process_pending(&mut block);

                // Every byte is inspected whatever the padding looks like.
                let pad_byte = block[BLOCK_SIZE - 1];
                let pad = pad_byte as usize;
                let mut mismatch = u8::from(pad == 0) | u8::from(pad > BLOCK_SIZE);
                for (i, &byte) in block.iter().enumerate() {
                    let in_padding = u8::from(i + pad >= BLOCK_SIZE);
                    mismatch |= in_padding & u8::from(byte != pad_byte);
                }

                if mismatch != 0 {
                    block.zeroize();
                    return Err(EngineError::BadFinal(BAD_FINAL));
                }

                let len = BLOCK_SIZE - pad;
                output[..len].copy_from_slice(&block[..len]);
                block.zeroize();
                Ok(len)
            }
        }
    }
}

impl Drop for CbcContext {
    fn drop(&mut self) {
        self.chain.zeroize();
        self.pending.zeroize();
    }
}

fn xor_in_place(block: &mut [u8; BLOCK_SIZE], other: &[u8; BLOCK_SIZE]) {
    for (a, b) in block.iter_mut().zip(other) {
        *a ^= b;
    }
}

/// AES in CBC mode with PKCS#7 padding.
///
/// The key length picks AES-128, AES-192 or AES-256. The key schedule and
/// chaining state are wiped on [`destroy`](AesCbcEngine::destroy) and on drop.
pub struct AesCbcEngine {
    state: EngineState,
    context: Option<CbcContext>,
}

impl Default for AesCbcEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AesCbcEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            context: None,
        }
    }

    /// Shorthand for [`new`](Self::new) followed by [`init_encrypt`](Self::init_encrypt).
    pub fn encryptor(key: &[u8], iv: &[u8]) -> Result<Self, EngineError> {
        let mut engine = Self::new();
        engine.init_encrypt(key, iv)?;
        Ok(engine)
    }

    /// Shorthand for [`new`](Self::new) followed by [`init_decrypt`](Self::init_decrypt).
    pub fn decryptor(key: &[u8], iv: &[u8]) -> Result<Self, EngineError> {
        let mut engine = Self::new();
        engine.init_decrypt(key, iv)?;
        Ok(engine)
    }

    pub fn init_encrypt(&mut self, key: &[u8], iv: &[u8]) -> Result<(), EngineError> {
        self.init(key, iv, Mode::Encrypt)
    }

    pub fn init_decrypt(&mut self, key: &[u8], iv: &[u8]) -> Result<(), EngineError> {
        self.init(key, iv, Mode::Decrypt)
    }

    /// `None` until initialized.
    pub fn mode(&self) -> Option<Mode> {
        self.context.as_ref().map(|context| context.mode)
    }

    /// Wipes the key and returns the engine to [`EngineState::Uninitialized`].
    ///
    /// Only allowed once the engine has been finalized.
    pub fn destroy(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Finalized {
            return Err(EngineError::NotFinalized);
        }
        self.context = None;
        self.state = EngineState::Uninitialized;
        Ok(())
    }

    fn init(&mut self, key: &[u8], iv: &[u8], mode: Mode) -> Result<(), EngineError> {
        if self.state != EngineState::Uninitialized {
            return Err(EngineError::AlreadyInitialized);
        }

        let chain: [u8; IV_LENGTH] = iv.try_into().map_err(|_| EngineError::InvalidIvLength {
            expected: IV_LENGTH,
            actual: iv.len(),
        })?;
        let cipher = BlockCipher::new(key)?;

        self.context = Some(CbcContext {
            cipher,
            mode,
            chain,
            pending: [0; BLOCK_SIZE],
            pending_len: 0,
        });
        self.state = EngineState::Initialized;

        log::debug!("AES-{} CBC engine initialized to {mode:?}", key.len() * 8);
        Ok(())
    }

    fn initialized_context(&mut self) -> Result<&mut CbcContext, EngineError> {
        match (self.state, self.context.as_mut()) {
            (EngineState::Initialized, Some(context)) => Ok(context),
            _ => Err(EngineError::NotInitialized),
        }
    }
}

impl CipherEngine for AesCbcEngine {
    fn state(&self) -> EngineState {
        self.state
    }

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn update(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, EngineError> {
        let context = self.initialized_context()?;
        assert!(
            output.len() >= input.len() + BLOCK_SIZE - 1,
            "update output buffer of {} bytes is too small for {} input bytes",
            output.len(),
            input.len()
        );
        Ok(context.update(input, output))
    }

    fn finalize(&mut self, output: &mut [u8]) -> Result<usize, EngineError> {
        let context = self.initialized_context()?;
        assert!(
            output.len() >= BLOCK_SIZE,
            "finalize output buffer of {} bytes is smaller than a block",
            output.len()
        );
        let result = context.finalize(output);
        self.state = EngineState::Finalized;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A, F.2.1 CBC-AES128.Encrypt
    const KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
    const IV: &str = "000102030405060708090a0b0c0d0e0f";
    const PLAINTEXT: &str = "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51";
    const CIPHERTEXT: &str = "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2";

    fn encrypt_all(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let mut engine = AesCbcEngine::encryptor(key, iv).unwrap();
        let mut out = vec![0; plaintext.len() + 2 * BLOCK_SIZE];
        let mut len = engine.update(plaintext, &mut out).unwrap();
        len += engine.finalize(&mut out[len..]).unwrap();
        out.truncate(len);
        out
    }

    fn decrypt_all(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EngineError> {
        let mut engine = AesCbcEngine::decryptor(key, iv).unwrap();
        let mut out = vec![0; ciphertext.len() + 2 * BLOCK_SIZE];
        let mut len = engine.update(ciphertext, &mut out)?;
        len += engine.finalize(&mut out[len..])?;
        out.truncate(len);
        Ok(out)
    }

    #[test]
    fn matches_nist_vector() {
        let key = hex::decode(KEY).unwrap();
        let iv = hex::decode(IV).unwrap();
        let plaintext = hex::decode(PLAINTEXT).unwrap();

        let ciphertext = encrypt_all(&key, &iv, &plaintext);
        assert_eq!(ciphertext.len(), 48);
        assert_eq!(hex::encode(&ciphertext[..32]), CIPHERTEXT);
        assert_eq!(decrypt_all(&key, &iv, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn decrypt_holds_back_last_block() {
        let key = hex::decode(KEY).unwrap();
        let iv = hex::decode(IV).unwrap();
        let ciphertext = hex::decode(CIPHERTEXT).unwrap();

        let mut engine = AesCbcEngine::decryptor(&key, &iv).unwrap();
        let mut out = [0; 64];
        let len = engine.update(&ciphertext, &mut out).unwrap();
        assert_eq!(len, BLOCK_SIZE);
        assert_eq!(hex::encode(&out[..len]), &PLAINTEXT[..32]);
    }

    #[test]
    fn all_key_sizes_round_trip() {
        let iv = [7; IV_LENGTH];
        for size in [KeySize::Aes128, KeySize::Aes192, KeySize::Aes256] {
            let key = vec![0x42; size.len()];
            for len in [0, 1, 15, 16, 17, 100] {
                let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let ciphertext = encrypt_all(&key, &iv, &plaintext);
                assert_eq!(ciphertext.len(), (len / BLOCK_SIZE + 1) * BLOCK_SIZE);
                assert_eq!(decrypt_all(&key, &iv, &ciphertext).unwrap(), plaintext);
            }
        }
    }

    #[test]
    fn empty_input_is_one_padding_block() {
        let ciphertext = encrypt_all(&[1; 16], &[2; 16], &[]);
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert!(decrypt_all(&[1; 16], &[2; 16], &ciphertext)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rejects_bad_padding() {
        let mut ciphertext = encrypt_all(&[1; 16], &[2; 16], b"attack at dawn, bring snacks");
        // Flipping the previous block's last byte flips the pad byte.
        let idx = ciphertext.len() - BLOCK_SIZE - 1;
        ciphertext[idx] ^= 0xff;
        assert_eq!(
            decrypt_all(&[1; 16], &[2; 16], &ciphertext),
            Err(EngineError::BadFinal(BAD_FINAL))
        );
    }

    #[test]
    fn rejects_truncated_ciphertext() {
        let mut ciphertext = encrypt_all(&[1; 16], &[2; 16], b"some text");
        ciphertext.pop();
        assert_eq!(
            decrypt_all(&[1; 16], &[2; 16], &ciphertext),
            Err(EngineError::BadFinal(BAD_FINAL))
        );
        assert_eq!(
            decrypt_all(&[1; 16], &[2; 16], &[]),
            Err(EngineError::BadFinal(BAD_FINAL))
        );
    }

    #[test]
    fn every_rejected_final_block_looks_the_same() {
        let key = [5; 16];
        let iv = [6; 16];
        let ciphertext = encrypt_all(&key, &iv, b"sixteen byte msg");
        let idx = ciphertext.len() - BLOCK_SIZE - 1;

        // The full padding block decrypts to sixteen 0x10 bytes. XORing the
        // previous block's last byte turns the pad byte into 0x00, 0x11, 0xff
        // or a short pad that disagrees with the bytes before it.
        let mut errors = Vec::new();
        for flip in [0x10, 0x01, 0xef, 0x12] {
            let mut tampered = ciphertext.clone();
            tampered[idx] ^= flip;
            errors.push(decrypt_all(&key, &iv, &tampered).unwrap_err());
        }

        assert!(errors
            .iter()
            .all(|err| *err == EngineError::BadFinal(BAD_FINAL)));
    }

    #[test]
    fn enforces_lifecycle() {
        let mut out = [0; 64];
        let mut engine = AesCbcEngine::new();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.update(b"abc", &mut out), Err(EngineError::NotInitialized));
        assert_eq!(engine.destroy(), Err(EngineError::NotFinalized));

        engine.init_encrypt(&[0; 16], &[0; 16]).unwrap();
        assert_eq!(engine.mode(), Some(Mode::Encrypt));
        assert_eq!(
            engine.init_decrypt(&[0; 16], &[0; 16]),
            Err(EngineError::AlreadyInitialized)
        );
        assert_eq!(engine.destroy(), Err(EngineError::NotFinalized));

        engine.finalize(&mut out).unwrap();
        assert_eq!(engine.state(), EngineState::Finalized);
        assert_eq!(engine.update(b"abc", &mut out), Err(EngineError::NotInitialized));
        assert_eq!(engine.finalize(&mut out), Err(EngineError::NotInitialized));

        engine.destroy().unwrap();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.mode(), None);
        engine.init_decrypt(&[0; 16], &[0; 16]).unwrap();
    }

    #[test]
    fn rejects_bad_key_and_iv() {
        assert_eq!(
            AesCbcEngine::encryptor(&[0; 15], &[0; 16]).err(),
            Some(EngineError::InvalidKeyLength(15))
        );
        assert_eq!(
            AesCbcEngine::decryptor(&[0; 16], &[0; 8]).err(),
            Some(EngineError::InvalidIvLength {
                expected: IV_LENGTH,
                actual: 8
            })
        );
    }

    #[test]
    fn failed_final_still_finalizes() {
        let mut engine = AesCbcEngine::decryptor(&[0; 16], &[0; 16]).unwrap();
        let mut out = [0; 64];
        engine.update(&[1; 5], &mut out).unwrap();
        assert!(engine.finalize(&mut out).is_err());
        assert_eq!(engine.state(), EngineState::Finalized);
        engine.destroy().unwrap();
    }
}
