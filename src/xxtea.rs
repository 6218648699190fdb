//! XXTEA (corrected block TEA) cipher used to obfuscate every record on the link.
//!
//! The cipher works in place on buffers of 32-bit words with a fixed 128-bit key.
//! It is link obfuscation only and makes no security claims.
//!
//! ```
//! use danfoss_eco_lib::xxtea::{Key, Xxtea};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key: Key = "00112233445566778899aabbccddeeff".parse()?;
//! let cipher = Xxtea::with_key(&key);
//!
//! let mut data = [1u8, 2, 3, 4, 5, 6, 7, 8];
//! cipher.encrypt(&mut data)?;
//! cipher.decrypt(&mut data)?;
//! assert_eq!(data, [1, 2, 3, 4, 5, 6, 7, 8]);
//! # Ok(())
//! # }
//! ```

use crate::error::{CipherError, ConfigError};
use std::fmt;
use std::str::FromStr;

/// Length of the cipher key in bytes.
pub const KEY_LEN: usize = 16;

const DELTA: u32 = 0x9E37_79B9;

/// The 16 byte secret shared with the valve.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn words(&self) -> [u32; 4] {
        let mut words = [0u32; 4];
        for (word, chunk) in words.iter_mut().zip(self.0.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never leak the secret into logs.
        f.write_str("Key(..)")
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = ConfigError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl FromStr for Key {
    type Err = ConfigError;

    /// Parses a key from its hex representation, e.g. `"00112233445566778899aabbccddeeff"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| ConfigError::InvalidKeyHex(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

/// Whether the cipher may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Uninitialized,
    Ready,
}

/// The expanded key plus its status.
///
/// Only a [`Status::Ready`] cipher encrypts or decrypts, everything else
/// reports [`CipherError::NotInitialized`].
#[derive(Clone, Default)]
pub struct Xxtea {
    key: [u32; 4],
    status: Status,
}

impl fmt::Debug for Xxtea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Xxtea")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Xxtea {
    /// Creates a cipher without a key. It must be given one with [`Xxtea::set_key`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cipher that is ready to use.
    pub fn with_key(key: &Key) -> Self {
        Self {
            key: key.words(),
            status: Status::Ready,
        }
    }

    /// Loads the key from raw bytes.
    ///
    /// On failure the previous key is discarded and the cipher becomes
    /// [`Status::Uninitialized`].
    pub fn set_key(&mut self, key: &[u8]) -> Result<Status, ConfigError> {
        self.key = [0; 4];
        self.status = Status::Uninitialized;
        let key = Key::try_from(key)?;
        self.key = key.words();
        self.status = Status::Ready;
        Ok(self.status)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Encrypts `data` in place. The length must be a positive multiple of 4.
    pub fn encrypt(&self, data: &mut [u8]) -> Result<(), CipherError> {
        self.transform(data, encrypt_words)
    }

    /// Decrypts `data` in place. The length must be a positive multiple of 4.
    pub fn decrypt(&self, data: &mut [u8]) -> Result<(), CipherError> {
        self.transform(data, decrypt_words)
    }

    fn transform(
        &self,
        data: &mut [u8],
        f: fn(&mut [u32], &[u32; 4]),
    ) -> Result<(), CipherError> {
        if self.status != Status::Ready {
            return Err(CipherError::NotInitialized);
        }
        if data.is_empty() || data.len() % 4 != 0 {
            return Err(CipherError::MisalignedLength(data.len()));
        }

        let mut words: Vec<u32> = data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        f(&mut words, &self.key);
        for (chunk, word) in data.chunks_exact_mut(4).zip(&words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Ok(())
    }
}

#[inline]
fn mx(y: u32, z: u32, sum: u32, key: &[u32; 4], p: usize, e: u32) -> u32 {
    (((z >> 5) ^ (y << 2)).wrapping_add((y >> 3) ^ (z << 4)))
        ^ ((sum ^ y).wrapping_add(key[(p & 3) ^ e as usize] ^ z))
}

fn rounds(n: usize) -> u32 {
    (6 + 52 / n) as u32
}

fn encrypt_words(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    if n < 2 {
        return;
    }
    let mut sum = 0u32;
    let mut z = v[n - 1];
    for _ in 0..rounds(n) {
        sum = sum.wrapping_add(DELTA);
        let e = (sum >> 2) & 3;
        for p in 0..n - 1 {
            let y = v[p + 1];
            v[p] = v[p].wrapping_add(mx(y, z, sum, key, p, e));
            z = v[p];
        }
        let y = v[0];
        v[n - 1] = v[n - 1].wrapping_add(mx(y, z, sum, key, n - 1, e));
        z = v[n - 1];
    }
}

fn decrypt_words(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    if n < 2 {
        return;
    }
    let rounds = rounds(n);
    let mut sum = rounds.wrapping_mul(DELTA);
    let mut y = v[0];
    for _ in 0..rounds {
        let e = (sum >> 2) & 3;
        for p in (1..n).rev() {
            let z = v[p - 1];
            v[p] = v[p].wrapping_sub(mx(y, z, sum, key, p, e));
            y = v[p];
        }
        let z = v[n - 1];
        v[0] = v[0].wrapping_sub(mx(y, z, sum, key, 0, e));
        y = v[0];
        sum = sum.wrapping_sub(DELTA);
    }
}
