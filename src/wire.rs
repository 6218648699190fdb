//! Byte order handling between the valve and the cipher.
//!
//! The valve sends and expects big-endian 4 byte words while [`Xxtea`] works on
//! little-endian words. Every record is therefore flipped per 4 byte chunk
//! before and after the cipher runs:
//!
//! * decrypt: reverse, cipher decrypt, reverse
//! * encrypt: reverse, cipher encrypt, reverse

use crate::error::CipherError;
use crate::xxtea::Xxtea;

/// Reverses the byte order within each 4 byte chunk. A trailing chunk shorter
/// than 4 bytes is reversed on its own.
///
/// Applying it twice yields the input.
///
/// ```
/// use danfoss_eco_lib::wire::reverse_chunks;
///
/// assert_eq!(reverse_chunks(&[1, 2, 3, 4, 5, 6]), vec![4, 3, 2, 1, 6, 5]);
/// ```
pub fn reverse_chunks(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    reverse_chunks_in_place(&mut out);
    out
}

/// In place variant of [`reverse_chunks`].
pub fn reverse_chunks_in_place(data: &mut [u8]) {
    data.chunks_mut(4).for_each(<[u8]>::reverse);
}

/// Turns a record as received from the valve into plain bytes, in place.
pub fn decrypt_record(cipher: &Xxtea, data: &mut [u8]) -> Result<(), CipherError> {
    log::trace!("DECRYPT INPUT[{}]: {}", data.len(), hex::encode(&*data));
    reverse_chunks_in_place(data);
    cipher.decrypt(data)?;
    reverse_chunks_in_place(data);
    log::trace!("DECRYPT OUTPUT: {}", hex::encode(&*data));
    Ok(())
}

/// Turns plain record bytes into what the valve expects on the link, in place.
pub fn encrypt_record(cipher: &Xxtea, data: &mut [u8]) -> Result<(), CipherError> {
    log::trace!("ENCRYPT INPUT[{}]: {}", data.len(), hex::encode(&*data));
    reverse_chunks_in_place(data);
    cipher.encrypt(data)?;
    reverse_chunks_in_place(data);
    log::trace!("ENCRYPT OUTPUT: {}", hex::encode(&*data));
    Ok(())
}
