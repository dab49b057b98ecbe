//! The passphrase encryption variant of the container body.
//!
//! Encrypted containers store `array(key) || array(nonce) ||
//! array(ciphertext)` in place of the body. The cipher is the data stream
//! of AES-GCM with the authentication tag omitted, which reduces to
//! AES-CTR over a 32-bit big-endian block counter starting at 2 (GCM
//! reserves counter 1 for the tag it never stores here). A corrupted
//! ciphertext therefore decrypts to garbage instead of failing.
use std::io::{Read, Seek, Write};

use aes::{Aes128, Aes192, Aes256};
use binrw::{BinReaderExt, BinWrite};
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr32BE;

use crate::error::{EncryptionError, ReadError, WriteError};

/// How the container body is protected on disk.
///
/// The four-byte ASCII mode tag appears reversed on disk
/// (`ENON`, `LPMS`, `RPYK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionVariant {
    None,
    SimplePassphrase,
    KeyPair,
}

impl EncryptionVariant {
    const NONE_TAG: [u8; 4] = *b"NONE";
    const SMPL_TAG: [u8; 4] = *b"SMPL";
    const KYPR_TAG: [u8; 4] = *b"KYPR";

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, ReadError> {
        let mut stored = reader.read_le::<[u8; 4]>()?;
        stored.reverse();
        match stored {
            Self::NONE_TAG => Ok(Self::None),
            Self::SMPL_TAG => Ok(Self::SimplePassphrase),
            Self::KYPR_TAG => Ok(Self::KeyPair),
            _ => {
                stored.reverse();
                Err(EncryptionError::InvalidTag(stored).into())
            }
        }
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), WriteError> {
        let mut tag = match self {
            Self::None => Self::NONE_TAG,
            Self::SimplePassphrase => Self::SMPL_TAG,
            Self::KeyPair => Self::KYPR_TAG,
        };
        tag.reverse();
        tag.write_le(writer)?;
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Applies the keystream in place. Encryption and decryption are the same
/// operation for a stream cipher, so callers use this for both directions.
pub fn apply_keystream(key: &[u8], nonce: &[u8], data: &mut [u8]) -> Result<(), EncryptionError> {
    if nonce.len() < 12 {
        return Err(EncryptionError::InvalidNonceLength(nonce.len()));
    }

    // nonce || big-endian counter starting at 2.
    let mut iv = [0u8; 16];
    iv[..12].copy_from_slice(&nonce[..12]);
    iv[15] = 2;

    match key.len() {
        16 => Ctr32BE::<Aes128>::new_from_slices(key, &iv)
            .map_err(|_| EncryptionError::InvalidKeyLength(key.len()))?
            .apply_keystream(data),
        24 => Ctr32BE::<Aes192>::new_from_slices(key, &iv)
            .map_err(|_| EncryptionError::InvalidKeyLength(key.len()))?
            .apply_keystream(data),
        32 => Ctr32BE::<Aes256>::new_from_slices(key, &iv)
            .map_err(|_| EncryptionError::InvalidKeyLength(key.len()))?
            .apply_keystream(data),
        other => return Err(EncryptionError::InvalidKeyLength(other)),
    }
    Ok(())
}

/// Encrypts a serialized body for the `SimplePassphrase` layout.
pub fn encrypt(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let mut data = plaintext.to_vec();
    apply_keystream(key, nonce, &mut data)?;
    Ok(data)
}

/// Decrypts a `SimplePassphrase` body.
pub fn decrypt(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let mut data = ciphertext.to_vec();
    apply_keystream(key, nonce, &mut data)?;
    Ok(data)
}
