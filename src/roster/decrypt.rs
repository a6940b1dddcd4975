//! Encrypted Roster Support
//!
//! Rosters may be encrypted as a whole with
//! `openssl enc -aes-256-cbc -pbkdf2 -iter 1000 -md sha256 [-a]`.
//! The format is the `Salted__` magic, an 8-byte salt and the ciphertext,
//! optionally base64 armoured. Key and IV come from PBKDF2-HMAC-SHA256 over the
//! pass-phrase and salt.
//!
//! [`DecryptedReader`] exposes the plaintext as a byte stream so the roster
//! parser never knows whether its input was encrypted.

use std::io::{self, Cursor, Read};

use aes::Aes256;
use base64::Engine;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;

use crate::error::{ExporterError, Result};

pub const SALT_MAGIC: &[u8; 8] = b"Salted__";
pub const SALT_LEN: usize = 8;
pub const PBKDF2_ITERATIONS: u32 = 1000;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Plaintext view over an encrypted roster
pub struct DecryptedReader {
    plaintext: Cursor<Vec<u8>>,
}

impl DecryptedReader {
    /// Reads the whole ciphertext from `source` and decrypts it
    pub fn new<R: Read>(mut source: R, passphrase: &SecretString) -> Result<Self> {
        let mut envelope = Vec::new();
        source.read_to_end(&mut envelope)?;

        let plaintext = decrypt(&envelope, passphrase)?;
        Ok(Self {
            plaintext: Cursor::new(plaintext),
        })
    }
}

impl Read for DecryptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.plaintext.read(buf)
    }
}

/// Key and IV for a salt, as `openssl enc -pbkdf2` derives them
pub fn derive_key_iv(passphrase: &SecretString, salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut material = [0u8; KEY_LEN + IV_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        passphrase.expose_secret().as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
        &mut material,
    );

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    iv.copy_from_slice(&material[KEY_LEN..]);
    (key, iv)
}

fn decrypt(envelope: &[u8], passphrase: &SecretString) -> Result<Vec<u8>> {
    let envelope = unarmor(envelope);

    let Some(rest) = envelope.strip_prefix(SALT_MAGIC.as_slice()) else {
        debug!("Roster ciphertext has no salt header");
        return Err(ExporterError::Decrypt);
    };
    if rest.len() < SALT_LEN {
        return Err(ExporterError::Decrypt);
    }
    let (salt, ciphertext) = rest.split_at(SALT_LEN);

    let (key, iv) = derive_key_iv(passphrase, salt);
    let plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| ExporterError::Decrypt)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ExporterError::Decrypt)?;

    // A wrong pass-phrase can still yield valid padding; garbage is rarely UTF-8
    if std::str::from_utf8(&plaintext).is_err() {
        return Err(ExporterError::Decrypt);
    }

    Ok(plaintext)
}

/// Strips base64 armour when present, otherwise returns the bytes unchanged
fn unarmor(envelope: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    if envelope.starts_with(SALT_MAGIC) {
        return envelope.into();
    }

    let compact: Vec<u8> = envelope
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    match base64::engine::general_purpose::STANDARD.decode(&compact) {
        Ok(decoded) => decoded.into(),
        Err(_) => envelope.into(),
    }
}
