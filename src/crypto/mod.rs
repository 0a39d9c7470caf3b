// src/crypto/mod.rs

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// Length of the random nonce prefixed to every encrypted file.
pub const NONCE_LEN: usize = 12;

/// Turns a plaintext file into an encrypted sibling and returns its path.
pub trait FileEncryptor {
    fn encrypt(&self, key: &str, path: &Path) -> Result<PathBuf>;
}

/// AES-256-GCM over the whole file.
///
/// Output is `<path>.enc` holding `nonce || ciphertext`; the cipher key is
/// the SHA-256 digest of the configured key string.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmEncryptor;

fn derive_key(key: &str) -> Result<Key<Aes256Gcm>> {
    if key.is_empty() {
        bail!("encryption key is empty");
    }
    let digest = Sha256::digest(key.as_bytes());
    Ok(*Key::<Aes256Gcm>::from_slice(&digest))
}

fn encrypted_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".enc");
    PathBuf::from(name)
}

impl FileEncryptor for AesGcmEncryptor {
    #[instrument(level = "info", skip(self, key, path), fields(path = %path.display()))]
    fn encrypt(&self, key: &str, path: &Path) -> Result<PathBuf> {
        let cipher = Aes256Gcm::new(&derive_key(key)?);
        let plaintext = fs::read(path).with_context(|| format!("reading {:?}", path))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| anyhow!("encrypting {:?}: {}", path, e))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        let out_path = encrypted_path(path);
        fs::write(&out_path, &out).with_context(|| format!("writing {:?}", out_path))?;

        info!(out = %out_path.display(), bytes = out.len(), "encrypted file");
        Ok(out_path)
    }
}

/// Reverse of [`AesGcmEncryptor::encrypt`] for a file written by it.
pub fn decrypt_file(key: &str, path: &Path) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(&derive_key(key)?);
    let data = fs::read(path).with_context(|| format!("reading {:?}", path))?;
    if data.len() < NONCE_LEN {
        bail!("{:?} is too short to hold a nonce", path);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("decrypting {:?}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_with_the_same_key() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("db.parquet");
        fs::write(&path, b"PAR1 some columnar bytes PAR1")?;

        let enc = AesGcmEncryptor.encrypt("secret", &path)?;
        assert_eq!(enc, dir.path().join("db.parquet.enc"));

        let raw = fs::read(&enc)?;
        assert_ne!(&raw[NONCE_LEN..], b"PAR1 some columnar bytes PAR1");
        assert_eq!(decrypt_file("secret", &enc)?, b"PAR1 some columnar bytes PAR1");
        Ok(())
    }

    #[test]
    fn wrong_key_does_not_decrypt() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("db.parquet");
        fs::write(&path, b"payload")?;

        let enc = AesGcmEncryptor.encrypt("secret", &path)?;
        assert!(decrypt_file("not-the-secret", &enc).is_err());
        Ok(())
    }

    #[test]
    fn empty_key_and_missing_file_fail() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("db.parquet");
        fs::write(&path, b"payload")?;

        assert!(AesGcmEncryptor.encrypt("", &path).is_err());
        assert!(AesGcmEncryptor
            .encrypt("secret", &dir.path().join("missing.parquet"))
            .is_err());
        Ok(())
    }
}
