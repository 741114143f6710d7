use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use cbc::{Decryptor, Encryptor};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

pub const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// AES-256-CBC file cipher.
///
/// The key is derived once from the application secret and the cipher is
/// handed to the pipeline and retrieval path at construction time. It is
/// immutable afterwards, so concurrent requests share it without locking.
pub struct FileCipher {
    key: [u8; 32],
}

impl FileCipher {
    /// Derive the 256-bit key as SHA-256 of the configured secret.
    /// Deterministic: the same secret always yields the same key.
    pub fn new(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt a buffer with a fresh random IV.
    ///
    /// The IV is never derived from content or reused; the caller must
    /// persist it next to the ciphertext locator or the data is lost.
    pub fn encrypt(&self, plaintext: &[u8]) -> (Vec<u8>, [u8; IV_LEN]) {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        (ciphertext, iv)
    }

    /// Decrypt a buffer with the IV stored at encryption time.
    ///
    /// Misaligned or corrupted input fails with an explicit error rather
    /// than yielding garbage framed as success.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| AppError::Cipher(format!("IV must be {} bytes", IV_LEN)))?;

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(AppError::Cipher(
                "Ciphertext length is not a multiple of the block size".to_string(),
            ));
        }

        Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| AppError::Cipher("Padding validation failed".to_string()))
    }

    /// Decrypt with a hex-encoded IV as persisted in a file record
    pub fn decrypt_hex_iv(&self, ciphertext: &[u8], iv_hex: &str) -> Result<Vec<u8>> {
        let iv = hex::decode(iv_hex)
            .map_err(|_| AppError::Cipher("Stored IV is not valid hex".to_string()))?;
        self.decrypt(ciphertext, &iv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = FileCipher::new("test-secret");
        for plaintext in [
            b"".as_slice(),
            b"a".as_slice(),
            b"exactly sixteen!".as_slice(),
            b"hello world!".as_slice(),
            &[0u8; 4096],
        ] {
            let (ciphertext, iv) = cipher.encrypt(plaintext);
            let decrypted = cipher.decrypt(&ciphertext, &iv).unwrap();
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_per_encrypt() {
        let cipher = FileCipher::new("test-secret");
        let (ct1, iv1) = cipher.encrypt(b"same content");
        let (ct2, iv2) = cipher.encrypt(b"same content");
        assert_ne!(iv1, iv2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let a = FileCipher::new("secret");
        let b = FileCipher::new("secret");
        let (ciphertext, iv) = a.encrypt(b"portable");
        assert_eq!(b.decrypt(&ciphertext, &iv).unwrap(), b"portable");
    }

    #[test]
    fn test_different_secret_cannot_decrypt() {
        let a = FileCipher::new("secret-a");
        let b = FileCipher::new("secret-b");
        let (ciphertext, iv) = a.encrypt(b"a fairly long plaintext spanning blocks..");
        let result = b.decrypt(&ciphertext, &iv);
        match result {
            Err(AppError::Cipher(_)) => {}
            Ok(decrypted) => assert_ne!(decrypted, b"a fairly long plaintext spanning blocks.."),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_wrong_iv_never_returns_plaintext() {
        let cipher = FileCipher::new("test-secret");
        let plaintext = b"block one here..block two here..";
        let (ciphertext, _iv) = cipher.encrypt(plaintext);
        let wrong_iv = [0u8; IV_LEN];
        match cipher.decrypt(&ciphertext, &wrong_iv) {
            Err(AppError::Cipher(_)) => {}
            Ok(decrypted) => assert_ne!(decrypted, plaintext),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_misaligned_ciphertext_is_rejected() {
        let cipher = FileCipher::new("test-secret");
        let (mut ciphertext, iv) = cipher.encrypt(b"some data");
        ciphertext.pop();
        assert!(matches!(
            cipher.decrypt(&ciphertext, &iv),
            Err(AppError::Cipher(_))
        ));
        assert!(matches!(cipher.decrypt(&[], &iv), Err(AppError::Cipher(_))));
    }

    #[test]
    fn test_bad_iv_length_is_rejected() {
        let cipher = FileCipher::new("test-secret");
        let (ciphertext, _) = cipher.encrypt(b"some data");
        assert!(matches!(
            cipher.decrypt(&ciphertext, &[0u8; 8]),
            Err(AppError::Cipher(_))
        ));
        assert!(matches!(
            cipher.decrypt_hex_iv(&ciphertext, "not-hex"),
            Err(AppError::Cipher(_))
        ));
    }
}
