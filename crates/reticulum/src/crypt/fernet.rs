use core::cmp;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, BlockSizeUser, Key, KeyIvInit, Unsigned};
use crypto_common::{IvSizeUser, KeySizeUser, OutputSizeUser};
use hmac::{Hmac, Mac};
use rand_core::{CryptoRngCore, OsRng};
use sha2::Sha256;

use crate::error::RnsError;

type AesAlgo = aes::Aes256;
type AesCbcEnc = cbc::Encryptor<AesAlgo>;
type AesCbcDec = cbc::Decryptor<AesAlgo>;
type AesKey = Key<AesAlgo>;

type HmacSha256 = Hmac<Sha256>;

const HMAC_OUT_SIZE: usize = <<HmacSha256 as OutputSizeUser>::OutputSize as Unsigned>::USIZE;
pub const AES_KEY_SIZE: usize = <<AesAlgo as KeySizeUser>::KeySize as Unsigned>::USIZE;
const IV_SIZE: usize = <<AesCbcEnc as IvSizeUser>::IvSize as Unsigned>::USIZE;
const AES_BLOCK_SIZE: usize = <<AesAlgo as BlockSizeUser>::BlockSize as Unsigned>::USIZE;

/// IV + HMAC overhead added to every encrypted token.
pub const FERNET_OVERHEAD_SIZE: usize = IV_SIZE + HMAC_OUT_SIZE;
pub const FERNET_MAX_PADDING_SIZE: usize = AES_BLOCK_SIZE;

/// AES-256-CBC + HMAC-SHA256 authenticated encryption, the way Link and
/// Destination payloads are framed.
///
/// This is a slightly modified Fernet token: the one-byte VERSION and
/// eight-byte TIMESTAMP fields from the Fernet spec are stripped, since
/// Reticulum has no use for them and they would leak initiator metadata.
/// Layout: `IV(16) || AES-256-CBC(plaintext, PKCS7) || HMAC-SHA256(IV||ciphertext)`.
pub struct Fernet {
    sign_key: [u8; AES_KEY_SIZE],
    enc_key: AesKey,
}

impl Fernet {
    pub fn new(sign_key: [u8; AES_KEY_SIZE], enc_key: [u8; AES_KEY_SIZE]) -> Self {
        Self { sign_key, enc_key: enc_key.into() }
    }

    /// Derive sign/enc keys from raw key material, truncating or zero-padding
    /// as needed (used when keys come from an HKDF expansion of fixed length).
    pub fn new_from_slices(sign_key: &[u8], enc_key: &[u8]) -> Self {
        let mut sign_key_bytes = [0u8; AES_KEY_SIZE];
        let sign_len = cmp::min(AES_KEY_SIZE, sign_key.len());
        sign_key_bytes[..sign_len].copy_from_slice(&sign_key[..sign_len]);

        let mut enc_key_bytes = [0u8; AES_KEY_SIZE];
        let enc_len = cmp::min(AES_KEY_SIZE, enc_key.len());
        enc_key_bytes[..enc_len].copy_from_slice(&enc_key[..enc_len]);

        Self { sign_key: sign_key_bytes, enc_key: enc_key_bytes.into() }
    }

    pub fn new_rand() -> Self {
        let mut rng = OsRng;
        let mut sign_key = [0u8; AES_KEY_SIZE];
        rng.fill_bytes(&mut sign_key);
        let enc_key = AesCbcEnc::generate_key(&mut rng);
        Self { sign_key, enc_key }
    }

    /// Encrypt into a caller-owned buffer, returning the used prefix.
    pub fn encrypt_into<'a>(
        &self,
        plaintext: &[u8],
        out_buf: &'a mut [u8],
    ) -> Result<&'a [u8], RnsError> {
        let block_count = plaintext
            .len()
            .checked_div(AES_BLOCK_SIZE)
            .and_then(|blocks| blocks.checked_add(1))
            .ok_or(RnsError::InvalidArgument)?;
        let padded_cipher_len =
            block_count.checked_mul(AES_BLOCK_SIZE).ok_or(RnsError::InvalidArgument)?;
        let required_len =
            FERNET_OVERHEAD_SIZE.checked_add(padded_cipher_len).ok_or(RnsError::InvalidArgument)?;

        if out_buf.len() < required_len {
            return Err(RnsError::InvalidArgument);
        }

        let mut rng = OsRng;
        let iv = AesCbcEnc::generate_iv(&mut rng);
        let mut out_len = iv.len();
        out_buf[..out_len].copy_from_slice(iv.as_slice());

        let cipher_len = AesCbcEnc::new(&self.enc_key, &iv)
            .encrypt_padded_b2b_mut::<Pkcs7>(plaintext, &mut out_buf[out_len..])
            .map_err(|_| RnsError::InvalidArgument)?
            .len();
        out_len += cipher_len;

        let mut hmac = <HmacSha256 as Mac>::new_from_slice(&self.sign_key)
            .map_err(|_| RnsError::InvalidArgument)?;
        hmac.update(&out_buf[..out_len]);
        let tag = hmac.finalize().into_bytes();
        out_buf[out_len..out_len + tag.len()].copy_from_slice(tag.as_slice());
        out_len += tag.len();

        Ok(&out_buf[..out_len])
    }

    /// HMAC-SHA256 of `data` under this token's sign key, used to produce a
    /// Resource proof `[content_hash|signature]` without re-deriving keys.
    pub fn mac(&self, data: &[u8]) -> [u8; HMAC_OUT_SIZE] {
        let mut hmac = <HmacSha256 as Mac>::new_from_slice(&self.sign_key)
            .expect("HMAC accepts any key length");
        hmac.update(data);
        hmac.finalize().into_bytes().into()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, RnsError> {
        let mut out = vec![0u8; plaintext.len() + AES_BLOCK_SIZE + FERNET_OVERHEAD_SIZE];
        let used = self.encrypt_into(plaintext, &mut out)?.len();
        out.truncate(used);
        Ok(out)
    }

    fn verify<'a>(&self, token: &'a [u8]) -> Result<&'a [u8], RnsError> {
        if token.len() <= FERNET_OVERHEAD_SIZE {
            return Err(RnsError::InvalidArgument);
        }

        let expected_tag = &token[token.len() - HMAC_OUT_SIZE..];
        let mut hmac = <HmacSha256 as Mac>::new_from_slice(&self.sign_key)
            .map_err(|_| RnsError::InvalidArgument)?;
        hmac.update(&token[..token.len() - HMAC_OUT_SIZE]);
        let actual_tag = hmac.finalize().into_bytes();

        let valid = expected_tag
            .iter()
            .zip(actual_tag.as_slice())
            .map(|(x, y)| x.cmp(y))
            .find(|&ord| ord != cmp::Ordering::Equal)
            .unwrap_or(actual_tag.len().cmp(&expected_tag.len()))
            == cmp::Ordering::Equal;

        if valid {
            Ok(token)
        } else {
            Err(RnsError::IncorrectSignature)
        }
    }

    pub fn decrypt_into<'a, 'b>(
        &self,
        token: &'a [u8],
        out_buf: &'b mut [u8],
    ) -> Result<&'b [u8], RnsError> {
        let token = self.verify(token)?;
        let tag_start = token.len() - HMAC_OUT_SIZE;

        let iv: [u8; IV_SIZE] =
            token[..IV_SIZE].try_into().map_err(|_| RnsError::InvalidArgument)?;
        let ciphertext = &token[IV_SIZE..tag_start];

        let msg = AesCbcDec::new(&self.enc_key, &iv.into())
            .decrypt_padded_b2b_mut::<Pkcs7>(ciphertext, out_buf)
            .map_err(|_| RnsError::CryptoError)?;

        Ok(msg)
    }

    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, RnsError> {
        let mut out = vec![0u8; token.len()];
        let used = self.decrypt_into(token, &mut out)?.len();
        out.truncate(used);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let fernet = Fernet::new_rand();
        let msg = b"#FERNET_TEST_MESSAGE#";

        let token = fernet.encrypt(msg).expect("token");
        let plain = fernet.decrypt(&token).expect("plain");

        assert_eq!(plain, msg);
    }

    #[test]
    fn tampered_token_fails_verification() {
        let fernet = Fernet::new_rand();
        let mut token = fernet.encrypt(b"hello").expect("token");
        let last = token.len() - 1;
        token[last] ^= 0xFF;

        assert_eq!(fernet.decrypt(&token), Err(RnsError::IncorrectSignature));
    }

    #[test]
    fn small_buffer_is_rejected_without_panicking() {
        let fernet = Fernet::new_rand();
        let mut out_buf = [0u8; 12];
        assert!(fernet.encrypt_into(b"#FERNET_TEST_MESSAGE#", &mut out_buf).is_err());
    }

    #[test]
    fn different_keys_cannot_decrypt_each_other() {
        let a = Fernet::new_rand();
        let b = Fernet::new_rand();
        let token = a.encrypt(b"secret").expect("token");
        assert!(b.decrypt(&token).is_err());
    }
}
