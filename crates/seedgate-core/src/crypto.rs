//! The symmetric primitives everything else is built from.
//!
//! Two constructions share the private key:
//!
//! - **Blobs** (throttle records): `iv ‖ AES-CBC(key, iv, PKCS#7(input ‖
//!   SHA-256(input)))`. The embedded digest makes tampering detectable
//!   without a separate MAC key.
//! - **Tickets**: raw per-block AES-ECB over an exactly 16- or 32-byte
//!   body whose tail is already an HMAC of its head (see [`crate::ticket`]).
//!   No IV, no padding; the construction is deliberately deterministic.
//!
//! Decryption failures never explain themselves: every bad-length,
//! bad-padding, and bad-tag path collapses into the same `None` so callers
//! cannot leak the reason, and tag comparisons are constant-time.

use aes::{
    Aes128, Aes192, Aes256,
    cipher::{
        BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
        block_padding::Pkcs7, generic_array::GenericArray,
    },
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::PrivateKey;

type HmacSha256 = Hmac<Sha256>;

/// AES block size; also the IV length for blob encryption.
pub const BLOCK_LEN: usize = 16;

/// SHA-256 of `input`, or HMAC-SHA-256 when `key` is supplied.
///
/// Keys are expected to be 24–64 bytes (the salt range); HMAC itself
/// accepts anything, so this is only debug-asserted.
pub fn hash(input: &[u8], key: Option<&[u8]>) -> [u8; 32] {
    match key {
        None => Sha256::digest(input).into(),
        Some(key) => {
            debug_assert!((24..=64).contains(&key.len()));
            let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
                .expect("HMAC-SHA-256 accepts any key length");
            mac.update(input);
            mac.finalize().into_bytes().into()
        }
    }
}

/// Authenticated-by-digest CBC encryption of an arbitrary byte string.
///
/// Output layout: `iv(16) ‖ ciphertext`, where the plaintext under the
/// padding is `input ‖ SHA-256(input)`.
pub fn encrypt_blob(input: &[u8], key: &PrivateKey) -> Vec<u8> {
    let mut iv = [0u8; BLOCK_LEN];
    rand::rng().fill_bytes(&mut iv);

    let tag = hash(input, None);
    let mut tagged = Vec::with_capacity(input.len() + tag.len());
    tagged.extend_from_slice(input);
    tagged.extend_from_slice(&tag);

    let key_bytes = key.as_bytes();
    let ciphertext = match key_bytes.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key_bytes, &iv)
            .expect("key and iv lengths are fixed")
            .encrypt_padded_vec_mut::<Pkcs7>(&tagged),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key_bytes, &iv)
            .expect("key and iv lengths are fixed")
            .encrypt_padded_vec_mut::<Pkcs7>(&tagged),
        _ => cbc::Encryptor::<Aes256>::new_from_slices(key_bytes, &iv)
            .expect("key and iv lengths are fixed")
            .encrypt_padded_vec_mut::<Pkcs7>(&tagged),
    };

    let mut out = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypt and verify a blob produced by [`encrypt_blob`].
///
/// Returns the plaintext without its digest, or `None` on any failure.
/// The length gate is the AES block size, independent of key length, so
/// AES-192/256 blobs round-trip like AES-128 ones.
pub fn decrypt_blob(input: &[u8], key: &PrivateKey) -> Option<Vec<u8>> {
    if input.len() % BLOCK_LEN != 0 || input.len() < 2 * BLOCK_LEN {
        return None;
    }

    let (iv, body) = input.split_at(BLOCK_LEN);
    let key_bytes = key.as_bytes();
    let tagged = match key_bytes.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key_bytes, iv)
            .expect("key and iv lengths are fixed")
            .decrypt_padded_vec_mut::<Pkcs7>(body),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key_bytes, iv)
            .expect("key and iv lengths are fixed")
            .decrypt_padded_vec_mut::<Pkcs7>(body),
        _ => cbc::Decryptor::<Aes256>::new_from_slices(key_bytes, iv)
            .expect("key and iv lengths are fixed")
            .decrypt_padded_vec_mut::<Pkcs7>(body),
    }
    .ok()?;

    if tagged.len() < 32 {
        return None;
    }
    let (plain, tag) = tagged.split_at(tagged.len() - 32);
    if bool::from(hash(plain, None).ct_eq(tag)) {
        Some(plain.to_vec())
    } else {
        None
    }
}

/// Encrypt `buf` in place, one independent AES block at a time.
///
/// `buf.len()` must be a multiple of 16; only the 16/32-byte ticket body
/// ever comes through here.
pub fn aes_ecb_encrypt(buf: &mut [u8], key: &PrivateKey) {
    debug_assert_eq!(buf.len() % BLOCK_LEN, 0);
    match key.as_bytes().len() {
        16 => ecb_encrypt_with::<Aes128>(buf, key.as_bytes()),
        24 => ecb_encrypt_with::<Aes192>(buf, key.as_bytes()),
        _ => ecb_encrypt_with::<Aes256>(buf, key.as_bytes()),
    }
}

/// Decrypt `buf` in place, one independent AES block at a time.
pub fn aes_ecb_decrypt(buf: &mut [u8], key: &PrivateKey) {
    debug_assert_eq!(buf.len() % BLOCK_LEN, 0);
    match key.as_bytes().len() {
        16 => ecb_decrypt_with::<Aes128>(buf, key.as_bytes()),
        24 => ecb_decrypt_with::<Aes192>(buf, key.as_bytes()),
        _ => ecb_decrypt_with::<Aes256>(buf, key.as_bytes()),
    }
}

fn ecb_encrypt_with<C: BlockEncrypt + KeyInit>(buf: &mut [u8], key: &[u8]) {
    let cipher = C::new_from_slice(key).expect("key length is validated at construction");
    for block in buf.chunks_exact_mut(BLOCK_LEN) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
}

fn ecb_decrypt_with<C: BlockDecrypt + KeyInit>(buf: &mut [u8], key: &[u8]) {
    let cipher = C::new_from_slice(key).expect("key length is validated at construction");
    for block in buf.chunks_exact_mut(BLOCK_LEN) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn key(len: usize) -> PrivateKey {
        PrivateKey::new((0..len as u8).collect()).unwrap()
    }

    #[test]
    fn sha256_matches_known_vector() {
        // SHA-256("abc") from FIPS 180-2
        assert_eq!(
            hash(b"abc", None),
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn hmac_is_keyed() {
        let msg = b"what do ya want for nothing?";
        let key_a = [0x0b; 24];
        let key_b = [0x0c; 24];
        assert_ne!(hash(msg, Some(&key_a)), hash(msg, Some(&key_b)));
        assert_ne!(hash(msg, Some(&key_a)), hash(msg, None));
        assert_eq!(hash(msg, Some(&key_a)), hash(msg, Some(&key_a)));
    }

    #[test]
    fn blob_roundtrip_all_key_sizes() {
        for len in [16, 24, 32] {
            let key = key(len);
            let blob = encrypt_blob(b"some record", &key);
            assert_eq!(blob.len() % BLOCK_LEN, 0);
            assert_eq!(decrypt_blob(&blob, &key).unwrap(), b"some record");
        }
    }

    #[test]
    fn blob_rejects_tampering() {
        let key = key(32);
        let mut blob = encrypt_blob(b"some record", &key);
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(decrypt_blob(&blob, &key).is_none());
    }

    #[test]
    fn blob_rejects_wrong_key() {
        let blob = encrypt_blob(b"some record", &key(32));
        assert!(decrypt_blob(&blob, &key(16)).is_none());
        let mut other = vec![0xaa; 32];
        other[0] = 0;
        assert!(decrypt_blob(&blob, &PrivateKey::new(other).unwrap()).is_none());
    }

    #[test]
    fn blob_length_gate_is_block_size() {
        let key = key(24);
        let blob = encrypt_blob(b"x", &key);
        // a 24-byte key must still accept its own 16-aligned output
        assert!(decrypt_blob(&blob, &key).is_some());
        assert!(decrypt_blob(&blob[..blob.len() - 1], &key).is_none());
        assert!(decrypt_blob(&[], &key).is_none());
        assert!(decrypt_blob(&blob[..16], &key).is_none());
    }

    #[test]
    fn ecb_is_deterministic_and_invertible() {
        let key = key(32);
        let mut block = *b"0123456789abcdef0123456789abcdef";
        let original = block;
        aes_ecb_encrypt(&mut block, &key);
        assert_ne!(block, original);
        // identical plaintext blocks encrypt identically under ECB
        assert_eq!(block[..16], block[16..]);
        aes_ecb_decrypt(&mut block, &key);
        assert_eq!(block, original);
    }

    #[test]
    fn ecb_single_block_vector() {
        // FIPS 197 appendix C.1: AES-128, key 000102...0f, plaintext 00112233...ff
        let key = PrivateKey::new(hex!("000102030405060708090a0b0c0d0e0f").to_vec()).unwrap();
        let mut block = hex!("00112233445566778899aabbccddeeff");
        aes_ecb_encrypt(&mut block, &key);
        assert_eq!(block, hex!("69c4e0d86a7b0430d8cdb78070b4c55a"));
    }
}
