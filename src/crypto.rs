//! RSA PKCS#1 v1.5 operations and DigestInfo encoding for handshake
//! signatures.
//!
//! # References
//!
//! * [RFC 5246 Section 4.7](https://datatracker.ietf.org/doc/html/rfc5246#section-4.7)
//! * [RFC 8017 Section 9.2](https://datatracker.ietf.org/doc/html/rfc8017#section-9.2)

use crate::key_schedule::HashType;
use alloc::vec::Vec;
use rand_core::{CryptoRng, RngCore};
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use subtle::ConstantTimeEq;

const DIGEST_INFO_MD5: &[u8] = &[
    0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05, 0x05,
    0x00, 0x04, 0x10,
];
const DIGEST_INFO_SHA1: &[u8] = &[
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];
const DIGEST_INFO_SHA256: &[u8] = &[
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];
const DIGEST_INFO_SHA384: &[u8] = &[
    0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02,
    0x05, 0x00, 0x04, 0x30,
];
const DIGEST_INFO_SHA512: &[u8] = &[
    0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03,
    0x05, 0x00, 0x04, 0x40,
];

/// DER DigestInfo with the digest appended.
///
/// Panics on a digest length that does not match the hash: the callers all
/// pass digests they computed with the same [`HashType`].
pub(crate) fn digest_info(hash: HashType, digest: &[u8]) -> Vec<u8> {
    let prefix: &'static [u8] = match hash {
        HashType::Md5 => DIGEST_INFO_MD5,
        HashType::Sha1 => DIGEST_INFO_SHA1,
        HashType::Sha256 => DIGEST_INFO_SHA256,
        HashType::Sha384 => DIGEST_INFO_SHA384,
        HashType::Sha512 => DIGEST_INFO_SHA512,
    };
    assert_eq!(digest.len(), hash.digest_len());

    let mut out: Vec<u8> = Vec::with_capacity(prefix.len() + digest.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(digest);
    out
}

/// Sign pre-encoded data (DigestInfo, or the raw 36-byte MD5‖SHA1 block at
/// TLS <= 1.1) with RSA PKCS#1 v1.5 block type 1.
pub(crate) fn rsa_sign(key: &RsaPrivateKey, data: &[u8]) -> Option<Vec<u8>> {
    key.sign(Pkcs1v15Sign::new_unprefixed(), data).ok()
}

/// Verify an RSA PKCS#1 v1.5 block type 1 signature over pre-encoded data.
pub(crate) fn rsa_verify(key: &RsaPublicKey, data: &[u8], signature: &[u8]) -> bool {
    key.verify(Pkcs1v15Sign::new_unprefixed(), data, signature)
        .is_ok()
}

/// RSA PKCS#1 v1.5 encryption of the pre-master secret.
pub(crate) fn rsa_encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &RsaPublicKey,
    plaintext: &[u8],
) -> Option<Vec<u8>> {
    key.encrypt(rng, Pkcs1v15Encrypt, plaintext).ok()
}

/// RSA PKCS#1 v1.5 decryption.
///
/// Failures are reported as `None`; callers on the server side must apply
/// the RFC 5246 7.4.7.1 countermeasure instead of surfacing an error.
pub(crate) fn rsa_decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Option<Vec<u8>> {
    key.decrypt(Pkcs1v15Encrypt, ciphertext).ok()
}

/// Constant-time equality.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn digest_info_sha256() {
        let digest: [u8; 32] = Sha256::digest(b"test").into();
        let info: Vec<u8> = digest_info(HashType::Sha256, &digest);
        assert_eq!(info.len(), 19 + 32);
        // DER SEQUENCE of total length 0x31
        assert_eq!(&info[..2], &[0x30, 0x31]);
        assert_eq!(&info[19..], &digest);
    }

    #[test]
    fn ct_eq_lengths() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"abcd"));
    }
}
