//! TLS pseudo-random functions and handshake key derivation.
//!
//! # References
//!
//! * [RFC 2246 Section 5](https://datatracker.ietf.org/doc/html/rfc2246#section-5) TLS 1.0 PRF
//! * [RFC 5246 Section 5](https://datatracker.ietf.org/doc/html/rfc5246#section-5) TLS 1.2 PRF
//! * [RFC 5246 Section 8.1](https://datatracker.ietf.org/doc/html/rfc5246#section-8.1) master secret
//! * [RFC 5246 Section 6.3](https://datatracker.ietf.org/doc/html/rfc5246#section-6.3) key block

use crate::cipher_suites::CipherSuite;
use crate::TlsVersion;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::min;
use hmac::digest::{Digest, KeyInit, Output};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Hash algorithms used in the handshake.
///
/// The TLS identifiers are the HashAlgorithm registry values from
/// [RFC 5246 Section 7.4.1.4.1](https://datatracker.ietf.org/doc/html/rfc5246#section-7.4.1.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HashType {
    /// MD5, id 1.
    Md5,
    /// SHA-1, id 2.
    Sha1,
    /// SHA-256, id 4.
    Sha256,
    /// SHA-384, id 5.
    Sha384,
    /// SHA-512, id 6.
    ///
    /// Advertised for peer certificate chains; no running transcript hash
    /// is maintained for it.
    Sha512,
}

impl HashType {
    pub(crate) const fn tls_id(self) -> u8 {
        match self {
            Self::Md5 => 1,
            Self::Sha1 => 2,
            Self::Sha256 => 4,
            Self::Sha384 => 5,
            Self::Sha512 => 6,
        }
    }

    pub(crate) const fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    pub(crate) fn from_tls_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Md5),
            2 => Some(Self::Sha1),
            4 => Some(Self::Sha256),
            5 => Some(Self::Sha384),
            6 => Some(Self::Sha512),
            _ => None,
        }
    }
}

// label + seed scratch; the longest inputs are the 15-byte finished labels
// and the 64-byte concatenated randoms
const PRF_SEED_MAX: usize = 128;

fn label_seed(label: &[u8], seed: &[u8]) -> heapless::Vec<u8, PRF_SEED_MAX> {
    let mut buf: heapless::Vec<u8, PRF_SEED_MAX> = heapless::Vec::new();
    unwrap!(buf.extend_from_slice(label).ok());
    unwrap!(buf.extend_from_slice(seed).ok());
    buf
}

/// `P_hash` data expansion.
///
/// ```text
/// P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) +
///                        HMAC_hash(secret, A(2) + seed) + ...
/// A(0) = seed
/// A(i) = HMAC_hash(secret, A(i-1))
/// ```
fn p_hash<M: Mac + KeyInit + Clone>(secret: &[u8], seed: &[u8], out: &mut [u8]) {
    // HMAC accepts keys of any length
    let mut a: Output<M> = {
        let mut mac: M = unwrap!(<M as KeyInit>::new_from_slice(secret).ok());
        mac.update(seed);
        mac.finalize().into_bytes()
    };

    let mut offset: usize = 0;
    while offset < out.len() {
        let mut mac: M = unwrap!(<M as KeyInit>::new_from_slice(secret).ok());
        mac.update(&a);
        mac.update(seed);
        let chunk: Output<M> = mac.finalize().into_bytes();

        let chunk_len: usize = min(chunk.len(), out.len() - offset);
        out[offset..offset + chunk_len].copy_from_slice(&chunk[..chunk_len]);
        offset += chunk_len;

        let mut mac: M = unwrap!(<M as KeyInit>::new_from_slice(secret).ok());
        mac.update(&a);
        a = mac.finalize().into_bytes();
    }
}

/// TLS 1.2 PRF with the given HMAC hash.
pub(crate) fn prf_tls12(hash: HashType, secret: &[u8], label: &[u8], seed: &[u8], out: &mut [u8]) {
    let seed: heapless::Vec<u8, PRF_SEED_MAX> = label_seed(label, seed);

    match hash {
        HashType::Md5 => p_hash::<Hmac<Md5>>(secret, &seed, out),
        HashType::Sha1 => p_hash::<Hmac<Sha1>>(secret, &seed, out),
        HashType::Sha256 => p_hash::<Hmac<Sha256>>(secret, &seed, out),
        HashType::Sha384 => p_hash::<Hmac<Sha384>>(secret, &seed, out),
        // never a PRF hash
        HashType::Sha512 => unreachable!(),
    }
}

/// TLS 1.0/1.1 PRF: `P_MD5(S1) XOR P_SHA1(S2)`.
///
/// RFC 2246 section 5: S1 and S2 are the two halves of the secret, each of
/// length `ceil(len / 2)`; with an odd-length secret the last byte of S1 is
/// also the first byte of S2.
pub(crate) fn prf_tls10(secret: &[u8], label: &[u8], seed: &[u8], out: &mut [u8]) {
    let half: usize = (secret.len() + 1) / 2;
    let s1: &[u8] = &secret[..half];
    let s2: &[u8] = &secret[secret.len() - half..];

    let seed: heapless::Vec<u8, PRF_SEED_MAX> = label_seed(label, seed);

    p_hash::<Hmac<Md5>>(s1, &seed, out);

    let mut sha1_out: Zeroizing<Vec<u8>> = Zeroizing::new(vec![0; out.len()]);
    p_hash::<Hmac<Sha1>>(s2, &seed, &mut sha1_out);

    for (out_byte, sha1_byte) in out.iter_mut().zip(sha1_out.iter()) {
        *out_byte ^= sha1_byte;
    }
}

/// Version-dispatching PRF.
pub(crate) fn prf(
    version: TlsVersion,
    prf_hash: HashType,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    out: &mut [u8],
) {
    if version >= TlsVersion::V1_2 {
        prf_tls12(prf_hash, secret, label, seed, out)
    } else {
        prf_tls10(secret, label, seed, out)
    }
}

/// `master_secret = PRF(pre_master_secret, "master secret",
/// ClientHello.random + ServerHello.random)[0..47]`
pub(crate) fn master_secret(
    version: TlsVersion,
    prf_hash: HashType,
    pre_master: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Zeroizing<[u8; 48]> {
    let mut seed: [u8; 64] = [0; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);

    let mut master: Zeroizing<[u8; 48]> = Zeroizing::new([0; 48]);
    prf(version, prf_hash, pre_master, b"master secret", &seed, &mut *master);
    seed.zeroize();
    master
}

/// Key material for both directions, split from the key block expansion.
///
/// `key_block = PRF(master_secret, "key expansion",
/// server_random + client_random)` — note the randoms are in the opposite
/// order from the master secret derivation.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct KeyBlock {
    pub client_mac: Vec<u8>,
    pub server_mac: Vec<u8>,
    pub client_key: Vec<u8>,
    pub server_key: Vec<u8>,
    pub client_iv: Vec<u8>,
    pub server_iv: Vec<u8>,
}

impl KeyBlock {
    pub fn derive(
        version: TlsVersion,
        prf_hash: HashType,
        suite: &CipherSuite,
        master: &[u8; 48],
        client_random: &[u8; 32],
        server_random: &[u8; 32],
    ) -> Self {
        let mut seed: [u8; 64] = [0; 64];
        seed[..32].copy_from_slice(server_random);
        seed[32..].copy_from_slice(client_random);

        let mut block: Zeroizing<Vec<u8>> =
            Zeroizing::new(vec![0; suite.key_block_size(version)]);
        prf(version, prf_hash, master, b"key expansion", &seed, &mut block);
        seed.zeroize();

        let mac_len: usize = suite.mac.map_or(0, |mac| mac.mac_len);
        let key_len: usize = suite.encryption.key_len;
        let iv_len: usize = if version <= TlsVersion::V1_0
            && suite.encryption.kind == crate::cipher_suites::CipherKind::Block
        {
            suite.encryption.iv_len
        } else {
            suite.encryption.fixed_iv_len
        };

        let mut at: usize = 0;
        let mut take = |len: usize| -> Vec<u8> {
            let piece: Vec<u8> = block[at..at + len].to_vec();
            at += len;
            piece
        };

        KeyBlock {
            client_mac: take(mac_len),
            server_mac: take(mac_len),
            client_key: take(key_len),
            server_key: take(key_len),
            client_iv: take(iv_len),
            server_iv: take(iv_len),
        }
    }
}

/// The running handshake transcript digests.
///
/// Four digests run from the first handshake message.  A snapshot of every
/// live digest is taken immediately before a received CertificateVerify or
/// Finished is absorbed, because their contents are computed over the
/// transcript up to but not including the message itself.
pub(crate) struct TranscriptHashes {
    md5: Option<Md5>,
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
    sha384: Option<Sha384>,

    prev_md5: [u8; 16],
    prev_sha1: [u8; 20],
    prev_sha256: [u8; 32],
    prev_sha384: [u8; 48],
}

impl TranscriptHashes {
    pub fn new() -> Self {
        Self {
            md5: Some(Md5::new()),
            sha1: Some(Sha1::new()),
            sha256: Some(Sha256::new()),
            sha384: Some(Sha384::new()),
            prev_md5: [0; 16],
            prev_sha1: [0; 20],
            prev_sha256: [0; 32],
            prev_sha384: [0; 48],
        }
    }

    /// Absorb a handshake message, header included.
    pub fn update(&mut self, data: &[u8]) {
        if let Some(hash) = &mut self.md5 {
            hash.update(data);
        }
        if let Some(hash) = &mut self.sha1 {
            hash.update(data);
        }
        if let Some(hash) = &mut self.sha256 {
            hash.update(data);
        }
        if let Some(hash) = &mut self.sha384 {
            hash.update(data);
        }
    }

    pub fn is_live(&self, hash: HashType) -> bool {
        match hash {
            HashType::Md5 => self.md5.is_some(),
            HashType::Sha1 => self.sha1.is_some(),
            HashType::Sha256 => self.sha256.is_some(),
            HashType::Sha384 => self.sha384.is_some(),
            HashType::Sha512 => false,
        }
    }

    /// Current digest of one transcript hash.
    pub fn digest(&self, hash: HashType, out: &mut [u8]) -> bool {
        match hash {
            HashType::Md5 => match &self.md5 {
                Some(h) => out[..16].copy_from_slice(&h.clone().finalize()),
                None => return false,
            },
            HashType::Sha1 => match &self.sha1 {
                Some(h) => out[..20].copy_from_slice(&h.clone().finalize()),
                None => return false,
            },
            HashType::Sha256 => match &self.sha256 {
                Some(h) => out[..32].copy_from_slice(&h.clone().finalize()),
                None => return false,
            },
            HashType::Sha384 => match &self.sha384 {
                Some(h) => out[..48].copy_from_slice(&h.clone().finalize()),
                None => return false,
            },
            HashType::Sha512 => return false,
        }
        true
    }

    /// Snapshot every live digest.
    ///
    /// Called before absorbing a received CertificateVerify or Finished.
    pub fn snapshot(&mut self) {
        if let Some(hash) = &self.md5 {
            self.prev_md5.copy_from_slice(&hash.clone().finalize());
        }
        if let Some(hash) = &self.sha1 {
            self.prev_sha1.copy_from_slice(&hash.clone().finalize());
        }
        if let Some(hash) = &self.sha256 {
            self.prev_sha256.copy_from_slice(&hash.clone().finalize());
        }
        if let Some(hash) = &self.sha384 {
            self.prev_sha384.copy_from_slice(&hash.clone().finalize());
        }
    }

    /// Snapshot of one transcript hash, `None` if the hash is not live.
    pub fn prev_digest(&self, hash: HashType) -> Option<&[u8]> {
        match hash {
            HashType::Md5 => self.md5.is_some().then_some(&self.prev_md5[..]),
            HashType::Sha1 => self.sha1.is_some().then_some(&self.prev_sha1[..]),
            HashType::Sha256 => self.sha256.is_some().then_some(&self.prev_sha256[..]),
            HashType::Sha384 => self.sha384.is_some().then_some(&self.prev_sha384[..]),
            HashType::Sha512 => None,
        }
    }

    /// Stop maintaining SHA-256 and SHA-384 once TLS < 1.2 is negotiated.
    pub fn drop_pre_tls12(&mut self) {
        self.sha256 = None;
        self.sha384 = None;
    }

    /// Stop maintaining every hash except the given ones.
    pub fn retain(&mut self, keep_a: HashType, keep_b: HashType) {
        let keep = |hash: HashType| hash == keep_a || hash == keep_b;
        if !keep(HashType::Md5) {
            self.md5 = None;
        }
        if !keep(HashType::Sha1) {
            self.sha1 = None;
        }
        if !keep(HashType::Sha256) {
            self.sha256 = None;
        }
        if !keep(HashType::Sha384) {
            self.sha384 = None;
        }
    }
}

impl Drop for TranscriptHashes {
    fn drop(&mut self) {
        self.prev_md5.zeroize();
        self.prev_sha1.zeroize();
        self.prev_sha256.zeroize();
        self.prev_sha384.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls12_prf_prefix_property() {
        let secret: [u8; 16] = [0xAB; 16];
        let mut short: [u8; 20] = [0; 20];
        let mut long: [u8; 100] = [0; 100];

        prf_tls12(HashType::Sha256, &secret, b"test label", b"seed", &mut short);
        prf_tls12(HashType::Sha256, &secret, b"test label", b"seed", &mut long);
        assert_eq!(short, long[..20]);
    }

    #[test]
    fn tls10_prf_half_split() {
        // odd-length secret: the halves overlap by one byte
        let secret: [u8; 7] = [1, 2, 3, 4, 5, 6, 7];
        let mut out: [u8; 32] = [0; 32];
        prf_tls10(&secret, b"label", b"seed", &mut out);

        let mut md5_half: [u8; 32] = [0; 32];
        let mut sha1_half: [u8; 32] = [0; 32];
        prf_tls12(HashType::Md5, &secret[..4], b"label", b"seed", &mut md5_half);
        prf_tls12(HashType::Sha1, &secret[3..], b"label", b"seed", &mut sha1_half);

        for i in 0..32 {
            assert_eq!(out[i], md5_half[i] ^ sha1_half[i]);
        }
    }

    /// RFC 5246 TLS 1.2 PRF test vector (SHA-256), widely published from
    /// the IETF TLS working group verification set.
    #[test]
    fn tls12_prf_vector() {
        use hex_literal::hex;

        let secret: [u8; 16] = hex!("9bbe436ba940f017b17652849a71db35");
        let seed: [u8; 16] = hex!("a0ba9f936cda311827a6f796ffd5198c");
        let mut out: [u8; 100] = [0; 100];
        prf_tls12(HashType::Sha256, &secret, b"test label", &seed, &mut out);

        let expected: [u8; 100] = hex!(
            "e3f229ba727be17b8d122620557cd453c2aab21d07c3d495329b52d4e61edb5a"
            "6b301791e90d35c9c9a46b4e14baf9af0fa022f7077def17abfd3797c0564bab"
            "4fbc91666e9def9b97fce34f796789baa48082d122ee42c5a72e5a5110fff701"
            "87347b66"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn transcript_snapshot_precedes_update() {
        let mut transcript: TranscriptHashes = TranscriptHashes::new();
        transcript.update(b"first message");
        transcript.snapshot();
        transcript.update(b"finished message");

        let mut current: [u8; 32] = [0; 32];
        assert!(transcript.digest(HashType::Sha256, &mut current));

        let prev: &[u8] = transcript.prev_digest(HashType::Sha256).unwrap();
        let expected: [u8; 32] = Sha256::digest(b"first message").into();
        assert_eq!(prev, expected);
        assert_ne!(prev, current);
    }

    #[test]
    fn retain_drops_others() {
        let mut transcript: TranscriptHashes = TranscriptHashes::new();
        transcript.retain(HashType::Sha256, HashType::Sha256);
        assert!(transcript.is_live(HashType::Sha256));
        assert!(!transcript.is_live(HashType::Md5));
        assert!(!transcript.is_live(HashType::Sha1));
        assert!(!transcript.is_live(HashType::Sha384));
    }
}
