//! Pairwise transient key derivation.
//!
//! # References
//!
//! * IEEE Std 802.11-2016, 12.7.1.2 (PRF) and 12.7.1.3 (pairwise key
//!   hierarchy)

use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// IEEE 802.11 PRF: `HMAC-SHA1(K, A || 0x00 || B || i)` concatenated over
/// an incrementing counter byte.
pub(crate) fn prf_sha1(key: &[u8], label: &[u8], data: &[u8], out: &mut [u8]) {
    let mut offset: usize = 0;
    let mut counter: u8 = 0;

    while offset < out.len() {
        let mut mac: Hmac<Sha1> = unwrap!(<Hmac<Sha1> as Mac>::new_from_slice(key).ok());
        mac.update(label);
        mac.update(&[0x00]);
        mac.update(data);
        mac.update(&[counter]);
        let chunk: [u8; 20] = mac.finalize().into_bytes().into();

        let chunk_len: usize = core::cmp::min(chunk.len(), out.len() - offset);
        out[offset..offset + chunk_len].copy_from_slice(&chunk[..chunk_len]);
        offset += chunk_len;
        counter += 1;
    }
}

/// The pairwise transient key split into its CCMP parts.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Ptk {
    /// Key confirmation key, authenticates EAPoL-Key MICs.
    pub kck: [u8; 16],
    /// Key encryption key, wraps the key-data section.
    pub kek: [u8; 16],
    /// Temporal key handed to the datapath.
    pub tk: [u8; 16],
}

impl Ptk {
    /// `PTK = PRF-384(PMK, "Pairwise key expansion",
    /// min(AA,SPA) || max(AA,SPA) || min(ANonce,SNonce) || max(ANonce,SNonce))`
    pub fn derive(
        pmk: &[u8; 32],
        aa: &[u8; 6],
        spa: &[u8; 6],
        anonce: &[u8; 32],
        snonce: &[u8; 32],
    ) -> Self {
        let mut data: [u8; 76] = [0; 76];

        let (addr_lo, addr_hi): (&[u8; 6], &[u8; 6]) = if aa < spa { (aa, spa) } else { (spa, aa) };
        data[..6].copy_from_slice(addr_lo);
        data[6..12].copy_from_slice(addr_hi);

        let (nonce_lo, nonce_hi): (&[u8; 32], &[u8; 32]) = if anonce < snonce {
            (anonce, snonce)
        } else {
            (snonce, anonce)
        };
        data[12..44].copy_from_slice(nonce_lo);
        data[44..76].copy_from_slice(nonce_hi);

        let mut ptk: [u8; 48] = [0; 48];
        prf_sha1(pmk, b"Pairwise key expansion", &data, &mut ptk);
        data.zeroize();

        let result: Self = Self {
            kck: unwrap!(ptk[..16].try_into().ok()),
            kek: unwrap!(ptk[16..32].try_into().ok()),
            tk: unwrap!(ptk[32..48].try_into().ok()),
        };
        ptk.zeroize();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    /// IEEE 802.11-2016 J.3 PRF test vector: PRF-512 of "Jefe" /
    /// "prefix" / "what do ya want for nothing?".
    #[test]
    fn prf_sha1_vector() {
        let mut out: [u8; 64] = [0; 64];
        prf_sha1(b"Jefe", b"prefix", b"what do ya want for nothing?", &mut out);

        let expected: [u8; 64] = hex!(
            "51f4de5b33f249adf81aeb713a3c20f4fe631446fabdfa58244759ae58ef9009"
            "a99abf4eac2ca5fa87e692c440eb40023e7babb206d61de7b92f41529092b8fc"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn derive_is_order_invariant() {
        let pmk: [u8; 32] = [7; 32];
        let aa: [u8; 6] = [2, 0, 0, 0, 0, 0];
        let spa: [u8; 6] = [2, 0, 0, 0, 1, 0];
        let anonce: [u8; 32] = [0xAA; 32];
        let snonce: [u8; 32] = [0x55; 32];

        let forward: Ptk = Ptk::derive(&pmk, &aa, &spa, &anonce, &snonce);
        // swapping the roles of the addresses and nonces changes nothing,
        // both sides must derive the same PTK
        let swapped: Ptk = Ptk::derive(&pmk, &spa, &aa, &snonce, &anonce);

        assert_eq!(forward.kck, swapped.kck);
        assert_eq!(forward.kek, swapped.kek);
        assert_eq!(forward.tk, swapped.tk);
    }
}
