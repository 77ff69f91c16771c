//! X.509 certificates and certificate chains.
//!
//! Certificates are kept as opaque DER with a cached public-key algorithm
//! tag; structure is parsed on demand through the `x509-cert`/`der` stack.

use crate::crypto;
use crate::key_schedule::HashType;
use alloc::string::String;
use alloc::vec::Vec;
use const_oid::ObjectIdentifier;
use der::Tagged;
use der::{Decode, Encode};
use md5::Md5;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_MD5_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.4");
const OID_SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const OID_SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const OID_SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

const OID_DN_ORGANIZATION_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_DN_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Subject public key algorithm of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyType {
    /// rsaEncryption.
    Rsa,
    /// Any algorithm not in the supported set.
    Unknown,
}

/// Parse a DER definite length, returning `(content_len, header_len)`.
fn der_definite_length(buf: &[u8]) -> Option<(usize, usize)> {
    let first: u8 = *buf.first()?;
    if first < 0x80 {
        return Some((usize::from(first), 1));
    }

    let len_bytes: usize = usize::from(first & 0x7f);
    if len_bytes == 0 || len_bytes > 4 || buf.len() < 1 + len_bytes {
        return None;
    }

    let mut content_len: usize = 0;
    for &byte in &buf[1..1 + len_bytes] {
        content_len = (content_len << 8) | usize::from(byte);
    }
    Some((content_len, 1 + len_bytes))
}

/// An X.509 certificate.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    parsed: x509_cert::Certificate,
    key_type: KeyType,
}

impl Certificate {
    /// Create a certificate from DER bytes.
    ///
    /// Returns `None` unless the outermost SEQUENCE spans exactly the
    /// buffer with at least 64 bytes of content and the structure is sound
    /// through the SubjectPublicKeyInfo AlgorithmIdentifier.
    pub fn from_der(der: &[u8]) -> Option<Self> {
        // Sanity check: outer element is a SEQUENCE spanning the buffer
        if *der.first()? != 0x30 {
            return None;
        }
        let (content_len, header_len) = der_definite_length(&der[1..])?;
        if content_len < 64 || 1 + header_len + content_len != der.len() {
            return None;
        }

        let parsed: x509_cert::Certificate = x509_cert::Certificate::from_der(der).ok()?;

        let key_type: KeyType =
            if parsed.tbs_certificate.subject_public_key_info.algorithm.oid == OID_RSA_ENCRYPTION {
                KeyType::Rsa
            } else {
                KeyType::Unknown
            };

        Some(Self {
            der: der.to_vec(),
            parsed,
            key_type,
        })
    }

    /// The original DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Cached subject public key algorithm.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// DER-encoded subject distinguished name.
    pub fn subject_dn(&self) -> Option<Vec<u8>> {
        self.parsed.tbs_certificate.subject.to_der().ok()
    }

    /// The subject public key as an RSA key.
    ///
    /// Returns `None` when the cached key type is not [`KeyType::Rsa`] or
    /// the key material does not decode.
    pub fn public_key(&self) -> Option<RsaPublicKey> {
        if self.key_type != KeyType::Rsa {
            return None;
        }
        let spki_key: &[u8] = self
            .parsed
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .as_bytes()?;
        RsaPublicKey::from_pkcs1_der(spki_key).ok()
    }

    /// Human-readable peer identity from the subject DN.
    ///
    /// organizationName takes priority, commonName is second.
    pub fn identity(&self) -> Option<String> {
        let mut common_name: Option<String> = None;

        for rdn in self.parsed.tbs_certificate.subject.0.iter() {
            for atv in rdn.0.iter() {
                let tag: der::Tag = atv.value.tag();
                if tag != der::Tag::PrintableString && tag != der::Tag::Utf8String {
                    continue;
                }
                let value: Option<String> =
                    core::str::from_utf8(atv.value.value()).ok().map(String::from);

                if atv.oid == OID_DN_ORGANIZATION_NAME {
                    if value.is_some() {
                        return value;
                    }
                } else if atv.oid == OID_DN_COMMON_NAME && common_name.is_none() {
                    common_name = value;
                }
            }
        }

        common_name
    }

    /// Verify this certificate's signature under the issuer's public key.
    ///
    /// RSA PKCS#1 v1.5 over the TBSCertificate, hash selected by the
    /// signature AlgorithmIdentifier.
    pub fn verify_signed_by(&self, issuer_key: &RsaPublicKey) -> bool {
        let tbs: Vec<u8> = match self.parsed.tbs_certificate.to_der() {
            Ok(tbs) => tbs,
            Err(_) => return false,
        };

        let sig_oid: ObjectIdentifier = self.parsed.signature_algorithm.oid;
        let (hash, digest): (HashType, Vec<u8>) = if sig_oid == OID_MD5_WITH_RSA {
            (HashType::Md5, Md5::digest(&tbs).to_vec())
        } else if sig_oid == OID_SHA1_WITH_RSA {
            (HashType::Sha1, Sha1::digest(&tbs).to_vec())
        } else if sig_oid == OID_SHA256_WITH_RSA {
            (HashType::Sha256, Sha256::digest(&tbs).to_vec())
        } else if sig_oid == OID_SHA384_WITH_RSA {
            (HashType::Sha384, Sha384::digest(&tbs).to_vec())
        } else if sig_oid == OID_SHA512_WITH_RSA {
            (HashType::Sha512, Sha512::digest(&tbs).to_vec())
        } else {
            debug!("unsupported certificate signature algorithm");
            return false;
        };

        let signature: &[u8] = match self.parsed.signature.as_bytes() {
            Some(signature) => signature,
            None => return false,
        };

        let expected: Vec<u8> = crypto::digest_info(hash, &digest);
        crypto::rsa_verify(issuer_key, &expected, signature)
    }
}

impl core::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
        write!(
            f,
            "Certificate {{ der: {} bytes, key_type: {:?} }}",
            self.der.len(),
            self.key_type
        )
    }
}

/// Certificates from a PEM bundle, in file order.
pub fn certs_from_pem(pem: &[u8]) -> Option<Vec<Certificate>> {
    let parsed: Vec<x509_cert::Certificate> =
        x509_cert::Certificate::load_pem_chain(pem).ok()?;
    if parsed.is_empty() {
        return None;
    }

    let mut certs: Vec<Certificate> = Vec::with_capacity(parsed.len());
    for cert in parsed {
        certs.push(Certificate::from_der(&cert.to_der().ok()?)?);
    }
    Some(certs)
}

/// An ordered certificate chain: index 0 is the end-entity ("leaf"), the
/// last element is the topmost authority ("ca").
///
/// The issuer/issued relationships of adjacent certificates are implicit in
/// the ordering; a chain is never empty.
#[derive(Debug, Clone)]
pub struct CertChain {
    certs: Vec<Certificate>,
}

impl CertChain {
    /// Create a chain holding only the end-entity certificate.
    pub fn from_leaf(leaf: Certificate) -> Self {
        let mut certs: Vec<Certificate> = Vec::with_capacity(4);
        certs.push(leaf);
        Self { certs }
    }

    /// Link a new topmost issuer.
    pub fn link_issuer(&mut self, issuer: Certificate) {
        self.certs.push(issuer);
    }

    /// The end-entity certificate.
    pub fn leaf(&self) -> &Certificate {
        // a chain is never empty by construction
        unwrap!(self.certs.first())
    }

    /// The topmost certificate.
    pub fn ca(&self) -> &Certificate {
        unwrap!(self.certs.last())
    }

    /// Number of certificates in the chain.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Iterate from the leaf up to the ca.
    pub fn iter_leaf_to_ca(&self) -> impl Iterator<Item = &Certificate> {
        self.certs.iter()
    }

    /// Iterate from the ca down to the leaf.
    pub fn iter_ca_to_leaf(&self) -> impl Iterator<Item = &Certificate> {
        self.certs.iter().rev()
    }

    /// Build a chain from a PEM bundle, leaf first.
    pub fn from_pem(pem: &[u8]) -> Option<Self> {
        let mut certs: alloc::vec::IntoIter<Certificate> = certs_from_pem(pem)?.into_iter();
        let mut chain: CertChain = CertChain::from_leaf(certs.next()?);
        for issuer in certs {
            chain.link_issuer(issuer);
        }
        Some(chain)
    }

    /// Verify the chain, optionally against a set of trusted CA
    /// certificates.
    ///
    /// The verification is a fold from the ca end down to the leaf: each
    /// certificate must carry an RSA PKCS#1 signature valid under the
    /// currently trusted public key, which its own key then replaces.
    ///
    /// The trust anchor is seeded as follows. A chain top byte-identical
    /// to a member of `ca_certs` is popped without verification (RFC 5246
    /// 7.4.2 allows omitting the self-signed root; shipping it anyway must
    /// not fail on roots without an AKID extension) and the next
    /// certificate's own key becomes the anchor; if nothing follows the
    /// chain is trivially valid. Otherwise the top certificate must verify
    /// under one of the CA keys. With no CA set at all the top is accepted
    /// as-is and only the chain's internal consistency is checked.
    pub fn verify(&self, ca_certs: Option<&[Certificate]>) -> bool {
        // remaining[0] is the current top, walking toward the leaf
        let mut remaining = self.certs.iter().rev();

        let top: &Certificate = unwrap!(remaining.next());

        let mut trusted: RsaPublicKey = match ca_certs {
            Some(cas) if cas.iter().any(|ca| ca.der == top.der) => {
                let next: &Certificate = match remaining.next() {
                    Some(next) => next,
                    None => return true,
                };
                match next.public_key() {
                    Some(key) => key,
                    None => return false,
                }
            }
            Some(cas) => {
                let signed_by_ca: bool = cas
                    .iter()
                    .filter_map(Certificate::public_key)
                    .any(|ca_key| top.verify_signed_by(&ca_key));
                if !signed_by_ca {
                    debug!("chain top not signed by any trusted CA");
                    return false;
                }
                match top.public_key() {
                    Some(key) => key,
                    None => return false,
                }
            }
            None => match top.public_key() {
                Some(key) => key,
                None => return false,
            },
        };

        for cert in remaining {
            if !cert.verify_signed_by(&trusted) {
                debug!("chain link signature verification failed");
                return false;
            }
            trusted = match cert.public_key() {
                Some(key) => key,
                None => return false,
            };
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA_PEM: &[u8] = include_bytes!("../tests/assets/ca.pem");
    const SERVER_PEM: &[u8] = include_bytes!("../tests/assets/server.pem");
    const CLIENT_PEM: &[u8] = include_bytes!("../tests/assets/client.pem");

    fn load_one(pem: &[u8]) -> Certificate {
        certs_from_pem(pem).unwrap().remove(0)
    }

    #[test]
    fn der_round_trip() {
        let cert: Certificate = load_one(SERVER_PEM);
        let again: Certificate = Certificate::from_der(cert.der()).unwrap();
        assert_eq!(cert.der(), again.der());
        assert_eq!(again.key_type(), KeyType::Rsa);
    }

    #[test]
    fn from_der_rejects_garbage() {
        assert!(Certificate::from_der(&[]).is_none());
        assert!(Certificate::from_der(&[0x30, 0x03, 1, 2, 3]).is_none());
        // valid header, truncated body
        let cert: Certificate = load_one(SERVER_PEM);
        let truncated: &[u8] = &cert.der()[..cert.der().len() - 1];
        assert!(Certificate::from_der(truncated).is_none());
    }

    #[test]
    fn identity_prefers_organization() {
        let cert: Certificate = load_one(SERVER_PEM);
        assert_eq!(cert.identity().unwrap(), "Example Server Org");
    }

    #[test]
    fn subject_dn_present() {
        let cert: Certificate = load_one(SERVER_PEM);
        let dn: Vec<u8> = cert.subject_dn().unwrap();
        // DER SEQUENCE
        assert_eq!(dn[0], 0x30);
    }

    #[test]
    fn chain_verifies_against_ca() {
        let ca: Certificate = load_one(CA_PEM);
        let server: Certificate = load_one(SERVER_PEM);
        let chain: CertChain = CertChain::from_leaf(server);

        assert!(chain.verify(Some(core::slice::from_ref(&ca))));
        assert!(chain.verify(None));
    }

    #[test]
    fn chain_rejects_wrong_ca() {
        let server: Certificate = load_one(SERVER_PEM);
        let client: Certificate = load_one(CLIENT_PEM);
        let chain: CertChain = CertChain::from_leaf(server);

        // the client cert is not a CA for the server cert
        assert!(!chain.verify(Some(core::slice::from_ref(&client))));
    }

    #[test]
    fn identical_root_in_chain_is_popped() {
        let ca: Certificate = load_one(CA_PEM);
        let server: Certificate = load_one(SERVER_PEM);

        let mut chain: CertChain = CertChain::from_leaf(server);
        chain.link_issuer(ca.clone());
        assert_eq!(chain.len(), 2);

        assert!(chain.verify(Some(core::slice::from_ref(&ca))));
    }
}
