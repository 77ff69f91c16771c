//! Cipher suite catalogue.
//!
//! # References
//!
//! * [RFC 5246 Appendix A.5](https://datatracker.ietf.org/doc/html/rfc5246#appendix-A.5)
//! * [RFC 5288](https://datatracker.ietf.org/doc/html/rfc5288) AES-GCM suites

use crate::cert::KeyType;
use crate::key_schedule::HashType;
use crate::TlsVersion;

/// How the record layer applies the bulk cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CipherKind {
    /// Stream cipher (ARC4).
    Stream,
    /// Block cipher in CBC mode.
    Block,
    /// Authenticated encryption with associated data (AES-GCM).
    Aead,
}

/// Bulk encryption parameters of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BulkEncryption {
    /// Cipher kind.
    pub kind: CipherKind,
    /// Encryption key length in bytes.
    pub key_len: usize,
    /// IV length in bytes (nonce length for AEAD).
    pub iv_len: usize,
    /// Implicit-nonce length for AEAD, zero otherwise.
    pub fixed_iv_len: usize,
    /// Cipher block length, zero for stream ciphers.
    pub block_len: usize,
    /// Authentication tag length for AEAD, zero otherwise.
    pub tag_len: usize,
}

const RC4: BulkEncryption = BulkEncryption {
    kind: CipherKind::Stream,
    key_len: 16,
    iv_len: 0,
    fixed_iv_len: 0,
    block_len: 0,
    tag_len: 0,
};

const AES_128_CBC: BulkEncryption = BulkEncryption {
    kind: CipherKind::Block,
    key_len: 16,
    iv_len: 16,
    fixed_iv_len: 0,
    block_len: 16,
    tag_len: 0,
};

const AES_256_CBC: BulkEncryption = BulkEncryption {
    kind: CipherKind::Block,
    key_len: 32,
    iv_len: 16,
    fixed_iv_len: 0,
    block_len: 16,
    tag_len: 0,
};

const DES3_EDE_CBC: BulkEncryption = BulkEncryption {
    kind: CipherKind::Block,
    key_len: 24,
    iv_len: 8,
    fixed_iv_len: 0,
    block_len: 8,
    tag_len: 0,
};

const AES_128_GCM: BulkEncryption = BulkEncryption {
    kind: CipherKind::Aead,
    key_len: 16,
    iv_len: 12,
    fixed_iv_len: 4,
    block_len: 0,
    tag_len: 16,
};

const AES_256_GCM: BulkEncryption = BulkEncryption {
    kind: CipherKind::Aead,
    key_len: 32,
    iv_len: 12,
    fixed_iv_len: 4,
    block_len: 0,
    tag_len: 16,
};

/// Record MAC parameters of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAlgorithm {
    /// HMAC hash.
    pub hash: HashType,
    /// MAC (and MAC key) length in bytes.
    pub mac_len: usize,
}

const MAC_MD5: MacAlgorithm = MacAlgorithm {
    hash: HashType::Md5,
    mac_len: 16,
};

const MAC_SHA: MacAlgorithm = MacAlgorithm {
    hash: HashType::Sha1,
    mac_len: 20,
};

const MAC_SHA256: MacAlgorithm = MacAlgorithm {
    hash: HashType::Sha256,
    mac_len: 32,
};

/// Key exchange algorithm of a cipher suite.
///
/// RSA key transport is the only variant today; the enum leaves room for
/// DH/ECDHE without changing the dispatch sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyExchange {
    /// RSA key transport with certificate authentication.
    Rsa,
}

impl KeyExchange {
    /// TLS SignatureAlgorithm identifier.
    pub(crate) const fn signature_id(self) -> u8 {
        match self {
            // RSA_sign
            Self::Rsa => 1,
        }
    }

    /// Whether the key exchange authenticates with certificates.
    pub(crate) const fn certificate_check(self) -> bool {
        match self {
            Self::Rsa => true,
        }
    }

    /// RFC 5246 7.4.2: the end-entity certificate's public key must be
    /// compatible with the selected key exchange algorithm.
    pub(crate) fn validate_cert_key_type(self, key_type: KeyType) -> bool {
        match self {
            Self::Rsa => key_type == KeyType::Rsa,
        }
    }
}

/// A TLS cipher suite.
#[derive(Debug, PartialEq, Eq)]
pub struct CipherSuite {
    /// Two-byte suite identifier.
    pub id: [u8; 2],
    /// IANA suite name.
    pub name: &'static str,
    /// Finished verify_data length in bytes.
    pub verify_data_length: usize,
    /// Bulk encryption parameters.
    pub encryption: BulkEncryption,
    /// Record MAC, `None` for AEAD suites.
    pub mac: Option<MacAlgorithm>,
    /// PRF hash override for TLS 1.2, `None` selects SHA-256.
    pub prf_hash: Option<HashType>,
    /// Key exchange algorithm.
    pub key_exchange: KeyExchange,
}

/// Supported cipher suites in server preference order.
pub(crate) static CIPHER_SUITE_PREF: [CipherSuite; 9] = [
    CipherSuite {
        id: [0x00, 0x35],
        name: "TLS_RSA_WITH_AES_256_CBC_SHA",
        verify_data_length: 12,
        encryption: AES_256_CBC,
        mac: Some(MAC_SHA),
        prf_hash: None,
        key_exchange: KeyExchange::Rsa,
    },
    CipherSuite {
        id: [0x00, 0x2f],
        name: "TLS_RSA_WITH_AES_128_CBC_SHA",
        verify_data_length: 12,
        encryption: AES_128_CBC,
        mac: Some(MAC_SHA),
        prf_hash: None,
        key_exchange: KeyExchange::Rsa,
    },
    CipherSuite {
        id: [0x00, 0x3d],
        name: "TLS_RSA_WITH_AES_256_CBC_SHA256",
        verify_data_length: 12,
        encryption: AES_256_CBC,
        mac: Some(MAC_SHA256),
        prf_hash: None,
        key_exchange: KeyExchange::Rsa,
    },
    CipherSuite {
        id: [0x00, 0x3c],
        name: "TLS_RSA_WITH_AES_128_CBC_SHA256",
        verify_data_length: 12,
        encryption: AES_128_CBC,
        mac: Some(MAC_SHA256),
        prf_hash: None,
        key_exchange: KeyExchange::Rsa,
    },
    CipherSuite {
        id: [0x00, 0x9d],
        name: "TLS_RSA_WITH_AES_256_GCM_SHA384",
        verify_data_length: 12,
        encryption: AES_256_GCM,
        mac: None,
        prf_hash: Some(HashType::Sha384),
        key_exchange: KeyExchange::Rsa,
    },
    CipherSuite {
        id: [0x00, 0x9c],
        name: "TLS_RSA_WITH_AES_128_GCM_SHA256",
        verify_data_length: 12,
        encryption: AES_128_GCM,
        mac: None,
        prf_hash: None,
        key_exchange: KeyExchange::Rsa,
    },
    CipherSuite {
        id: [0x00, 0x0a],
        name: "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
        verify_data_length: 12,
        encryption: DES3_EDE_CBC,
        mac: Some(MAC_SHA),
        prf_hash: None,
        key_exchange: KeyExchange::Rsa,
    },
    CipherSuite {
        id: [0x00, 0x05],
        name: "TLS_RSA_WITH_RC4_128_SHA",
        verify_data_length: 12,
        encryption: RC4,
        mac: Some(MAC_SHA),
        prf_hash: None,
        key_exchange: KeyExchange::Rsa,
    },
    CipherSuite {
        id: [0x00, 0x04],
        name: "TLS_RSA_WITH_RC4_128_MD5",
        verify_data_length: 12,
        encryption: RC4,
        mac: Some(MAC_MD5),
        prf_hash: None,
        key_exchange: KeyExchange::Rsa,
    },
];

impl CipherSuite {
    /// Look up a suite by its two-byte identifier.
    pub fn find(id: &[u8; 2]) -> Option<&'static CipherSuite> {
        CIPHER_SUITE_PREF.iter().find(|suite| &suite.id == id)
    }

    /// PRF hash for this suite at TLS 1.2.
    pub(crate) fn prf_hash(&self) -> HashType {
        self.prf_hash.unwrap_or(HashType::Sha256)
    }

    /// Whether this suite can be negotiated in the given context.
    ///
    /// All catalogue primitives are compiled in through the provider
    /// crates, so compatibility reduces to the protocol rules: AEAD
    /// requires TLS 1.2, and the local certificate's key must be usable
    /// with the suite's key exchange.
    pub(crate) fn is_compatible(
        &self,
        negotiated_version: Option<TlsVersion>,
        local_cert_key: Option<KeyType>,
    ) -> bool {
        if self.encryption.kind == CipherKind::Aead
            && negotiated_version.map_or(false, |v| v < TlsVersion::V1_2)
        {
            debug!("suite {} requires TLS 1.2 for AEAD", self.name);
            return false;
        }

        if let Some(key_type) = local_cert_key {
            if !self.key_exchange.validate_cert_key_type(key_type) {
                debug!("suite {} incompatible with local certificate key", self.name);
                return false;
            }
        }

        true
    }

    /// Size of the key block expansion for this suite at `version`.
    ///
    /// RFC 5246 6.3: 2 MAC keys, 2 encryption keys, and 2 IVs; the CBC IVs
    /// are part of the key block only at TLS <= 1.0, AEAD fixed IVs always.
    pub(crate) fn key_block_size(&self, version: TlsVersion) -> usize {
        let mut size: usize = 2 * self.encryption.key_len;

        if let Some(mac) = &self.mac {
            size += 2 * mac.mac_len;
        }

        if version <= TlsVersion::V1_0 && self.encryption.kind == CipherKind::Block {
            size += 2 * self.encryption.iv_len;
        }

        size += 2 * self.encryption.fixed_iv_len;
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_known() {
        let suite: &CipherSuite = CipherSuite::find(&[0x00, 0x2f]).unwrap();
        assert_eq!(suite.name, "TLS_RSA_WITH_AES_128_CBC_SHA");
        assert!(CipherSuite::find(&[0x13, 0x01]).is_none());
    }

    #[test]
    fn aead_requires_tls12() {
        let gcm: &CipherSuite = CipherSuite::find(&[0x00, 0x9c]).unwrap();
        assert!(gcm.is_compatible(Some(TlsVersion::V1_2), None));
        assert!(!gcm.is_compatible(Some(TlsVersion::V1_1), None));
        // version not negotiated yet
        assert!(gcm.is_compatible(None, None));
    }

    #[test]
    fn key_block_sizes() {
        let cbc_sha: &CipherSuite = CipherSuite::find(&[0x00, 0x2f]).unwrap();
        // 2*20 MAC + 2*16 key
        assert_eq!(cbc_sha.key_block_size(TlsVersion::V1_2), 72);
        // TLS 1.0 adds 2*16 CBC IV
        assert_eq!(cbc_sha.key_block_size(TlsVersion::V1_0), 104);

        let gcm: &CipherSuite = CipherSuite::find(&[0x00, 0x9d]).unwrap();
        // 2*32 key + 2*4 fixed IV
        assert_eq!(gcm.key_block_size(TlsVersion::V1_2), 72);
    }
}
