use crate::cert::Certificate;
use crate::io::{Reader, Writer};
use crate::key_schedule::{HashType, TranscriptHashes};
use crate::{AlertDescription, TlsVersion};

// ClientCertificateType rsa_sign
const CERT_TYPE_RSA_SIGN: u8 = 1;

// SignatureAndHashAlgorithm pairs offered to the peer, strongest first:
// SHA512, SHA384, SHA256, SHA1, MD5, all with RSA
const SIGNATURE_HASH_PREF: [[u8; 2]; 5] = [[6, 1], [5, 1], [4, 1], [2, 1], [1, 1]];

/// Serialize a CertificateRequest body.
///
/// ```text
/// struct {
///     ClientCertificateType certificate_types<1..2^8-1>;
///     SignatureAndHashAlgorithm supported_signature_algorithms<2^16-1>;  /* TLS 1.2 */
///     DistinguishedName certificate_authorities<0..2^16-1>;
/// } CertificateRequest;
/// ```
pub(crate) fn ser(version: TlsVersion, ca_certs: &[Certificate]) -> alloc::vec::Vec<u8> {
    let mut writer: Writer = Writer::new();

    writer.put_u8(1);
    writer.put_u8(CERT_TYPE_RSA_SIGN);

    if version >= TlsVersion::V1_2 {
        writer.put_u16(2 * SIGNATURE_HASH_PREF.len() as u16);
        for pair in SIGNATURE_HASH_PREF.iter() {
            writer.put_slice(pair);
        }
    }

    let dn_mark: usize = writer.mark();
    writer.put_u16(0);
    for ca_cert in ca_certs {
        if let Some(dn) = ca_cert.subject_dn() {
            writer.put_u16(dn.len() as u16);
            writer.put_slice(&dn);
        }
    }
    writer.patch_len_u16(dn_mark);

    writer.into_inner()
}

/// Parse a CertificateRequest body and select the CertificateVerify
/// signature hash.
///
/// Returns `None` at TLS <= 1.1 (the hash pair is fixed).  At TLS 1.2
/// SHA-256 is preferred when offered; otherwise the first offered hash for
/// which a transcript digest is still maintained wins; no usable hash is
/// `unsupported_certificate`.
pub(crate) fn deser(
    body: &[u8],
    version: TlsVersion,
    transcript: &TranscriptHashes,
) -> Result<Option<HashType>, AlertDescription> {
    let mut reader: Reader = Reader::new(body);

    let cert_type_len: usize = reader.next_u8()?.into();
    reader.skip_n(cert_type_len)?;

    let signature_hash: Option<HashType> = if version >= TlsVersion::V1_2 {
        let signature_hash_len: usize = reader.next_u16()?.into();
        if signature_hash_len % 2 != 0 {
            return Err(AlertDescription::DecodeError);
        }
        let pairs: &[u8] = reader.next_slice(signature_hash_len)?;

        let mut selected: Option<HashType> = None;
        for pair in pairs.chunks_exact(2) {
            // ignore hash types for signatures other than RSA
            if pair[1] != 1 {
                continue;
            }

            if pair[0] == HashType::Sha256.tls_id() {
                selected = Some(HashType::Sha256);
                break;
            }

            if selected.is_none() {
                if let Some(hash) = HashType::from_tls_id(pair[0]) {
                    if transcript.is_live(hash) {
                        selected = Some(hash);
                    }
                }
            }
        }

        match selected {
            Some(hash) => Some(hash),
            None => {
                error!("no supported signature hash type");
                return Err(AlertDescription::UnsupportedCertificate);
            }
        }
    } else {
        None
    };

    let dn_len: usize = reader.next_u16()?.into();
    if reader.remain() != dn_len {
        return Err(AlertDescription::DecodeError);
    }

    Ok(signature_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ser_deser_tls12() {
        let body: alloc::vec::Vec<u8> = ser(TlsVersion::V1_2, &[]);
        let transcript: TranscriptHashes = TranscriptHashes::new();
        let hash: Option<HashType> = deser(&body, TlsVersion::V1_2, &transcript).unwrap();
        assert_eq!(hash, Some(HashType::Sha256));
    }

    #[test]
    fn ser_deser_tls10() {
        let body: alloc::vec::Vec<u8> = ser(TlsVersion::V1_0, &[]);
        let transcript: TranscriptHashes = TranscriptHashes::new();
        assert_eq!(deser(&body, TlsVersion::V1_0, &transcript).unwrap(), None);
    }

    #[test]
    fn falls_back_to_first_live_hash() {
        let mut writer: Writer = Writer::new();
        writer.put_u8(1);
        writer.put_u8(CERT_TYPE_RSA_SIGN);
        // SHA384+RSA and SHA1+RSA offered, no SHA256
        writer.put_u16(4);
        writer.put_slice(&[5, 1, 2, 1]);
        writer.put_u16(0);
        let body: alloc::vec::Vec<u8> = writer.into_inner();

        let transcript: TranscriptHashes = TranscriptHashes::new();
        let hash: Option<HashType> = deser(&body, TlsVersion::V1_2, &transcript).unwrap();
        assert_eq!(hash, Some(HashType::Sha384));
    }

    #[test]
    fn no_usable_hash() {
        let mut writer: Writer = Writer::new();
        writer.put_u8(1);
        writer.put_u8(CERT_TYPE_RSA_SIGN);
        // SHA512+RSA only: no transcript hash is maintained for it
        writer.put_u16(2);
        writer.put_slice(&[6, 1]);
        writer.put_u16(0);
        let body: alloc::vec::Vec<u8> = writer.into_inner();

        let transcript: TranscriptHashes = TranscriptHashes::new();
        assert_eq!(
            deser(&body, TlsVersion::V1_2, &transcript).unwrap_err(),
            AlertDescription::UnsupportedCertificate
        );
    }
}
