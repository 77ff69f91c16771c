use crate::cert::{CertChain, Certificate};
use crate::io::{Reader, Writer};
use crate::AlertDescription;

/// Serialize a Certificate body: the chain from leaf to ca, each
/// certificate with a 3-byte length, wrapped in a 3-byte total length.
///
/// ```text
/// opaque ASN.1Cert<1..2^24-1>;
///
/// struct {
///     ASN.1Cert certificate_list<0..2^24-1>;
/// } Certificate;
/// ```
///
/// `None` produces the empty certificate list a client without a
/// certificate responds with.
pub(crate) fn ser(chain: Option<&CertChain>) -> alloc::vec::Vec<u8> {
    let total: usize = chain.map_or(0, |chain| {
        chain
            .iter_leaf_to_ca()
            .map(|cert| 3 + cert.der().len())
            .sum()
    });

    let mut writer: Writer = Writer::with_capacity(3 + total);
    writer.put_u24(total as u32);
    if let Some(chain) = chain {
        for cert in chain.iter_leaf_to_ca() {
            writer.put_u24(cert.der().len() as u32);
            writer.put_slice(cert.der());
        }
    }
    writer.into_inner()
}

/// Parse a Certificate body into a chain, `None` for an empty list.
pub(crate) fn deser(body: &[u8]) -> Result<Option<CertChain>, AlertDescription> {
    let mut reader: Reader = Reader::new(body);

    let total: usize = reader.next_u24()? as usize;
    if total != reader.remain() {
        return Err(AlertDescription::DecodeError);
    }

    let mut chain: Option<CertChain> = None;
    while !reader.is_empty() {
        let cert_len: usize = reader.next_u24()? as usize;
        let der: &[u8] = reader.next_slice(cert_len)?;

        let cert: Certificate = match Certificate::from_der(der) {
            Some(cert) => cert,
            None => {
                error!("certificate list entry failed to decode");
                return Err(AlertDescription::DecodeError);
            }
        };

        match &mut chain {
            None => chain = Some(CertChain::from_leaf(cert)),
            Some(chain) => chain.link_issuer(cert),
        }
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::certs_from_pem;

    const CA_PEM: &[u8] = include_bytes!("../../tests/assets/ca.pem");
    const SERVER_PEM: &[u8] = include_bytes!("../../tests/assets/server.pem");

    #[test]
    fn empty_list() {
        let body: alloc::vec::Vec<u8> = ser(None);
        assert_eq!(body, &[0, 0, 0]);
        assert!(deser(&body).unwrap().is_none());
    }

    #[test]
    fn two_cert_round_trip() {
        let server: Certificate = certs_from_pem(SERVER_PEM).unwrap().remove(0);
        let ca: Certificate = certs_from_pem(CA_PEM).unwrap().remove(0);
        let mut chain: CertChain = CertChain::from_leaf(server);
        chain.link_issuer(ca);

        let body: alloc::vec::Vec<u8> = ser(Some(&chain));
        let parsed: CertChain = deser(&body).unwrap().unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.leaf().der(), chain.leaf().der());
        assert_eq!(parsed.ca().der(), chain.ca().der());
    }

    #[test]
    fn total_length_mismatch() {
        let mut body: alloc::vec::Vec<u8> = ser(None);
        body.push(0xFF);
        assert_eq!(deser(&body).unwrap_err(), AlertDescription::DecodeError);
    }
}
