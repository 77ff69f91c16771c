use crate::cert::KeyType;
use crate::cipher_suites::{CipherSuite, CIPHER_SUITE_PREF};
use crate::io::{Reader, Writer};
use crate::{AlertDescription, TlsVersion};

/// Serialize a ClientHello body.
///
/// ```text
/// struct {
///     ProtocolVersion client_version;
///     Random random;
///     SessionID session_id;
///     CipherSuite cipher_suites<2..2^16-2>;
///     CompressionMethod compression_methods<1..2^8-1>;
/// } ClientHello;
/// ```
///
/// No session ID is offered (sessions are not cached) and no extensions are
/// sent.  The suite list carries every catalogue suite compatible with the
/// local certificate; returns `None` when that list is empty.
pub(crate) fn ser(
    random: &[u8; 32],
    local_cert_key: Option<KeyType>,
) -> Option<alloc::vec::Vec<u8>> {
    let mut writer: Writer = Writer::with_capacity(64 + 2 * CIPHER_SUITE_PREF.len());

    writer.put_u16(TlsVersion::V1_2 as u16);
    writer.put_slice(random);
    // no SessionID
    writer.put_u8(0);

    let mark: usize = writer.mark();
    writer.put_u16(0);
    for suite in CIPHER_SUITE_PREF.iter() {
        // the negotiated version is unknown at this point
        if suite.is_compatible(None, local_cert_key) {
            writer.put_slice(&suite.id);
        }
    }
    if writer.len() == mark + 2 {
        error!("no compatible cipher suites for the local certificate");
        return None;
    }
    writer.patch_len_u16(mark);

    // CompressionMethod.null only
    writer.put_u8(1);
    writer.put_u8(0);

    Some(writer.into_inner())
}

/// A parsed ClientHello body.
#[derive(Debug)]
pub(crate) struct ClientHello<'a> {
    pub client_version: u16,
    pub random: [u8; 32],
    /// Offered suite identifiers, two bytes each, in client preference
    /// order.
    pub cipher_suites: &'a [u8],
    pub compression_methods: &'a [u8],
}

impl<'a> ClientHello<'a> {
    pub fn deser(body: &'a [u8]) -> Result<Self, AlertDescription> {
        let mut reader: Reader<'a> = Reader::new(body);

        let client_version: u16 = reader.next_u16()?;
        let random: [u8; 32] = reader.next_n()?;

        let session_id_len: usize = reader.next_u8()?.into();
        reader.skip_n(session_id_len)?;

        let cipher_suites_len: usize = reader.next_u16()?.into();
        if cipher_suites_len == 0 || cipher_suites_len % 2 != 0 {
            return Err(AlertDescription::DecodeError);
        }
        let cipher_suites: &'a [u8] = reader.next_slice(cipher_suites_len)?;

        let compression_methods_len: usize = reader.next_u8()?.into();
        if compression_methods_len == 0 {
            return Err(AlertDescription::DecodeError);
        }
        let compression_methods: &'a [u8] = reader.next_slice(compression_methods_len)?;

        // extensions are decoded for length sanity and otherwise ignored
        if !reader.is_empty() {
            let extensions_len: usize = reader.next_u16()?.into();
            if reader.remain() != extensions_len {
                return Err(AlertDescription::DecodeError);
            }
        }

        Ok(Self {
            client_version,
            random,
            cipher_suites,
            compression_methods,
        })
    }

    /// First client-offered suite that we support and that is compatible
    /// with the negotiated context.
    pub fn select_suite(
        &self,
        negotiated_version: TlsVersion,
        local_cert_key: Option<KeyType>,
    ) -> Option<&'static CipherSuite> {
        self.cipher_suites.chunks_exact(2).find_map(|id| {
            let id: [u8; 2] = unwrap!(id.try_into());
            CipherSuite::find(&id)
                .filter(|suite| suite.is_compatible(Some(negotiated_version), local_cert_key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ser_deser() {
        let random: [u8; 32] = [0x5A; 32];
        let body: alloc::vec::Vec<u8> = ser(&random, Some(KeyType::Rsa)).unwrap();

        let hello: ClientHello = ClientHello::deser(&body).unwrap();
        assert_eq!(hello.client_version, 0x0303);
        assert_eq!(hello.random, random);
        assert_eq!(hello.cipher_suites.len(), 2 * CIPHER_SUITE_PREF.len());
        assert_eq!(hello.compression_methods, &[0]);
    }

    #[test]
    fn deser_rejects_odd_suite_length() {
        let mut body: alloc::vec::Vec<u8> = ser(&[0; 32], None).unwrap();
        // session id is empty: the suite length field is at offset 35
        body[36] = 3;
        assert_eq!(
            ClientHello::deser(&body).unwrap_err(),
            AlertDescription::DecodeError
        );
    }

    #[test]
    fn select_honors_client_preference() {
        let mut body: alloc::vec::Vec<u8> = alloc::vec::Vec::new();
        body.extend_from_slice(&0x0303u16.to_be_bytes());
        body.extend_from_slice(&[0; 32]);
        // empty session id
        body.push(0);
        body.extend_from_slice(&4u16.to_be_bytes());
        // RC4-MD5 preferred over AES-128-CBC-SHA
        body.extend_from_slice(&[0x00, 0x04, 0x00, 0x2f]);
        body.push(1);
        body.push(0);

        let hello: ClientHello = ClientHello::deser(&body).unwrap();
        let suite: &CipherSuite = hello.select_suite(TlsVersion::V1_2, None).unwrap();
        assert_eq!(suite.id, [0x00, 0x04]);
    }
}
