use crate::io::{Reader, Writer};
use crate::AlertDescription;

/// Serialize a ServerHello body.
///
/// ```text
/// struct {
///     ProtocolVersion server_version;
///     Random random;
///     SessionID session_id;
///     CipherSuite cipher_suite;
///     CompressionMethod compression_method;
/// } ServerHello;
/// ```
///
/// Sessions are not cached, so the session ID is empty; no extensions are
/// echoed.
pub(crate) fn ser(version: u16, random: &[u8; 32], suite_id: &[u8; 2]) -> alloc::vec::Vec<u8> {
    let mut writer: Writer = Writer::with_capacity(2 + 32 + 1 + 2 + 1);
    writer.put_u16(version);
    writer.put_slice(random);
    writer.put_u8(0);
    writer.put_slice(suite_id);
    // CompressionMethod.null
    writer.put_u8(0);
    writer.into_inner()
}

/// A parsed ServerHello body.
#[derive(Debug)]
pub(crate) struct ServerHello {
    pub server_version: u16,
    pub random: [u8; 32],
    pub cipher_suite_id: [u8; 2],
    pub compression_method: u8,
}

impl ServerHello {
    pub fn deser(body: &[u8]) -> Result<Self, AlertDescription> {
        let mut reader: Reader = Reader::new(body);

        let server_version: u16 = reader.next_u16()?;
        let random: [u8; 32] = reader.next_n()?;

        let session_id_len: usize = reader.next_u8()?.into();
        reader.skip_n(session_id_len)?;

        let cipher_suite_id: [u8; 2] = reader.next_n()?;
        let compression_method: u8 = reader.next_u8()?;

        // we offered no extensions, so none may be echoed
        if !reader.is_empty() {
            error!("ServerHello contains extensions");
            return Err(AlertDescription::UnsupportedExtension);
        }

        Ok(Self {
            server_version,
            random,
            cipher_suite_id,
            compression_method,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ser_deser() {
        let random: [u8; 32] = [0xA5; 32];
        let body: alloc::vec::Vec<u8> = ser(0x0303, &random, &[0x00, 0x2f]);

        let hello: ServerHello = ServerHello::deser(&body).unwrap();
        assert_eq!(hello.server_version, 0x0303);
        assert_eq!(hello.random, random);
        assert_eq!(hello.cipher_suite_id, [0x00, 0x2f]);
        assert_eq!(hello.compression_method, 0);
    }

    #[test]
    fn deser_rejects_extensions() {
        let mut body: alloc::vec::Vec<u8> = ser(0x0303, &[0; 32], &[0x00, 0x35]);
        body.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(
            ServerHello::deser(&body).unwrap_err(),
            AlertDescription::UnsupportedExtension
        );
    }
}
