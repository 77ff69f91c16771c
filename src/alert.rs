/// Alert level.
///
/// # References
///
/// * [RFC 5246 Section 7.2](https://datatracker.ietf.org/doc/html/rfc5246#section-7.2)
///
/// ```text
/// enum { warning(1), fatal(2), (255) } AlertLevel;
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlertLevel {
    /// Warning.
    Warning = 1,
    /// Fatal.
    Fatal = 2,
}

impl From<AlertLevel> for u8 {
    #[inline]
    fn from(alert_level: AlertLevel) -> Self {
        alert_level as u8
    }
}

impl TryFrom<u8> for AlertLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::Warning as u8) => Ok(Self::Warning),
            x if x == (Self::Fatal as u8) => Ok(Self::Fatal),
            _ => Err(value),
        }
    }
}

/// Alert description.
///
/// # References
///
/// * [RFC 5246 Section 7.2](https://datatracker.ietf.org/doc/html/rfc5246#section-7.2)
///
/// ```text
/// enum {
///     close_notify(0),
///     unexpected_message(10),
///     bad_record_mac(20),
///     record_overflow(22),
///     decompression_failure(30),
///     handshake_failure(40),
///     bad_certificate(42),
///     unsupported_certificate(43),
///     certificate_revoked(44),
///     certificate_expired(45),
///     certificate_unknown(46),
///     illegal_parameter(47),
///     unknown_ca(48),
///     access_denied(49),
///     decode_error(50),
///     decrypt_error(51),
///     protocol_version(70),
///     insufficient_security(71),
///     internal_error(80),
///     user_canceled(90),
///     no_renegotiation(100),
///     unsupported_extension(110),
///     (255)
/// } AlertDescription;
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlertDescription {
    /// The sender will not send any more messages on this connection.
    CloseNotify = 0,
    /// An inappropriate message was received (wrong handshake message,
    /// premature application data, and so on).
    UnexpectedMessage = 10,
    /// A record was received with an incorrect MAC.
    BadRecordMac = 20,
    /// A TLSCiphertext record was received that had a length more than
    /// `2^14 + 2048` bytes.
    RecordOverflow = 22,
    /// The decompression function received improper input.
    DecompressionFailure = 30,
    /// The sender was unable to negotiate an acceptable set of security
    /// parameters given the options available.
    HandshakeFailure = 40,
    /// A certificate was corrupt, contained signatures that did not verify
    /// correctly, etc.
    BadCertificate = 42,
    /// A certificate was of an unsupported type.
    UnsupportedCertificate = 43,
    /// A certificate was revoked by its signer.
    CertificateRevoked = 44,
    /// A certificate has expired or is not currently valid.
    CertificateExpired = 45,
    /// Some other (unspecified) issue arose in processing the certificate.
    CertificateUnknown = 46,
    /// A field in the handshake was incorrect or inconsistent with other
    /// fields.
    IllegalParameter = 47,
    /// The CA certificate could not be located or could not be matched with
    /// a known trust anchor.
    UnknownCa = 48,
    /// A valid certificate was received, but access control denied
    /// continuing the negotiation.
    AccessDenied = 49,
    /// A message could not be decoded because some field was out of the
    /// specified range or the length of the message was incorrect.
    DecodeError = 50,
    /// A handshake cryptographic operation failed, including being unable
    /// to correctly verify a signature or validate a Finished message.
    DecryptError = 51,
    /// The protocol version the peer has attempted to negotiate is
    /// recognized but not supported.
    ProtocolVersion = 70,
    /// The negotiation failed because the server requires parameters more
    /// secure than those supported by the client.
    InsufficientSecurity = 71,
    /// An internal error unrelated to the peer or the correctness of the
    /// protocol makes it impossible to continue.
    InternalError = 80,
    /// The sender is canceling the handshake for some reason unrelated to
    /// a protocol failure.
    UserCanceled = 90,
    /// Secure renegotiation is not accepted.
    NoRenegotiation = 100,
    /// An extension was included that was not first offered.
    UnsupportedExtension = 110,
}

impl From<AlertDescription> for u8 {
    #[inline]
    fn from(alert_description: AlertDescription) -> Self {
        alert_description as u8
    }
}

impl TryFrom<u8> for AlertDescription {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::CloseNotify as u8) => Ok(Self::CloseNotify),
            x if x == (Self::UnexpectedMessage as u8) => Ok(Self::UnexpectedMessage),
            x if x == (Self::BadRecordMac as u8) => Ok(Self::BadRecordMac),
            x if x == (Self::RecordOverflow as u8) => Ok(Self::RecordOverflow),
            x if x == (Self::DecompressionFailure as u8) => Ok(Self::DecompressionFailure),
            x if x == (Self::HandshakeFailure as u8) => Ok(Self::HandshakeFailure),
            x if x == (Self::BadCertificate as u8) => Ok(Self::BadCertificate),
            x if x == (Self::UnsupportedCertificate as u8) => Ok(Self::UnsupportedCertificate),
            x if x == (Self::CertificateRevoked as u8) => Ok(Self::CertificateRevoked),
            x if x == (Self::CertificateExpired as u8) => Ok(Self::CertificateExpired),
            x if x == (Self::CertificateUnknown as u8) => Ok(Self::CertificateUnknown),
            x if x == (Self::IllegalParameter as u8) => Ok(Self::IllegalParameter),
            x if x == (Self::UnknownCa as u8) => Ok(Self::UnknownCa),
            x if x == (Self::AccessDenied as u8) => Ok(Self::AccessDenied),
            x if x == (Self::DecodeError as u8) => Ok(Self::DecodeError),
            x if x == (Self::DecryptError as u8) => Ok(Self::DecryptError),
            x if x == (Self::ProtocolVersion as u8) => Ok(Self::ProtocolVersion),
            x if x == (Self::InsufficientSecurity as u8) => Ok(Self::InsufficientSecurity),
            x if x == (Self::InternalError as u8) => Ok(Self::InternalError),
            x if x == (Self::UserCanceled as u8) => Ok(Self::UserCanceled),
            x if x == (Self::NoRenegotiation as u8) => Ok(Self::NoRenegotiation),
            x if x == (Self::UnsupportedExtension as u8) => Ok(Self::UnsupportedExtension),
            _ => Err(value),
        }
    }
}

/// TLS Alert.
///
/// See [`AlertLevel`] and [`AlertDescription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Alert {
    /// Alert level.
    pub level: AlertLevel,
    /// Alert description.
    pub description: AlertDescription,
}

impl Alert {
    pub(crate) fn new_fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_round_trip() {
        for code in 0..=255u8 {
            if let Ok(desc) = AlertDescription::try_from(code) {
                assert_eq!(u8::from(desc), code);
            }
        }
        assert_eq!(AlertDescription::try_from(100), Ok(AlertDescription::NoRenegotiation));
        assert_eq!(AlertDescription::try_from(1), Err(1));
    }
}
