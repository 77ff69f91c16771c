use crate::cipher_suites::CipherSuite;
use alloc::vec::Vec;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Record content type.
///
/// # References
///
/// * [RFC 5246 Section 6.2.1](https://datatracker.ietf.org/doc/html/rfc5246#section-6.2.1)
///
/// ```text
/// enum {
///     change_cipher_spec(20),
///     alert(21),
///     handshake(22),
///     application_data(23),
///     (255)
/// } ContentType;
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ContentType {
    /// Change cipher spec.
    ChangeCipherSpec = 20,
    /// Alert.
    Alert = 21,
    /// Handshake.
    Handshake = 22,
    /// Application data.
    ApplicationData = 23,
}

impl From<ContentType> for u8 {
    #[inline]
    fn from(content_type: ContentType) -> Self {
        content_type as u8
    }
}

impl TryFrom<u8> for ContentType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::ChangeCipherSpec as u8) => Ok(Self::ChangeCipherSpec),
            x if x == (Self::Alert as u8) => Ok(Self::Alert),
            x if x == (Self::Handshake as u8) => Ok(Self::Handshake),
            x if x == (Self::ApplicationData as u8) => Ok(Self::ApplicationData),
            _ => Err(value),
        }
    }
}

/// Key material for one direction of the record layer.
///
/// Emitted through [`TlsIo::install_tx_cipher`] and
/// [`TlsIo::install_rx_cipher`] when a ChangeCipherSpec takes effect.  The
/// record layer owns the bulk cipher, the record MAC, and the sequence
/// numbers; this struct only transports the negotiated suite and the key
/// block slices for the direction.
///
/// [`TlsIo::install_tx_cipher`]: crate::TlsIo::install_tx_cipher
/// [`TlsIo::install_rx_cipher`]: crate::TlsIo::install_rx_cipher
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CipherSpecParams {
    /// Two-byte identifier of the negotiated cipher suite.
    ///
    /// Look the suite up with [`CipherSuite::find`] for the primitive
    /// parameters (key, MAC and IV lengths, cipher kind).
    pub suite_id: [u8; 2],
    /// HMAC key for the record MAC, empty for AEAD suites.
    pub mac_key: Vec<u8>,
    /// Bulk encryption key.
    pub enc_key: Vec<u8>,
    /// IV material.
    ///
    /// For block ciphers at TLS <= 1.0 this is the initial CBC IV; for AEAD
    /// suites it is the fixed (implicit) part of the nonce.  Empty
    /// otherwise: TLS 1.1+ block ciphers carry an explicit IV per record.
    pub iv: Vec<u8>,
}

impl CipherSpecParams {
    /// Suite parameters from the catalogue.
    pub fn suite(&self) -> &'static CipherSuite {
        // the machine only installs suites from its own catalogue
        unwrap!(CipherSuite::find(&self.suite_id))
    }
}

impl core::fmt::Debug for CipherSpecParams {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
        write!(f, "CipherSpecParams {{ suite_id: {:?}, ... }}", self.suite_id)
    }
}
