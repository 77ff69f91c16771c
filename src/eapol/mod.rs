//! EAPoL-Key frames and the WPA/WPA2 4-Way Handshake supplicant.
//!
//! # References
//!
//! * IEEE Std 802.11-2016, 12.7.2 (EAPOL-Key frames)
//! * IEEE Std 802.1X-2004, 7.5.4 (EAPOL frame format)

mod ptk;
mod supplicant;

pub use ptk::Ptk;
pub use supplicant::{EapolIo, HandshakeState, Supplicant, SupplicantState};

use crate::io::{Reader, Writer};
use alloc::vec::Vec;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;

/// EAPOL packet type for key frames.
const PACKET_TYPE_KEY: u8 = 0x03;

/// Key descriptor type for RSN (WPA2).
const DESCRIPTOR_TYPE_80211: u8 = 0x02;

// byte layout of the fixed descriptor, from the start of the frame
const EAPOL_HEADER_LEN: usize = 4;
const MIC_OFFSET: usize = 81;
const MIC_LEN: usize = 16;
/// Fixed frame length up to and including key_data_len.
const KEY_FRAME_LEN: usize = 99;

/// EAPOL protocol version.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolVersion {
    /// IEEE 802.1X-2001
    V2001 = 1,
    /// IEEE 802.1X-2004
    V2004 = 2,
    /// IEEE 802.1X-2010
    V2010 = 3,
}

impl From<ProtocolVersion> for u8 {
    #[inline]
    fn from(version: ProtocolVersion) -> Self {
        version as u8
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::V2001 as u8) => Ok(Self::V2001),
            x if x == (Self::V2004 as u8) => Ok(Self::V2004),
            x if x == (Self::V2010 as u8) => Ok(Self::V2010),
            _ => Err(value),
        }
    }
}

/// Key descriptor version from the key information field.
///
/// Selects the MIC algorithm and the key-data cipher.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyDescriptorVersion {
    /// HMAC-MD5 MIC, ARC4 key data.
    HmacMd5Rc4 = 1,
    /// HMAC-SHA1-128 MIC, NIST AES key wrap key data.
    HmacSha1Aes = 2,
    /// AES-128-CMAC MIC, NIST AES key wrap key data.
    AesCmacAes = 3,
}

impl TryFrom<u8> for KeyDescriptorVersion {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::HmacMd5Rc4 as u8) => Ok(Self::HmacMd5Rc4),
            x if x == (Self::HmacSha1Aes as u8) => Ok(Self::HmacSha1Aes),
            x if x == (Self::AesCmacAes as u8) => Ok(Self::AesCmacAes),
            _ => Err(value),
        }
    }
}

/// The 2-byte key information field.
///
/// ```text
/// key_info: version:3 | type:1 | key_id:2 | install:1 | ack:1 |
///           mic:1 | secure:1 | error:1 | request:1 | encrypted:1 | smk:1
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyInfo(pub u16);

impl KeyInfo {
    /// Key descriptor version bits.
    pub fn descriptor_version(self) -> Result<KeyDescriptorVersion, u8> {
        KeyDescriptorVersion::try_from((self.0 & 0x0007) as u8)
    }

    /// `true` for a pairwise key frame, `false` for a group key frame.
    pub fn key_type(self) -> bool {
        self.0 & 0x0008 != 0
    }

    /// WPA key id bits, always zero for RSN.
    pub fn key_id(self) -> u8 {
        ((self.0 >> 4) & 0x3) as u8
    }

    /// Install flag.
    pub fn install(self) -> bool {
        self.0 & 0x0040 != 0
    }

    /// Key ack flag: the frame expects a response.
    pub fn key_ack(self) -> bool {
        self.0 & 0x0080 != 0
    }

    /// Key MIC flag: the MIC field is valid.
    pub fn key_mic(self) -> bool {
        self.0 & 0x0100 != 0
    }

    /// Secure flag.
    pub fn secure(self) -> bool {
        self.0 & 0x0200 != 0
    }

    /// Error flag.
    pub fn error(self) -> bool {
        self.0 & 0x0400 != 0
    }

    /// Request flag.
    pub fn request(self) -> bool {
        self.0 & 0x0800 != 0
    }

    /// Encrypted key data flag.
    pub fn encrypted_key_data(self) -> bool {
        self.0 & 0x1000 != 0
    }

    /// SMK message flag.
    pub fn smk_message(self) -> bool {
        self.0 & 0x2000 != 0
    }

    pub(crate) fn builder(version: KeyDescriptorVersion) -> Self {
        Self(version as u16)
    }

    pub(crate) fn with_key_type(self) -> Self {
        Self(self.0 | 0x0008)
    }

    pub(crate) fn with_key_mic(self) -> Self {
        Self(self.0 | 0x0100)
    }

    pub(crate) fn with_secure(self) -> Self {
        Self(self.0 | 0x0200)
    }
}

/// A validated EAPoL-Key frame.
#[derive(Debug, Clone)]
pub struct KeyFrame {
    /// EAPOL protocol version.
    pub protocol_version: ProtocolVersion,
    /// Key information bits.
    pub key_info: KeyInfo,
    /// Length of the pairwise/group key being negotiated.
    pub key_length: u16,
    /// Monotonically increasing replay counter.
    pub replay_counter: u64,
    /// ANonce, SNonce, or zero depending on the message.
    pub key_nonce: [u8; 32],
    /// EAPOL key IV (ARC4 key data only).
    pub key_iv: [u8; 16],
    /// Receive sequence counter for the GTK.
    pub key_rsc: [u8; 8],
    /// Message integrity code.
    pub key_mic: [u8; MIC_LEN],
    /// Trailing key data, possibly AES-key-wrapped.
    pub key_data: Vec<u8>,
}

impl KeyFrame {
    /// Validate and parse a raw EAPoL frame.
    ///
    /// Returns `None` for anything that is not a well-formed RSN
    /// EAPoL-Key descriptor with a known protocol and descriptor version
    /// and consistent lengths.
    pub fn validate(frame: &[u8]) -> Option<Self> {
        if frame.len() < KEY_FRAME_LEN {
            return None;
        }

        let mut reader: Reader = Reader::new(frame);

        let protocol_version: ProtocolVersion =
            ProtocolVersion::try_from(reader.next_u8().ok()?).ok()?;
        if reader.next_u8().ok()? != PACKET_TYPE_KEY {
            return None;
        }
        let packet_len: usize = reader.next_u16().ok()?.into();
        if packet_len != frame.len() - EAPOL_HEADER_LEN {
            return None;
        }

        if reader.next_u8().ok()? != DESCRIPTOR_TYPE_80211 {
            return None;
        }

        let key_info: KeyInfo = KeyInfo(reader.next_u16().ok()?);
        key_info.descriptor_version().ok()?;

        let key_length: u16 = reader.next_u16().ok()?;
        let replay_counter: u64 = u64::from_be_bytes(reader.next_n().ok()?);
        let key_nonce: [u8; 32] = reader.next_n().ok()?;
        let key_iv: [u8; 16] = reader.next_n().ok()?;
        let key_rsc: [u8; 8] = reader.next_n().ok()?;
        // reserved
        reader.skip_n(8).ok()?;
        let key_mic: [u8; MIC_LEN] = reader.next_n().ok()?;

        let key_data_len: usize = reader.next_u16().ok()?.into();
        if key_data_len != reader.remain() {
            return None;
        }
        let key_data: Vec<u8> = reader.rest().to_vec();

        Some(Self {
            protocol_version,
            key_info,
            key_length,
            replay_counter,
            key_nonce,
            key_iv,
            key_rsc,
            key_mic,
            key_data,
        })
    }

    /// Serialize the frame, MIC field included as-is.
    pub fn to_bytes(&self) -> Vec<u8> {
        let packet_len: u16 = unwrap!(u16::try_from(
            KEY_FRAME_LEN - EAPOL_HEADER_LEN + self.key_data.len()
        )
        .ok());

        let mut writer: Writer = Writer::with_capacity(KEY_FRAME_LEN + self.key_data.len());
        writer.put_u8(self.protocol_version.into());
        writer.put_u8(PACKET_TYPE_KEY);
        writer.put_u16(packet_len);
        writer.put_u8(DESCRIPTOR_TYPE_80211);
        writer.put_u16(self.key_info.0);
        writer.put_u16(self.key_length);
        writer.put_slice(&self.replay_counter.to_be_bytes());
        writer.put_slice(&self.key_nonce);
        writer.put_slice(&self.key_iv);
        writer.put_slice(&self.key_rsc);
        writer.put_slice(&[0; 8]);
        writer.put_slice(&self.key_mic);
        writer.put_u16(unwrap!(u16::try_from(self.key_data.len()).ok()));
        writer.put_slice(&self.key_data);
        writer.into_inner()
    }

    /// Serialized frame with the MIC field zeroed, the MIC computation
    /// input.
    pub(crate) fn to_bytes_zero_mic(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.to_bytes();
        bytes[MIC_OFFSET..MIC_OFFSET + MIC_LEN].fill(0);
        bytes
    }
}

/// MIC over a serialized frame (MIC field zeroed) under the KCK, per the
/// descriptor version.
///
/// Returns `None` for descriptor versions without a supported MIC
/// algorithm (AES-CMAC).
pub fn calculate_mic(
    version: KeyDescriptorVersion,
    kck: &[u8; 16],
    frame: &[u8],
) -> Option<[u8; MIC_LEN]> {
    match version {
        KeyDescriptorVersion::HmacMd5Rc4 => {
            let mut mac: Hmac<Md5> = unwrap!(<Hmac<Md5> as Mac>::new_from_slice(kck).ok());
            mac.update(frame);
            Some(mac.finalize().into_bytes().into())
        }
        KeyDescriptorVersion::HmacSha1Aes => {
            let mut mac: Hmac<Sha1> = unwrap!(<Hmac<Sha1> as Mac>::new_from_slice(kck).ok());
            mac.update(frame);
            let digest: [u8; 20] = mac.finalize().into_bytes().into();
            Some(unwrap!(digest[..MIC_LEN].try_into().ok()))
        }
        // AES-CMAC MICs (802.11w AKMs) are not supported
        KeyDescriptorVersion::AesCmacAes => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    /// WPA2 message 1 of 4.
    const PTK_STEP_1: &[u8] = &hex!(
        "0203005f02008a00100000000000000001"
        "2b5852b88e4ca34dc599ed202c63957c535e3efa9289873411127cbaf3588425"
        "0000000000000000000000000000000000000000000000000000000000000000"
        "000000000000000000000000000000000000"
    );

    #[test]
    fn validate_message_1() {
        let frame: KeyFrame = KeyFrame::validate(PTK_STEP_1).unwrap();

        assert_eq!(frame.protocol_version, ProtocolVersion::V2004);
        assert_eq!(
            frame.key_info.descriptor_version(),
            Ok(KeyDescriptorVersion::HmacSha1Aes)
        );
        assert!(frame.key_info.key_type());
        assert_eq!(frame.key_info.key_id(), 0);
        assert!(!frame.key_info.install());
        assert!(frame.key_info.key_ack());
        assert!(!frame.key_info.key_mic());
        assert!(!frame.key_info.secure());
        assert!(!frame.key_info.error());
        assert!(!frame.key_info.request());
        assert!(!frame.key_info.encrypted_key_data());
        assert!(!frame.key_info.smk_message());
        assert_eq!(frame.key_length, 16);
        assert_eq!(frame.replay_counter, 1);
        assert_eq!(
            frame.key_nonce,
            hex!("2b5852b88e4ca34dc599ed202c63957c535e3efa9289873411127cbaf3588425")
        );
        assert_eq!(frame.key_iv, [0; 16]);
        assert_eq!(frame.key_rsc, [0; 8]);
        assert_eq!(frame.key_mic, [0; 16]);
        assert!(frame.key_data.is_empty());
    }

    #[test]
    fn round_trip() {
        let frame: KeyFrame = KeyFrame::validate(PTK_STEP_1).unwrap();
        assert_eq!(frame.to_bytes(), PTK_STEP_1);
    }

    #[test]
    fn validate_rejects_bad_lengths() {
        // truncated
        assert!(KeyFrame::validate(&PTK_STEP_1[..50]).is_none());

        // packet_len inconsistent with the frame length
        let mut frame: Vec<u8> = PTK_STEP_1.to_vec();
        frame.push(0);
        assert!(KeyFrame::validate(&frame).is_none());

        // bad packet type
        let mut frame: Vec<u8> = PTK_STEP_1.to_vec();
        frame[1] = 0x00;
        assert!(KeyFrame::validate(&frame).is_none());
    }
}
