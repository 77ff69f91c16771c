//! 4-Way and Group-Key Handshake supplicant.
//!
//! # References
//!
//! * IEEE Std 802.11-2016, 12.7.6 (4-Way Handshake) and 12.7.7 (Group Key
//!   Handshake)

use super::ptk::Ptk;
use super::{calculate_mic, KeyDescriptorVersion, KeyFrame, KeyInfo};
use crate::crypto::ct_eq;
use alloc::vec;
use alloc::vec::Vec;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

// RSNE element id
const IE_TYPE_RSNE: u8 = 0x30;
// vendor-specific element id carrying KDEs
const IE_TYPE_VENDOR: u8 = 0xdd;
// 00:0F:AC (IEEE 802.11) OUI
const KDE_OUI: [u8; 3] = [0x00, 0x0f, 0xac];
// GTK KDE data type
const KDE_TYPE_GTK: u8 = 0x01;

/// Callbacks out of the supplicant: outbound EAPoL frames and key
/// installation into the datapath.
pub trait EapolIo {
    /// Transmit a whole EAPoL frame to the authenticator.
    fn tx_packet(&mut self, frame: &[u8]);

    /// Install the pairwise temporal key.
    ///
    /// Invoked at most once per supplicant, no matter how often message 3
    /// is received.
    fn install_tk(&mut self, tk: &[u8; 16]);

    /// Install the group temporal key.
    ///
    /// Invoked at most once per supplicant.
    fn install_gtk(&mut self, key_id: u8, gtk: &[u8], rsc: &[u8; 8]);
}

/// Security association parameters for one supplicant.
pub struct HandshakeState {
    ifindex: u32,
    aa: [u8; 6],
    spa: [u8; 6],
    pmk: Zeroizing<[u8; 32]>,
    supplicant_rsne: Vec<u8>,
    authenticator_rsne: Vec<u8>,
}

impl HandshakeState {
    /// New handshake state for the given interface.
    pub fn new(ifindex: u32) -> Self {
        Self {
            ifindex,
            aa: [0; 6],
            spa: [0; 6],
            pmk: Zeroizing::new([0; 32]),
            supplicant_rsne: Vec::new(),
            authenticator_rsne: Vec::new(),
        }
    }

    /// Interface index this association belongs to.
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    /// Set the pairwise master key.
    pub fn set_pmk(&mut self, pmk: &[u8; 32]) {
        self.pmk.copy_from_slice(pmk);
    }

    /// Set the authenticator (AP) MAC address.
    pub fn set_authenticator_address(&mut self, aa: &[u8; 6]) {
        self.aa = *aa;
    }

    /// Set the supplicant (station) MAC address.
    pub fn set_supplicant_address(&mut self, spa: &[u8; 6]) {
        self.spa = *spa;
    }

    /// Set the RSNE this supplicant sent in its association request,
    /// echoed in message 2.
    pub fn set_supplicant_rsne(&mut self, rsne: &[u8]) {
        self.supplicant_rsne = rsne.to_vec();
    }

    /// Set the RSNE advertised by the authenticator in beacon/probe
    /// responses, checked against message 3.
    pub fn set_authenticator_rsne(&mut self, rsne: &[u8]) {
        self.authenticator_rsne = rsne.to_vec();
    }
}

/// Supplicant progress through the handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupplicantState {
    /// Nothing received yet.
    Idle,
    /// Message 1 processed, message 2 sent.
    PtkStart,
    /// Message 3 processed, message 4 sent, pairwise keys in place.
    PtkDone,
    /// Group key handshake completed.
    GroupDone,
}

/// The EAPoL-Key supplicant state machine.
///
/// Frames enter through [`rx_packet`](Self::rx_packet); replies and key
/// installations leave through the [`EapolIo`] callbacks.  Malformed,
/// replayed, or unverifiable frames are dropped silently — EAPoL has no
/// error signalling towards the authenticator.
pub struct Supplicant {
    hs: HandshakeState,
    state: SupplicantState,

    ptk: Option<Ptk>,
    anonce: [u8; 32],
    snonce: [u8; 32],
    have_snonce: bool,

    /// Highest replay counter from a MIC-authenticated frame.  Message 1
    /// carries no MIC and never updates it.
    last_replay: Option<u64>,

    /// Key reinstallation guards: once a key went into the datapath no
    /// retransmission may install it again.
    ptk_installed: bool,
    gtk_installed: bool,
}

impl Supplicant {
    /// Create a supplicant over the given association parameters.
    pub fn new(hs: HandshakeState) -> Self {
        Self {
            hs,
            state: SupplicantState::Idle,
            ptk: None,
            anonce: [0; 32],
            snonce: [0; 32],
            have_snonce: false,
            last_replay: None,
            ptk_installed: false,
            gtk_installed: false,
        }
    }

    /// Current handshake progress.
    pub fn state(&self) -> SupplicantState {
        self.state
    }

    /// Process one inbound EAPoL frame.
    pub fn rx_packet<Io: EapolIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
        frame: &[u8],
    ) {
        let parsed: KeyFrame = match KeyFrame::validate(frame) {
            Some(parsed) => parsed,
            None => {
                debug!("dropping invalid EAPoL-Key frame");
                return;
            }
        };

        let key_info: KeyInfo = parsed.key_info;

        // the supplicant only answers authenticator-originated frames
        if !key_info.key_ack() {
            debug!("dropping frame without key_ack");
            return;
        }

        if !key_info.key_mic() {
            // message 1 is the only unauthenticated frame we accept
            if key_info.key_type() && !key_info.install() {
                self.handle_ptk_1(io, rng, &parsed);
            } else {
                debug!("dropping unauthenticated frame");
            }
            return;
        }

        // MIC-bearing frames: verify, then enforce a strictly increasing
        // replay counter
        if !self.verify_mic(&parsed) {
            debug!("dropping frame with bad MIC");
            return;
        }

        if let Some(last) = self.last_replay {
            if parsed.replay_counter <= last {
                debug!("dropping replayed frame");
                return;
            }
        }
        self.last_replay = Some(parsed.replay_counter);

        if key_info.key_type() {
            self.handle_ptk_3(io, &parsed);
        } else {
            self.handle_gtk_1(io, &parsed);
        }
    }

    /// 4-Way Handshake message 1: derive the PTK, answer with message 2.
    ///
    /// Message 1 carries no MIC, so it is accepted whenever its counter is
    /// not behind the last authenticated one.  The SNonce is generated
    /// once and reused for retransmissions; a new PTK is derived from the
    /// (possibly changed) ANonce each time.
    fn handle_ptk_1<Io: EapolIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
        frame: &KeyFrame,
    ) {
        if let Some(last) = self.last_replay {
            if frame.replay_counter <= last {
                debug!("dropping stale message 1");
                return;
            }
        }

        self.anonce = frame.key_nonce;

        if !self.have_snonce {
            rng.fill_bytes(&mut self.snonce);
            self.have_snonce = true;
        }

        self.ptk = Some(Ptk::derive(
            &self.hs.pmk,
            &self.hs.aa,
            &self.hs.spa,
            &self.anonce,
            &self.snonce,
        ));

        let version: KeyDescriptorVersion = match frame.key_info.descriptor_version() {
            Ok(version) => version,
            Err(_) => return,
        };

        let mut reply: KeyFrame = KeyFrame {
            protocol_version: frame.protocol_version,
            key_info: KeyInfo::builder(version).with_key_type().with_key_mic(),
            key_length: 0,
            replay_counter: frame.replay_counter,
            key_nonce: self.snonce,
            key_iv: [0; 16],
            key_rsc: [0; 8],
            key_mic: [0; 16],
            key_data: self.hs.supplicant_rsne.clone(),
        };

        if self.sign_and_send(io, &mut reply) {
            if self.state < SupplicantState::PtkStart {
                self.state = SupplicantState::PtkStart;
            }
            debug!("sent message 2");
        }
    }

    /// 4-Way Handshake message 3: validate, install the TK once, answer
    /// with message 4.
    fn handle_ptk_3<Io: EapolIo>(&mut self, io: &mut Io, frame: &KeyFrame) {
        if self.state < SupplicantState::PtkStart {
            debug!("dropping message 3 before message 1");
            return;
        }
        if !frame.key_info.install() || !frame.key_info.secure() {
            debug!("dropping message 3 with bad flags");
            return;
        }

        // The ANonce must match message 1; a mismatch means a different
        // handshake instance and is ignored.
        if !ct_eq(&frame.key_nonce, &self.anonce) {
            debug!("message 3 ANonce mismatch");
            return;
        }

        let key_data: Zeroizing<Vec<u8>> = match self.decrypt_key_data(frame) {
            Some(key_data) => key_data,
            None => {
                debug!("message 3 key data unwrap failed");
                return;
            }
        };

        // The embedded RSNE must be bit-identical to the RSNE from the
        // beacon/probe response, otherwise the AP is being impersonated.
        match find_rsne(&key_data) {
            Some(rsne) if rsne == &self.hs.authenticator_rsne[..] => {}
            _ => {
                debug!("message 3 RSNE mismatch");
                return;
            }
        }

        if !self.ptk_installed {
            // the single point where the pairwise key reaches the datapath
            let tk: [u8; 16] = match &self.ptk {
                Some(ptk) => ptk.tk,
                None => return,
            };
            io.install_tk(&tk);
            self.ptk_installed = true;
        }

        let version: KeyDescriptorVersion = match frame.key_info.descriptor_version() {
            Ok(version) => version,
            Err(_) => return,
        };

        let mut reply: KeyFrame = KeyFrame {
            protocol_version: frame.protocol_version,
            key_info: KeyInfo::builder(version)
                .with_key_type()
                .with_key_mic()
                .with_secure(),
            key_length: 0,
            replay_counter: frame.replay_counter,
            key_nonce: [0; 32],
            key_iv: [0; 16],
            key_rsc: [0; 8],
            key_mic: [0; 16],
            key_data: Vec::new(),
        };

        if self.sign_and_send(io, &mut reply) {
            if self.state < SupplicantState::PtkDone {
                self.state = SupplicantState::PtkDone;
            }
            debug!("sent message 4");
        }
    }

    /// Group Key Handshake message 1: install the GTK once, answer with
    /// message 2.
    fn handle_gtk_1<Io: EapolIo>(&mut self, io: &mut Io, frame: &KeyFrame) {
        if self.state < SupplicantState::PtkDone {
            debug!("dropping group message before pairwise completion");
            return;
        }
        if !frame.key_info.secure() {
            debug!("dropping group message without secure flag");
            return;
        }

        let key_data: Zeroizing<Vec<u8>> = match self.decrypt_key_data(frame) {
            Some(key_data) => key_data,
            None => {
                debug!("group message key data unwrap failed");
                return;
            }
        };

        let (key_id, gtk): (u8, &[u8]) = match find_gtk_kde(&key_data) {
            Some(kde) => kde,
            None => {
                debug!("group message without GTK KDE");
                return;
            }
        };

        if !self.gtk_installed {
            io.install_gtk(key_id, gtk, &frame.key_rsc);
            self.gtk_installed = true;
        }

        let version: KeyDescriptorVersion = match frame.key_info.descriptor_version() {
            Ok(version) => version,
            Err(_) => return,
        };

        let mut reply: KeyFrame = KeyFrame {
            protocol_version: frame.protocol_version,
            key_info: KeyInfo::builder(version).with_key_mic().with_secure(),
            key_length: 0,
            replay_counter: frame.replay_counter,
            key_nonce: [0; 32],
            key_iv: [0; 16],
            key_rsc: [0; 8],
            key_mic: [0; 16],
            key_data: Vec::new(),
        };

        if self.sign_and_send(io, &mut reply) {
            if self.state < SupplicantState::GroupDone {
                self.state = SupplicantState::GroupDone;
            }
            debug!("sent group message 2");
        }
    }

    /// MIC the reply under the KCK and transmit it.
    fn sign_and_send<Io: EapolIo>(&self, io: &mut Io, reply: &mut KeyFrame) -> bool {
        let ptk: &Ptk = match &self.ptk {
            Some(ptk) => ptk,
            None => return false,
        };
        let version: KeyDescriptorVersion = match reply.key_info.descriptor_version() {
            Ok(version) => version,
            Err(_) => return false,
        };

        let mic: [u8; 16] = match calculate_mic(version, &ptk.kck, &reply.to_bytes_zero_mic()) {
            Some(mic) => mic,
            None => {
                debug!("unsupported MIC algorithm");
                return false;
            }
        };
        reply.key_mic = mic;

        io.tx_packet(&reply.to_bytes());
        true
    }

    fn verify_mic(&self, frame: &KeyFrame) -> bool {
        let ptk: &Ptk = match &self.ptk {
            Some(ptk) => ptk,
            None => return false,
        };
        let version: KeyDescriptorVersion = match frame.key_info.descriptor_version() {
            Ok(version) => version,
            Err(_) => return false,
        };

        match calculate_mic(version, &ptk.kck, &frame.to_bytes_zero_mic()) {
            Some(mic) => ct_eq(&mic, &frame.key_mic),
            None => false,
        }
    }

    /// NIST AES key unwrap of the key-data section under the KEK.
    fn decrypt_key_data(&self, frame: &KeyFrame) -> Option<Zeroizing<Vec<u8>>> {
        if !frame.key_info.encrypted_key_data() {
            return None;
        }
        let ptk: &Ptk = self.ptk.as_ref()?;

        // wrapped data is the plaintext plus the 8-byte integrity block,
        // in whole 8-byte words
        let unwrapped_len: usize = frame.key_data.len().checked_sub(8)?;
        if unwrapped_len == 0 || frame.key_data.len() % 8 != 0 {
            return None;
        }

        let kek: aes_kw::KekAes128 = aes_kw::KekAes128::from(ptk.kek);
        let mut out: Zeroizing<Vec<u8>> = Zeroizing::new(vec![0; unwrapped_len]);
        kek.unwrap(&frame.key_data, &mut out).ok()?;
        Some(out)
    }
}

/// Locate the RSNE in decrypted key data, tag and length included.
fn find_rsne(key_data: &[u8]) -> Option<&[u8]> {
    let mut remaining: &[u8] = key_data;
    while remaining.len() >= 2 {
        let ie_type: u8 = remaining[0];
        let ie_len: usize = usize::from(remaining[1]);

        // key-wrap padding starts with dd 00 or bare zeros
        if ie_type == IE_TYPE_VENDOR && ie_len == 0 {
            return None;
        }
        if remaining.len() < 2 + ie_len {
            return None;
        }

        if ie_type == IE_TYPE_RSNE {
            return Some(&remaining[..2 + ie_len]);
        }
        remaining = &remaining[2 + ie_len..];
    }
    None
}

/// Locate the GTK KDE in decrypted key data, returning the key id and the
/// key itself.
fn find_gtk_kde(key_data: &[u8]) -> Option<(u8, &[u8])> {
    let mut remaining: &[u8] = key_data;
    while remaining.len() >= 2 {
        let ie_type: u8 = remaining[0];
        let ie_len: usize = usize::from(remaining[1]);

        if ie_type == IE_TYPE_VENDOR && ie_len == 0 {
            return None;
        }
        if remaining.len() < 2 + ie_len {
            return None;
        }

        // KDE: OUI(3) | data type(1) | data
        if ie_type == IE_TYPE_VENDOR
            && ie_len >= 6
            && remaining[2..5] == KDE_OUI
            && remaining[5] == KDE_TYPE_GTK
        {
            let key_id: u8 = remaining[6] & 0x03;
            // one reserved byte after the key id/flags
            let gtk: &[u8] = &remaining[8..2 + ie_len];
            return Some((key_id, gtk));
        }
        remaining = &remaining[2 + ie_len..];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn rsne_lookup() {
        let rsne: [u8; 20] =
            hex!("30120100000fac040100000fac040100000fac02");
        let mut key_data: Vec<u8> = rsne.to_vec();
        // key-wrap padding
        key_data.extend_from_slice(&[0xdd, 0x00, 0x00]);

        assert_eq!(find_rsne(&key_data), Some(&rsne[..]));
        assert!(find_gtk_kde(&key_data).is_none());
    }

    #[test]
    fn gtk_kde_lookup() {
        // key id 2, tx bit set, 16-byte GTK
        let mut key_data: Vec<u8> = vec![0xdd, 22, 0x00, 0x0f, 0xac, 0x01, 0x06, 0x00];
        let gtk: [u8; 16] = [0xA7; 16];
        key_data.extend_from_slice(&gtk);

        let (key_id, found) = find_gtk_kde(&key_data).unwrap();
        assert_eq!(key_id, 2);
        assert_eq!(found, gtk);
    }

    #[test]
    fn truncated_element_is_rejected() {
        let key_data: [u8; 4] = [0x30, 0x12, 0x01, 0x00];
        assert!(find_rsne(&key_data).is_none());
    }
}
