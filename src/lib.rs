//! TLS 1.0–1.2 endpoint and WPA/WPA2 EAPoL-Key supplicant state machines
//! for embedded use.
//!
//! The crate contains the protocol logic only: handshake sequencing, key
//! derivation, certificate chain verification, and the 4-Way Handshake
//! with its replay and key-reinstallation defences.  Record-layer framing,
//! bulk encryption, and all I/O stay with the caller, wired in through the
//! [`TlsIo`] and [`eapol::EapolIo`] traits.
//!
//! # Warning
//!
//! ⚠️ This is in an early alpha state ⚠️
//!
//! All the usual security disclaimers apply here, read the license, don't
//! use this code in production.
//!
//! # Limitations
//!
//! * RSA key transport only; no DHE/ECDHE.
//! * No session resumption and no TLS 1.3.
//! * Handshake extensions are decoded and ignored.
//! * The record layer must reassemble fragmented handshake messages before
//!   delivery.
//!
//! # Feature Flags
//!
//! All features are disabled by default.
//!
//! * `std`: PEM file based configuration ([`Tls::set_ca_cert_file`],
//!   [`Tls::set_auth_data_files`]).
//! * `defmt`: Enable logging with `defmt`.
//! * `log`: Enable logging with `log`.
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg))]
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod alert;
pub mod cert;
mod cipher_suites;
mod crypto;
pub mod eapol;
mod handshake;
mod io;
mod key_schedule;
mod record;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use cipher_suites::{BulkEncryption, CipherKind, CipherSuite, KeyExchange, MacAlgorithm};
pub use handshake::{HandshakeHeader, HandshakeType};
pub use key_schedule::HashType;
pub use rand_core;
pub use record::{CipherSpecParams, ContentType};
pub use rsa;

use alloc::string::String;
use alloc::vec::Vec;
use cert::{CertChain, Certificate, KeyType};
use core::mem;
use handshake::{certificate, certificate_request, client_hello, server_hello};
use io::{Reader, Writer};
use key_schedule::{KeyBlock, TranscriptHashes};
use rand_core::{CryptoRng, RngCore};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::{Zeroize, Zeroizing};

/// TLS protocol version.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TlsVersion {
    /// TLS 1.0
    V1_0 = 0x0301,
    /// TLS 1.1
    V1_1 = 0x0302,
    /// TLS 1.2
    V1_2 = 0x0303,
}

impl From<TlsVersion> for u16 {
    #[inline]
    fn from(version: TlsVersion) -> Self {
        version as u16
    }
}

impl TryFrom<u16> for TlsVersion {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::V1_0 as u16) => Ok(Self::V1_0),
            x if x == (Self::V1_1 as u16) => Ok(Self::V1_1),
            x if x == (Self::V1_2 as u16) => Ok(Self::V1_2),
            _ => Err(value),
        }
    }
}

/// Highest version this implementation negotiates.
const TLS_VERSION: TlsVersion = TlsVersion::V1_2;
/// Lowest version this implementation accepts.
const TLS_MIN_VERSION: TlsVersion = TlsVersion::V1_0;

/// Handshake states.
// RFC 5246 Section 7.4; see also the state summaries in DESIGN.md
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeState {
    /// Waiting for ClientHello (server) or ServerHello (client).
    WaitHello,
    /// Waiting for the peer Certificate.
    WaitCertificate,
    /// Waiting for ClientKeyExchange (server only).
    WaitKeyExchange,
    /// Waiting for ServerHelloDone (client only).
    WaitHelloDone,
    /// Waiting for CertificateVerify (server only).
    WaitCertificateVerify,
    /// Waiting for ChangeCipherSpec.
    WaitChangeCipherSpec,
    /// Waiting for the peer Finished.
    WaitFinished,
    /// Handshake complete.
    Done,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Role {
    Client,
    Server,
}

/// Callbacks into the caller: outbound records, decrypted application
/// data, session lifecycle, and cipher-spec installation for the external
/// record layer.
///
/// Every callback is invoked synchronously from inside the [`Tls`] entry
/// points; [`disconnect`](Self::disconnect) is always the last call in its
/// frame, so the callee may drop the `Tls` object afterwards.
pub trait TlsIo {
    /// A whole outbound record fragment of the given content type.
    ///
    /// The record layer frames, MACs, and encrypts it under the current
    /// transmit cipher spec.
    fn tx_record(&mut self, content_type: ContentType, fragment: &[u8]);

    /// Decrypted application data received from the peer.
    fn app_data(&mut self, data: &[u8]);

    /// The handshake completed.
    ///
    /// `peer_identity` carries the organizationName (or commonName) from
    /// the peer certificate when the peer was authenticated.
    fn ready(&mut self, peer_identity: Option<&str>);

    /// The connection terminated.
    ///
    /// `wire` is the alert code sent to the peer; `local` reports the
    /// actual failure reason, which may be more specific.
    fn disconnect(&mut self, wire: AlertDescription, local: AlertDescription);

    /// Install the transmit cipher spec in the record layer.
    fn install_tx_cipher(&mut self, params: CipherSpecParams) {
        let _ = params;
    }

    /// Install the receive cipher spec in the record layer.
    fn install_rx_cipher(&mut self, params: CipherSpecParams) {
        let _ = params;
    }

    /// Drop both cipher specs (connection teardown).
    fn reset_ciphers(&mut self) {}
}

/// A fatal handshake failure: the alert that goes on the wire and the
/// local reason reported through the disconnect callback.
struct Disconnect {
    wire: AlertDescription,
    local: AlertDescription,
}

impl Disconnect {
    fn with_local(wire: AlertDescription, local: AlertDescription) -> Self {
        Self { wire, local }
    }
}

impl From<AlertDescription> for Disconnect {
    fn from(wire: AlertDescription) -> Self {
        Self { wire, local: wire }
    }
}

type HsResult<T> = Result<T, Disconnect>;

/// A TLS connection endpoint.
///
/// The endpoint is single-threaded and cooperative: it is driven entirely
/// by [`start`](Self::start), [`rx`](Self::rx), [`write`](Self::write) and
/// [`close`](Self::close), never blocks, and emits through the [`TlsIo`]
/// callbacks passed into each call.
pub struct Tls {
    role: Role,
    state: HandshakeState,

    negotiated_version: Option<TlsVersion>,
    /// ProtocolVersion from the ClientHello, kept for the premaster secret
    /// version check.
    client_version: u16,

    pending_suite: Option<&'static CipherSuite>,
    prf_hash: HashType,
    signature_hash: HashType,

    client_random: [u8; 32],
    server_random: [u8; 32],
    master_secret: Zeroizing<[u8; 48]>,
    key_block: Option<KeyBlock>,

    /// Suite installed for transmit, `cipher_suite[1]` in the key block
    /// sense.
    tx_suite: Option<&'static CipherSuite>,
    /// Suite installed for receive.
    rx_suite: Option<&'static CipherSuite>,

    transcript: Option<TranscriptHashes>,

    peer_cert: Option<Certificate>,
    peer_pubkey: Option<RsaPublicKey>,

    cert: Option<CertChain>,
    ca_certs: Option<Vec<Certificate>>,
    priv_key: Option<RsaPrivateKey>,

    cert_requested: bool,
    cert_sent: bool,
    ready: bool,
    peer_authenticated: bool,
}

impl Tls {
    fn new(role: Role) -> Self {
        Self {
            role,
            state: HandshakeState::WaitHello,
            negotiated_version: None,
            client_version: 0,
            pending_suite: None,
            prf_hash: HashType::Sha256,
            signature_hash: HashType::Sha256,
            client_random: [0; 32],
            server_random: [0; 32],
            master_secret: Zeroizing::new([0; 48]),
            key_block: None,
            tx_suite: None,
            rx_suite: None,
            transcript: None,
            peer_cert: None,
            peer_pubkey: None,
            cert: None,
            ca_certs: None,
            priv_key: None,
            cert_requested: false,
            cert_sent: false,
            ready: false,
            peer_authenticated: false,
        }
    }

    /// Create a client endpoint.
    ///
    /// Call [`start`](Self::start) to emit the ClientHello once the
    /// transport is connected.
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    /// Create a server endpoint.
    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    /// `true` once the handshake has completed and application data can
    /// flow.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Current handshake state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Negotiated protocol version, `None` before negotiation.
    pub fn version(&self) -> Option<TlsVersion> {
        self.negotiated_version
    }

    /// Whether the peer proved possession of its certificate key.
    ///
    /// On the server this requires an accepted CertificateVerify; on the
    /// client a configured CA set plus a verified server Finished.
    pub fn is_peer_authenticated(&self) -> bool {
        self.peer_authenticated
    }

    /// Replace the set of trusted CA certificates; `None` clears it.
    ///
    /// A configured CA set makes a server request and verify client
    /// certificates, and is required for a client to authenticate the
    /// server.
    pub fn set_ca_certs(&mut self, ca_certs: Option<Vec<Certificate>>) {
        self.ca_certs = ca_certs;
    }

    /// Set the local certificate chain and RSA private key.
    pub fn set_auth_data(&mut self, cert: Option<CertChain>, priv_key: Option<RsaPrivateKey>) {
        self.cert = cert;
        self.priv_key = priv_key;
    }

    fn local_cert_key(&self) -> Option<KeyType> {
        self.cert.as_ref().map(|chain| chain.leaf().key_type())
    }

    fn version_at_least_12(&self) -> bool {
        self.negotiated_version
            .map_or(false, |version| version >= TlsVersion::V1_2)
    }

    fn set_state(&mut self, state: HandshakeState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Start the handshake by sending a ClientHello.
    ///
    /// Returns `false` on a server endpoint, when a handshake is already
    /// running, or when no cipher suite is compatible with the local
    /// certificate.
    pub fn start<Io: TlsIo, R: RngCore + CryptoRng>(&mut self, io: &mut Io, rng: &mut R) -> bool {
        if self.role != Role::Client {
            return false;
        }
        if self.transcript.is_some() {
            warn!("handshake already in progress");
            return false;
        }

        rng.fill_bytes(&mut self.client_random);

        let body: Vec<u8> = match client_hello::ser(&self.client_random, self.local_cert_key()) {
            Some(body) => body,
            None => return false,
        };

        self.transcript = Some(TranscriptHashes::new());
        self.tx_handshake(io, HandshakeType::ClientHello, &body);
        self.set_state(HandshakeState::WaitHello);
        true
    }

    /// Process one inbound record fragment decoded by the record layer.
    ///
    /// Handshake fragments may carry several complete messages; fragmented
    /// messages must have been reassembled by the record layer.
    pub fn rx<Io: TlsIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
        content_type: ContentType,
        fragment: &[u8],
    ) {
        if let Err(disconnect) = self.handle_fragment(io, rng, content_type, fragment) {
            self.disconnect(io, disconnect.wire, disconnect.local);
        }
    }

    /// Send application data.
    ///
    /// Silently ignored until the handshake has completed.
    pub fn write<Io: TlsIo>(&mut self, io: &mut Io, data: &[u8]) {
        if !self.ready {
            warn!("write before handshake completion");
            return;
        }
        io.tx_record(ContentType::ApplicationData, data);
    }

    /// Close the session: emits a close_notify alert and runs the
    /// disconnect pathway.
    pub fn close<Io: TlsIo>(&mut self, io: &mut Io) {
        self.disconnect(io, AlertDescription::CloseNotify, AlertDescription::CloseNotify);
    }

    fn handle_fragment<Io: TlsIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
        content_type: ContentType,
        fragment: &[u8],
    ) -> HsResult<()> {
        match content_type {
            ContentType::ChangeCipherSpec => self.handle_change_cipher_spec(io, fragment),
            ContentType::Alert => self.handle_alert(fragment),
            ContentType::Handshake => self.handle_handshake_fragment(io, rng, fragment),
            ContentType::ApplicationData => {
                if !self.ready {
                    error!("application data before handshake completion");
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                if !fragment.is_empty() {
                    io.app_data(fragment);
                }
                Ok(())
            }
        }
    }

    fn handle_change_cipher_spec<Io: TlsIo>(
        &mut self,
        io: &mut Io,
        fragment: &[u8],
    ) -> HsResult<()> {
        if fragment != [0x01] {
            error!("ChangeCipherSpec message decode error");
            return Err(AlertDescription::DecodeError.into());
        }

        if self.state != HandshakeState::WaitChangeCipherSpec {
            error!("ChangeCipherSpec invalid in state {:?}", self.state);
            return Err(AlertDescription::UnexpectedMessage.into());
        }

        let params: CipherSpecParams = self.take_cipher_spec(false)?;
        io.install_rx_cipher(params);
        self.rx_suite = self.pending_suite;

        self.set_state(HandshakeState::WaitFinished);
        Ok(())
    }

    fn handle_alert(&mut self, fragment: &[u8]) -> HsResult<()> {
        let mut reader: Reader = Reader::new(fragment);
        let level: u8 = reader.next_u8()?;
        let description: u8 = reader.next_u8()?;

        if AlertLevel::try_from(level).is_err() {
            error!("received bad AlertLevel {}", level);
            return Err(AlertDescription::DecodeError.into());
        }

        // A fatal alert obligates us to close; on a warning we are allowed
        // to treat it as fatal as well, so both take the same path.
        let local: AlertDescription =
            AlertDescription::try_from(description).unwrap_or(AlertDescription::CloseNotify);
        warn!("peer sent an alert: {:?}", local);

        Err(Disconnect::with_local(AlertDescription::CloseNotify, local))
    }

    fn handle_handshake_fragment<Io: TlsIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
        fragment: &[u8],
    ) -> HsResult<()> {
        let mut remaining: &[u8] = fragment;

        while !remaining.is_empty() {
            if remaining.len() < HandshakeHeader::LEN {
                return Err(AlertDescription::DecodeError.into());
            }
            let header_bytes: [u8; 4] = unwrap!(<[u8; 4]>::try_from(&remaining[..4]).ok());
            let header: HandshakeHeader = HandshakeHeader::from(header_bytes);
            let total: usize = HandshakeHeader::LEN + header.length() as usize;
            if remaining.len() < total {
                error!("handshake message fragmented across records");
                return Err(AlertDescription::DecodeError.into());
            }

            let message: &[u8] = &remaining[..total];
            remaining = &remaining[total..];

            let msg_type: HandshakeType = match header.msg_type() {
                Ok(msg_type) => msg_type,
                Err(value) => {
                    error!("invalid handshake type {}", value);
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
            };

            // Start hashing the handshake contents on the first message
            if self.role == Role::Server
                && msg_type == HandshakeType::ClientHello
                && matches!(self.state, HandshakeState::WaitHello | HandshakeState::Done)
                && self.transcript.is_none()
            {
                self.transcript = Some(TranscriptHashes::new());
            }

            if let Some(transcript) = &mut self.transcript {
                // CertificateVerify and Finished carry proofs computed over
                // the transcript NOT including themselves, so the running
                // digests are snapshotted first.
                if matches!(
                    msg_type,
                    HandshakeType::CertificateVerify | HandshakeType::Finished
                ) {
                    transcript.snapshot();
                }

                // RFC 5246 7.4.1.1: HelloRequest is never hashed
                if msg_type != HandshakeType::HelloRequest {
                    transcript.update(message);
                }
            }

            self.handle_handshake(io, rng, msg_type, &message[HandshakeHeader::LEN..])?;
        }

        Ok(())
    }

    fn handle_handshake<Io: TlsIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
        msg_type: HandshakeType,
        body: &[u8],
    ) -> HsResult<()> {
        debug!("handling {:?} of {} bytes", msg_type, body.len());

        match msg_type {
            HandshakeType::HelloRequest => {
                if self.role == Role::Server {
                    error!("HelloRequest invalid in server mode");
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                if !body.is_empty() {
                    return Err(AlertDescription::DecodeError.into());
                }
                // Clients may ignore a HelloRequest mid-handshake, and we
                // never renegotiate voluntarily.
                Ok(())
            }
            HandshakeType::ClientHello => {
                if self.role != Role::Server {
                    error!("ClientHello invalid in client mode");
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                if !matches!(self.state, HandshakeState::WaitHello | HandshakeState::Done) {
                    error!("ClientHello invalid in state {:?}", self.state);
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                self.handle_client_hello(io, rng, body)
            }
            HandshakeType::ServerHello => {
                if self.role != Role::Client || self.state != HandshakeState::WaitHello {
                    error!("unexpected ServerHello in state {:?}", self.state);
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                self.handle_server_hello(body)
            }
            HandshakeType::Certificate => {
                if self.state != HandshakeState::WaitCertificate {
                    error!("unexpected Certificate in state {:?}", self.state);
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                self.handle_certificate(body)
            }
            HandshakeType::ServerKeyExchange => {
                // RSA key transport never uses ServerKeyExchange
                error!("unexpected ServerKeyExchange");
                Err(AlertDescription::UnexpectedMessage.into())
            }
            HandshakeType::CertificateRequest => {
                // Sent optionally before ServerHelloDone, at most once
                let suite_checks_certs: bool = self
                    .pending_suite
                    .map_or(false, |suite| suite.key_exchange.certificate_check());
                if self.role != Role::Client
                    || self.state != HandshakeState::WaitHelloDone
                    || self.cert_requested
                    || !suite_checks_certs
                {
                    error!("unexpected CertificateRequest");
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                self.handle_certificate_request(body)
            }
            HandshakeType::ServerHelloDone => {
                if self.role != Role::Client || self.state != HandshakeState::WaitHelloDone {
                    error!("unexpected ServerHelloDone in state {:?}", self.state);
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                self.handle_server_hello_done(io, rng, body)
            }
            HandshakeType::CertificateVerify => {
                if self.role != Role::Server || self.state != HandshakeState::WaitCertificateVerify
                {
                    error!("unexpected CertificateVerify in state {:?}", self.state);
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                self.handle_certificate_verify(body)
            }
            HandshakeType::ClientKeyExchange => {
                if self.role != Role::Server || self.state != HandshakeState::WaitKeyExchange {
                    error!("unexpected ClientKeyExchange in state {:?}", self.state);
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                self.handle_client_key_exchange(rng, body)
            }
            HandshakeType::Finished => {
                if self.state != HandshakeState::WaitFinished {
                    error!("unexpected Finished in state {:?}", self.state);
                    return Err(AlertDescription::UnexpectedMessage.into());
                }
                self.handle_finished(io, body)
            }
        }
    }

    fn handle_client_hello<Io: TlsIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
        body: &[u8],
    ) -> HsResult<()> {
        let hello: client_hello::ClientHello = client_hello::ClientHello::deser(body)?;

        self.client_random = hello.random;
        // Saved for the premaster secret version check
        self.client_version = hello.client_version;

        if hello.client_version < TLS_MIN_VERSION as u16 {
            error!("client version too low: {:#06x}", hello.client_version);
            return Err(AlertDescription::ProtocolVersion.into());
        }

        let negotiated: TlsVersion = if hello.client_version >= TLS_VERSION as u16 {
            TLS_VERSION
        } else {
            // in range, so the exact conversion cannot fail
            unwrap!(TlsVersion::try_from(hello.client_version).ok())
        };
        self.negotiated_version = Some(negotiated);
        info!("negotiated {:?}", negotiated);

        if negotiated < TlsVersion::V1_2 {
            if let Some(transcript) = &mut self.transcript {
                transcript.drop_pre_tls12();
            }
        }

        let suite: &'static CipherSuite =
            match hello.select_suite(negotiated, self.local_cert_key()) {
                Some(suite) => suite,
                None => {
                    error!("no common cipher suites");
                    return Err(AlertDescription::HandshakeFailure.into());
                }
            };
        self.pending_suite = Some(suite);
        self.prf_hash = suite.prf_hash();
        info!("negotiated {}", suite.name);

        // CompressionMethod.null must be present in the vector
        if !hello.compression_methods.contains(&0) {
            error!("no common compression methods");
            return Err(AlertDescription::HandshakeFailure.into());
        }

        rng.fill_bytes(&mut self.server_random);

        let hello_body: Vec<u8> =
            server_hello::ser(negotiated.into(), &self.server_random, &suite.id);
        self.tx_handshake(io, HandshakeType::ServerHello, &hello_body);

        let client_auth: bool = suite.key_exchange.certificate_check() && self.ca_certs.is_some();

        // Certificate is mandatory whenever the key exchange authenticates
        // with certificates; a server without auth data fails in
        // send_certificate rather than leaving the client to diagnose a
        // truncated flight.
        if suite.key_exchange.certificate_check() {
            self.send_certificate(io)?;
        }
        if client_auth {
            let request: Vec<u8> = certificate_request::ser(
                negotiated,
                self.ca_certs.as_deref().unwrap_or(&[]),
            );
            self.tx_handshake(io, HandshakeType::CertificateRequest, &request);
        }
        self.tx_handshake(io, HandshakeType::ServerHelloDone, &[]);

        if client_auth {
            self.set_state(HandshakeState::WaitCertificate);
        } else {
            self.set_state(HandshakeState::WaitKeyExchange);
        }
        Ok(())
    }

    fn handle_server_hello(&mut self, body: &[u8]) -> HsResult<()> {
        let hello: server_hello::ServerHello = server_hello::ServerHello::deser(body)?;

        self.server_random = hello.random;

        let version: TlsVersion = match TlsVersion::try_from(hello.server_version) {
            Ok(version) if version >= TLS_MIN_VERSION => version,
            _ => {
                error!("unsupported version {:#06x}", hello.server_version);
                let alert: AlertDescription = if hello.server_version < TLS_MIN_VERSION as u16 {
                    AlertDescription::ProtocolVersion
                } else {
                    AlertDescription::IllegalParameter
                };
                return Err(alert.into());
            }
        };
        self.negotiated_version = Some(version);
        info!("negotiated {:?}", version);

        if version < TlsVersion::V1_2 {
            if let Some(transcript) = &mut self.transcript {
                transcript.drop_pre_tls12();
            }
        }

        let suite: &'static CipherSuite = match CipherSuite::find(&hello.cipher_suite_id) {
            Some(suite) => suite,
            None => {
                error!("unknown cipher suite {:?}", hello.cipher_suite_id);
                return Err(AlertDescription::HandshakeFailure.into());
            }
        };
        if !suite.is_compatible(Some(version), self.local_cert_key()) {
            error!("selected cipher suite not compatible");
            return Err(AlertDescription::HandshakeFailure.into());
        }
        self.pending_suite = Some(suite);
        self.prf_hash = suite.prf_hash();
        info!("negotiated {}", suite.name);

        if hello.compression_method != 0 {
            error!("unknown compression method {}", hello.compression_method);
            return Err(AlertDescription::HandshakeFailure.into());
        }

        // RSA key transport always authenticates with a certificate
        self.set_state(HandshakeState::WaitCertificate);
        Ok(())
    }

    fn handle_certificate(&mut self, body: &[u8]) -> HsResult<()> {
        let chain: Option<CertChain> = certificate::deser(body)?;

        let chain: CertChain = match chain {
            Some(chain) => chain,
            None => {
                // A client may send no certificates in response to our
                // request; an anonymous server cannot be accepted.
                if self.role != Role::Server {
                    error!("server sent no certificate chain");
                    return Err(AlertDescription::HandshakeFailure.into());
                }
                self.set_state(HandshakeState::WaitKeyExchange);
                return Ok(());
            }
        };

        if !chain.verify(self.ca_certs.as_deref()) {
            error!("peer certificate chain verification failed");
            return Err(AlertDescription::BadCertificate.into());
        }

        let suite: &'static CipherSuite = self.pending_suite()?;
        let leaf: &Certificate = chain.leaf();
        if !suite.key_exchange.validate_cert_key_type(leaf.key_type()) {
            error!("peer certificate key type incompatible with {}", suite.name);
            return Err(AlertDescription::UnsupportedCertificate.into());
        }

        let pubkey: RsaPublicKey = match leaf.public_key() {
            Some(pubkey) => pubkey,
            None => {
                error!("error materializing the peer public key");
                return Err(AlertDescription::UnsupportedCertificate.into());
            }
        };

        self.peer_cert = Some(leaf.clone());
        self.peer_pubkey = Some(pubkey);

        if self.role == Role::Server {
            self.set_state(HandshakeState::WaitKeyExchange);
        } else {
            self.set_state(HandshakeState::WaitHelloDone);
        }
        Ok(())
    }

    fn handle_certificate_request(&mut self, body: &[u8]) -> HsResult<()> {
        let version: TlsVersion = self.negotiated_version()?;
        let transcript: &TranscriptHashes = match &self.transcript {
            Some(transcript) => transcript,
            None => return Err(AlertDescription::InternalError.into()),
        };

        let selected: Option<HashType> = certificate_request::deser(body, version, transcript)?;

        self.cert_requested = true;

        if let Some(hash) = selected {
            self.signature_hash = hash;
            // Only the PRF hash and the signing hash are needed from here on
            let prf_hash: HashType = self.prf_hash;
            if let Some(transcript) = &mut self.transcript {
                transcript.retain(prf_hash, hash);
            }
        }
        Ok(())
    }

    fn handle_server_hello_done<Io: TlsIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
        body: &[u8],
    ) -> HsResult<()> {
        if !body.is_empty() {
            error!("ServerHelloDone not empty");
            return Err(AlertDescription::DecodeError.into());
        }

        if self.cert_requested {
            self.send_certificate(io)?;
        }

        self.send_client_key_exchange(io, rng)?;

        if self.cert_sent {
            self.send_certificate_verify(io)?;
        }

        io.tx_record(ContentType::ChangeCipherSpec, &[0x01]);
        let params: CipherSpecParams = self.take_cipher_spec(true)?;
        io.install_tx_cipher(params);
        self.tx_suite = self.pending_suite;

        self.send_finished(io)?;

        self.set_state(HandshakeState::WaitChangeCipherSpec);
        Ok(())
    }

    fn handle_client_key_exchange<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        body: &[u8],
    ) -> HsResult<()> {
        let priv_key: &RsaPrivateKey = match &self.priv_key {
            Some(priv_key) => priv_key,
            None => {
                error!("no private key");
                return Err(Disconnect::with_local(
                    AlertDescription::InternalError,
                    AlertDescription::BadCertificate,
                ));
            }
        };
        let modulus_len: usize = priv_key.size();

        let mut reader: Reader = Reader::new(body);
        let encrypted_len: usize = reader.next_u16()?.into();
        if encrypted_len != modulus_len || reader.remain() != modulus_len {
            error!("EncryptedPreMasterSecret length {} not {}", encrypted_len, modulus_len);
            return Err(AlertDescription::DecodeError.into());
        }

        let decrypted: Option<Vec<u8>> = crypto::rsa_decrypt(priv_key, reader.rest());

        // RFC 5246 7.4.7.1: on any decode failure substitute a random
        // premaster secret and continue without an alert, and use the
        // ClientHello version regardless of the decrypted bytes.
        let mut pre_master: Zeroizing<[u8; 48]> = Zeroizing::new([0; 48]);
        rng.fill_bytes(&mut pre_master[2..]);
        pre_master[..2].copy_from_slice(&self.client_version.to_be_bytes());

        match decrypted {
            Some(secret) if secret.len() == 48 => {
                pre_master[2..].copy_from_slice(&secret[2..]);
                let mut secret: Vec<u8> = secret;
                secret.zeroize();
            }
            _ => debug!("error decrypting the premaster secret"),
        }

        self.generate_master_secret(&*pre_master)?;

        // A client that sent a certificate with signing capability must
        // follow with CertificateVerify
        if self.peer_pubkey.is_some() {
            self.set_state(HandshakeState::WaitCertificateVerify);
        } else {
            self.set_state(HandshakeState::WaitChangeCipherSpec);
        }
        Ok(())
    }

    fn handle_certificate_verify(&mut self, body: &[u8]) -> HsResult<()> {
        self.verify_peer_signature(body)?;

        // Stop maintaining handshake hashes other than the PRF hash
        if self.version_at_least_12() {
            let prf_hash: HashType = self.prf_hash;
            if let Some(transcript) = &mut self.transcript {
                transcript.retain(prf_hash, prf_hash);
            }
        }

        // An accepted CertificateVerify implies we sent a
        // CertificateRequest, which implies a configured CA set, which
        // implies the chain already verified; the signature now proves
        // possession of the end-entity key.
        self.peer_authenticated = true;

        self.set_state(HandshakeState::WaitChangeCipherSpec);
        Ok(())
    }

    fn handle_finished<Io: TlsIo>(&mut self, io: &mut Io, body: &[u8]) -> HsResult<()> {
        let rx_suite: &'static CipherSuite = match self.rx_suite {
            Some(suite) => suite,
            None => return Err(AlertDescription::InternalError.into()),
        };

        if body.len() != rx_suite.verify_data_length {
            error!("Finished length not {}", rx_suite.verify_data_length);
            return Err(AlertDescription::DecodeError.into());
        }

        let label: &[u8] = match self.role {
            Role::Server => b"client finished",
            Role::Client => b"server finished",
        };
        let expected: Zeroizing<Vec<u8>> =
            self.finished_verify_data(label, rx_suite.verify_data_length, true)?;

        if !crypto::ct_eq(&expected, body) {
            error!("Finished contents don't match");
            return Err(AlertDescription::DecryptError.into());
        }

        if self.role == Role::Server {
            io.tx_record(ContentType::ChangeCipherSpec, &[0x01]);
            let params: CipherSpecParams = self.take_cipher_spec(true)?;
            io.install_tx_cipher(params);
            self.tx_suite = self.pending_suite;
            self.send_finished(io)?;
        }

        // On the client the server is authenticated only now: the CA set
        // vouched for the chain and the verified Finished proves the peer
        // recovered the premaster secret we encrypted to its key.
        if self.role == Role::Client && self.ca_certs.is_some() {
            self.peer_authenticated = true;
        }

        self.finished(io);
        Ok(())
    }

    /// Handshake completion: free handshake resources, report readiness.
    fn finished<Io: TlsIo>(&mut self, io: &mut Io) {
        let peer_identity: Option<String> = if self.peer_authenticated {
            self.peer_cert.as_ref().and_then(Certificate::identity)
        } else {
            None
        };

        self.reset_handshake();
        self.cleanup_handshake_secrets();

        self.set_state(HandshakeState::Done);
        self.ready = true;

        io.ready(peer_identity.as_deref());
    }

    fn send_certificate<Io: TlsIo>(&mut self, io: &mut Io) -> HsResult<()> {
        if self.role == Role::Server && self.cert.is_none() {
            error!("certificate needed in server mode");
            return Err(Disconnect::with_local(
                AlertDescription::InternalError,
                AlertDescription::BadCertificate,
            ));
        }

        // The chain is used as supplied; no search for an alternative path
        // to the CA set is attempted.
        if let Some(chain) = &self.cert {
            if self.ca_certs.is_some() && !chain.verify(self.ca_certs.as_deref()) {
                error!("can't verify local chain against the local CA certs");
                return Err(Disconnect::with_local(
                    AlertDescription::InternalError,
                    AlertDescription::UnknownCa,
                ));
            }

            let suite: &'static CipherSuite = self.pending_suite()?;
            if !suite.key_exchange.validate_cert_key_type(chain.leaf().key_type()) {
                error!("local certificate key type incompatible with {}", suite.name);
                return Err(Disconnect::with_local(
                    AlertDescription::InternalError,
                    AlertDescription::CertificateUnknown,
                ));
            }
        }

        let body: Vec<u8> = certificate::ser(self.cert.as_ref());
        self.tx_handshake(io, HandshakeType::Certificate, &body);

        if self.cert.is_some() {
            self.cert_sent = true;
        }
        Ok(())
    }

    fn send_client_key_exchange<Io: TlsIo, R: RngCore + CryptoRng>(
        &mut self,
        io: &mut Io,
        rng: &mut R,
    ) -> HsResult<()> {
        let peer_pubkey: &RsaPublicKey = match &self.peer_pubkey {
            Some(pubkey) => pubkey,
            None => {
                error!("peer public key not received");
                return Err(AlertDescription::InternalError.into());
            }
        };

        let mut pre_master: Zeroizing<[u8; 48]> = Zeroizing::new([0; 48]);
        pre_master[..2].copy_from_slice(&(TLS_VERSION as u16).to_be_bytes());
        rng.fill_bytes(&mut pre_master[2..]);

        let encrypted: Vec<u8> = match crypto::rsa_encrypt(rng, peer_pubkey, &*pre_master) {
            Some(encrypted) => encrypted,
            None => {
                error!("encrypting the premaster secret failed");
                return Err(AlertDescription::InternalError.into());
            }
        };

        let mut writer: Writer = Writer::with_capacity(2 + encrypted.len());
        writer.put_u16(unwrap!(u16::try_from(encrypted.len()).ok()));
        writer.put_slice(&encrypted);
        let body: Vec<u8> = writer.into_inner();
        self.tx_handshake(io, HandshakeType::ClientKeyExchange, &body);

        self.generate_master_secret(&*pre_master)
    }

    fn send_certificate_verify<Io: TlsIo>(&mut self, io: &mut Io) -> HsResult<()> {
        let signature_hash: HashType = self.signature_hash;
        let tls12: bool = self.version_at_least_12();

        let sign_input: Zeroizing<Vec<u8>> = self.signature_input(signature_hash, false)?;

        let priv_key: &RsaPrivateKey = match &self.priv_key {
            Some(priv_key) => priv_key,
            None => {
                error!("no private key loaded");
                return Err(Disconnect::with_local(
                    AlertDescription::InternalError,
                    AlertDescription::BadCertificate,
                ));
            }
        };

        let signature: Vec<u8> = match crypto::rsa_sign(priv_key, &sign_input) {
            Some(signature) => signature,
            None => {
                error!("signing the handshake hash failed");
                return Err(AlertDescription::InternalError.into());
            }
        };

        let mut writer: Writer = Writer::with_capacity(4 + signature.len());
        if tls12 {
            writer.put_u8(signature_hash.tls_id());
            // RSA_sign
            writer.put_u8(1);
        }
        writer.put_u16(unwrap!(u16::try_from(signature.len()).ok()));
        writer.put_slice(&signature);
        let body: Vec<u8> = writer.into_inner();

        // Stop maintaining handshake hashes other than the PRF hash
        if tls12 {
            let prf_hash: HashType = self.prf_hash;
            if let Some(transcript) = &mut self.transcript {
                transcript.retain(prf_hash, prf_hash);
            }
        }

        self.tx_handshake(io, HandshakeType::CertificateVerify, &body);
        Ok(())
    }

    fn send_finished<Io: TlsIo>(&mut self, io: &mut Io) -> HsResult<()> {
        let tx_suite: &'static CipherSuite = match self.tx_suite {
            Some(suite) => suite,
            None => return Err(AlertDescription::InternalError.into()),
        };

        let label: &[u8] = match self.role {
            Role::Server => b"server finished",
            Role::Client => b"client finished",
        };
        let verify_data: Zeroizing<Vec<u8>> =
            self.finished_verify_data(label, tx_suite.verify_data_length, false)?;

        self.tx_handshake(io, HandshakeType::Finished, &verify_data);
        Ok(())
    }

    /// `verify_data = PRF(master_secret, finished_label, Hash(handshake_messages))`
    ///
    /// `use_snapshot` selects the transcript state from before the peer's
    /// Finished was absorbed (receive path); transmit uses the live state.
    fn finished_verify_data(
        &self,
        label: &[u8],
        verify_data_length: usize,
        use_snapshot: bool,
    ) -> HsResult<Zeroizing<Vec<u8>>> {
        let version: TlsVersion = self.negotiated_version()?;
        let transcript: &TranscriptHashes = match &self.transcript {
            Some(transcript) => transcript,
            None => return Err(AlertDescription::InternalError.into()),
        };

        let mut seed: Zeroizing<[u8; 48]> = Zeroizing::new([0; 48]);
        let seed_len: usize = if version >= TlsVersion::V1_2 {
            let len: usize = self.prf_hash.digest_len();
            if use_snapshot {
                match transcript.prev_digest(self.prf_hash) {
                    Some(digest) => seed[..len].copy_from_slice(digest),
                    None => return Err(AlertDescription::InternalError.into()),
                }
            } else if !transcript.digest(self.prf_hash, &mut seed[..len]) {
                return Err(AlertDescription::InternalError.into());
            }
            len
        } else {
            // MD5 followed by SHA-1
            if use_snapshot {
                let md5: &[u8] = transcript
                    .prev_digest(HashType::Md5)
                    .ok_or(AlertDescription::InternalError)?;
                let sha1: &[u8] = transcript
                    .prev_digest(HashType::Sha1)
                    .ok_or(AlertDescription::InternalError)?;
                seed[..16].copy_from_slice(md5);
                seed[16..36].copy_from_slice(sha1);
            } else {
                if !transcript.digest(HashType::Md5, &mut seed[..16]) {
                    return Err(AlertDescription::InternalError.into());
                }
                if !transcript.digest(HashType::Sha1, &mut seed[16..36]) {
                    return Err(AlertDescription::InternalError.into());
                }
            }
            36
        };

        let mut verify_data: Zeroizing<Vec<u8>> =
            Zeroizing::new(alloc::vec![0; verify_data_length]);
        key_schedule::prf(
            version,
            self.prf_hash,
            &*self.master_secret,
            label,
            &seed[..seed_len],
            &mut verify_data,
        );
        Ok(verify_data)
    }

    /// Build the RSA signing input for CertificateVerify: a DigestInfo at
    /// TLS 1.2, the raw MD5‖SHA1 concatenation before that.
    ///
    /// `use_snapshot` selects the transcript from before the message being
    /// verified (receive path).
    fn signature_input(
        &self,
        hash: HashType,
        use_snapshot: bool,
    ) -> HsResult<Zeroizing<Vec<u8>>> {
        let transcript: &TranscriptHashes = match &self.transcript {
            Some(transcript) => transcript,
            None => return Err(AlertDescription::InternalError.into()),
        };

        if self.version_at_least_12() {
            let len: usize = hash.digest_len();
            let mut digest: [u8; 48] = [0; 48];
            if use_snapshot {
                match transcript.prev_digest(hash) {
                    Some(prev) => digest[..len].copy_from_slice(prev),
                    None => {
                        error!("unknown hash type {}", hash.tls_id());
                        return Err(AlertDescription::DecryptError.into());
                    }
                }
            } else if !transcript.digest(hash, &mut digest[..len]) {
                error!("unknown hash type {}", hash.tls_id());
                return Err(AlertDescription::DecryptError.into());
            }
            Ok(Zeroizing::new(crypto::digest_info(hash, &digest[..len])))
        } else {
            let mut input: Zeroizing<Vec<u8>> = Zeroizing::new(alloc::vec![0; 36]);
            if use_snapshot {
                let md5: &[u8] = transcript
                    .prev_digest(HashType::Md5)
                    .ok_or(AlertDescription::DecryptError)?;
                let sha1: &[u8] = transcript
                    .prev_digest(HashType::Sha1)
                    .ok_or(AlertDescription::DecryptError)?;
                input[..16].copy_from_slice(md5);
                input[16..].copy_from_slice(sha1);
            } else {
                if !transcript.digest(HashType::Md5, &mut input[..16]) {
                    return Err(AlertDescription::InternalError.into());
                }
                if !transcript.digest(HashType::Sha1, &mut input[16..]) {
                    return Err(AlertDescription::InternalError.into());
                }
            }
            Ok(input)
        }
    }

    /// Verify a CertificateVerify signature against the snapshotted
    /// transcript.
    fn verify_peer_signature(&self, body: &[u8]) -> HsResult<()> {
        let peer_pubkey: &RsaPublicKey = match &self.peer_pubkey {
            Some(pubkey) => pubkey,
            None => return Err(AlertDescription::InternalError.into()),
        };
        let modulus_len: usize = peer_pubkey.size();

        // 2 bytes of SignatureAndHashAlgorithm at TLS 1.2
        let offset: usize = if self.version_at_least_12() { 2 } else { 0 };

        if body.len() < offset + 2 {
            return Err(AlertDescription::DecodeError.into());
        }
        let sig_len: usize =
            u16::from_be_bytes(unwrap!(body[offset..offset + 2].try_into())).into();
        if offset + 2 + sig_len != body.len() || sig_len != modulus_len {
            error!("signature length {} doesn't match", sig_len);
            return Err(AlertDescription::DecodeError.into());
        }

        let hash: HashType = if self.version_at_least_12() {
            if body[1] != 1 {
                error!("unknown signature algorithm {}", body[1]);
                return Err(AlertDescription::DecryptError.into());
            }
            match HashType::from_tls_id(body[0]) {
                Some(hash) => hash,
                None => {
                    error!("unknown hash type {}", body[0]);
                    return Err(AlertDescription::DecryptError.into());
                }
            }
        } else {
            // unused below 1.2
            HashType::Sha256
        };

        let expected: Zeroizing<Vec<u8>> = self.signature_input(hash, true)?;

        if !crypto::rsa_verify(peer_pubkey, &expected, &body[offset + 2..]) {
            error!("peer signature verification failed");
            return Err(AlertDescription::DecryptError.into());
        }
        debug!("peer signature verified");
        Ok(())
    }

    fn generate_master_secret(&mut self, pre_master: &[u8; 48]) -> HsResult<()> {
        let version: TlsVersion = self.negotiated_version()?;
        let suite: &'static CipherSuite = self.pending_suite()?;

        self.master_secret = key_schedule::master_secret(
            version,
            self.prf_hash,
            pre_master,
            &self.client_random,
            &self.server_random,
        );

        self.key_block = Some(KeyBlock::derive(
            version,
            self.prf_hash,
            suite,
            &self.master_secret,
            &self.client_random,
            &self.server_random,
        ));
        Ok(())
    }

    /// Extract the cipher spec for one direction from the key block.
    ///
    /// Client write and server read use the client halves of the key
    /// block, and vice versa.
    fn take_cipher_spec(&mut self, tx: bool) -> HsResult<CipherSpecParams> {
        let suite: &'static CipherSuite = self.pending_suite()?;
        let key_block: &mut KeyBlock = match &mut self.key_block {
            Some(key_block) => key_block,
            None => return Err(AlertDescription::InternalError.into()),
        };

        let client_side: bool = (self.role == Role::Client) == tx;

        let (mac_key, enc_key, iv): (Vec<u8>, Vec<u8>, Vec<u8>) = if client_side {
            (
                mem::take(&mut key_block.client_mac),
                mem::take(&mut key_block.client_key),
                mem::take(&mut key_block.client_iv),
            )
        } else {
            (
                mem::take(&mut key_block.server_mac),
                mem::take(&mut key_block.server_key),
                mem::take(&mut key_block.server_iv),
            )
        };

        Ok(CipherSpecParams {
            suite_id: suite.id,
            mac_key,
            enc_key,
            iv,
        })
    }

    fn tx_handshake<Io: TlsIo>(&mut self, io: &mut Io, msg_type: HandshakeType, body: &[u8]) {
        debug!("sending a {:?} of {} bytes", msg_type, body.len());

        let header: HandshakeHeader = HandshakeHeader::ser(msg_type, body.len());

        if let Some(transcript) = &mut self.transcript {
            transcript.update(header.as_bytes());
            transcript.update(body);
        }

        let mut message: Vec<u8> = Vec::with_capacity(HandshakeHeader::LEN + body.len());
        message.extend_from_slice(header.as_bytes());
        message.extend_from_slice(body);
        io.tx_record(ContentType::Handshake, &message);
    }

    fn send_alert<Io: TlsIo>(&mut self, io: &mut Io, level: AlertLevel, desc: AlertDescription) {
        debug!("sending a {:?} alert: {:?}", level, desc);
        io.tx_record(ContentType::Alert, &[level.into(), desc.into()]);
    }

    /// Fatal teardown: wire alert, state reset, secret cleanup, and the
    /// disconnect callback — in that order.  The disconnect callback is the
    /// last operation so the callee is free to drop this object.
    fn disconnect<Io: TlsIo>(
        &mut self,
        io: &mut Io,
        wire: AlertDescription,
        local: AlertDescription,
    ) {
        self.send_alert(io, AlertLevel::Fatal, wire);

        self.reset_handshake();
        self.cleanup_handshake_secrets();

        self.pending_suite = None;
        self.tx_suite = None;
        self.rx_suite = None;
        io.reset_ciphers();

        self.negotiated_version = None;
        self.ready = false;

        io.disconnect(wire, local);
    }

    /// Free per-handshake resources and return to the initial state.
    fn reset_handshake(&mut self) {
        self.key_block = None;
        self.peer_cert = None;
        self.peer_pubkey = None;
        self.transcript = None;
        self.state = HandshakeState::WaitHello;
        self.cert_requested = false;
        self.cert_sent = false;
    }

    fn cleanup_handshake_secrets(&mut self) {
        self.client_random.zeroize();
        self.server_random.zeroize();
        self.master_secret.zeroize();
    }

    fn negotiated_version(&self) -> HsResult<TlsVersion> {
        self.negotiated_version
            .ok_or_else(|| AlertDescription::InternalError.into())
    }

    fn pending_suite(&self) -> HsResult<&'static CipherSuite> {
        self.pending_suite
            .ok_or_else(|| AlertDescription::InternalError.into())
    }
}

impl core::fmt::Debug for Tls {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
        write!(
            f,
            "Tls {{ role: {:?}, state: {:?}, ready: {} }}",
            self.role, self.state, self.ready
        )
    }
}

#[cfg(feature = "std")]
impl Tls {
    /// Load the trusted CA certificate set from a PEM file, replacing any
    /// existing set; `None` clears it.
    pub fn set_ca_cert_file(&mut self, path: Option<&str>) -> bool {
        debug!("ca-cert-path={:?}", path);

        self.ca_certs = None;

        if let Some(path) = path {
            let pem: Vec<u8> = match std::fs::read(path) {
                Ok(pem) => pem,
                Err(_) => {
                    error!("error reading {}", path);
                    return false;
                }
            };
            match cert::certs_from_pem(&pem) {
                Some(certs) => self.ca_certs = Some(certs),
                None => {
                    error!("error loading {}", path);
                    return false;
                }
            }
        }

        true
    }

    /// Load the local certificate chain and RSA private key from PEM
    /// files.
    ///
    /// The key may be PKCS#8 (optionally encrypted under `passphrase`) or
    /// PKCS#1.  Passing `None` paths clears the respective item.
    pub fn set_auth_data_files(
        &mut self,
        cert_path: Option<&str>,
        key_path: Option<&str>,
        passphrase: Option<&str>,
    ) -> bool {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        use rsa::pkcs8::DecodePrivateKey;

        debug!("cert-path={:?} priv-key-path={:?}", cert_path, key_path);

        self.cert = None;
        self.priv_key = None;

        if let Some(path) = cert_path {
            let pem: Vec<u8> = match std::fs::read(path) {
                Ok(pem) => pem,
                Err(_) => {
                    error!("error reading {}", path);
                    return false;
                }
            };
            match CertChain::from_pem(&pem) {
                Some(chain) => self.cert = Some(chain),
                None => {
                    error!("error loading {}", path);
                    return false;
                }
            }
        }

        if let Some(path) = key_path {
            let pem: String = match std::fs::read_to_string(path) {
                Ok(pem) => pem,
                Err(_) => {
                    error!("error reading {}", path);
                    return false;
                }
            };

            let key: Option<RsaPrivateKey> = match passphrase {
                Some(passphrase) => {
                    RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, passphrase).ok()
                }
                None => RsaPrivateKey::from_pkcs8_pem(&pem)
                    .ok()
                    .or_else(|| RsaPrivateKey::from_pkcs1_pem(&pem).ok()),
            };

            match key {
                Some(key) => self.priv_key = Some(key),
                None => {
                    error!("not a usable RSA private key: {}", path);
                    self.cert = None;
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct NullIo {
        records: Vec<(ContentType, Vec<u8>)>,
        disconnects: Vec<(AlertDescription, AlertDescription)>,
    }

    impl TlsIo for NullIo {
        fn tx_record(&mut self, content_type: ContentType, fragment: &[u8]) {
            self.records.push((content_type, fragment.to_vec()));
        }
        fn app_data(&mut self, _data: &[u8]) {}
        fn ready(&mut self, _peer_identity: Option<&str>) {}
        fn disconnect(&mut self, wire: AlertDescription, local: AlertDescription) {
            self.disconnects.push((wire, local));
        }
    }

    #[test]
    fn client_start_emits_client_hello() {
        let mut tls: Tls = Tls::client();
        let mut io: NullIo = NullIo::default();
        assert!(tls.start(&mut io, &mut rand::thread_rng()));

        assert_eq!(tls.state(), HandshakeState::WaitHello);
        assert_eq!(io.records.len(), 1);
        let (content_type, record) = &io.records[0];
        assert_eq!(*content_type, ContentType::Handshake);
        assert_eq!(record[0], u8::from(HandshakeType::ClientHello));

        // a second start is rejected
        assert!(!tls.start(&mut io, &mut rand::thread_rng()));
    }

    #[test]
    fn server_rejects_start() {
        let mut tls: Tls = Tls::server();
        let mut io: NullIo = NullIo::default();
        assert!(!tls.start(&mut io, &mut rand::thread_rng()));
    }

    #[test]
    fn app_data_before_ready_is_fatal() {
        let mut tls: Tls = Tls::server();
        let mut io: NullIo = NullIo::default();
        tls.rx(
            &mut io,
            &mut rand::thread_rng(),
            ContentType::ApplicationData,
            b"too early",
        );

        assert_eq!(
            io.disconnects,
            alloc::vec![(
                AlertDescription::UnexpectedMessage,
                AlertDescription::UnexpectedMessage
            )]
        );
        // the wire alert went out before the disconnect callback
        let (content_type, record) = io.records.last().unwrap();
        assert_eq!(*content_type, ContentType::Alert);
        assert_eq!(record[1], u8::from(AlertDescription::UnexpectedMessage));
    }

    #[test]
    fn write_before_ready_is_ignored() {
        let mut tls: Tls = Tls::client();
        let mut io: NullIo = NullIo::default();
        tls.write(&mut io, b"data");
        assert!(io.records.is_empty());
    }

    #[test]
    fn peer_alert_reports_local_code() {
        let mut tls: Tls = Tls::client();
        let mut io: NullIo = NullIo::default();
        tls.rx(
            &mut io,
            &mut rand::thread_rng(),
            ContentType::Alert,
            &[
                u8::from(AlertLevel::Fatal),
                u8::from(AlertDescription::HandshakeFailure),
            ],
        );

        assert_eq!(
            io.disconnects,
            alloc::vec![(
                AlertDescription::CloseNotify,
                AlertDescription::HandshakeFailure
            )]
        );
    }
}
