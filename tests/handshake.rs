//! End-to-end handshake scenarios: a client and a server endpoint wired
//! back-to-back through a pass-through record layer.

use femtotls::cert::{certs_from_pem, CertChain, Certificate};
use femtotls::rand_core::RngCore;
use femtotls::rsa::pkcs8::DecodePrivateKey;
use femtotls::rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use femtotls::{AlertDescription, CipherSpecParams, ContentType, HandshakeState, Tls, TlsIo};

const CA_PEM: &[u8] = include_bytes!("assets/ca.pem");
const SERVER_PEM: &[u8] = include_bytes!("assets/server.pem");
const SERVER_KEY_PEM: &str = include_str!("assets/server.key");
const CLIENT_PEM: &[u8] = include_bytes!("assets/client.pem");
const CLIENT_KEY_PEM: &str = include_str!("assets/client.key");

/// Record-layer stand-in: collects whatever the endpoint emits.
///
/// The handshake itself never requires record encryption, so records are
/// passed between the peers as plaintext; cipher-spec installations are
/// captured for inspection.
#[derive(Default)]
struct Wire {
    outbox: Vec<(ContentType, Vec<u8>)>,
    app_data: Vec<u8>,
    ready: Option<Option<String>>,
    disconnects: Vec<(AlertDescription, AlertDescription)>,
    tx_cipher: Option<CipherSpecParams>,
    rx_cipher: Option<CipherSpecParams>,
}

impl TlsIo for Wire {
    fn tx_record(&mut self, content_type: ContentType, fragment: &[u8]) {
        self.outbox.push((content_type, fragment.to_vec()));
    }

    fn app_data(&mut self, data: &[u8]) {
        self.app_data.extend_from_slice(data);
    }

    fn ready(&mut self, peer_identity: Option<&str>) {
        self.ready = Some(peer_identity.map(String::from));
    }

    fn disconnect(&mut self, wire: AlertDescription, local: AlertDescription) {
        self.disconnects.push((wire, local));
    }

    fn install_tx_cipher(&mut self, params: CipherSpecParams) {
        self.tx_cipher = Some(params);
    }

    fn install_rx_cipher(&mut self, params: CipherSpecParams) {
        self.rx_cipher = Some(params);
    }
}

fn ca_set() -> Vec<Certificate> {
    certs_from_pem(CA_PEM).unwrap()
}

fn server_auth() -> (CertChain, RsaPrivateKey) {
    (
        CertChain::from_pem(SERVER_PEM).unwrap(),
        RsaPrivateKey::from_pkcs8_pem(SERVER_KEY_PEM).unwrap(),
    )
}

fn client_auth() -> (CertChain, RsaPrivateKey) {
    (
        CertChain::from_pem(CLIENT_PEM).unwrap(),
        RsaPrivateKey::from_pkcs8_pem(CLIENT_KEY_PEM).unwrap(),
    )
}

/// Shuttle pending records between the two endpoints until both sides go
/// quiet.
fn pump(client: &mut Tls, client_wire: &mut Wire, server: &mut Tls, server_wire: &mut Wire) {
    let mut rng = rand::thread_rng();
    loop {
        // a fatal alert tears the transport down
        if !client_wire.disconnects.is_empty() || !server_wire.disconnects.is_empty() {
            return;
        }

        let to_server: Vec<(ContentType, Vec<u8>)> = std::mem::take(&mut client_wire.outbox);
        let to_client: Vec<(ContentType, Vec<u8>)> = std::mem::take(&mut server_wire.outbox);
        if to_server.is_empty() && to_client.is_empty() {
            return;
        }

        for (content_type, record) in to_server {
            server.rx(server_wire, &mut rng, content_type, &record);
        }
        for (content_type, record) in to_client {
            client.rx(client_wire, &mut rng, content_type, &record);
        }
    }
}

fn connect(client: &mut Tls, server: &mut Tls) -> (Wire, Wire) {
    let mut client_wire: Wire = Wire::default();
    let mut server_wire: Wire = Wire::default();

    assert!(client.start(&mut client_wire, &mut rand::thread_rng()));
    pump(client, &mut client_wire, server, &mut server_wire);

    (client_wire, server_wire)
}

#[test]
fn client_full_handshake() {
    let mut client: Tls = Tls::client();
    client.set_ca_certs(Some(ca_set()));

    let mut server: Tls = Tls::server();
    let (chain, key) = server_auth();
    server.set_auth_data(Some(chain), Some(key));

    let (mut client_wire, mut server_wire) = connect(&mut client, &mut server);

    assert!(client_wire.disconnects.is_empty());
    assert!(server_wire.disconnects.is_empty());
    assert!(client.is_ready());
    assert!(server.is_ready());
    assert_eq!(client.state(), HandshakeState::Done);
    assert_eq!(server.state(), HandshakeState::Done);

    // the client authenticated the server via the CA set; the server has
    // no CA set and so never authenticated the client
    assert_eq!(
        client_wire.ready,
        Some(Some(String::from("Example Server Org")))
    );
    assert!(client.is_peer_authenticated());
    assert_eq!(server_wire.ready, Some(None));
    assert!(!server.is_peer_authenticated());

    // both sides installed the same preferred suite
    let client_tx: &CipherSpecParams = client_wire.tx_cipher.as_ref().unwrap();
    let server_rx: &CipherSpecParams = server_wire.rx_cipher.as_ref().unwrap();
    assert_eq!(client_tx.suite_id, [0x00, 0x35]);
    assert_eq!(client_tx.suite_id, server_rx.suite_id);
    assert_eq!(client_tx.mac_key, server_rx.mac_key);
    assert_eq!(client_tx.enc_key, server_rx.enc_key);
    // SHA-1 MAC key, AES-256 key, no CBC IV in the key block at TLS 1.2
    assert_eq!(client_tx.mac_key.len(), 20);
    assert_eq!(client_tx.enc_key.len(), 32);
    assert!(client_tx.iv.is_empty());

    // application data passes through decrypted exactly as written
    client.write(&mut client_wire, b"GET / HTTP/1.0\r\n\r\n");
    pump(&mut client, &mut client_wire, &mut server, &mut server_wire);
    assert_eq!(server_wire.app_data, b"GET / HTTP/1.0\r\n\r\n");

    server.write(&mut server_wire, b"HTTP/1.0 200 OK\r\n\r\n");
    pump(&mut client, &mut client_wire, &mut server, &mut server_wire);
    assert_eq!(client_wire.app_data, b"HTTP/1.0 200 OK\r\n\r\n");
}

#[test]
fn server_handshake_with_client_auth() {
    let mut client: Tls = Tls::client();
    client.set_ca_certs(Some(ca_set()));
    let (chain, key) = client_auth();
    client.set_auth_data(Some(chain), Some(key));

    let mut server: Tls = Tls::server();
    let (chain, key) = server_auth();
    server.set_auth_data(Some(chain), Some(key));
    server.set_ca_certs(Some(ca_set()));

    let (client_wire, server_wire) = connect(&mut client, &mut server);

    assert!(client_wire.disconnects.is_empty());
    assert!(server_wire.disconnects.is_empty());
    assert!(client.is_ready());
    assert!(server.is_ready());

    // the CertificateVerify proved the client's key possession
    assert!(server.is_peer_authenticated());
    assert_eq!(
        server_wire.ready,
        Some(Some(String::from("Example Client Org")))
    );
    assert!(client.is_peer_authenticated());
    assert_eq!(
        client_wire.ready,
        Some(Some(String::from("Example Server Org")))
    );
}

#[test]
fn empty_client_certificate_is_accepted() {
    let mut client: Tls = Tls::client();
    client.set_ca_certs(Some(ca_set()));
    // no client auth data: an empty Certificate message goes out

    let mut server: Tls = Tls::server();
    let (chain, key) = server_auth();
    server.set_auth_data(Some(chain), Some(key));
    server.set_ca_certs(Some(ca_set()));

    let (client_wire, server_wire) = connect(&mut client, &mut server);

    assert!(client_wire.disconnects.is_empty());
    assert!(server_wire.disconnects.is_empty());
    assert!(client.is_ready());
    assert!(server.is_ready());

    assert!(!server.is_peer_authenticated());
    assert_eq!(server_wire.ready, Some(None));
}

#[test]
fn close_notifies_peer() {
    let mut client: Tls = Tls::client();
    client.set_ca_certs(Some(ca_set()));
    let mut server: Tls = Tls::server();
    let (chain, key) = server_auth();
    server.set_auth_data(Some(chain), Some(key));

    let (mut client_wire, _server_wire) = connect(&mut client, &mut server);
    assert!(client.is_ready());

    client.close(&mut client_wire);

    assert!(!client.is_ready());
    assert_eq!(
        client_wire.disconnects,
        vec![(AlertDescription::CloseNotify, AlertDescription::CloseNotify)]
    );
    let (content_type, record) = client_wire.outbox.last().unwrap();
    assert_eq!(*content_type, ContentType::Alert);
    assert_eq!(record[1], u8::from(AlertDescription::CloseNotify));
}

/// Replace the encrypted premaster secret in a ClientKeyExchange record.
fn forge_cke(encrypted: &[u8]) -> Vec<u8> {
    let body_len: usize = 2 + encrypted.len();
    let mut record: Vec<u8> = Vec::with_capacity(4 + body_len);
    // ClientKeyExchange handshake header
    record.push(16);
    record.extend_from_slice(&(body_len as u32).to_be_bytes()[1..]);
    record.extend_from_slice(&(encrypted.len() as u16).to_be_bytes());
    record.extend_from_slice(encrypted);
    record
}

/// Drive a handshake while substituting the client's ClientKeyExchange
/// with `forged`, asserting that the substitution itself draws no
/// reaction, and return the server side.
fn run_with_forged_cke(forged: Vec<u8>) -> Wire {
    let mut rng = rand::thread_rng();

    let mut client: Tls = Tls::client();
    client.set_ca_certs(Some(ca_set()));
    let mut server: Tls = Tls::server();
    let (chain, key) = server_auth();
    server.set_auth_data(Some(chain), Some(key));

    let mut client_wire: Wire = Wire::default();
    let mut server_wire: Wire = Wire::default();

    assert!(client.start(&mut client_wire, &mut rng));

    // ClientHello -> server flight -> client flight
    let (content_type, hello) = client_wire.outbox.remove(0);
    server.rx(&mut server_wire, &mut rng, content_type, &hello);
    for (content_type, record) in std::mem::take(&mut server_wire.outbox) {
        client.rx(&mut client_wire, &mut rng, content_type, &record);
    }

    // feed the client flight into the server with the ClientKeyExchange
    // swapped out
    let mut cke_seen: bool = false;
    for (content_type, record) in std::mem::take(&mut client_wire.outbox) {
        let is_cke: bool = content_type == ContentType::Handshake && record[0] == 16;
        let record: &[u8] = if is_cke { &forged } else { &record };

        server.rx(&mut server_wire, &mut rng, content_type, record);

        if is_cke {
            cke_seen = true;
            // RFC 5246 7.4.7.1: a bad premaster secret must not be
            // distinguishable at this point
            assert!(server_wire
                .outbox
                .iter()
                .all(|(content_type, _)| *content_type != ContentType::Alert));
            assert!(server_wire.disconnects.is_empty());
        }
    }
    assert!(cke_seen);

    server_wire
}

#[test]
fn downgraded_premaster_version_fails_at_finished() {
    // Attacker: a premaster secret claiming SSLv3/TLS-1.0-era version
    // bytes, correctly PKCS#1 encrypted to the server key.  The server
    // overrides the version bytes with the ClientHello version and derives
    // a master secret the client does not share.
    let server_cert: Certificate = certs_from_pem(SERVER_PEM).unwrap().remove(0);
    let server_pubkey = server_cert.public_key().unwrap();

    let mut pre_master: [u8; 48] = [0; 48];
    rand::thread_rng().fill_bytes(&mut pre_master[2..]);
    pre_master[0] = 0x03;
    pre_master[1] = 0x00;

    let encrypted: Vec<u8> = server_pubkey
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &pre_master)
        .unwrap();

    let server_wire: Wire = run_with_forged_cke(forge_cke(&encrypted));

    // the handshake dies only at Finished verification
    assert_eq!(
        server_wire.disconnects,
        vec![(AlertDescription::DecryptError, AlertDescription::DecryptError)]
    );
}

#[test]
fn garbage_premaster_fails_silently_until_finished() {
    // An EncryptedPreMasterSecret that does not even decrypt: the server
    // must substitute a random premaster without alerting, and only the
    // Finished mismatch may kill the handshake.
    let mut garbage: Vec<u8> = vec![0; 256];
    rand::thread_rng().fill_bytes(&mut garbage);

    let server_wire: Wire = run_with_forged_cke(forge_cke(&garbage));

    assert_eq!(
        server_wire.disconnects,
        vec![(AlertDescription::DecryptError, AlertDescription::DecryptError)]
    );
}

#[test]
fn server_without_auth_data_disconnects_itself() {
    let mut client: Tls = Tls::client();
    client.set_ca_certs(Some(ca_set()));

    // no set_auth_data: the server cannot satisfy the mandatory
    // Certificate message and must tear the handshake down itself
    let mut server: Tls = Tls::server();

    let (client_wire, server_wire) = connect(&mut client, &mut server);

    assert!(!server.is_ready());
    assert!(!client.is_ready());
    assert_eq!(
        server_wire.disconnects,
        vec![(
            AlertDescription::InternalError,
            AlertDescription::BadCertificate
        )]
    );
    // the client side never got a completed flight
    assert!(client_wire.ready.is_none());
}

#[test]
fn untrusted_server_chain_is_rejected() {
    let mut client: Tls = Tls::client();
    // trust anchor that did not issue the server certificate
    client.set_ca_certs(Some(certs_from_pem(CLIENT_PEM).unwrap()));

    let mut server: Tls = Tls::server();
    let (chain, key) = server_auth();
    server.set_auth_data(Some(chain), Some(key));

    let (client_wire, _server_wire) = connect(&mut client, &mut server);

    assert!(!client.is_ready());
    assert_eq!(
        client_wire.disconnects,
        vec![(
            AlertDescription::BadCertificate,
            AlertDescription::BadCertificate
        )]
    );
}
