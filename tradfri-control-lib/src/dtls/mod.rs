//! DTLS-PSK transport to the gateway.
//!
//! The gateway only accepts DTLS 1.2 with `TLS_PSK_WITH_AES_128_CCM_8`, so a
//! session is an ephemeral UDP socket connected to the gateway address with a
//! pre-shared-key handshake on top. A session is either connected or does not
//! exist; a failed handshake is terminal and reported to the caller, never
//! acted on here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use webrtc_dtls::cipher_suite::CipherSuiteId;
use webrtc_dtls::config::{Config, ExtendedMasterSecretType};
use webrtc_dtls::conn::DTLSConn;
use webrtc_util::Conn;

use crate::error::{Error, Result};
use crate::util::traits::Transport;

/// Largest datagram the gateway will send; device listings stay well below
/// the DTLS record limit.
const RECV_BUFFER_SIZE: usize = 1500;

/// The identity/key pair registered for the handshake.
///
/// Exactly one mapping exists per session, and it is installed before the
/// handshake begins so the key material is available to the PSK callback.
#[derive(Clone)]
pub struct PskStore {
    identity: String,
    key: Vec<u8>,
}

impl PskStore {
    pub fn new(identity: &str, key: &[u8]) -> Self {
        PskStore {
            identity: identity.to_string(),
            key: key.to_vec(),
        }
    }

    fn into_config(self) -> Config {
        let key = self.key;
        Config {
            psk: Some(Arc::new(move |_hint: &[u8]| Ok(key.clone()))),
            psk_identity_hint: Some(self.identity.into_bytes()),
            cipher_suites: vec![CipherSuiteId::Tls_Psk_With_Aes_128_Ccm_8],
            extended_master_secret: ExtendedMasterSecretType::Require,
            ..Default::default()
        }
    }
}

/// One encrypted datagram session to a single gateway peer.
///
/// The session supports exactly one outstanding write/read pair; both
/// operations take `&mut self` and the owning client serializes its calls.
pub struct DtlsSession {
    conn: Arc<dyn Conn + Send + Sync>,
    gateway: String,
}

impl DtlsSession {
    /// Connects to `gateway` (a `host:port` address) and performs the PSK
    /// handshake, bounded by `handshake_timeout`.
    ///
    /// Bad credentials, an unreachable peer and an elapsed timeout all
    /// surface as [`Error::Handshake`]; deciding whether that is fatal to
    /// the process is the caller's business.
    pub async fn connect(
        gateway: &str,
        identity: &str,
        psk: &[u8],
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::Connection(format!("binding local socket: {}", e)))?;
        socket.connect(gateway).await.map_err(|e| Error::Handshake {
            gateway: gateway.to_string(),
            reason: format!("resolving peer address: {}", e),
        })?;

        let config = PskStore::new(identity, psk).into_config();

        info!("connecting to gateway {} as {}", gateway, identity);
        let conn: Arc<dyn Conn + Send + Sync> = Arc::new(socket);
        let dtls_conn = timeout(handshake_timeout, DTLSConn::new(conn, config, true, None))
            .await
            .map_err(|_| Error::Handshake {
                gateway: gateway.to_string(),
                reason: format!("handshake timed out after {:?}", handshake_timeout),
            })?
            .map_err(|e| Error::Handshake {
                gateway: gateway.to_string(),
                reason: e.to_string(),
            })?;
        info!("DTLS session established with {}", gateway);

        Ok(DtlsSession {
            conn: Arc::new(dtls_conn),
            gateway: gateway.to_string(),
        })
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Closes the session. Dropping the session without closing leaves the
    /// gateway to time the association out on its own.
    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}

#[async_trait]
impl Transport for DtlsSession {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        debug!("writing {} bytes to {}", data.len(), self.gateway);
        self.conn
            .send(data)
            .await
            .map(|_| ())
            .map_err(|e| Error::Connection(format!("write to {}: {}", self.gateway, e)))
    }

    async fn read(&mut self, read_timeout: Duration) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        let n = timeout(read_timeout, self.conn.recv(&mut buffer))
            .await
            .map_err(|_| Error::ReadTimeout)?
            .map_err(|e| Error::Connection(format!("read from {}: {}", self.gateway, e)))?;
        buffer.truncate(n);
        debug!("read {} bytes from {}", n, self.gateway);
        Ok(buffer)
    }
}
