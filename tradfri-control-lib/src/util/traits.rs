use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// The byte channel a [`crate::coap::client::CoapClient`] drives.
///
/// One write/read pair may be outstanding at a time; both methods take
/// `&mut self`, so exclusive ownership of the transport enforces that
/// contract by construction. The production implementation is
/// [`crate::dtls::DtlsSession`]; tests substitute a stub.
#[async_trait]
pub trait Transport: Send {
    /// Writes one datagram to the peer.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Reads one datagram, waiting at most `timeout`.
    async fn read(&mut self, timeout: Duration) -> Result<Vec<u8>>;
}
