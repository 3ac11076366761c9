//! Request/response client over a [`Transport`].

use std::time::Duration;

use log::debug;

use crate::coap::{CoapMessage, Method, ResourcePath};
use crate::error::{Error, Result};
use crate::util::traits::Transport;

/// How long a call waits for the gateway's reply.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Pairs a transport with a message-id counter and turns the two into a
/// single `call(request) -> response` primitive.
///
/// The client owns its transport exclusively, so only one request can be in
/// flight at a time and sequential calls are processed in issuance order.
/// Message ids are unique per in-flight request for this instance; a second
/// client talking to the same gateway has an independent id space.
pub struct CoapClient<T: Transport> {
    transport: T,
    message_id: u16,
    read_timeout: Duration,
}

impl<T: Transport> CoapClient<T> {
    pub fn new(transport: T) -> Self {
        CoapClient {
            transport,
            message_id: 0,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Increments before every encode so each call gets a fresh identifier,
    /// wrapping at 65536.
    fn next_message_id(&mut self) -> u16 {
        self.message_id = self.message_id.wrapping_add(1);
        self.message_id
    }

    /// Sends one request and reads back the correlated reply.
    ///
    /// Encode, write, read and decode errors short-circuit unchanged; there
    /// is no retry at this layer. A reply carrying a different message id
    /// than the request is rejected as [`Error::Correlation`] rather than
    /// accepted as the answer.
    pub async fn call(
        &mut self,
        method: Method,
        path: ResourcePath,
        payload: Vec<u8>,
    ) -> Result<CoapMessage> {
        let message_id = self.next_message_id();
        let request = CoapMessage::request(method, path, payload, message_id);
        debug!("{} {} (id {})", method, request.path, message_id);

        self.transport.write(&request.encode()).await?;
        let raw = self.transport.read(self.read_timeout).await?;
        let response = CoapMessage::decode(&raw)?;

        if response.message_id != message_id {
            return Err(Error::Correlation {
                expected: message_id,
                actual: response.message_id,
            });
        }
        debug!("{} {} -> {}", method, request.path, response.code_string());
        Ok(response)
    }
}
