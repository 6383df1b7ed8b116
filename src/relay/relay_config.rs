use std::net::SocketAddr;
use std::time::Duration;

use anyhow::bail;

use crate::frame::frame_model::MAX_RESPONSE_OVERHEAD;

/// Fixed at startup; nothing in the relay changes its configuration while it is running.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub self_addr: SocketAddr,

    /// An association is live for this long after the client's most recent ASSOCIATE request
    pub association_timeout: Duration,
    /// maximum payload length of a pushed message, in bytes
    pub max_payload_len: usize,
    /// maximum number of pending messages per recipient
    pub max_buffer_size: usize,
    /// Upper bound for the number of tracked associations. Registering a new client beyond this
    ///  number evicts stale associations, and if there are none, the least recently renewed one.
    ///  `None` means no limit.
    pub max_associations: Option<usize>,

    /// Size of the receive buffer. Datagrams filling the entire buffer are assumed to be
    ///  truncated and are rejected.
    pub max_datagram_size: usize,
}

impl RelayConfig {
    pub fn new(self_addr: SocketAddr) -> RelayConfig {
        RelayConfig {
            self_addr,
            association_timeout: Duration::from_secs(30),
            max_payload_len: 1024,
            max_buffer_size: 5,
            max_associations: Some(100_000),
            max_datagram_size: 64 * 1024,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_buffer_size == 0 {
            bail!("max buffer size must be at least 1");
        }
        if self.association_timeout.is_zero() {
            bail!("association timeout must not be zero");
        }
        if self.max_associations == Some(0) {
            bail!("max associations must be at least 1");
        }
        // a GET_RESPONSE with a maximum-size payload must fit into a datagram
        if self.max_payload_len + MAX_RESPONSE_OVERHEAD >= self.max_datagram_size {
            bail!("max payload length of {} bytes does not fit into datagrams of {} bytes", self.max_payload_len, self.max_datagram_size);
        }
        if self.max_datagram_size > 64 * 1024 {
            bail!("max datagram size {} exceeds UDP's limit", self.max_datagram_size);
        }
        Ok(())
    }
}
