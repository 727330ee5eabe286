//! gRPC plumbing shared by masters and workers.
//!
//! Every call dials a fresh connection, performs one request/response
//! exchange and drops the connection again. Calls have no deadline; they
//! end when the peer answers or the transport gives up.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use master::master_client::MasterClient;
use worker::worker_client::WorkerClient;

pub mod master {
    tonic::include_proto!("master");
}

pub mod worker {
    tonic::include_proto!("worker");
}

/// Why a call did not produce a reply.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("invalid address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("{method} on {address} failed: {status}")]
    Rejected {
        address: String,
        method: &'static str,
        status: tonic::Status,
    },
}

impl CallError {
    pub fn rejected(address: &str, method: &'static str, status: tonic::Status) -> Self {
        Self::Rejected {
            address: address.to_string(),
            method,
            status,
        }
    }
}

/// Connection settings used for every outgoing call.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Upper bound on establishing a connection. The call itself is never
    /// timed out.
    pub connect_timeout: Option<Duration>,

    /// Whether to set `TCP_NODELAY` on outgoing connections.
    pub tcp_nodelay: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            tcp_nodelay: true,
        }
    }
}

impl ChannelConfig {
    fn endpoint(&self, address: &str) -> Result<Endpoint, CallError> {
        let mut endpoint =
            Endpoint::from_shared(with_scheme(address)).map_err(|source| {
                CallError::InvalidAddress {
                    address: address.to_string(),
                    source,
                }
            })?;

        if let Some(timeout) = self.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        Ok(endpoint.tcp_nodelay(self.tcp_nodelay))
    }

    /// Open a connection to `address`.
    pub async fn connect(&self, address: &str) -> Result<Channel, CallError> {
        debug!("Dialing {address}");
        self.endpoint(address)?
            .connect()
            .await
            .map_err(|source| CallError::Connect {
                address: address.to_string(),
                source,
            })
    }

    /// Client for the `Worker` service at `address`.
    pub async fn worker(&self, address: &str) -> Result<WorkerClient<Channel>, CallError> {
        Ok(WorkerClient::new(self.connect(address).await?))
    }

    /// Client for the `Master` service at `address`.
    pub async fn master(&self, address: &str) -> Result<MasterClient<Channel>, CallError> {
        Ok(MasterClient::new(self.connect(address).await?))
    }
}

/// Node addresses are plain `host:port`; tonic wants a URI.
pub fn with_scheme(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_gain_a_scheme_once() {
        assert_eq!(with_scheme("localhost:7782"), "http://localhost:7782");
        assert_eq!(with_scheme("http://[::1]:8030"), "http://[::1]:8030");
    }

    #[test]
    fn endpoint_targets_the_address() {
        let config = ChannelConfig {
            connect_timeout: Some(Duration::from_secs(2)),
            tcp_nodelay: false,
        };
        let endpoint = config.endpoint("127.0.0.1:7783").unwrap();
        assert_eq!(endpoint.uri().host(), Some("127.0.0.1"));
        assert_eq!(endpoint.uri().port_u16(), Some(7783));
    }

    #[tokio::test]
    async fn connecting_to_a_closed_port_fails() {
        // Bind then drop so the port is known to be free.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = ChannelConfig::default().worker(&address).await.unwrap_err();
        assert!(matches!(err, CallError::Connect { .. }));
    }
}
