//! Server verification

use std::sync::Arc;

use connect_api::{TlsOptions, VerifyServerRequest};
use tracing::{debug, warn};

use crate::errors::PublishError;
use crate::http::ConnectApi;
use crate::models::server::normalize_address;

/// Identity of a reachable server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedServer {
    /// Stable hash of the address, used as the registry id
    pub server_id: String,

    /// Address the server answers on after redirects, normalized
    pub canonical_address: String,
}

/// Confirms a server address is reachable
pub struct Verifier {
    api: Arc<dyn ConnectApi>,
}

impl Verifier {
    pub fn new(api: Arc<dyn ConnectApi>) -> Self {
        Self { api }
    }

    /// Verify `address` with one round trip.
    ///
    /// Every failure is a `PublishError::Verification` naming the address.
    pub async fn verify(
        &self,
        address: &str,
        api_key: &str,
        tls: &TlsOptions,
    ) -> Result<VerifiedServer, PublishError> {
        let address = normalize_address(address)?;
        debug!("Verifying server {}", address);

        let request = VerifyServerRequest {
            server_address: address.clone(),
            api_key: api_key.to_string(),
            tls: tls.clone(),
        };

        let response = self.api.verify_server(&request).await.map_err(|e| {
            warn!("Verification of {} failed: {}", address, e);
            PublishError::Verification {
                address: address.clone(),
                message: e.server_message(),
            }
        })?;

        if response.address_hash.is_empty() {
            return Err(PublishError::Verification {
                address,
                message: "server did not return an identifier".to_string(),
            });
        }

        let canonical_address = if response.server_address.trim().is_empty() {
            address.clone()
        } else {
            normalize_address(&response.server_address).map_err(|_| {
                PublishError::Verification {
                    address: address.clone(),
                    message: format!(
                        "server reported an invalid address '{}'",
                        response.server_address
                    ),
                }
            })?
        };

        Ok(VerifiedServer {
            server_id: response.address_hash,
            canonical_address,
        })
    }
}
