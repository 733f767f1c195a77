// ABOUTME: Target PostgreSQL connection handling with TLS and retry
// ABOUTME: Each replication unit opens its own client and drops it when done

use std::time::Duration;

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::Client;

use crate::error::ReplicationError;
use crate::utils::{mask_password, retry_with_backoff, validate_connection_string};

/// Opens clients against the target warehouse.
///
/// Cheap to clone; every worker gets its own copy and its own client.
#[derive(Clone)]
pub struct TargetConnector {
    url: String,
    allow_self_signed: bool,
}

impl TargetConnector {
    /// Validate the connection string. Nothing is dialed yet.
    pub fn new(url: &str, allow_self_signed: bool) -> Result<Self, ReplicationError> {
        validate_connection_string(url).map_err(|e| ReplicationError::config(format!("{:#}", e)))?;
        Ok(Self {
            url: url.to_string(),
            allow_self_signed,
        })
    }

    /// Connection string with the password masked, for logs.
    pub fn display_url(&self) -> String {
        mask_password(&self.url)
    }

    /// Open a single client. The connection task is spawned on the runtime and
    /// ends when the returned client is dropped.
    pub async fn connect(&self) -> Result<Client> {
        let mut builder = TlsConnector::builder();
        if self.allow_self_signed {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        let tls = MakeTlsConnector::new(builder.build().context("Failed to build TLS connector")?);

        let (client, connection) = tokio_postgres::connect(&self.url, tls)
            .await
            .with_context(|| format!("Failed to connect to {}", self.display_url()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Target connection error: {}", e);
            }
        });

        Ok(client)
    }

    /// Open a client, retrying transient failures with exponential backoff
    /// (3 retries starting at 1s).
    pub async fn connect_with_retry(&self) -> Result<Client> {
        retry_with_backoff(|| self.connect(), 3, Duration::from_secs(1)).await
    }
}
