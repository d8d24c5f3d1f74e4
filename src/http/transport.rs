//! Pluggable HTTP transport.
//!
//! The IAM client only needs "send this request, give me status and body".
//! Keeping that behind a trait lets TLS setup live outside the client and lets
//! tests substitute a mock.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use reqwest::{Certificate, Client, Request};

const USER_AGENT: &str = concat!("rgwiam/", env!("RGWIAM_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends the request and reads the whole body. Errors are network-level
    /// only; any HTTP status is a successful exchange.
    async fn execute(&self, request: Request) -> Result<HttpResponse>;
}

/// TLS settings injected from provider configuration.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Extra PEM-encoded root certificate(s) to trust.
    pub ca_pem: Option<Vec<u8>>,
    pub insecure_skip_verify: bool,
}

/// [`HttpTransport`] backed by a `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a client honoring the given TLS options.
    pub fn new(tls: &TlsOptions, request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(pem) = &tls.ca_pem {
            let certs =
                Certificate::from_pem_bundle(pem).context("Failed to parse CA certificate")?;
            if certs.is_empty() {
                bail!("CA certificate file contains no PEM certificates");
            }
            debug!("HTTP client trusting {} custom CA certificate(s)", certs.len());
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
            debug!("HTTP client configured to skip TLS verification");
        }

        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[tracing::instrument(skip(self, request), fields(url = %request.url()))]
    async fn execute(&self, request: Request) -> Result<HttpResponse> {
        let response = self
            .client
            .execute(request)
            .await
            .context("Failed to send request")?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
