use std::net::IpAddr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

const CHECKIP_URL: &str = "https://checkip.amazonaws.com/";

/// Looks up the public IP of this host.
#[async_trait]
pub trait IpResolver {
    async fn resolve(&self) -> Result<String>;
}

/// How a failed lookup is reported to the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Errors and bodies that are not an IP address are returned as errors.
    #[default]
    Strict,
    /// The error text is handed back as if it were the IP, and the body is
    /// accepted whatever the status code.
    ErrorAsIp,
}

pub struct HttpIpResolver {
    client: Client,
    url: String,
    mode: FailureMode,
}

impl HttpIpResolver {
    pub fn new(client: Client, mode: FailureMode) -> Self {
        Self {
            client,
            url: CHECKIP_URL.to_string(),
            mode,
        }
    }

    #[cfg(test)]
    fn with_url(client: Client, url: &str, mode: FailureMode) -> Self {
        Self {
            client,
            url: url.to_string(),
            mode,
        }
    }

    async fn fetch(&self) -> Result<(StatusCode, String)> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to send IP lookup request to {}", self.url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read IP lookup response")?;

        Ok((status, body))
    }
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn resolve(&self) -> Result<String> {
        settle(self.mode, self.fetch().await)
    }
}

fn settle(mode: FailureMode, fetched: Result<(StatusCode, String)>) -> Result<String> {
    match mode {
        FailureMode::Strict => {
            let (status, body) = fetched?;
            let body = body.trim();
            if !status.is_success() {
                bail!("IP lookup returned HTTP {}: {}", status, body);
            }
            body.parse::<IpAddr>()
                .with_context(|| format!("IP lookup returned an invalid address: {:?}", body))?;
            Ok(body.to_string())
        }
        FailureMode::ErrorAsIp => Ok(match fetched {
            Ok((_, body)) => body.trim().to_string(),
            Err(e) => format!("{:#}", e),
        }),
    }
}
