use anyhow::Result;
use async_trait::async_trait;

pub mod cloudflare;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub status: u16,
    pub body: String,
}

/// Points the configured DNS record at a new address.
#[async_trait]
pub trait DnsUpdater {
    async fn update(&self, ip: &str) -> Result<UpdateOutcome>;
}
