use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};

use crate::provider::DnsUpdater;
use crate::resolver::IpResolver;

/// What a single check ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Unchanged,
    ResolveFailed,
    Updated,
    UpdateFailed,
}

/// Keeps one DNS record in step with the public IP.
///
/// The last seen IP advances on every detected change, whether or not the
/// update that followed succeeded. A failed update is therefore not retried
/// until the IP changes again or the process restarts with `--force`.
pub struct Poller<R, U> {
    resolver: R,
    updater: U,
    interval: Duration,
    last_ip: Option<String>,
    force: bool,
}

impl<R: IpResolver, U: DnsUpdater> Poller<R, U> {
    pub fn new(resolver: R, updater: U, interval: Duration, force: bool) -> Self {
        Self {
            resolver,
            updater,
            interval,
            last_ip: None,
            force,
        }
    }

    pub fn last_ip(&self) -> Option<&str> {
        self.last_ip.as_deref()
    }

    /// Records the IP at startup, so the first check only updates on change.
    pub async fn prime(&mut self) {
        match self.resolver.resolve().await {
            Ok(ip) => {
                info!("Current public IP: {}", ip);
                self.last_ip = Some(ip);
            }
            Err(e) => warn!("Initial public IP lookup failed: {:#}", e),
        }
    }

    pub async fn check(&mut self) -> Check {
        let current = match self.resolver.resolve().await {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Public IP lookup failed, retrying next interval: {:#}", e);
                return Check::ResolveFailed;
            }
        };

        let changed = self.last_ip.as_deref() != Some(current.as_str());
        if !changed && !self.force {
            debug!("Public IP unchanged: {}", current);
            return Check::Unchanged;
        }

        if changed {
            info!(
                "IP changed: {} -> {}",
                self.last_ip.as_deref().unwrap_or("<unknown>"),
                current
            );
        } else {
            info!("Forcing DNS record update to {}", current);
        }

        let outcome = match self.updater.update(&current).await {
            Ok(outcome) => {
                info!("{}", outcome.body);
                info!("DNS record updated to {} (HTTP {})", current, outcome.status);
                Check::Updated
            }
            Err(e) => {
                error!("DNS update failed: {:#}", e);
                Check::UpdateFailed
            }
        };

        self.last_ip = Some(current);
        self.force = false;
        outcome
    }

    async fn tick(&mut self) {
        self.check().await;
        tokio::time::sleep(self.interval).await;
    }

    /// Checks immediately, then every interval, until Ctrl-C.
    pub async fn run(mut self) -> Result<()> {
        info!("Checking public IP every {} seconds", self.interval.as_secs());
        self.prime().await;

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                res = &mut shutdown => {
                    res.context("Failed to listen for Ctrl+C")?;
                    break;
                }
                _ = self.tick() => {}
            }
        }

        info!(
            "Received shutdown signal, last known IP: {}",
            self.last_ip().unwrap_or("<unknown>")
        );
        Ok(())
    }
}
