use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::warn;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{DnsUpdater, UpdateOutcome};
use crate::config::CloudflareParams;

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

// Sent on every update regardless of the configured ttl.
const UPDATE_TTL: u32 = 3600;

pub struct CloudflareUpdater {
    client: Client,
    params: CloudflareParams,
    api_base: String,
}

impl CloudflareUpdater {
    pub fn new(client: Client, params: CloudflareParams) -> Self {
        Self {
            client,
            params,
            api_base: CLOUDFLARE_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    fn with_api_base(client: Client, params: CloudflareParams, api_base: &str) -> Self {
        Self {
            client,
            params,
            api_base: api_base.to_string(),
        }
    }

    fn record_url(&self) -> String {
        format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, self.params.zone_id, self.params.dns_record_id
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let email = HeaderValue::from_str(&self.params.api_email)
            .context("API email is not a valid header value")?;
        headers.insert("X-Auth-Email", email);

        let mut key = HeaderValue::from_str(&self.params.api_key)
            .context("API key is not a valid header value")?;
        key.set_sensitive(true);
        headers.insert("X-Auth-Key", key);

        Ok(headers)
    }

    fn payload(&self, ip: &str) -> UpdateRecordRequest {
        UpdateRecordRequest {
            record_type: "A".to_string(),
            name: self.params.dns_record_name.clone(),
            content: ip.to_string(),
            comment: self.params.comment.clone(),
            ttl: UPDATE_TTL,
            proxied: self.params.proxied,
            id: self.params.dns_record_id.clone(),
        }
    }
}

#[async_trait]
impl DnsUpdater for CloudflareUpdater {
    async fn update(&self, ip: &str) -> Result<UpdateOutcome> {
        let missing = self.params.missing_fields();
        if !missing.is_empty() {
            warn!("Updating DNS record with empty settings: {}", missing.join(", "));
        }

        let response = self
            .client
            .patch(self.record_url())
            .headers(self.headers()?)
            .json(&self.payload(ip))
            .send()
            .await
            .context("Failed to send update request to Cloudflare")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Cloudflare update response")?;

        check_response(status.is_success(), &body)?;

        Ok(UpdateOutcome {
            status: status.as_u16(),
            body,
        })
    }
}

/// Errors carry the raw response body, so it always reaches the log.
fn check_response(status_ok: bool, body: &str) -> Result<()> {
    // Bodies that are not the usual envelope are judged on the status alone.
    if let Ok(response) = serde_json::from_str::<CloudflareResponse>(body) {
        if !response.success {
            let errors: Vec<String> = response
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect();
            bail!("Cloudflare API error: {}; response: {}", errors.join(", "), body);
        }
    }

    if !status_ok {
        bail!("Cloudflare API returned an error status: {}", body);
    }

    Ok(())
}

// Cloudflare API types

#[derive(Debug, Serialize)]
struct UpdateRecordRequest {
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    comment: String,
    ttl: u32,
    proxied: bool,
    id: String,
}

#[derive(Debug, Deserialize)]
struct CloudflareResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareError>,
}

#[derive(Debug, Deserialize)]
struct CloudflareError {
    code: i32,
    message: String,
}
