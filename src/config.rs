use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// File written by `--generate`, relative to the working directory.
pub const GENERATED_CONFIG_FILE: &str = "config.json";

pub const DEFAULT_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_TTL: u32 = 3600;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub interval_seconds: u64,
    pub cloudflare_params: CloudflareParams,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudflareParams {
    pub zone_id: String,
    pub dns_record_id: String,
    pub api_email: String,
    pub api_key: String,
    pub dns_record_name: String,
    pub comment: String,
    pub proxied: bool,
    pub ttl: u32,
}

// Credentials stay out of logs.
impl fmt::Debug for CloudflareParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareParams")
            .field("zone_id", &self.zone_id)
            .field("dns_record_id", &self.dns_record_id)
            .field("api_email", &"<REDACTED>")
            .field("api_key", &"<REDACTED>")
            .field("dns_record_name", &self.dns_record_name)
            .field("comment", &self.comment)
            .field("proxied", &self.proxied)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CloudflareParams {
    /// Names of the string fields that are empty. All of them are expected to
    /// be set whenever an update is sent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("zoneId", &self.zone_id),
            ("dnsRecordId", &self.dns_record_id),
            ("apiEmail", &self.api_email),
            ("apiKey", &self.api_key),
            ("dnsRecordName", &self.dns_record_name),
            ("comment", &self.comment),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Writes the config as four-space indented JSON, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_pretty_json()?;

        fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn to_pretty_json(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).context("Failed to serialize config")?;
        Ok(buf)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_seconds == 0 {
            bail!("intervalSeconds must be at least 1");
        }
        Ok(())
    }
}

/// Produces the configuration the poll loop runs with.
///
/// The flag-sourced config is written to `generate_to` first when asked. A
/// config file at `load_from` then replaces it wholesale; fields absent from
/// the file take their zero value rather than the flag value.
pub fn build_effective(
    from_flags: Config,
    generate_to: Option<&Path>,
    load_from: Option<&Path>,
) -> Result<Config> {
    if let Some(out) = generate_to {
        from_flags.save(out)?;
        info!("Config file generated successfully: {}", out.display());
    }

    let config = match load_from {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(path)?
        }
        None => from_flags,
    };

    config.validate()?;
    Ok(config)
}
