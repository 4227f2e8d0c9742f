mod config;
mod poller;
mod provider;
mod resolver;
#[cfg(test)]
mod test_support;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::info;
use reqwest::Client;

use crate::config::{
    CloudflareParams, Config, DEFAULT_INTERVAL_SECS, DEFAULT_TTL, GENERATED_CONFIG_FILE,
};
use crate::poller::Poller;
use crate::provider::cloudflare::CloudflareUpdater;
use crate::resolver::{FailureMode, HttpIpResolver};

// Long flags that may also be written with a single dash. Those taking a
// value consume the next argument when no `=value` is attached.
const VALUE_FLAGS: &[&str] = &[
    "interval",
    "config",
    "zone",
    "record",
    "email",
    "key",
    "name",
    "comment",
    "ttl",
    "timeout",
    "log-level",
];
const SWITCH_FLAGS: &[&str] = &[
    "generate",
    "force",
    "proxied",
    "error-as-ip",
    "help",
    "version",
];

#[derive(Parser, Debug)]
#[command(name = "cf-ddns", version)]
#[command(about = "Keeps a Cloudflare DNS record pointed at this host's public IP")]
struct Args {
    /// Interval in seconds to check for IP changes
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,

    /// Path to the config file
    #[arg(long, allow_hyphen_values = true)]
    config: Option<String>,

    /// Generate a config file with the provided parameters
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    generate: bool,

    /// Force the first update to Cloudflare
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    force: bool,

    /// Cloudflare Zone ID
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    zone: String,

    /// Cloudflare DNS Record ID
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    record: String,

    /// Cloudflare API Email
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    email: String,

    /// Cloudflare API Key
    #[arg(long, default_value = "", hide_default_value = true, allow_hyphen_values = true)]
    key: String,

    /// Cloudflare DNS Record Name
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    name: String,

    /// Comment about the DNS Record
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    comment: String,

    /// Whether the DNS Record is proxied by Cloudflare or not
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    proxied: bool,

    /// TTL of the DNS Record
    #[arg(long, default_value_t = DEFAULT_TTL)]
    ttl: u32,

    /// Use the error text of a failed IP lookup as the IP
    #[arg(long)]
    error_as_ip: bool,

    /// Timeout in seconds for each HTTP request
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            interval_seconds: self.interval,
            cloudflare_params: CloudflareParams {
                zone_id: self.zone.clone(),
                dns_record_id: self.record.clone(),
                api_email: self.email.clone(),
                api_key: self.key.clone(),
                dns_record_name: self.name.clone(),
                comment: self.comment.clone(),
                proxied: self.proxied,
                ttl: self.ttl,
            },
        }
    }

    fn config_path(&self) -> Option<&Path> {
        self.config
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(Path::new)
    }

    fn failure_mode(&self) -> FailureMode {
        if self.error_as_ip {
            FailureMode::ErrorAsIp
        } else {
            FailureMode::Strict
        }
    }
}

/// Rewrites `-zone=Z` style flags to `--zone=Z`.
///
/// Only arguments in flag position are touched: the value following a
/// value-taking flag is passed through even when it looks like a flag, and
/// everything after `--` is left alone.
fn normalize_flags<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut normalized = Vec::new();
    let mut passthrough = false;
    let mut expecting_value = false;

    for arg in args {
        if expecting_value {
            expecting_value = false;
            normalized.push(arg);
            continue;
        }
        if passthrough || arg == "--" {
            passthrough = true;
            normalized.push(arg);
            continue;
        }

        let flag = arg
            .strip_prefix("--")
            .or_else(|| arg.strip_prefix('-'))
            .map(|rest| rest.split_once('=').map_or((rest, false), |(name, _)| (name, true)));

        match flag {
            Some((name, inline_value))
                if VALUE_FLAGS.contains(&name) || SWITCH_FLAGS.contains(&name) =>
            {
                expecting_value = !inline_value && VALUE_FLAGS.contains(&name);
                if arg.starts_with("--") {
                    normalized.push(arg);
                } else {
                    normalized.push(format!("-{}", arg));
                }
            }
            _ => normalized.push(arg),
        }
    }

    normalized
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse_from(normalize_flags(std::env::args()));

    // Initialize logger (env var takes precedence)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .target(env_logger::Target::Stdout)
        .init();

    let generate_to = args.generate.then(|| Path::new(GENERATED_CONFIG_FILE));
    let config = config::build_effective(args.to_config(), generate_to, args.config_path())?;

    info!(
        "Keeping record {:?} in zone {:?} up to date",
        config.cloudflare_params.dns_record_name, config.cloudflare_params.zone_id
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()
        .context("Failed to build HTTP client")?;

    let resolver = HttpIpResolver::new(client.clone(), args.failure_mode());
    let updater = CloudflareUpdater::new(client, config.cloudflare_params);

    Poller::new(
        resolver,
        updater,
        Duration::from_secs(config.interval_seconds),
        args.force,
    )
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let argv = std::iter::once("cf-ddns")
            .chain(args.iter().copied())
            .map(String::from);
        Args::try_parse_from(normalize_flags(argv)).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.interval, 600);
        assert_eq!(args.ttl, 3600);
        assert!(!args.proxied);
        assert!(!args.force);
        assert!(!args.generate);
        assert!(args.config_path().is_none());
        assert_eq!(args.failure_mode(), FailureMode::Strict);
    }

    #[test]
    fn test_single_dash_flags() {
        let args = parse(&[
            "-zone=Z", "-record=R", "-email=E", "-key=K", "-name=N", "-proxied", "-ttl=1800",
        ]);
        let config = args.to_config();

        assert_eq!(config.interval_seconds, 600);
        let params = config.cloudflare_params;
        assert_eq!(params.zone_id, "Z");
        assert_eq!(params.dns_record_id, "R");
        assert_eq!(params.api_email, "E");
        assert_eq!(params.api_key, "K");
        assert_eq!(params.dns_record_name, "N");
        assert!(params.proxied);
        assert_eq!(params.ttl, 1800);
    }

    #[test]
    fn test_space_separated_values() {
        let args = parse(&["-interval", "60", "--config", "cf.json", "-comment", "home"]);
        assert_eq!(args.interval, 60);
        assert_eq!(args.config_path(), Some(Path::new("cf.json")));
        assert_eq!(args.comment, "home");
    }

    #[test]
    fn test_bool_flags_take_explicit_values() {
        let args = parse(&["-proxied=false", "-force=true", "--generate"]);
        assert!(!args.proxied);
        assert!(args.force);
        assert!(args.generate);
    }

    #[test]
    fn test_empty_config_path_means_none() {
        let args = parse(&["-config="]);
        assert!(args.config_path().is_none());
    }

    #[test]
    fn test_error_as_ip_flag() {
        assert_eq!(parse(&["-error-as-ip"]).failure_mode(), FailureMode::ErrorAsIp);
    }

    #[test]
    fn test_normalize_leaves_values_and_unknown_flags() {
        let argv = ["cf-ddns", "-name", "-x", "-h", "--", "-zone=Z"].map(String::from);
        assert_eq!(
            normalize_flags(argv),
            vec!["cf-ddns", "--name", "-x", "-h", "--", "-zone=Z"]
        );
    }

    #[test]
    fn test_negative_interval_rejected() {
        let argv = ["cf-ddns", "-interval=-5"].map(String::from);
        assert!(Args::try_parse_from(normalize_flags(argv)).is_err());
    }

    #[test]
    fn test_value_that_looks_like_a_flag_is_kept() {
        let args = parse(&["-comment", "-force", "-name", "--proxied", "-zone=Z"]);
        assert_eq!(args.comment, "-force");
        assert_eq!(args.name, "--proxied");
        assert!(!args.force);
        assert!(!args.proxied);
        assert_eq!(args.zone, "Z");
    }

    #[test]
    fn test_normalize_only_rewrites_flag_positions() {
        let argv = ["cf-ddns", "--key", "-ttl", "-ttl", "60", "-force"].map(String::from);
        assert_eq!(
            normalize_flags(argv),
            vec!["cf-ddns", "--key", "-ttl", "--ttl", "60", "--force"]
        );
    }
}
