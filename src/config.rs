use std::path::PathBuf;

use anyhow::Context;
use reqwest::Url;

use crate::retry::RetryConfig;
use crate::sync::SyncConfig;
use crate::types::{LogLevel, VerifyMode};

/// Application configuration, validated from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub packages_url: Url,
    pub directory: PathBuf,

    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub concurrent_downloads: u16,

    pub log_level: LogLevel,
    pub verify: VerifyMode,

    pub dry_run: bool,
    pub prune: bool,
    pub write_index: bool,
    pub no_progress_bar: bool,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Parse the index URL; only HTTP(S) can be mirrored.
fn parse_packages_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid packages URL '{}'", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!(
            "Unsupported URL scheme '{}' in '{}', expected http or https",
            other,
            raw
        ),
    }
}

impl Config {
    pub fn from_cli(cli: crate::cli::Cli) -> anyhow::Result<Self> {
        let packages_url = parse_packages_url(&cli.packages_url)?;

        if cli.directory.is_empty() {
            anyhow::bail!("--directory must not be empty");
        }
        if cli.concurrent_downloads == 0 {
            anyhow::bail!("--concurrent-downloads must be at least 1");
        }

        // The dry-run plan is logged at info.
        let mut log_level = LogLevel::from_verbosity(cli.verbose);
        if cli.dry_run {
            log_level = log_level.max(LogLevel::Info);
        }

        Ok(Self {
            packages_url,
            directory: expand_tilde(&cli.directory),
            max_retries: cli.max_retries,
            retry_delay_secs: cli.retry_delay,
            concurrent_downloads: cli.concurrent_downloads,
            log_level,
            verify: VerifyMode::from_flag(cli.verify),
            dry_run: cli.dry_run,
            prune: cli.prune,
            write_index: cli.write_index,
            no_progress_bar: cli.no_progress_bar,
        })
    }

    /// The part of the configuration the sync engine needs.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            directory: self.directory.clone(),
            verify: self.verify,
            dry_run: self.dry_run,
            concurrent_downloads: self.concurrent_downloads as usize,
            retry: RetryConfig {
                max_retries: self.max_retries,
                base_delay_secs: self.retry_delay_secs,
                ..RetryConfig::default()
            },
            no_progress_bar: self.no_progress_bar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn make_cli(extra: &[&str]) -> crate::cli::Cli {
        let mut args = vec!["opkgsync", "-p", "http://example.com/feed/Packages"];
        args.extend_from_slice(extra);
        crate::cli::Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/mirror");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("mirror"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(expand_tilde("/srv/mirror"), PathBuf::from("/srv/mirror"));
        assert_eq!(expand_tilde("mirror"), PathBuf::from("mirror"));
    }

    #[test]
    fn test_from_cli_defaults() {
        let cfg = Config::from_cli(make_cli(&[])).unwrap();
        assert_eq!(cfg.packages_url.as_str(), "http://example.com/feed/Packages");
        assert_eq!(cfg.directory, PathBuf::from("."));
        assert_eq!(cfg.verify, VerifyMode::SizeOnly);
        assert_eq!(cfg.log_level, LogLevel::Error);
        assert!(!cfg.dry_run && !cfg.prune && !cfg.write_index);
    }

    #[test]
    fn test_from_cli_flags_pass_through() {
        let cfg = Config::from_cli(make_cli(&[
            "-d",
            "/srv/opkg",
            "-vv",
            "--verify",
            "--dry-run",
            "--concurrent-downloads",
            "4",
        ]))
        .unwrap();
        assert_eq!(cfg.directory, PathBuf::from("/srv/opkg"));
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert_eq!(cfg.verify, VerifyMode::Checksum);
        assert!(cfg.dry_run);

        let sync = cfg.sync_config();
        assert_eq!(sync.concurrent_downloads, 4);
        assert_eq!(sync.verify, VerifyMode::Checksum);
        assert_eq!(sync.retry.max_retries, 1);
    }

    #[test]
    fn test_rejects_non_http_url() {
        let cli = crate::cli::Cli::try_parse_from(["opkgsync", "-p", "ftp://example.com/Packages"])
            .unwrap();
        assert!(Config::from_cli(cli).is_err());

        let cli = crate::cli::Cli::try_parse_from(["opkgsync", "-p", "not a url"]).unwrap();
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn test_dry_run_logs_plan_by_default() {
        let cfg = Config::from_cli(make_cli(&["--dry-run"])).unwrap();
        assert_eq!(cfg.log_level, LogLevel::Info);

        let cfg = Config::from_cli(make_cli(&["--dry-run", "-vvv"])).unwrap();
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_sync_config_retry_defaults() {
        let cfg = Config::from_cli(make_cli(&["--max-retries", "3", "--retry-delay", "2"])).unwrap();
        let retry = cfg.sync_config().retry;
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay_secs, 2);
        assert_eq!(retry.max_delay_secs, RetryConfig::default().max_delay_secs);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        assert!(Config::from_cli(make_cli(&["--concurrent-downloads", "0"])).is_err());
    }
}
