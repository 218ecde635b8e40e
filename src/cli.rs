use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "opkgsync",
    version,
    about = "Mirror an opkg package repository into a local directory"
)]
pub struct Cli {
    /// URL of the remote Packages index
    #[arg(short = 'p', long, env = "OPKGSYNC_PACKAGES_URL", value_name = "URL")]
    pub packages_url: String,

    /// Local mirror directory
    #[arg(short = 'd', long, default_value = ".", value_name = "PATH")]
    pub directory: String,

    /// Increase log verbosity (-v warn, -vv info, -vvv debug)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Recompute checksums of existing files instead of trusting their size
    #[arg(long)]
    pub verify: bool,

    /// Report what would be downloaded without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Delete local packages that a previously saved index listed but the
    /// remote index no longer does
    #[arg(long)]
    pub prune: bool,

    /// Save the fetched index as <directory>/Packages after a successful run
    #[arg(long)]
    pub write_index: bool,

    /// Number of packages processed at once
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub concurrent_downloads: u16,

    /// Re-downloads allowed after a transfer fails verification
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub max_retries: u32,

    /// Base delay in seconds before a re-download
    #[arg(long, default_value_t = 0, value_name = "SECS")]
    pub retry_delay: u64,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_args_and_defaults() {
        let cli = Cli::try_parse_from(["opkgsync", "-p", "http://example.com/Packages"]).unwrap();
        assert_eq!(cli.packages_url, "http://example.com/Packages");
        assert_eq!(cli.directory, ".");
        assert_eq!(cli.verbose, 0);
        assert!(!cli.verify);
        assert_eq!(cli.concurrent_downloads, 1);
        assert_eq!(cli.max_retries, 1);
    }

    #[test]
    fn test_long_flags_and_repeated_verbose() {
        let cli = Cli::try_parse_from([
            "opkgsync",
            "--packages-url",
            "https://feed/Packages",
            "--directory",
            "/srv/mirror",
            "-vvv",
            "--verify",
            "--prune",
            "--write-index",
        ])
        .unwrap();
        assert_eq!(cli.directory, "/srv/mirror");
        assert_eq!(cli.verbose, 3);
        assert!(cli.verify && cli.prune && cli.write_index);
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = Cli::try_parse_from(["opkgsync", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
