//! CLI argument definitions for libtrail-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// libtrail library catalog daemon.
///
/// Periodically migrates raw telemetry records into the parsed tier,
/// folds library-load events into the catalog, and links catalog
/// entries to known CVEs.
#[derive(Parser, Debug)]
#[command(name = "libtrail-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to libtrail.toml configuration file.
    #[arg(short, long, default_value = "/etc/libtrail/libtrail.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,

    #[command(subcommand)]
    pub command: Option<DaemonCommand>,
}

/// One-shot commands. Without a subcommand the daemon runs the poll loop.
#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Import a CVE feed (JSON array) into the CVE table and exit.
    ImportCves {
        /// Path to the feed file.
        file: PathBuf,
    },

    /// Run a single drain cycle over every enabled processor, print a
    /// JSON summary and exit.
    RunOnce,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_runs_daemon() {
        let cli = DaemonCli::parse_from(["libtrail-daemon", "-c", "/tmp/lt.toml"]);
        assert_eq!(cli.config, PathBuf::from("/tmp/lt.toml"));
        assert!(cli.command.is_none());
        assert!(!cli.validate);
    }

    #[test]
    fn import_cves_takes_file() {
        let cli = DaemonCli::parse_from(["libtrail-daemon", "import-cves", "feed.json"]);
        match cli.command {
            Some(DaemonCommand::ImportCves { file }) => {
                assert_eq!(file, PathBuf::from("feed.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn overrides_are_optional() {
        let cli = DaemonCli::parse_from([
            "libtrail-daemon",
            "--log-level",
            "debug",
            "--pid-file",
            "/run/lt.pid",
            "run-once",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.pid_file.as_deref(), Some("/run/lt.pid"));
        assert!(matches!(cli.command, Some(DaemonCommand::RunOnce)));
    }
}
