use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "offsync")]
#[command(about = "Offline-first cache and deferred sync queue")]
#[command(long_about = "offsync - offline-first cache and sync queue

Keeps previously fetched data in a durable cache with optional expiry, and
queues mutations while the network is unreachable, replaying them when
connectivity returns.

QUICK START:
  offsync cache set greeting '\"salam\"' --ttl 3600
  offsync cache get greeting
  offsync sync add https://api.example.com/bookmarks --body '{\"surah\": 18}'
  offsync sync run

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

Data lives under $OFFSYNC_HOME, or ~/.offsync when unset.")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output (default),
    /// or 'json' for machine-readable output suitable for scripting.
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Path to the configuration file
    ///
    /// Defaults to config.yaml under the data root.
    #[arg(long, global = true, env = "OFFSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read and write the durable cache
    ///
    /// # Subcommands
    ///
    ///   get      Print a cached value
    ///   set      Store a value with an optional TTL
    ///   clear    Remove one key, or everything with --all
    ///   list     Show live entries
    ///
    /// # Examples
    ///
    ///   offsync cache set surah:1 '{"name": "Al-Fatiha"}' --ttl 86400
    ///   offsync cache get surah:1
    ///   offsync cache clear --all
    Cache(CacheArgs),

    /// Sync queue for deferred operations
    ///
    /// Queue HTTP requests while offline and replay them once the
    /// network is reachable.
    ///
    /// # Subcommands
    ///
    ///   status   Show queue status and connectivity
    ///   list     Show pending operations
    ///   add      Queue an HTTP request
    ///   run      Run one sync pass now
    ///   watch    Sync on every reconnect until interrupted
    ///   clear    Remove all pending operations
    ///
    /// # Examples
    ///
    ///   offsync sync add https://api.example.com/progress -X PUT --body '{"ayah": 5}'
    ///   offsync sync status
    ///   offsync sync run
    Sync(SyncArgs),

    /// Generate shell completions
    ///
    /// Outputs a completion script for the given shell.
    ///
    /// Example: offsync completions bash > ~/.bash_completion.d/offsync
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Show installation instructions
        #[arg(long, short = 'i')]
        install: bool,
    },
}

/// Arguments for the cache.
#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Print a cached value
    ///
    /// Expired entries are reported as a miss and evicted.
    Get {
        /// Cache key
        key: String,
    },

    /// Store a value
    ///
    /// The value is parsed as JSON; anything that is not valid JSON is
    /// stored as a string.
    Set {
        /// Cache key
        key: String,

        /// Value to store
        value: String,

        /// Seconds until the entry expires (at least 1)
        #[arg(long, short = 't', value_parser = clap::value_parser!(u64).range(1..))]
        ttl: Option<u64>,
    },

    /// Remove cached entries
    Clear {
        /// Key to remove
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        key: Option<String>,

        /// Remove every entry in the namespace
        #[arg(long)]
        all: bool,
    },

    /// List live entries
    List,
}

/// Arguments for the sync queue.
#[derive(Args)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: SyncCommands,
}

/// Sync queue subcommands.
#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show sync queue status
    ///
    /// Displays the pending count, the oldest pending operation and
    /// whether the network is reachable.
    Status,

    /// List pending operations
    ///
    /// Shows queued operations in the order they will run.
    List {
        /// Maximum operations to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Queue an HTTP request
    ///
    /// The request is stored durably and sent on the next sync pass.
    Add {
        /// Target URL
        url: String,

        /// HTTP method
        #[arg(long, short = 'X', default_value = "POST")]
        method: String,

        /// Extra header as NAME:VALUE (repeatable)
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,

        /// JSON request body
        #[arg(long, short = 'b')]
        body: Option<String>,
    },

    /// Run one sync pass now
    ///
    /// Probes connectivity once, then attempts every pending operation.
    Run,

    /// Sync on every reconnect
    ///
    /// Polls connectivity and runs a pass each time the network comes
    /// back, until Ctrl-C.
    Watch,

    /// Remove all pending operations
    Clear {
        /// Skip confirmation
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cache_set_with_ttl() {
        let cli = Cli::parse_from(["offsync", "cache", "set", "k", "42", "--ttl", "60"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                command: CacheCommands::Set { key, value, ttl },
            }) => {
                assert_eq!(key, "k");
                assert_eq!(value, "42");
                assert_eq!(ttl, Some(60));
            },
            _ => panic!("expected cache set"),
        }
    }

    #[test]
    fn test_cache_set_rejects_zero_ttl() {
        assert!(Cli::try_parse_from(["offsync", "cache", "set", "k", "1", "--ttl", "0"]).is_err());
        assert!(Cli::try_parse_from(["offsync", "cache", "set", "k", "1", "--ttl", "1"]).is_ok());
    }

    #[test]
    fn test_parse_sync_add_headers() {
        let cli = Cli::parse_from([
            "offsync",
            "--output",
            "json",
            "sync",
            "add",
            "http://x/y",
            "-X",
            "PUT",
            "-H",
            "a:b",
            "-H",
            "c: d",
        ]);
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Sync(SyncArgs {
                command: SyncCommands::Add { url, method, headers, body },
            }) => {
                assert_eq!(url, "http://x/y");
                assert_eq!(method, "PUT");
                assert_eq!(headers, vec!["a:b", "c: d"]);
                assert!(body.is_none());
            },
            _ => panic!("expected sync add"),
        }
    }

    #[test]
    fn test_completions_rejects_unknown_shell() {
        assert!(Cli::try_parse_from(["offsync", "completions", "tcsh"]).is_err());
        assert!(Cli::try_parse_from(["offsync", "completions", "zsh"]).is_ok());
    }

    #[test]
    fn test_cache_clear_requires_key_or_all() {
        assert!(Cli::try_parse_from(["offsync", "cache", "clear"]).is_err());
        assert!(Cli::try_parse_from(["offsync", "cache", "clear", "k", "--all"]).is_err());
        assert!(Cli::try_parse_from(["offsync", "cache", "clear", "--all"]).is_ok());
    }
}
