//! Command line arguments
//!
//! Pipeline tuning flags mirror the keys of the `[pipeline]` table in the
//! configuration file and take precedence over it.

use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "msgflow")]
#[command(about = "Batch and process message groups read as JSON lines")]
#[command(version)]
#[command(after_help = "Each input line is one message group, e.g.\n  \
    {\"messages\": [{\"id\": \"m1\"}], \"type\": \"notify\", \"requestId\": \"r1\"}")]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Input file with one JSON message group per line ('-' for stdin)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Write every processed group to stdout as a JSON line
    #[arg(short = 'e', long = "echo")]
    pub echo: bool,

    /// Pipeline name used in logs and events
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Maximum number of handler invocations running at once
    #[arg(short = 'j', long = "max-concurrency", value_name = "COUNT")]
    pub max_concurrency: Option<usize>,

    /// Deadline of a single handler invocation
    #[arg(short = 't', long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Quiet period that closes a batching window
    #[arg(short = 'w', long = "batch-timeout-ms", value_name = "MS")]
    pub batch_timeout_ms: Option<u64>,

    /// Total attempts per group, including the first
    #[arg(short = 'r', long = "max-retry-attempts", value_name = "COUNT")]
    pub max_retry_attempts: Option<u32>,

    /// Delay between attempts of the same group
    #[arg(short = 'd', long = "retry-delay-ms", value_name = "MS")]
    pub retry_delay_ms: Option<u64>,

    /// Ingestion channel capacity
    #[arg(long = "channel-capacity", value_name = "COUNT")]
    pub channel_capacity: Option<usize>,

    /// Close a window early once it holds this many groups
    #[arg(long = "max-batch-size", value_name = "COUNT")]
    pub max_batch_size: Option<usize>,

    /// Force colored log output
    #[arg(short = 'g', long = "color", conflicts_with = "no_color")]
    pub color: bool,

    /// Disable colored log output
    #[arg(long = "no-color", conflicts_with = "color")]
    pub no_color: bool,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,
}

impl Args {
    /// Input file, or `None` when reading stdin
    pub fn input_path(&self) -> Option<&Path> {
        self.input
            .as_deref()
            .filter(|path| path.as_os_str() != "-")
    }

    /// Colors are used on a terminal unless overridden
    pub fn use_color(&self) -> bool {
        if self.no_color {
            false
        } else if self.color {
            true
        } else {
            std::io::stderr().is_terminal()
        }
    }

    pub fn log_file(&self) -> Option<String> {
        self.log_file
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
    }
}
