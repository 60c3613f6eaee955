use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the layout-flush binary.
#[derive(Debug, Parser)]
#[command(
    name = "layout-flush",
    version,
    about = "Flush layout page renderings from the cache when their content changes"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LAYOUT_FLUSH_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Read JSON-lines change events from stdin and invalidate affected pages.
    Watch(Box<WatchArgs>),
    /// Print the page identity each path resolves to.
    Resolve(PathsArgs),
    /// Print every cache key a change on the given paths would invalidate.
    Plan(PathsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub overrides: WatchOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct InvalidationOverrides {
    /// Override the watched root path.
    #[arg(long = "watch-root", value_name = "PATH")]
    pub watch_root: Option<String>,

    /// Replace the configured dimension values; repeat for several values.
    #[arg(long = "dimension-value", value_name = "VALUE")]
    pub dimension_values: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WatchOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub invalidation: InvalidationOverrides,

    /// Override the maximum number of events delivered per batch.
    #[arg(long = "batch-limit", value_name = "COUNT")]
    pub batch_limit: Option<usize>,

    /// Override the delivery interval in milliseconds.
    #[arg(long = "deliver-interval-ms", value_name = "MILLIS")]
    pub deliver_interval_ms: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct PathsArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub invalidation: InvalidationOverrides,

    /// Changed resource paths.
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<String>,
}
