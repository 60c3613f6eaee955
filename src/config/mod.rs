//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{collections::HashSet, num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::invalidation::{
    ChangeKind, DIMENSION_PLACEHOLDER, InvalidationConfig, VALUE_PLACEHOLDER,
};

pub use cli::{
    CliArgs, Command, InvalidationOverrides, LoggingOverrides, PathsArgs, WatchArgs,
    WatchOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "layout-flush";
const ENV_PREFIX: &str = "LAYOUT_FLUSH";
const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
const DEFAULT_BATCH_LIMIT: usize = 100;
const DEFAULT_DELIVER_INTERVAL_MS: u64 = 250;
const DEFAULT_STORE_CAPACITY: usize = 1_000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub invalidation: InvalidationSettings,
    pub feed: FeedSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct InvalidationSettings {
    pub watch_root: String,
    pub categories: Vec<String>,
    pub max_id_len: NonZeroUsize,
    pub render_suffix: String,
    pub dimension_name: String,
    pub dimension_values: Vec<String>,
    pub variant_template: String,
    pub change_kinds: Vec<ChangeKind>,
    pub max_concurrent_invalidations: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub queue_capacity: NonZeroUsize,
    pub batch_limit: NonZeroUsize,
    pub deliver_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub capacity: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("invalidation.categories")
            .with_list_parse_key("invalidation.dimension_values")
            .with_list_parse_key("invalidation.change_kinds"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Watch(args)) => raw.apply_watch_overrides(&args.overrides),
        Some(Command::Resolve(args)) | Some(Command::Plan(args)) => {
            raw.apply_logging_overrides(&args.logging);
            raw.apply_invalidation_overrides(&args.invalidation);
        }
        None => raw.apply_watch_overrides(&WatchOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    invalidation: RawInvalidationSettings,
    feed: RawFeedSettings,
    store: RawStoreSettings,
}

impl RawSettings {
    fn apply_watch_overrides(&mut self, overrides: &WatchOverrides) {
        self.apply_logging_overrides(&overrides.logging);
        self.apply_invalidation_overrides(&overrides.invalidation);
        if let Some(limit) = overrides.batch_limit {
            self.feed.batch_limit = Some(limit);
        }
        if let Some(interval) = overrides.deliver_interval_ms {
            self.feed.deliver_interval_ms = Some(interval);
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_invalidation_overrides(&mut self, overrides: &InvalidationOverrides) {
        if let Some(root) = overrides.watch_root.as_ref() {
            self.invalidation.watch_root = Some(root.clone());
        }
        if !overrides.dimension_values.is_empty() {
            self.invalidation.dimension_values = Some(overrides.dimension_values.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            invalidation,
            feed,
            store,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            invalidation: build_invalidation_settings(invalidation)?,
            feed: build_feed_settings(feed)?,
            store: build_store_settings(store)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_invalidation_settings(
    raw: RawInvalidationSettings,
) -> Result<InvalidationSettings, LoadError> {
    let defaults = InvalidationConfig::default();

    let watch_root = raw.watch_root.unwrap_or(defaults.watch_root);
    if !watch_root.starts_with('/') {
        return Err(LoadError::invalid(
            "invalidation.watch_root",
            "root must be an absolute path",
        ));
    }
    if watch_root.len() > 1 && watch_root.ends_with('/') {
        return Err(LoadError::invalid(
            "invalidation.watch_root",
            "root must not end with `/`",
        ));
    }

    let categories = raw.categories.unwrap_or(defaults.categories);
    if categories.is_empty() {
        return Err(LoadError::invalid(
            "invalidation.categories",
            "at least one category is required",
        ));
    }
    if let Some(bad) = categories
        .iter()
        .find(|c| c.trim().is_empty() || c.contains('/'))
    {
        return Err(LoadError::invalid(
            "invalidation.categories",
            format!("`{bad}` is not a single non-empty path segment"),
        ));
    }

    let max_id_len = non_zero_usize(
        raw.max_id_len.unwrap_or(defaults.max_id_len),
        "invalidation.max_id_len",
    )?;

    let render_suffix = raw.render_suffix.unwrap_or(defaults.render_suffix);
    if render_suffix.is_empty() {
        return Err(LoadError::invalid(
            "invalidation.render_suffix",
            "suffix must not be empty",
        ));
    }

    let dimension_name = raw.dimension_name.unwrap_or(defaults.dimension_name);
    if dimension_name.trim().is_empty() {
        return Err(LoadError::invalid(
            "invalidation.dimension_name",
            "dimension name must not be empty",
        ));
    }

    let dimension_values = raw.dimension_values.unwrap_or(defaults.dimension_values);
    let mut seen = HashSet::new();
    for value in &dimension_values {
        if value.trim().is_empty() {
            return Err(LoadError::invalid(
                "invalidation.dimension_values",
                "dimension values must not be empty",
            ));
        }
        if !seen.insert(value.as_str()) {
            return Err(LoadError::invalid(
                "invalidation.dimension_values",
                format!("duplicate dimension value `{value}`"),
            ));
        }
    }

    let variant_template = raw.variant_template.unwrap_or(defaults.variant_template);
    for placeholder in [DIMENSION_PLACEHOLDER, VALUE_PLACEHOLDER] {
        if !variant_template.contains(placeholder) {
            return Err(LoadError::invalid(
                "invalidation.variant_template",
                format!("template must contain `{placeholder}`"),
            ));
        }
    }

    let change_kinds = match raw.change_kinds {
        Some(kinds) => kinds
            .iter()
            .map(|kind| ChangeKind::from_str(kind))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| LoadError::invalid("invalidation.change_kinds", err.to_string()))?,
        None => defaults.change_kinds,
    };
    if change_kinds.is_empty() {
        return Err(LoadError::invalid(
            "invalidation.change_kinds",
            "at least one change kind is required",
        ));
    }

    let max_concurrent_invalidations = match raw.max_concurrent_invalidations {
        Some(value) => non_zero_usize(value, "invalidation.max_concurrent_invalidations")?,
        None => defaults.max_concurrent_invalidations,
    };

    Ok(InvalidationSettings {
        watch_root,
        categories,
        max_id_len,
        render_suffix,
        dimension_name,
        dimension_values,
        variant_template,
        change_kinds,
        max_concurrent_invalidations,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let queue_capacity = non_zero_usize(
        feed.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
        "feed.queue_capacity",
    )?;
    let batch_limit = non_zero_usize(
        feed.batch_limit.unwrap_or(DEFAULT_BATCH_LIMIT),
        "feed.batch_limit",
    )?;

    let interval_ms = feed
        .deliver_interval_ms
        .unwrap_or(DEFAULT_DELIVER_INTERVAL_MS);
    if interval_ms == 0 {
        return Err(LoadError::invalid(
            "feed.deliver_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(FeedSettings {
        queue_capacity,
        batch_limit,
        deliver_interval: Duration::from_millis(interval_ms),
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let capacity = non_zero_usize(
        store.capacity.unwrap_or(DEFAULT_STORE_CAPACITY),
        "store.capacity",
    )?;
    Ok(StoreSettings { capacity })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawInvalidationSettings {
    watch_root: Option<String>,
    categories: Option<Vec<String>>,
    max_id_len: Option<usize>,
    render_suffix: Option<String>,
    dimension_name: Option<String>,
    dimension_values: Option<Vec<String>>,
    variant_template: Option<String>,
    change_kinds: Option<Vec<String>>,
    max_concurrent_invalidations: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    queue_capacity: Option<usize>,
    batch_limit: Option<usize>,
    deliver_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    capacity: Option<usize>,
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
