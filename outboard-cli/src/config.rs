//! Configuration management for the outboard viewer

use crate::error::{CliError, CliResult};
use anyhow::{Context, Result};
use outboard_core::playback::MAX_INTERVAL;
use outboard_core::{ProducerInvocation, ReplotSettings, ViewerOptions, WireOrder};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted session timeout
pub const MAX_TIMEOUT_HOURS: f64 = 8760.0;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub movie: MovieConfig,

    #[serde(default)]
    pub zoom: ZoomConfig,

    #[serde(default)]
    pub replot: ReplotConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Window size used for replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// Records retained; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieConfig {
    /// Show each record as it arrives
    #[serde(default)]
    pub ingest: bool,

    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ZoomConfig {
    #[serde(default)]
    pub replot_on_zoom: bool,
}

/// Producer subprocess settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplotConfig {
    /// Full producer command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Read the plot stream from a file instead of stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,

    #[serde(default = "default_byte_order")]
    pub byte_order: String,

    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Share name for a viewer that accepts several producers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,

    /// Unix socket accepting navigation commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<PathBuf>,

    /// Exit after this many hours; 0 disables the timeout
    #[serde(default)]
    pub timeout_hours: f64,
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 618 }
fn default_interval_seconds() -> f64 { 0.1 }
fn default_poll_attempts() -> u32 { 20 }
fn default_initial_delay_ms() -> u64 { 10 }
fn default_max_delay_ms() -> u64 { 500 }
fn default_byte_order() -> String { "native".to_string() }
fn default_read_chunk() -> usize { 64 * 1024 }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for MovieConfig {
    fn default() -> Self {
        Self {
            ingest: false,
            interval_seconds: default_interval_seconds(),
        }
    }
}

impl Default for ReplotConfig {
    fn default() -> Self {
        Self {
            command: None,
            poll_attempts: default_poll_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            input: None,
            byte_order: default_byte_order(),
            read_chunk: default_read_chunk(),
        }
    }
}

/// Values given on the command line; `None` keeps the file setting
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub command: Option<String>,
    pub keep: Option<usize>,
    pub movie: bool,
    pub interval: Option<f64>,
    pub share: Option<String>,
    pub timeout_hours: Option<f64>,
    pub input: Option<PathBuf>,
    pub control: Option<PathBuf>,
    pub byte_order: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub replot_on_zoom: bool,
}

impl Config {
    /// Load configuration from file or create default
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from("mpl_outboard.toml");
                if default_path.exists() {
                    log::info!("Loading configuration from: mpl_outboard.toml");
                    Self::load_from_file(&default_path)?
                } else {
                    log::info!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> CliResult<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Command-line flags win over the file.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(command) = overrides.command {
            self.replot.command = Some(command);
        }
        if let Some(keep) = overrides.keep {
            self.history.keep = Some(keep);
        }
        if overrides.movie {
            self.movie.ingest = true;
        }
        if let Some(interval) = overrides.interval {
            self.movie.interval_seconds = interval;
        }
        if let Some(share) = overrides.share {
            self.session.share = Some(share);
        }
        if let Some(hours) = overrides.timeout_hours {
            self.session.timeout_hours = hours;
        }
        if let Some(input) = overrides.input {
            self.stream.input = Some(input);
        }
        if let Some(control) = overrides.control {
            self.session.control = Some(control);
        }
        if let Some(order) = overrides.byte_order {
            self.stream.byte_order = order;
        }
        if let Some(width) = overrides.width {
            self.display.width = width;
        }
        if let Some(height) = overrides.height {
            self.display.height = height;
        }
        if overrides.replot_on_zoom {
            self.zoom.replot_on_zoom = true;
        }
    }

    pub fn validate(&self) -> CliResult<()> {
        if self.display.width == 0 || self.display.height == 0 {
            return Err(CliError::invalid_value("width/height", "window size must be non-zero"));
        }
        if self.history.keep == Some(0) {
            return Err(CliError::invalid_value("keep", "must retain at least one record"));
        }
        let interval = self.movie.interval_seconds;
        if !(0.0..=MAX_INTERVAL.as_secs_f64()).contains(&interval) {
            return Err(CliError::invalid_value(
                "interval",
                format!("{} is outside 0..={} seconds", interval, MAX_INTERVAL.as_secs()),
            ));
        }
        let hours = self.session.timeout_hours;
        if !(0.0..=MAX_TIMEOUT_HOURS).contains(&hours) {
            return Err(CliError::invalid_value(
                "timeout-hours",
                format!("{} is outside 0..={} hours", hours, MAX_TIMEOUT_HOURS),
            ));
        }
        self.byte_order()?;
        if self.replot.poll_attempts == 0 {
            return Err(CliError::invalid_value("poll_attempts", "must be at least 1"));
        }
        if self.replot.max_delay_ms < self.replot.initial_delay_ms {
            return Err(CliError::invalid_value(
                "max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }
        if self.stream.read_chunk == 0 {
            return Err(CliError::invalid_value("read_chunk", "must be non-zero"));
        }
        if let Some(command) = &self.replot.command {
            ProducerInvocation::parse(command).map_err(|e| {
                let program = command.split_whitespace().next().unwrap_or_default();
                CliError::producer(program, e.to_string())
            })?;
        }
        if let Some(share) = &self.session.share {
            if share.trim().is_empty() {
                return Err(CliError::share(share.clone(), "share name is empty"));
            }
        }
        Ok(())
    }

    pub fn byte_order(&self) -> CliResult<WireOrder> {
        self.stream
            .byte_order
            .parse()
            .map_err(|e: outboard_core::protocol::ProtocolError| CliError::invalid_value("byte-order", e.to_string()))
    }

    pub fn movie_interval(&self) -> Duration {
        Duration::from_secs_f64(self.movie.interval_seconds.clamp(0.0, MAX_INTERVAL.as_secs_f64()))
    }

    /// `None` when the timeout is disabled
    pub fn session_timeout(&self) -> Option<Duration> {
        (self.session.timeout_hours > 0.0)
            .then(|| Duration::from_secs_f64(self.session.timeout_hours * 3600.0))
    }

    pub fn to_viewer_options(&self) -> CliResult<ViewerOptions> {
        Ok(ViewerOptions {
            retention: self.history.keep.and_then(NonZeroUsize::new),
            movie_ingest: self.movie.ingest,
            movie_interval: self.movie_interval(),
            replot_on_zoom: self.zoom.replot_on_zoom,
            byte_order: self.byte_order()?,
            width: self.display.width,
            height: self.display.height,
            replot: ReplotSettings {
                poll_attempts: self.replot.poll_attempts,
                initial_delay_ms: self.replot.initial_delay_ms,
                max_delay_ms: self.replot.max_delay_ms,
            },
            command_line: self.replot.command.clone(),
        })
    }
}
