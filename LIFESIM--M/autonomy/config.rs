use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Number of top-scoring candidates considered by default.
pub const DEFAULT_NUM_INTERACTIONS: usize = 5;

/// Default wall-clock slice of one scheduler pass, in seconds.
pub const DEFAULT_MAX_SECONDS_PER_LOOP: f64 = 1.0 / 30.0;

/// Counter key used for queue depth reports.
pub const QUEUE_DEPTH_COUNTER: &str = "autonomy_queue_length";

/// Process-wide autonomy tuning, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutonomyConfig {
    /// Top-K candidates kept before the final choice.
    #[serde(default = "default_num_interactions")]
    pub num_interactions: usize,
    /// Time slice per scheduler pass, in seconds.
    #[serde(default = "default_max_seconds_per_loop")]
    pub max_seconds_per_loop: f64,
    /// Distance thresholds handed to scorers for social targeting.
    #[serde(default)]
    pub social: SocialDistances,
    /// Record per-candidate selection probabilities.
    #[serde(default)]
    pub archive: bool,
    /// Seed for the selection RNG; entropy when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// Number of recent requests averaged into the ping metric.
    #[serde(default = "default_ping_window")]
    pub ping_window: usize,
    /// Counter key for queue depth reports.
    #[serde(default = "default_queue_depth_counter")]
    pub queue_depth_counter: String,
    /// Simulation tick period used when the clock is driven by a timer.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// JSON-lines telemetry destination.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

/// Squared-distance thresholds consumed by social scoring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SocialDistances {
    /// Beyond this squared distance a social target is not considered.
    #[serde(default = "default_max_social_distance_sq")]
    pub max_distance_sq: f64,
    /// Within this squared distance an actor may join an existing group.
    #[serde(default = "default_group_join_distance_sq")]
    pub group_join_distance_sq: f64,
}

impl Default for SocialDistances {
    fn default() -> Self {
        Self {
            max_distance_sq: default_max_social_distance_sq(),
            group_join_distance_sq: default_group_join_distance_sq(),
        }
    }
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            num_interactions: default_num_interactions(),
            max_seconds_per_loop: default_max_seconds_per_loop(),
            social: SocialDistances::default(),
            archive: false,
            rng_seed: None,
            ping_window: default_ping_window(),
            queue_depth_counter: default_queue_depth_counter(),
            tick_millis: default_tick_millis(),
            log_path: None,
        }
    }
}

impl AutonomyConfig {
    /// Loads and validates a TOML file. A relative `log_path` resolves
    /// against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading autonomy config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("loading {}", path.display()))?;
        if let Some(parent) = path.parent() {
            config.log_path = config.log_path.take().map(|log_path| {
                if log_path.is_relative() {
                    parent.join(log_path)
                } else {
                    log_path
                }
            });
        }
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("parsing autonomy config")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.num_interactions == 0 {
            bail!("num_interactions must be at least 1");
        }
        if self.max_seconds_per_loop <= 0.0
            || Duration::try_from_secs_f64(self.max_seconds_per_loop).is_err()
        {
            bail!(
                "max_seconds_per_loop must be a positive number, got {}",
                self.max_seconds_per_loop
            );
        }
        for (name, value) in [
            ("social.max_distance_sq", self.social.max_distance_sq),
            ("social.group_join_distance_sq", self.social.group_join_distance_sq),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{name} must be a non-negative number, got {value}");
            }
        }
        if self.ping_window == 0 {
            bail!("ping_window must be at least 1");
        }
        if self.tick_millis == 0 {
            bail!("tick_millis must be at least 1");
        }
        if self.queue_depth_counter.trim().is_empty() {
            bail!("queue_depth_counter must not be empty");
        }
        Ok(())
    }

    /// Pass time budget. Values [`Self::validate`] rejects fall back to
    /// the default slice.
    #[must_use]
    pub fn time_slice(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_seconds_per_loop)
            .ok()
            .filter(|slice| !slice.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_MAX_SECONDS_PER_LOOP))
    }

    /// Tick period for timer-driven clocks.
    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

const fn default_num_interactions() -> usize {
    DEFAULT_NUM_INTERACTIONS
}

const fn default_max_seconds_per_loop() -> f64 {
    DEFAULT_MAX_SECONDS_PER_LOOP
}

const fn default_max_social_distance_sq() -> f64 {
    400.0
}

const fn default_group_join_distance_sq() -> f64 {
    36.0
}

const fn default_ping_window() -> usize {
    32
}

fn default_queue_depth_counter() -> String {
    QUEUE_DEPTH_COUNTER.into()
}

const fn default_tick_millis() -> u64 {
    33
}
