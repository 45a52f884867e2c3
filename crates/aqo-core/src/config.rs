//! Predictor configuration.
//!
//! Provides configuration file support via `aqo.toml`, environment
//! variables, and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (host planner, CLI)
//! 2. Environment variables (`AQO_*`)
//! 3. Configuration file (`aqo.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Operating mode, selecting what happens when a previously-unseen query
/// class is encountered and how aggressively the store is mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// New class auto-added with `learn=true, use=false, auto_tune=true`.
    #[default]
    Intelligent,
    /// New class redirected to the common feature space (`fs=0`);
    /// `learn=use=true`, no auto-tuning.
    Forced,
    /// New class ignored; existing classes use their stored preferences.
    Controlled,
    /// Like `Intelligent` but without auto-tuning, and `use=true` from the
    /// start.
    Learn,
    /// Never mutate the store; use stored predictions where available.
    Frozen,
    /// Never use the predictor. Stats may still be collected if
    /// `collect_stat_on_disabled` is set.
    Disabled,
}

/// Preferences a newly observed query class is seeded with, per [`Mode`].
#[derive(Debug, Clone, Copy)]
pub struct SeedPreferences {
    /// Whether the class should be redirected to `fs=0`.
    pub redirect_to_common: bool,
    /// Initial `learn_enabled`.
    pub learn_enabled: bool,
    /// Initial `use_enabled`.
    pub use_enabled: bool,
    /// Initial `auto_tune_enabled`.
    pub auto_tune_enabled: bool,
}

impl Mode {
    /// Returns the seed preferences a first-seen class gets under this
    /// mode. `Controlled` returns `None`: the class is not added at all.
    #[must_use]
    pub fn seed_preferences(self) -> Option<SeedPreferences> {
        match self {
            Self::Intelligent => Some(SeedPreferences {
                redirect_to_common: false,
                learn_enabled: true,
                use_enabled: false,
                auto_tune_enabled: true,
            }),
            Self::Forced => Some(SeedPreferences {
                redirect_to_common: true,
                learn_enabled: true,
                use_enabled: true,
                auto_tune_enabled: false,
            }),
            Self::Learn => Some(SeedPreferences {
                redirect_to_common: false,
                learn_enabled: true,
                use_enabled: true,
                auto_tune_enabled: false,
            }),
            Self::Controlled | Self::Frozen | Self::Disabled => None,
        }
    }

    /// Whether this mode ever mutates the shared store.
    #[must_use]
    pub fn mutates_store(self) -> bool {
        !matches!(self, Self::Frozen)
    }
}

/// The fixed machine-learning constants from the original implementation,
/// exposed as overridable tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConstants {
    /// Linear smoothing rate applied on nudge/K-full updates.
    pub learning_rate: f64,
    /// Distance below which a new sample nudges its nearest row instead of
    /// being appended.
    pub object_selection_threshold: f64,
    /// Similarity smoothing term (`1/(epsilon + distance)`).
    pub distance_epsilon: f64,
    /// Matrix capacity per `(fs, fss)` entry.
    pub k: usize,
    /// Floor applied to every `log(selectivity)` feature value.
    pub log_sel_floor: f64,
    /// Reliability factor assigned to a sample staged at statement timeout.
    pub partial_rfactor: f64,
}

impl Default for LearningConstants {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            object_selection_threshold: 0.1,
            distance_epsilon: 0.001,
            k: 30,
            log_sel_floor: -30.0,
            partial_rfactor: 0.1,
        }
    }
}

/// Prediction-time options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    /// Number of nearest neighbours used for prediction and for the
    /// K-full learning branch.
    pub k_neighbors: usize,
    /// Allow prediction when `rows < k_neighbors`.
    pub predict_with_few_neighbors: bool,
    /// Fall back to any entry with matching `fss`/`cols` when the exact
    /// `(fs, fss)` entry is absent.
    pub wide_search: bool,
    /// Minimum number of joins in a query before the predictor activates.
    pub join_threshold: u32,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 3,
            predict_with_few_neighbors: false,
            wide_search: false,
            join_threshold: 0,
        }
    }
}

/// Shared-store capacity and snapshot options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Max entries in the `stat` and `qtext` and `queries` tables.
    pub fs_max_items: usize,
    /// Max entries in the `data` table.
    pub fss_max_items: usize,
    /// Max stored length of a query-text entry, in bytes.
    pub querytext_max_size: usize,
    /// Max size of the shared heap segment, in megabytes.
    pub dsm_size_max: usize,
    /// Length of each stat ring buffer.
    pub stat_sample_size: usize,
    /// Directory snapshot files are written under, relative to the
    /// process's data directory.
    pub snapshot_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            fs_max_items: 10_000,
            fss_max_items: 100_000,
            querytext_max_size: 1000,
            dsm_size_max: 100,
            stat_sample_size: 20,
            snapshot_dir: "./aqo_data".to_string(),
        }
    }
}

/// Timeout-handling options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whether the timeout path stages learning samples at all.
    pub learn_on_timeout: bool,
    /// Statement timeout, milliseconds (0 = disabled). Mirrors the host's
    /// own `statement_timeout`; the predictor only reacts to it.
    pub statement_timeout_ms: u64,
    /// A dedicated, usually shorter, timeout used only for learning.
    pub learn_statement_timeout_ms: u64,
    /// Multiplier applied to `(learn_rows - predicted)` when inflating a
    /// partial sample's target. A tunable, not a derived constant: higher
    /// values push the learner harder toward the timed-out row count.
    pub inflation_factor: f64,
    /// Samples are only inflated if `learn_rows > inflation_threshold *
    /// predicted`.
    pub inflation_threshold: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            learn_on_timeout: false,
            statement_timeout_ms: 0,
            learn_statement_timeout_ms: 0,
            inflation_factor: 10.0,
            inflation_threshold: 1.2,
        }
    }
}

/// Auto-tuner options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTuneConfig {
    /// Window size used both for "collect baseline" and for convergence
    /// checks.
    pub window_size: usize,
    /// Relative/absolute convergence error.
    pub convergence_error: f64,
    /// Additional samples beyond `window_size` before declaring an
    /// "infinite loop" (non-convergence).
    pub infinite_loop: usize,
    /// Logistic-transform "temperature": smaller makes the `use`/`learn`
    /// decision sharper around `p_use = 0.5`.
    pub exploration: f64,
    /// Total executions after which a class with `p_use <= 0.5` is frozen.
    pub max_iterations: i64,
}

impl Default for AutoTuneConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            convergence_error: 0.01,
            infinite_loop: 20,
            exploration: 0.1,
            max_iterations: 50,
        }
    }
}

/// Top-level predictor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AqoConfig {
    /// Operating mode.
    pub mode: Mode,
    /// Prediction-time options.
    pub predict: PredictConfig,
    /// Shared-store options.
    pub store: StoreConfig,
    /// Learning-constant overrides.
    pub learning: LearningConstants,
    /// Timeout-handling options.
    pub timeout: TimeoutConfig,
    /// Auto-tuner options.
    pub auto_tune: AutoTuneConfig,
    /// Whether to collect statistics even when `mode = Disabled`.
    pub collect_stat_on_disabled: bool,
}

impl AqoConfig {
    /// Loads configuration from the default file (`aqo.toml`) layered with
    /// `AQO_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but fails to parse, or if an
    /// environment variable has the wrong shape for its field.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("aqo.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but fails to parse, or if an
    /// environment variable has the wrong shape for its field.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("AQO_").split("_").lowercase(false));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Builds a configuration from a TOML string (used in tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the string fails to parse.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates cross-field invariants that serde alone cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.learning.k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "learning.k".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.predict.k_neighbors == 0 || self.predict.k_neighbors > self.learning.k {
            return Err(ConfigError::InvalidValue {
                key: "predict.k_neighbors".to_string(),
                message: format!(
                    "must be in [1, {}] (learning.k)",
                    self.learning.k
                ),
            });
        }
        if self.timeout.inflation_threshold < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout.inflation_threshold".to_string(),
                message: "must be >= 1.0".to_string(),
            });
        }
        if self.store.fs_max_items == 0 || self.store.fss_max_items == 0 {
            return Err(ConfigError::InvalidValue {
                key: "store.fs_max_items/fss_max_items".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Serializes the configuration to TOML, for `aqo-cli config dump`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (should not happen for this
    /// struct's field types).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
