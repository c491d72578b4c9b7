//! Configuration vault – reads/writes `~/.wbc/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use wbc_manifold::DEFAULT_BASE_PATH;
use wbc_runtime::ControlLoopConfig;
use wbc_supervisor::{RelatchPolicy, SupervisorConfig};

/// Persisted controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control period in milliseconds.
    #[serde(default = "default_control_period_ms")]
    pub control_period_ms: u64,

    /// Norm above which a stack switch is reported inconsistent.
    #[serde(default = "default_consistency_tolerance")]
    pub consistency_tolerance: f64,

    /// Ticks between an activation and the first delivered reference.
    #[serde(default = "default_queue_lookahead")]
    pub queue_lookahead: i64,

    #[serde(default)]
    pub relatch_policy: RelatchPolicy,

    /// Ticks between two state samples.
    #[serde(default = "default_state_subsampling")]
    pub state_subsampling: u64,

    #[serde(default = "default_control_norm_threshold")]
    pub control_norm_threshold: f64,

    /// Planner topic prefix of every reference channel.
    #[serde(default = "default_reference_base_path")]
    pub reference_base_path: String,

    /// Samples buffered per reference channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_control_period_ms() -> u64 {
    1
}
fn default_consistency_tolerance() -> f64 {
    1e-3
}
fn default_queue_lookahead() -> i64 {
    10
}
fn default_state_subsampling() -> u64 {
    40
}
fn default_control_norm_threshold() -> f64 {
    1e-2
}
fn default_reference_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}
fn default_queue_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_period_ms: default_control_period_ms(),
            consistency_tolerance: default_consistency_tolerance(),
            queue_lookahead: default_queue_lookahead(),
            relatch_policy: RelatchPolicy::default(),
            state_subsampling: default_state_subsampling(),
            control_norm_threshold: default_control_norm_threshold(),
            reference_base_path: default_reference_base_path(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Config {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms.max(1))
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            consistency_tolerance: self.consistency_tolerance,
            queue_lookahead: self.queue_lookahead,
            relatch_policy: self.relatch_policy,
            reference_base_path: self.reference_base_path.clone(),
        }
    }

    pub fn loop_config(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            period: self.period(),
            state_subsampling: self.state_subsampling,
            control_norm_threshold: self.control_norm_threshold,
            posture_channel: format!("{}/position", self.reference_base_path.trim_end_matches('/')),
        }
    }
}

/// Return the path to `~/.wbc/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".wbc").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `WBC_*` environment variable overrides to `cfg`.  Values that do
/// not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `WBC_CONTROL_PERIOD_MS` | `control_period_ms` |
/// | `WBC_CONSISTENCY_TOLERANCE` | `consistency_tolerance` |
/// | `WBC_QUEUE_LOOKAHEAD` | `queue_lookahead` |
/// | `WBC_RELATCH_POLICY` | `relatch_policy` (`every_activation`, `first_entry`) |
/// | `WBC_REFERENCE_BASE_PATH` | `reference_base_path` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WBC_CONTROL_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.control_period_ms = ms;
    }
    if let Ok(v) = std::env::var("WBC_CONSISTENCY_TOLERANCE")
        && let Ok(tol) = v.parse::<f64>()
    {
        cfg.consistency_tolerance = tol;
    }
    if let Ok(v) = std::env::var("WBC_QUEUE_LOOKAHEAD")
        && let Ok(ticks) = v.parse::<i64>()
    {
        cfg.queue_lookahead = ticks;
    }
    if let Ok(v) = std::env::var("WBC_RELATCH_POLICY") {
        match v.as_str() {
            "every_activation" => cfg.relatch_policy = RelatchPolicy::EveryActivation,
            "first_entry" => cfg.relatch_policy = RelatchPolicy::FirstEntry,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("WBC_REFERENCE_BASE_PATH") {
        cfg.reference_base_path = v;
    }
}

/// Save the config to disk, creating `~/.wbc/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    if let Some(dir) = path.parent() {
        create_private_dir(dir).map_err(|e| format!("Failed to prepare {}: {}", dir.display(), e))?;
    }
    write_private(path, raw.as_bytes()).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

/// Create `dir` readable by its owner only (`rwx------` on Unix).
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Replace `path` with `contents`, owner read/write only (`rw-------` on Unix).
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(contents)
}
