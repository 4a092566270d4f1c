//! Configuration Vault – reads/writes `~/.aegis/config.toml`.

use aegis_kernel::GovernanceConfig;
use aegis_runtime::GovernorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.aegis/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding keyed state and the trace log.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Name of the trace stream inside `state_path`.
    #[serde(default = "default_trace_log")]
    pub trace_log: String,

    /// Maturity level the agent starts with (0–10).
    #[serde(default = "default_maturity_level")]
    pub maturity_level: u8,

    /// Mental-health score the agent starts with (0.0–1.0).
    #[serde(default = "default_mental_health")]
    pub mental_health: f64,

    /// Rotate the trace log on exit once it exceeds this size.
    #[serde(default = "default_rotate_max_mb")]
    pub rotate_max_mb: f64,

    #[serde(default = "default_rotate_max_files")]
    pub rotate_max_files: usize,

    /// Thresholds and limits of the policy chain.
    #[serde(default)]
    pub governance: GovernanceConfig,
}

fn default_state_path() -> PathBuf {
    aegis_dir_for_home(&home_dir()).join("state")
}
fn default_trace_log() -> String {
    GovernorConfig::default().trace_log
}
fn default_maturity_level() -> u8 {
    GovernorConfig::default().maturity_level
}
fn default_mental_health() -> f64 {
    GovernorConfig::default().mental_health
}
fn default_rotate_max_mb() -> f64 {
    GovernorConfig::default().rotate_max_mb
}
fn default_rotate_max_files() -> usize {
    GovernorConfig::default().rotate_max_files
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            trace_log: default_trace_log(),
            maturity_level: default_maturity_level(),
            mental_health: default_mental_health(),
            rotate_max_mb: default_rotate_max_mb(),
            rotate_max_files: default_rotate_max_files(),
            governance: GovernanceConfig::default(),
        }
    }
}

impl Config {
    /// Governor settings derived from this config; budgets keep their defaults.
    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            state_path: self.state_path.clone(),
            trace_log: self.trace_log.clone(),
            rotate_max_mb: self.rotate_max_mb,
            rotate_max_files: self.rotate_max_files,
            maturity_level: self.maturity_level,
            mental_health: self.mental_health,
            governance: self.governance.clone(),
            ..GovernorConfig::default()
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn aegis_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".aegis")
}

/// Return the path to `~/.aegis/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    aegis_dir_for_home(home).join("config.toml")
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

/// Apply `AEGIS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `AEGIS_STATE_PATH` | `state_path` |
/// | `AEGIS_TRACE_LOG` | `trace_log` |
/// | `AEGIS_MATURITY_LEVEL` | `maturity_level` (0–10) |
/// | `AEGIS_MENTAL_HEALTH` | `mental_health` (0.0–1.0) |
///
/// Values that do not parse or are out of range are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("AEGIS_STATE_PATH")
        && !v.trim().is_empty()
    {
        cfg.state_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("AEGIS_TRACE_LOG")
        && !v.trim().is_empty()
    {
        cfg.trace_log = v;
    }
    if let Ok(v) = std::env::var("AEGIS_MATURITY_LEVEL")
        && let Ok(level) = v.trim().parse::<u8>()
        && level <= aegis_types::MAX_MATURITY_LEVEL
    {
        cfg.maturity_level = level;
    }
    if let Ok(v) = std::env::var("AEGIS_MENTAL_HEALTH")
        && let Ok(score) = v.trim().parse::<f64>()
        && (0.0..=1.0).contains(&score)
    {
        cfg.mental_health = score;
    }
}

/// Save the config to disk, creating `~/.aegis/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix: the vault names where the audit trail lives.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialises the tests that mutate AEGIS_* variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F: FnOnce()>(key: &str, value: &str, f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: every test touching AEGIS_* holds ENV_LOCK.
        unsafe { std::env::set_var(key, value) };
        f();
        unsafe { std::env::remove_var(key) };
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap()).expect("dir metadata").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.maturity_level, 6);
        assert_eq!(loaded.governance.maturity_thresholds["system_access"], 9);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "maturity_level = 9\n\n[governance]\nrisk_threshold = 0.5\n").unwrap();

        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.maturity_level, 9);
        assert_eq!(loaded.mental_health, 0.85);
        assert_eq!(loaded.governance.risk_threshold, 0.5);
        assert_eq!(loaded.governance.critical_threshold, 0.2);
    }

    #[test]
    fn config_path_points_to_aegis_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".aegis"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "maturity_level = \"high\"").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn env_overrides_state_path() {
        with_env("AEGIS_STATE_PATH", "/var/lib/aegis", || {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            assert_eq!(cfg.state_path, PathBuf::from("/var/lib/aegis"));
        });
    }

    #[test]
    fn env_overrides_trace_log() {
        with_env("AEGIS_TRACE_LOG", "audit/traces", || {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            assert_eq!(cfg.trace_log, "audit/traces");
        });
    }

    #[test]
    fn env_overrides_maturity_level() {
        with_env("AEGIS_MATURITY_LEVEL", "9", || {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            assert_eq!(cfg.maturity_level, 9);
        });
    }

    #[test]
    fn env_override_ignores_out_of_range_maturity() {
        with_env("AEGIS_MATURITY_LEVEL", "42", || {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            assert_eq!(cfg.maturity_level, 6);
        });
    }

    #[test]
    fn env_overrides_mental_health_and_ignores_garbage() {
        with_env("AEGIS_MENTAL_HEALTH", "0.35", || {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            assert_eq!(cfg.mental_health, 0.35);
        });
        with_env("AEGIS_MENTAL_HEALTH", "calm", || {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            assert_eq!(cfg.mental_health, 0.85);
        });
    }

    #[test]
    fn governor_config_carries_vault_settings() {
        let cfg = Config {
            maturity_level: 8,
            trace_log: "audit".to_string(),
            ..Config::default()
        };
        let gc = cfg.governor_config();
        assert_eq!(gc.maturity_level, 8);
        assert_eq!(gc.trace_log, "audit");
        assert_eq!(gc.compute_budget, 1000);
        assert_eq!(gc.state_path, cfg.state_path);
    }
}
