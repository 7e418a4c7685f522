//! Configuration for voicedrop.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VOICEDROP_HOME, VOICEDROP_ENDPOINT)
//! 2. Config file (.voicedrop/config.yaml)
//! 3. Defaults (~/.voicedrop)
//!
//! Config file discovery:
//! - Searches current directory and parents for .voicedrop/config.yaml
//! - `paths.home` in the config file is relative to the .voicedrop/ directory

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_SLOT;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub uploader: Option<UploaderConfig>,
    #[serde(default)]
    pub processing: Option<ProcessingConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to the .voicedrop/ directory)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: Option<StoreBackend>,
    pub slot: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploaderConfig {
    pub endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    pub min_pass_interval_ms: Option<u64>,
    pub probe_interval_seconds: Option<u64>,
}

/// Where the queue is persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to voicedrop home (queue state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Persistence settings
    pub store: StoreSettings,
    /// Upload endpoint settings
    pub uploader: UploaderSettings,
    /// Pass scheduling settings
    pub processing: ProcessingSettings,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub slot: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            slot: DEFAULT_SLOT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploaderSettings {
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingSettings {
    /// Minimum time between pass starts; zero disables the throttle
    pub min_pass_interval_ms: u64,
    pub probe_interval_seconds: u64,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            min_pass_interval_ms: 0,
            probe_interval_seconds: 15,
        }
    }
}

impl ProcessingSettings {
    pub fn min_pass_interval(&self) -> Duration {
        Duration::from_millis(self.min_pass_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        // A zero interval would make tokio's ticker panic
        Duration::from_secs(self.probe_interval_seconds.max(1))
    }
}

impl ResolvedConfig {
    /// Location of the queue for the configured backend
    pub fn queue_path(&self) -> PathBuf {
        match self.store.backend {
            StoreBackend::Json => self.home.join(paths::QUEUE_JSON),
            StoreBackend::Sqlite => self.home.join(paths::QUEUE_DB),
        }
    }

    /// Lock file marking the home as owned by one process
    pub fn owner_lock_path(&self) -> PathBuf {
        self.home.join(paths::OWNER_LOCK)
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(paths::CONFIG_DIR).join(paths::CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge environment, config file and defaults
fn resolve<F>(config: Option<(PathBuf, ConfigFile)>, env: F, default_home: PathBuf) -> ResolvedConfig
where
    F: Fn(&str) -> Option<String>,
{
    let (config_file, file) = match config {
        Some((path, file)) => (Some(path), Some(file)),
        None => (None, None),
    };

    let home = if let Some(env_home) = env("VOICEDROP_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(path), Some(home)) = (
        config_file.as_ref(),
        file.as_ref().and_then(|f| f.paths.home.as_ref()),
    ) {
        let voicedrop_dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(voicedrop_dir, home)
    } else {
        default_home
    };

    let mut store = StoreSettings::default();
    if let Some(cfg) = file.as_ref().and_then(|f| f.store.as_ref()) {
        store.backend = cfg.backend.unwrap_or_default();
        if let Some(slot) = &cfg.slot {
            store.slot = slot.clone();
        }
    }

    let mut uploader = UploaderSettings::default();
    if let Some(cfg) = file.as_ref().and_then(|f| f.uploader.as_ref()) {
        uploader.endpoint = cfg.endpoint.clone();
        uploader.timeout_seconds = cfg.timeout_seconds.unwrap_or(uploader.timeout_seconds);
    }
    if let Some(endpoint) = env("VOICEDROP_ENDPOINT") {
        uploader.endpoint = Some(endpoint);
    }

    let mut processing = ProcessingSettings::default();
    if let Some(cfg) = file.as_ref().and_then(|f| f.processing.as_ref()) {
        processing.min_pass_interval_ms = cfg.min_pass_interval_ms.unwrap_or(processing.min_pass_interval_ms);
        processing.probe_interval_seconds = cfg
            .probe_interval_seconds
            .unwrap_or(processing.probe_interval_seconds);
    }

    ResolvedConfig {
        home,
        config_file,
        store,
        uploader,
        processing,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(paths::CONFIG_DIR);

    let config = match find_config_file() {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    Ok(resolve(config, |key| std::env::var(key).ok(), default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, env_from(&[]), PathBuf::from("/home/u/.voicedrop"));

        assert_eq!(config.home, PathBuf::from("/home/u/.voicedrop"));
        assert!(config.config_file.is_none());
        assert_eq!(config.store.backend, StoreBackend::Json);
        assert_eq!(config.store.slot, "upload_queue");
        assert_eq!(config.uploader.timeout_seconds, 60);
        assert_eq!(config.processing.min_pass_interval(), Duration::ZERO);
        assert_eq!(config.queue_path(), PathBuf::from("/home/u/.voicedrop/queue.json"));
        assert_eq!(config.owner_lock_path(), PathBuf::from("/home/u/.voicedrop/owner.lock"));
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let voicedrop_dir = temp.path().join(".voicedrop");
        std::fs::create_dir_all(&voicedrop_dir).unwrap();

        let config_path = voicedrop_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
store:
  backend: sqlite
  slot: notes
uploader:
  endpoint: https://api.example.com/recordings
  timeout_seconds: 20
processing:
  min_pass_interval_ms: 2000
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.paths.home, Some("./state".to_string()));

        let config = resolve(
            Some((config_path.clone(), parsed)),
            env_from(&[]),
            PathBuf::from("/unused"),
        );

        assert_eq!(config.home, voicedrop_dir.join("./state"));
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.slot, "notes");
        assert_eq!(
            config.uploader.endpoint.as_deref(),
            Some("https://api.example.com/recordings")
        );
        assert_eq!(config.uploader.timeout_seconds, 20);
        assert_eq!(config.processing.min_pass_interval(), Duration::from_secs(2));
        assert_eq!(config.processing.probe_interval_seconds, 15);
        assert!(config.queue_path().ends_with("queue.db"));
    }

    #[test]
    fn test_env_overrides_file() {
        let file: ConfigFile = serde_yaml::from_str(
            r#"
version: "1.0"
paths:
  home: /from/file
uploader:
  endpoint: https://file.example.com
"#,
        )
        .unwrap();

        let config = resolve(
            Some((PathBuf::from("/p/.voicedrop/config.yaml"), file)),
            env_from(&[
                ("VOICEDROP_HOME", "/from/env"),
                ("VOICEDROP_ENDPOINT", "https://env.example.com"),
            ]),
            PathBuf::from("/unused"),
        );

        assert_eq!(config.home, PathBuf::from("/from/env"));
        assert_eq!(config.uploader.endpoint.as_deref(), Some("https://env.example.com"));
    }

    #[test]
    fn test_probe_interval_never_zero() {
        let settings = ProcessingSettings {
            min_pass_interval_ms: 0,
            probe_interval_seconds: 0,
        };
        assert_eq!(settings.probe_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
