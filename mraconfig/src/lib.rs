//! # MRAudio configuration
//!
//! Configuration management for the audio server:
//! - loading from a YAML file merged over embedded defaults,
//! - environment variable overrides (`MRAUDIO_CONFIG__SECTION__KEY`),
//! - typed getters for the sections the core consumes,
//! - declarative zone definitions (identity, volume policy, inputs,
//!   outputs),
//! - a thread-safe singleton accessor.
//!
//! ## Usage
//!
//! ```no_run
//! use mraconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let zones = config.zone_definitions().unwrap();
//! # let _ = (port, zones);
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

use mramodel::VolumePolicy;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("mraudio.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load MRAudio configuration"));
}

const ENV_CONFIG_DIR: &str = "MRAUDIO_CONFIG";
const ENV_PREFIX: &str = "MRAUDIO_CONFIG__";

const DEFAULT_HTTP_PORT: u16 = 7091;

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap(),
                Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap().max(0) as u64,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Declarative definition of one output bound to a zone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputDefinition {
    /// Transport type: airplay, snapcast, slimproto, sendspin, sonos,
    /// cast, dlna, spotify.
    #[serde(rename = "type")]
    pub kind: String,
    /// Network address of the renderer when the transport needs one.
    #[serde(default)]
    pub host: Option<String>,
    /// Free-form per-transport parameters.
    #[serde(default)]
    pub params: serde_yaml::Mapping,
}

/// Declarative definition of one zone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub source_mac: String,
    #[serde(default = "default_volume_section")]
    pub volume: VolumeSection,
    /// Input labels enabled for the zone.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<OutputDefinition>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VolumeSection {
    #[serde(default = "default_volume_default")]
    pub default: u32,
    #[serde(default = "default_volume_step")]
    pub step: u32,
    #[serde(default = "default_volume_max")]
    pub max: u32,
}

fn default_volume_default() -> u32 {
    25
}
fn default_volume_step() -> u32 {
    5
}
fn default_volume_max() -> u32 {
    100
}
fn default_volume_section() -> VolumeSection {
    VolumeSection {
        default: default_volume_default(),
        step: default_volume_step(),
        max: default_volume_max(),
    }
}

impl From<VolumeSection> for VolumePolicy {
    fn from(section: VolumeSection) -> VolumePolicy {
        VolumePolicy {
            default: section.default,
            step: section.step,
            max: section.max,
        }
    }
}

/// Configuration manager for MRAudio.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order.
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(".mraudio").exists() {
            return ".mraudio".to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(".mraudio");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".mraudio".to_string()
    }

    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("config path is not a directory"));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory.
    ///
    /// Search order: explicit parameter, `MRAUDIO_CONFIG` env var,
    /// `.mraudio` in the current directory, `.mraudio` in the home
    /// directory. The directory is created if missing.
    pub fn config_dir(directory: &str) -> String {
        let dir_path = Self::find_config_dir(directory);
        let path = Path::new(&dir_path);

        Self::validate_config_dir(path).expect("Cannot validate the configuration directory");

        dir_path
    }

    /// Loads the configuration from the specified directory.
    ///
    /// Merges an external `config.yaml` (if present) over the embedded
    /// defaults, then applies environment overrides, then persists the
    /// merged result.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory);
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Saves the current configuration to the config.yaml file.
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()?;
        Ok(())
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                let key_path = key
                    .trim_start_matches(ENV_PREFIX)
                    .split("__")
                    .collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        let new_key = Value::String(s.to_lowercase());
                        new_map.insert(new_key, Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a relative or absolute directory and creates it if needed.
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);

        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created cache directory");
        }

        Ok(absolute_path.to_string_lossy().to_string())
    }

    // ===== host =====

    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap() as u16,
            _ => DEFAULT_HTTP_PORT,
        }
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    /// Base URL of the internal HTTP endpoint (cover delivery).
    pub fn get_base_url(&self, local_ip: &str) -> String {
        format!("http://{}:{}", local_ip, self.get_http_port())
    }

    // ===== engine =====

    impl_u64_config!(
        get_handoff_timeout_ms,
        set_handoff_timeout_ms,
        &["engine", "handoff_timeout_ms"],
        4000
    );
    impl_u64_config!(
        get_first_chunk_timeout_ms,
        set_first_chunk_timeout_ms,
        &["engine", "first_chunk_timeout_ms"],
        6000
    );
    impl_u64_config!(
        get_subscriber_ring_chunks,
        set_subscriber_ring_chunks,
        &["engine", "subscriber_ring_chunks"],
        128
    );
    impl_u64_config!(
        get_prime_buffer_bytes,
        set_prime_buffer_bytes,
        &["engine", "prime_buffer_bytes"],
        131_072
    );

    // ===== outputs =====

    impl_u64_config!(
        get_dispatch_timeout_ms,
        set_dispatch_timeout_ms,
        &["outputs", "dispatch_timeout_ms"],
        2000
    );
    impl_u64_config!(
        get_probe_timeout_ms,
        set_probe_timeout_ms,
        &["outputs", "probe_timeout_ms"],
        1500
    );
    impl_u64_config!(
        get_airplay_start_retries,
        set_airplay_start_retries,
        &["outputs", "airplay_start_retries"],
        20
    );
    impl_u64_config!(
        get_slimproto_ready_timeout_ms,
        set_slimproto_ready_timeout_ms,
        &["outputs", "slimproto_ready_timeout_ms"],
        10_000
    );
    impl_u64_config!(
        get_sendspin_lead_window_ms,
        set_sendspin_lead_window_ms,
        &["outputs", "sendspin_lead_window_ms"],
        150
    );

    // ===== spotify =====

    impl_bool_config!(
        get_spotify_offload_enabled,
        set_spotify_offload_enabled,
        &["spotify", "offload_enabled"],
        false
    );

    // ===== covers =====

    pub fn get_cover_cache_dir(&self) -> Result<String> {
        let configured = match self.get_value(&["covers", "cache_dir"]) {
            Ok(Value::String(dir)) => dir,
            _ => "covers".to_string(),
        };
        self.resolve_and_create_dir(&configured)
    }

    // ===== log =====

    pub fn get_log_min_level(&self) -> String {
        match self.get_value(&["log", "min_level"]) {
            Ok(Value::String(level)) => level,
            _ => "INFO".to_string(),
        }
    }

    // ===== zones =====

    /// Typed zone definitions from the `zones` section.
    pub fn zone_definitions(&self) -> Result<Vec<ZoneDefinition>> {
        let value = self.get_value(&["zones"])?;
        let zones: Vec<ZoneDefinition> = serde_yaml::from_value(value)?;
        Ok(zones)
    }
}

/// Merges `overlay` into `base`, recursing through mappings.
fn merge_yaml(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_yaml(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Returns the global configuration singleton.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);
        assert_eq!(config.get_handoff_timeout_ms(), 4000);
        assert!(!config.get_spotify_offload_enabled());
        assert!(config.zone_definitions().unwrap().is_empty());
    }

    #[test]
    fn test_set_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        config.set_http_port(9000).unwrap();
        assert_eq!(config.get_http_port(), 9000);

        // A reload sees the persisted value.
        let reloaded = config_in(&dir);
        assert_eq!(reloaded.get_http_port(), 9000);
    }

    #[test]
    fn test_zone_definitions_parse() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            r#"
zones:
  - id: 1
    name: Living Room
    source_mac: "aa:bb:cc:dd:ee:01"
    volume: { default: 30, step: 3, max: 90 }
    inputs: [airplay, spotify]
    outputs:
      - type: airplay
        host: 192.168.1.50
"#,
        )
        .unwrap();

        let config = config_in(&dir);
        let zones = config.zone_definitions().unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "Living Room");
        assert_eq!(zones[0].volume.max, 90);
        assert_eq!(zones[0].outputs[0].kind, "airplay");
    }

    #[test]
    fn test_merge_yaml_overlay_wins() {
        let mut base: Value = serde_yaml::from_str("a: 1\nb: {c: 2}").unwrap();
        let overlay: Value = serde_yaml::from_str("b: {c: 3, d: 4}").unwrap();
        merge_yaml(&mut base, &overlay);
        assert_eq!(
            Config::get_value_internal(&base, &["b", "c"]).unwrap(),
            Value::Number(Number::from(3))
        );
        assert_eq!(
            Config::get_value_internal(&base, &["b", "d"]).unwrap(),
            Value::Number(Number::from(4))
        );
        assert_eq!(
            Config::get_value_internal(&base, &["a"]).unwrap(),
            Value::Number(Number::from(1))
        );
    }
}
