use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, de::DeserializeOwned};

use crate::engine::{ArasanMode, EngineType, StockfishMode};

const ENV_PREFIX: &str = "UCI_MESSENGER_";
const CONFIG_FILE: &str = "uci-messenger.json";

/// Runtime settings. Every field has a default, a JSON file may set any
/// subset, and `UCI_MESSENGER_*` environment variables override both.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineType,
    pub log_level: String,
    pub shutdown_timeout_ms: u64,
    pub stockfish_mode: StockfishMode,
    pub arasan_mode: ArasanMode,
    pub arasan_stack_size: usize,
    /// Where the bundled engine resources live.
    pub resource_dir: PathBuf,
    /// Overrides `$HOME` as the Arasan resource target.
    pub home_dir: Option<PathBuf>,
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineType::default(),
            log_level: "info".to_string(),
            shutdown_timeout_ms: 5_000,
            stockfish_mode: StockfishMode::default(),
            arasan_mode: ArasanMode::default(),
            arasan_stack_size: 8 * 1024 * 1024,
            resource_dir: PathBuf::from("resources"),
            home_dir: None,
            threads: default_threads(),
        }
    }
}

/// One thread less than the machine has, but at least one.
pub fn default_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

impl Config {
    /// Reads the file named by `UCI_MESSENGER_CONFIG`, else `uci-messenger.json`
    /// in the working directory if there is one, then applies the environment.
    pub fn load() -> Result<Self> {
        let mut config = match env::var(format!("{ENV_PREFIX}CONFIG")) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => {
                let local = env::current_dir()?.join(CONFIG_FILE);
                if local.is_file() {
                    Self::from_file(local)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `UCI_MESSENGER_*` keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        config.apply(lookup)?;
        Ok(config)
    }

    fn apply(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value.trim().to_string()))
        };

        if let Some((key, value)) = var("ENGINE") {
            self.engine = EngineType::from_str(&value).with_context(|| format!("invalid {key}"))?;
        }
        if let Some((_, value)) = var("LOG") {
            self.log_level = value;
        }
        if let Some((key, value)) = var("SHUTDOWN_TIMEOUT_MS") {
            self.shutdown_timeout_ms = value.parse().with_context(|| format!("invalid {key}"))?;
        }
        if let Some((key, value)) = var("STOCKFISH_MODE") {
            self.stockfish_mode = parse_mode(&value).with_context(|| format!("invalid {key}"))?;
        }
        if let Some((key, value)) = var("ARASAN_MODE") {
            self.arasan_mode = parse_mode(&value).with_context(|| format!("invalid {key}"))?;
        }
        if let Some((key, value)) = var("ARASAN_STACK_SIZE") {
            self.arasan_stack_size = value.parse().with_context(|| format!("invalid {key}"))?;
        }
        if let Some((_, value)) = var("RESOURCE_DIR") {
            self.resource_dir = PathBuf::from(value);
        }
        if let Some((_, value)) = var("HOME") {
            self.home_dir = Some(PathBuf::from(value));
        }
        if let Some((key, value)) = var("THREADS") {
            self.threads = value
                .parse::<usize>()
                .with_context(|| format!("invalid {key}"))?
                .max(1);
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// The configured home directory, else `$HOME`.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir
            .clone()
            .or_else(|| env::var_os("HOME").map(PathBuf::from))
    }

    /// Falls back to `info` for unrecognised level names.
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

/// Mode enums share their serde names with the config file.
fn parse_mode<T: DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        value.to_ascii_lowercase(),
    ))?)
}
