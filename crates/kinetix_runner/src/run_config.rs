//! Replay Configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Command line: `kinetix-replay level.json --steps 600 --actions 1,0,0,0,0,1`
//! 2. Environment variables: `KINETIX_LEVEL`, `KINETIX_STEPS`, `KINETIX_ACTIONS`
//! 3. Config file: `--config <path>`, else `kinetix.toml` in the working directory
//! 4. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! level = "levels/bridge.json"
//! steps = 600
//! actions = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0]
//! stop_on_terminal = true
//! report_every = 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "kinetix.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Missing value after {0}")]
    MissingValue(String),

    #[error("Unknown flag: {0}")]
    UnknownFlag(String),
}

/// Everything a replay run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Level document to replay; an empty bordered scene when unset
    pub level: Option<PathBuf>,
    /// Size preset for the empty scene
    pub size: String,
    /// Number of `step_bound` calls
    pub steps: u32,
    /// Constant binding actions; zeros when empty
    pub actions: Vec<f32>,
    pub stop_on_terminal: bool,
    /// Log progress every this many steps; 0 disables
    pub report_every: u32,
    /// Where to write the final level
    pub output: Option<PathBuf>,
    /// Write the output level with compressed parameter blocks
    pub compress: bool,
    /// Print usage and exit
    #[serde(skip)]
    pub help: bool,
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            level: None,
            size: "s".to_string(),
            steps: 300,
            actions: Vec::new(),
            stop_on_terminal: true,
            report_every: 60,
            output: None,
            compress: false,
            help: false,
            config_path: None,
        }
    }
}

pub const USAGE: &str = "\
Usage: kinetix-replay [LEVEL] [OPTIONS]

Options:
  --config <PATH>        TOML config file (default: kinetix.toml if present)
  --level <PATH>         Level JSON to replay
  --size <s|m|l>         Preset for an empty scene when no level is given
  --steps <N>            Number of steps to run
  --actions <A,B,...>    Constant binding actions
  --report-every <N>     Progress log interval (0 = off)
  --output <PATH>        Write the final level JSON
  --compress             Compress parameter blocks in the output
  --keep-going           Do not stop at a terminal outcome
  -h, --help             Print this help";

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Comma-separated list of numbers
pub fn parse_actions(key: &str, value: &str) -> Result<Vec<f32>, ConfigError> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    value.split(',').map(|part| parse_value(key, part)).collect()
}

impl RunConfig {
    /// Load from the process environment and command line
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Merge every source; `env` looks up environment variables
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let explicit = find_config_flag(args)?;
        let mut config = match &explicit {
            Some(path) => Self::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load_from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };

        if let Some(level) = env("KINETIX_LEVEL").filter(|v| !v.is_empty()) {
            log::info!("Level from env: {}", level);
            config.level = Some(PathBuf::from(level));
        }
        if let Some(steps) = env("KINETIX_STEPS") {
            config.steps = parse_value("KINETIX_STEPS", &steps)?;
        }
        if let Some(actions) = env("KINETIX_ACTIONS") {
            config.actions = parse_actions("KINETIX_ACTIONS", &actions)?;
        }

        config.apply_args(args)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content)?;
        config.config_path = Some(path.to_path_buf());
        log::info!("Loaded replay config from {}", path.display());
        Ok(config)
    }

    fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        let mut iter = args.iter();
        let mut positional_seen = false;
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| iter.next().cloned().ok_or_else(|| ConfigError::MissingValue(flag.to_string()));
            match arg.as_str() {
                "-h" | "--help" => self.help = true,
                "--config" => {
                    // Already applied as the base layer.
                    value("--config")?;
                }
                "--level" => self.level = Some(PathBuf::from(value("--level")?)),
                "--size" => self.size = value("--size")?,
                "--steps" => self.steps = parse_value("--steps", &value("--steps")?)?,
                "--actions" => self.actions = parse_actions("--actions", &value("--actions")?)?,
                "--report-every" => self.report_every = parse_value("--report-every", &value("--report-every")?)?,
                "--output" => self.output = Some(PathBuf::from(value("--output")?)),
                "--compress" => self.compress = true,
                "--keep-going" => self.stop_on_terminal = false,
                flag if flag.starts_with('-') => return Err(ConfigError::UnknownFlag(flag.to_string())),
                // First positional argument is the level
                path if !positional_seen => {
                    self.level = Some(PathBuf::from(path));
                    positional_seen = true;
                }
                path => log::warn!("Ignoring extra argument: {}", path),
            }
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        log::info!("Replay Configuration:");
        match &self.level {
            Some(path) => log::info!("  Level: {}", path.display()),
            None => log::info!("  Level: empty '{}' scene", self.size),
        }
        log::info!("  Steps: {} (stop on terminal: {})", self.steps, self.stop_on_terminal);
        if !self.actions.is_empty() {
            log::info!("  Actions: {:?}", self.actions);
        }
        if let Some(path) = &self.output {
            log::info!("  Output: {}", path.display());
        }
        if let Some(path) = &self.config_path {
            log::info!("  Config: {}", path.display());
        }
    }
}

fn find_config_flag(args: &[String]) -> Result<Option<PathBuf>, ConfigError> {
    match args.iter().position(|a| a == "--config") {
        Some(i) => args
            .get(i + 1)
            .map(|p| Some(PathBuf::from(p)))
            .ok_or_else(|| ConfigError::MissingValue("--config".to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.steps, 300);
        assert_eq!(config.size, "s");
        assert!(config.stop_on_terminal);
        assert!(config.actions.is_empty());
    }

    #[test]
    fn test_args_override_env() {
        let env = |key: &str| match key {
            "KINETIX_STEPS" => Some("50".to_string()),
            "KINETIX_ACTIONS" => Some("1,0,0,0,0,1".to_string()),
            "KINETIX_LEVEL" => Some("from_env.json".to_string()),
            _ => None,
        };
        let config = RunConfig::from_sources(&args(&["--steps", "10", "--keep-going"]), env).unwrap();
        assert_eq!(config.steps, 10);
        assert_eq!(config.actions, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.level, Some(PathBuf::from("from_env.json")));
        assert!(!config.stop_on_terminal);
    }

    #[test]
    fn test_positional_level() {
        let config = RunConfig::from_sources(&args(&["bridge.json", "--compress"]), no_env).unwrap();
        assert_eq!(config.level, Some(PathBuf::from("bridge.json")));
        assert!(config.compress);
    }

    #[test]
    fn test_bad_values() {
        assert!(matches!(
            RunConfig::from_sources(&args(&["--steps", "many"]), no_env),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            RunConfig::from_sources(&args(&["--steps"]), no_env),
            Err(ConfigError::MissingValue(_))
        ));
        assert!(matches!(
            RunConfig::from_sources(&args(&["--fast"]), no_env),
            Err(ConfigError::UnknownFlag(_))
        ));
        assert!(parse_actions("a", "1,x").is_err());
    }

    #[test]
    fn test_toml_layer() {
        let config: RunConfig = toml::from_str(
            r#"
            level = "levels/bridge.json"
            steps = 600
            actions = [1.0, 0.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.steps, 600);
        assert_eq!(config.actions, vec![1.0, 0.0]);
        assert_eq!(config.size, "s");
        assert_eq!(config.report_every, 60);
    }
}
